//! 对象存储 - 基础设施层
//!
//! 二进制文件（PDF、图片、练习卷）的上传、下载、删除，以及生成限时签名链接。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::signing::{UrlMethod, UrlSigner};
use crate::error::ObjectStoreError;

/// 对象存储能力
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 当前使用的 bucket
    fn bucket(&self) -> &str;

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// 生成限时签名链接
    ///
    /// # 参数
    /// - `method`: 上传（PUT）或下载（GET）
    /// - `ttl_secs`: 有效期（秒）
    fn presign(&self, method: UrlMethod, key: &str, ttl_secs: u64) -> String;
}

fn expires_at(ttl_secs: u64) -> i64 {
    chrono::Utc::now().timestamp() + i64::try_from(ttl_secs).unwrap_or(i64::MAX / 2)
}

// ========== 内存实现 ==========

/// 进程内对象存储
pub struct MemoryObjectStore {
    bucket: String,
    base_url: String,
    signer: UrlSigner,
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str, base_url: &str, signer: UrlSigner) -> Self {
        Self {
            bucket: bucket.to_string(),
            base_url: base_url.to_string(),
            signer,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// 对象的内容类型（测试断言用）
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ObjectStoreError::NotFound { key: key.to_string() })
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn presign(&self, method: UrlMethod, key: &str, ttl_secs: u64) -> String {
        self.signer
            .sign(&self.base_url, method, &self.bucket, key, expires_at(ttl_secs))
    }
}

// ========== HTTP 实现 ==========

/// 通过 HTTP 访问的对象存储（`{base}/{bucket}/{key}`）
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    signer: UrlSigner,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, bucket: &str, signer: UrlSigner) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            signer,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }

    fn request_failed(key: &str, e: reqwest::Error) -> ObjectStoreError {
        error!("❌ 对象存储请求失败 [{}]: {}", key, e);
        ObjectStoreError::RequestFailed {
            key: key.to_string(),
            source: Box::new(e),
        }
    }

    fn check(key: &str, response: reqwest::Response) -> Result<reqwest::Response, ObjectStoreError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound { key: key.to_string() });
        }
        if !status.is_success() {
            error!("❌ 对象存储返回异常 [{}]: {}", key, status);
            return Err(ObjectStoreError::BadResponse {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError> {
        debug!("上传对象 {} ({} 字节, {})", key, bytes.len(), content_type);
        let response = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::request_failed(key, e))?;
        Self::check(key, response)?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        debug!("下载对象 {}", key);
        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(|e| Self::request_failed(key, e))?;
        let response = Self::check(key, response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::request_failed(key, e))?;
        Ok(bytes.to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        debug!("删除对象 {}", key);
        let response = self
            .client
            .delete(self.object_url(key))
            .send()
            .await
            .map_err(|e| Self::request_failed(key, e))?;
        match Self::check(key, response) {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn presign(&self, method: UrlMethod, key: &str, ttl_secs: u64) -> String {
        self.signer
            .sign(&self.base_url, method, &self.bucket, key, expires_at(ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_memory_roundtrip_and_presign() {
        let store = MemoryObjectStore::new("docs", "http://files.local", UrlSigner::new("s"));
        store
            .put_object("a/b.txt", b"hello".to_vec(), "text/plain")
            .await
            .unwrap();
        assert_eq!(store.get_object("a/b.txt").await.unwrap(), b"hello");
        assert_eq!(store.content_type("a/b.txt").await.as_deref(), Some("text/plain"));

        let url = store.presign(UrlMethod::Get, "a/b.txt", 60);
        let now = chrono::Utc::now().timestamp();
        assert!(UrlSigner::new("s").verify(&url, now).is_ok());
        assert!(UrlSigner::new("s").verify(&url, now + 120).is_err());

        store.delete_object("a/b.txt").await.unwrap();
        assert!(matches!(
            store.get_object("a/b.txt").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_put_and_missing_get() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/docs/uploads/x.pdf"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "docs", UrlSigner::new("s"));
        store
            .put_object("uploads/x.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();
        assert!(matches!(
            store.get_object("uploads/x.pdf").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }
}
