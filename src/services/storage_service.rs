//! 存储服务 - 上传链接与文件落盘

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{ObjectStore, UrlMethod};

/// 预签名上传链接
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub key: String,
    pub expires_in: u64,
}

/// 已存储的文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub key: String,
    pub download_url: String,
}

/// 存储服务
pub struct StorageService {
    store: Arc<dyn ObjectStore>,
    upload_ttl_secs: u64,
    download_ttl_secs: u64,
}

impl StorageService {
    /// # 参数
    /// - `upload_ttl_secs`: 上传链接有效期（默认 1 小时）
    /// - `download_ttl_secs`: 下载链接有效期（默认 7 天）
    pub fn new(store: Arc<dyn ObjectStore>, upload_ttl_secs: u64, download_ttl_secs: u64) -> Self {
        Self {
            store,
            upload_ttl_secs,
            download_ttl_secs,
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// 为客户端直传生成上传链接
    pub fn presign_upload(&self, file_name: &str) -> AppResult<PresignedUpload> {
        let key = upload_key(file_name)?;
        let upload_url = self.store.presign(UrlMethod::Put, &key, self.upload_ttl_secs);
        info!("🔗 生成上传链接: {}", key);
        Ok(PresignedUpload {
            upload_url,
            key,
            expires_in: self.upload_ttl_secs,
        })
    }

    /// 上传文件到 `uploads/<uuid>/<file_name>`，返回下载链接
    pub async fn upload_document(&self, file_name: &str, bytes: Vec<u8>) -> AppResult<StoredDocument> {
        let key = upload_key(file_name)?;
        self.put(&key, bytes, content_type_for(file_name)).await
    }

    /// 以指定 key 写入并返回下载链接
    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<StoredDocument> {
        let size = bytes.len();
        self.store
            .put_object(key, bytes, content_type)
            .await
            .map_err(|e| {
                error!("❌ 文件上传失败 [{}]: {}", key, e);
                e
            })?;
        info!("📦 已上传 {} ({} 字节)", key, size);
        Ok(StoredDocument {
            key: key.to_string(),
            download_url: self.download_url(key),
        })
    }

    pub fn download_url(&self, key: &str) -> String {
        self.store.presign(UrlMethod::Get, key, self.download_ttl_secs)
    }
}

fn upload_key(file_name: &str) -> AppResult<String> {
    // 只保留文件名部分
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::invalid_input("file_name 不能为空"));
    }
    Ok(format!("uploads/{}/{}", uuid::Uuid::new_v4(), name))
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryObjectStore, UrlSigner};

    fn service() -> (Arc<MemoryObjectStore>, StorageService) {
        let store = Arc::new(MemoryObjectStore::new(
            "docs",
            "http://files.local",
            UrlSigner::new("secret"),
        ));
        (store.clone(), StorageService::new(store, 3600, 604800))
    }

    #[tokio::test]
    async fn test_upload_document_layout() {
        let (store, service) = service();
        let stored = service
            .upload_document("scans/worksheet.PDF", b"%PDF".to_vec())
            .await
            .unwrap();

        assert!(stored.key.starts_with("uploads/"));
        assert!(stored.key.ends_with("/worksheet.PDF"));
        assert_eq!(stored.key.split('/').count(), 3);
        assert!(stored.download_url.contains("method=GET"));
        assert_eq!(store.get_object(&stored.key).await.unwrap(), b"%PDF".to_vec());
        assert_eq!(
            store.content_type(&stored.key).await.as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_presign_upload() {
        let (_, service) = service();
        let upload = service.presign_upload("photo.png").unwrap();
        assert!(upload.upload_url.contains("method=PUT"));
        assert_eq!(upload.expires_in, 3600);
        assert!(service.presign_upload("  ").is_err());
    }
}
