//! 签名 URL
//!
//! 对象存储的临时访问链接：`method + key + 过期时间` 经 HMAC-SHA256 签名，
//! 以十六进制放在查询串里。

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ObjectStoreError;

type HmacSha256 = Hmac<Sha256>;

/// 签名链接允许的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlMethod {
    Get,
    Put,
}

impl UrlMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlMethod::Get => "GET",
            UrlMethod::Put => "PUT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(UrlMethod::Get),
            "PUT" => Some(UrlMethod::Put),
            _ => None,
        }
    }
}

/// 签名链接生成与校验
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn signature(&self, method: UrlMethod, bucket: &str, key: &str, expires: i64) -> String {
        // HMAC 接受任意长度的密钥，new_from_slice 不会失败
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(format!("{}\n{}/{}\n{}", method.as_str(), bucket, key, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 生成签名链接
    ///
    /// # 参数
    /// - `base_url`: 对象存储服务地址
    /// - `expires_at`: 过期时间（Unix 秒）
    pub fn sign(
        &self,
        base_url: &str,
        method: UrlMethod,
        bucket: &str,
        key: &str,
        expires_at: i64,
    ) -> String {
        let signature = self.signature(method, bucket, key, expires_at);
        format!(
            "{}/{}/{}?method={}&expires={}&signature={}",
            base_url.trim_end_matches('/'),
            bucket,
            key,
            method.as_str(),
            expires_at,
            signature
        )
    }

    /// 校验签名链接，返回 `(method, bucket, key)`
    ///
    /// # 参数
    /// - `url`: 完整链接
    /// - `now`: 当前时间（Unix 秒）
    pub fn verify(&self, url: &str, now: i64) -> Result<(UrlMethod, String, String), ObjectStoreError> {
        let invalid = |reason: &str| ObjectStoreError::InvalidSignature {
            reason: reason.to_string(),
        };

        let parsed = reqwest::Url::parse(url).map_err(|_| invalid("无法解析链接"))?;
        let mut segments = parsed
            .path_segments()
            .ok_or_else(|| invalid("缺少路径"))?
            .filter(|s| !s.is_empty());
        let bucket = segments.next().ok_or_else(|| invalid("缺少 bucket"))?.to_string();
        let key = segments.collect::<Vec<_>>().join("/");
        if key.is_empty() {
            return Err(invalid("缺少对象 key"));
        }

        let mut method = None;
        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "method" => method = UrlMethod::parse(&value),
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }
        let method = method.ok_or_else(|| invalid("缺少或无效的 method"))?;
        let expires = expires.ok_or_else(|| invalid("缺少或无效的 expires"))?;
        let signature = signature.ok_or_else(|| invalid("缺少 signature"))?;

        if expires < now {
            return Err(invalid("链接已过期"));
        }
        if self.signature(method, &bucket, &key, expires) != signature {
            return Err(invalid("签名不匹配"));
        }
        Ok((method, bucket, key))
    }
}
