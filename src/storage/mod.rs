pub mod s3;

#[cfg(test)]
pub mod testing;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

pub use s3::{S3Options, S3Store};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- head, 区域查询等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- put
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 一次上传请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub key: String,
    /// 上传时重新打开此文件作为请求体
    pub source_path: PathBuf,
    pub content_type: String,
    pub acl: String,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// 远程对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMeta {
    /// 已去掉引号的 ETag
    pub etag: Option<String>,
}

/// head 查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadResult {
    Found(ObjectMeta),
    NotFound,
}

/// 远程对象存储接口
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 上传本地文件到 `request.key`
    async fn put(&self, request: &PutRequest) -> Result<(), StoreError>;

    /// 查询对象元数据，对象不存在返回 `HeadResult::NotFound`
    async fn head(&self, key: &str) -> Result<HeadResult, StoreError>;

    /// 查询 bucket 所在区域
    async fn resolve_region(&self, bucket: &str) -> Result<String, StoreError>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 给远程调用加上超时，超时按可重试的服务错误处理
pub async fn with_timeout<T, F>(secs: u64, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| StoreError::Service(format!("操作超时 ({}s)", secs)))
}

/// 去掉 ETag 两侧的引号
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
