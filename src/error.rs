//! 错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 远程存储操作错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 远程服务返回的错误（网络、权限、超时等），可重试
    #[error("远程服务错误: {0}")]
    Service(String),

    /// 本地文件无法读取，不可重试
    #[error("读取本地文件失败 {path:?}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn service(err: impl std::fmt::Display) -> Self {
        StoreError::Service(err.to_string())
    }

    /// 只有远程服务错误才值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Service(_))
    }
}

/// 同步过程中的错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的忽略规则 '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("遍历源目录失败 {path:?}: {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("查询远程对象 {key} 失败: {source}")]
    Reconcile {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("上传 {key} 失败: {source}")]
    Transfer {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("读取本地文件失败 {path:?}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("操作已取消")]
    Cancelled,

    #[error("上传任务异常退出: {0}")]
    Worker(String),

    #[error("上传中止（已上传 {uploaded} 个文件）: {source}")]
    Aborted {
        uploaded: u64,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// 远程查询或上传遇到服务错误时可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Reconcile { source, .. } | SyncError::Transfer { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// 将存储错误按所处阶段归类；本地读取错误单独成类
    pub fn from_store(key: &str, err: StoreError, reconciling: bool) -> Self {
        match err {
            StoreError::LocalIo { path, source } => SyncError::LocalIo { path, source },
            other if reconciling => SyncError::Reconcile {
                key: key.to_string(),
                source: other,
            },
            other => SyncError::Transfer {
                key: key.to_string(),
                source: other,
            },
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_service_errors_retry() {
        assert!(StoreError::service("503 SlowDown").is_retryable());
        let local = StoreError::LocalIo {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!local.is_retryable());
    }

    #[test]
    fn test_from_store_classifies_by_phase() {
        let err = SyncError::from_store("/a.txt", StoreError::service("boom"), true);
        assert!(matches!(err, SyncError::Reconcile { .. }));

        let err = SyncError::from_store("/a.txt", StoreError::service("boom"), false);
        assert!(matches!(err, SyncError::Transfer { .. }));

        let local = StoreError::LocalIo {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let err = SyncError::from_store("/a.txt", local, false);
        assert!(matches!(err, SyncError::LocalIo { .. }));
        assert!(!err.is_retryable());
    }
}
