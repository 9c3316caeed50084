use crate::error::SyncError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// 默认最多尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// 默认重试间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 固定间隔的有限次重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 包含第一次在内的总尝试次数
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// 重试结束时的失败原因
#[derive(Debug)]
pub enum RetryError {
    /// 可重试错误用完了尝试次数
    Exhausted { attempts: u32, last: SyncError },
    /// 不可重试的错误，未做重试
    Fatal(SyncError),
    Cancelled,
}

impl From<RetryError> for SyncError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
            RetryError::Cancelled => SyncError::Cancelled,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// 执行 `op`，可重试错误按固定间隔重试；等待期间可被取消
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(RetryError::Fatal(err));
            }

            if attempt >= max_attempts {
                error!(target: "s3up::retry", attempts = attempt, "{} 最终失败: {}", label, err);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                attempt,
                max_attempts,
                "{} 失败，{}ms 后重试: {}",
                label,
                self.delay.as_millis(),
                err
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}
