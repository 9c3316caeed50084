use crate::core::content_type::ContentTypes;
use crate::core::reconciler::{Reconciler, SyncDecision};
use crate::core::retry::RetryPolicy;
use crate::core::scanner::UploadItem;
use crate::error::{SyncError, SyncResult};
use crate::storage::{PutRequest, RemoteStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 默认并行上传数
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// 单个文件出错后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// 任意文件最终失败即中止整个任务
    #[default]
    Abort,
    /// 记录失败并继续处理其余文件
    Continue,
}

/// 上传配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 是否开启同步模式（只上传新增或变化的文件）
    pub sync_enabled: bool,
    /// key 中是否带有内容哈希前缀
    pub hash_prefix_enabled: bool,
    pub acl: String,
    pub cache_control: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub content_types: ContentTypes,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_enabled: false,
            hash_prefix_enabled: false,
            acl: "private".to_string(),
            cache_control: None,
            expires: None,
            content_types: ContentTypes::default(),
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unchanged,
    AlreadyHashed,
    DryRun,
}

/// 单个文件的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub key: String,
    pub outcome: UploadOutcome,
}

/// 上传报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub duration_ms: u64,
    pub outcomes: Vec<ItemOutcome>,
}

impl UploadReport {
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, UploadOutcome::Failed(_)))
    }
}

/// 进度事件，按处理顺序发送
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Uploading { key: String },
    DryRun { key: String },
    Skipped { key: String, reason: SkipReason },
    Failed { key: String, error: String },
}

/// 传输统计
#[derive(Debug, Default)]
struct TransferStats {
    uploaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// 单个工作任务共享的上下文
struct Worker {
    store: Arc<dyn RemoteStore>,
    reconciler: Reconciler,
    config: Arc<EngineConfig>,
    stats: Arc<TransferStats>,
    events: Option<mpsc::Sender<UploadEvent>>,
    cancel: CancellationToken,
    dry_run: bool,
}

/// 工作任务退出时交回的结果
struct WorkerResult {
    outcomes: Vec<ItemOutcome>,
    fatal: Option<SyncError>,
}

/// 上传调度器
pub struct UploadEngine {
    store: Arc<dyn RemoteStore>,
    config: Arc<EngineConfig>,
    events: Option<mpsc::Sender<UploadEvent>>,
    cancelled: CancellationToken,
}

impl UploadEngine {
    pub fn new(store: Arc<dyn RemoteStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            events: None,
            cancelled: CancellationToken::new(),
        }
    }

    /// 接收进度事件
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 取消上传
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// 可以交给其他任务（如 Ctrl-C 处理）的取消句柄
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancelled.clone()
    }

    /// 用 `worker_count` 个并行任务处理全部文件
    ///
    /// 返回的报告里每个被处理的文件恰好有一条结果。出现致命错误时其余任务
    /// 会尽快停止，返回 `SyncError::Aborted`，其中带有已上传的数量。
    pub async fn run(
        &self,
        items: Vec<UploadItem>,
        worker_count: usize,
        dry_run: bool,
    ) -> SyncResult<UploadReport> {
        if worker_count == 0 {
            return Err(SyncError::Configuration(
                "并行数必须大于 0".to_string(),
            ));
        }

        let start = Instant::now();
        let total = items.len();
        info!(
            "开始上传: {} 个文件, {} 个并行任务, 目标 {}{}",
            total,
            worker_count,
            self.store.name(),
            if dry_run { " (dry run)" } else { "" }
        );

        // 队列一次性填满后关闭，任务取空即退出
        let (tx, rx) = mpsc::channel(total.max(1));
        for item in items {
            if tx.send(item).await.is_err() {
                break;
            }
        }
        drop(tx);
        let queue = Arc::new(Mutex::new(rx));

        let stats = Arc::new(TransferStats::default());
        let run_cancel = self.cancelled.child_token();
        let worker = Arc::new(Worker {
            store: self.store.clone(),
            reconciler: Reconciler::new(
                self.store.clone(),
                self.config.sync_enabled,
                self.config.hash_prefix_enabled,
            ),
            config: self.config.clone(),
            stats: stats.clone(),
            events: self.events.clone(),
            cancel: run_cancel.clone(),
            dry_run,
        });

        let handles: Vec<_> = (0..worker_count.min(total.max(1)))
            .map(|id| {
                let worker = worker.clone();
                let queue = queue.clone();
                tokio::spawn(async move { worker.drain(id, queue).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        let mut fatal: Option<SyncError> = None;

        for joined in futures::future::join_all(handles).await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("上传任务异常退出: {}", e);
                    run_cancel.cancel();
                    WorkerResult {
                        outcomes: Vec::new(),
                        fatal: Some(SyncError::Worker(e.to_string())),
                    }
                }
            };
            outcomes.extend(result.outcomes);

            // 保留第一个真正的错误，因取消而退出的任务不覆盖它
            if let Some(err) = result.fatal {
                if matches!(fatal, None | Some(SyncError::Cancelled)) {
                    fatal = Some(err);
                }
            }
        }

        let uploaded = stats.uploaded.load(Ordering::SeqCst);
        if fatal.is_none() && self.cancelled.is_cancelled() && outcomes.len() < total {
            fatal = Some(SyncError::Cancelled);
        }
        if let Some(source) = fatal {
            error!("上传中止: 已上传 {} 个文件, 原因: {}", uploaded, source);
            return Err(SyncError::Aborted {
                uploaded,
                source: Box::new(source),
            });
        }

        let report = UploadReport {
            uploaded,
            skipped: stats.skipped.load(Ordering::SeqCst),
            failed: stats.failed.load(Ordering::SeqCst),
            duration_ms: start.elapsed().as_millis() as u64,
            outcomes,
        };

        info!(
            "上传完成: 上传 {}, 跳过 {}, 失败 {}, 耗时 {}ms",
            report.uploaded, report.skipped, report.failed, report.duration_ms
        );

        Ok(report)
    }
}

impl Worker {
    /// 从共享队列中不断取出文件处理，直到队列为空或被取消
    async fn drain(
        &self,
        id: usize,
        queue: Arc<Mutex<mpsc::Receiver<UploadItem>>>,
    ) -> WorkerResult {
        let mut outcomes = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                debug!("上传任务 {} 收到取消信号", id);
                break;
            }

            let next = queue.lock().await.recv().await;
            let Some(item) = next else { break };

            match self.process(&item).await {
                Ok(outcome) => outcomes.push(ItemOutcome {
                    key: item.destination_key().to_string(),
                    outcome,
                }),
                Err(SyncError::Cancelled) => {
                    return WorkerResult {
                        outcomes,
                        fatal: Some(SyncError::Cancelled),
                    };
                }
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::Abort => {
                        error!("{} 上传失败，中止全部任务: {}", item.destination_key(), err);
                        self.cancel.cancel();
                        return WorkerResult {
                            outcomes,
                            fatal: Some(err),
                        };
                    }
                    FailurePolicy::Continue => {
                        error!("{} 上传失败: {}", item.destination_key(), err);
                        self.stats.failed.fetch_add(1, Ordering::SeqCst);
                        self.emit(UploadEvent::Failed {
                            key: item.destination_key().to_string(),
                            error: err.to_string(),
                        })
                        .await;
                        outcomes.push(ItemOutcome {
                            key: item.destination_key().to_string(),
                            outcome: UploadOutcome::Failed(err.to_string()),
                        });
                    }
                },
            }
        }

        WorkerResult {
            outcomes,
            fatal: None,
        }
    }

    /// 判断并上传单个文件
    async fn process(&self, item: &UploadItem) -> SyncResult<UploadOutcome> {
        let key = item.destination_key();

        let decision = self
            .config
            .retry
            .run(&format!("查询 {}", key), &self.cancel, move || async move {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
                    decision = self.reconciler.decide(item) => decision,
                }
            })
            .await?;

        let reason = match decision {
            SyncDecision::Upload => None,
            SyncDecision::SkipUnchanged => Some(SkipReason::Unchanged),
            SyncDecision::SkipAlreadyHashed => Some(SkipReason::AlreadyHashed),
        };
        if let Some(reason) = reason {
            self.stats.skipped.fetch_add(1, Ordering::SeqCst);
            self.emit(UploadEvent::Skipped {
                key: key.to_string(),
                reason,
            })
            .await;
            return Ok(UploadOutcome::Skipped(reason));
        }

        if self.dry_run {
            self.stats.skipped.fetch_add(1, Ordering::SeqCst);
            self.emit(UploadEvent::DryRun {
                key: key.to_string(),
            })
            .await;
            return Ok(UploadOutcome::Skipped(SkipReason::DryRun));
        }

        let request = PutRequest {
            key: key.to_string(),
            source_path: item.source_path().to_path_buf(),
            content_type: self.config.content_types.for_path(item.source_path()),
            acl: self.config.acl.clone(),
            cache_control: self.config.cache_control.clone(),
            expires: self.config.expires,
        };

        let request = &request;
        self.config
            .retry
            .run(&format!("上传 {}", key), &self.cancel, move || async move {
                self.emit(UploadEvent::Uploading {
                    key: key.to_string(),
                })
                .await;
                // 中止时不等待进行中的上传
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
                    result = self.store.put(request) => {
                        result.map_err(|e| SyncError::from_store(key, e, false))
                    }
                }
            })
            .await?;

        self.stats.uploaded.fetch_add(1, Ordering::SeqCst);
        debug!("上传完成: {} ({} 字节)", key, item.size_bytes());
        Ok(UploadOutcome::Uploaded)
    }

    async fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
