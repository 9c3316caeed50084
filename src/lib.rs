//! 将本地目录上传到 S3
//!
//! 扫描源目录、计算内容摘要并生成远程 key，然后由多个并行任务上传。
//! 同步模式下先查询远程对象，跳过内容未变化的文件。

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{FileConfig, Overrides, Settings};
pub use core::{EngineConfig, UploadEngine, UploadEvent, UploadReport};
pub use error::{StoreError, SyncError, SyncResult};
pub use storage::{RemoteStore, S3Store};

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
