pub mod content_type;
pub mod engine;
pub mod filter;
pub mod hasher;
pub mod keys;
pub mod reconciler;
pub mod retry;
pub mod scanner;

pub use content_type::ContentTypes;
pub use engine::{
    EngineConfig, FailurePolicy, ItemOutcome, SkipReason, UploadEngine, UploadEvent,
    UploadOutcome, UploadReport,
};
pub use filter::PathFilter;
pub use hasher::{digest_file, prefix_from_digest, ContentDigest};
pub use keys::build_key;
pub use reconciler::{Reconciler, SyncDecision};
pub use retry::{RetryError, RetryPolicy};
pub use scanner::{ListEntry, ScanConfig, SourceScanner, UploadItem};
