use crate::core::scanner::UploadItem;
use crate::error::{SyncError, SyncResult};
use crate::storage::{HeadResult, RemoteStore};
use std::sync::Arc;
use tracing::debug;

/// 同步判断结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Upload,
    /// 远程 ETag 与本地摘要一致
    SkipUnchanged,
    /// key 中带有内容哈希且远程已存在
    SkipAlreadyHashed,
}

/// 同步模式下根据远程元数据决定是否上传
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RemoteStore>,
    sync_enabled: bool,
    hash_prefix_enabled: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RemoteStore>, sync_enabled: bool, hash_prefix_enabled: bool) -> Self {
        Self {
            store,
            sync_enabled,
            hash_prefix_enabled,
        }
    }

    /// 单次判断；远程查询失败（对象不存在除外）返回 `SyncError::Reconcile`
    pub async fn decide(&self, item: &UploadItem) -> SyncResult<SyncDecision> {
        if !self.sync_enabled {
            return Ok(SyncDecision::Upload);
        }

        let key = item.destination_key();
        let head = self
            .store
            .head(key)
            .await
            .map_err(|e| SyncError::from_store(key, e, true))?;

        let decision = match head {
            HeadResult::NotFound => SyncDecision::Upload,
            // 带哈希前缀的 key 内容不可变，存在即相同
            HeadResult::Found(_) if self.hash_prefix_enabled => SyncDecision::SkipAlreadyHashed,
            HeadResult::Found(meta) => match meta.etag {
                Some(etag) if etag.eq_ignore_ascii_case(item.content_digest()) => {
                    SyncDecision::SkipUnchanged
                }
                _ => SyncDecision::Upload,
            },
        };

        debug!("同步判断: {} -> {:?}", key, decision);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::MockStore;
    use std::path::PathBuf;

    fn item(digest: &str, prefix: &str) -> UploadItem {
        UploadItem::new(
            PathBuf::from("/src/a.txt"),
            "a.txt".to_string(),
            10,
            digest.to_string(),
            prefix.to_string(),
            "site",
        )
    }

    #[tokio::test]
    async fn test_sync_disabled_never_queries() {
        let store = Arc::new(MockStore::new().with_object("/site/a.txt", Some("abc")));
        let reconciler = Reconciler::new(store.clone(), false, false);

        assert_eq!(
            reconciler.decide(&item("abc", "")).await.unwrap(),
            SyncDecision::Upload
        );
        assert_eq!(store.head_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_object_uploads() {
        let store = Arc::new(MockStore::new());
        let reconciler = Reconciler::new(store, true, false);
        assert_eq!(
            reconciler.decide(&item("abc", "")).await.unwrap(),
            SyncDecision::Upload
        );
    }

    #[tokio::test]
    async fn test_existing_hashed_key_is_skipped_regardless_of_etag() {
        let store = Arc::new(MockStore::new().with_object("/XrY7u-Ae/site/a.txt", Some("other")));
        let reconciler = Reconciler::new(store, true, true);
        assert_eq!(
            reconciler.decide(&item("abc", "XrY7u-Ae")).await.unwrap(),
            SyncDecision::SkipAlreadyHashed
        );
    }

    #[tokio::test]
    async fn test_etag_comparison() {
        let store = Arc::new(MockStore::new().with_object("/site/a.txt", Some("abc")));
        let reconciler = Reconciler::new(store, true, false);

        assert_eq!(
            reconciler.decide(&item("abc", "")).await.unwrap(),
            SyncDecision::SkipUnchanged
        );
        assert_eq!(
            reconciler.decide(&item("ABC", "")).await.unwrap(),
            SyncDecision::SkipUnchanged
        );
        assert_eq!(
            reconciler.decide(&item("def", "")).await.unwrap(),
            SyncDecision::Upload
        );
    }

    #[tokio::test]
    async fn test_missing_etag_uploads() {
        let store = Arc::new(MockStore::new().with_object("/site/a.txt", None));
        let reconciler = Reconciler::new(store, true, false);
        assert_eq!(
            reconciler.decide(&item("abc", "")).await.unwrap(),
            SyncDecision::Upload
        );
    }

    #[tokio::test]
    async fn test_head_error_is_retryable_reconcile_error() {
        let store = Arc::new(MockStore::new().failing_heads(1));
        let reconciler = Reconciler::new(store, true, false);

        let err = reconciler.decide(&item("abc", "")).await.unwrap_err();
        assert!(matches!(err, SyncError::Reconcile { .. }));
        assert!(err.is_retryable());
    }
}
