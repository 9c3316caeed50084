//! 测试用的内存存储

use super::{HeadResult, ObjectMeta, PutRequest, RemoteStore};
use crate::core::hasher::digest_file;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockStore {
    /// key -> etag
    objects: Mutex<HashMap<String, Option<String>>>,
    puts: Mutex<Vec<PutRequest>>,
    /// 前 N 次 head 返回服务错误
    head_failures: AtomicU32,
    /// 前 N 次 put 返回服务错误，u32::MAX 表示一直失败
    put_failures: AtomicU32,
    put_delay: Option<Duration>,
    pub head_calls: AtomicU64,
    pub put_calls: AtomicU64,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, etag: Option<&str>) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), etag.map(str::to_string));
        self
    }

    pub fn failing_heads(self, n: u32) -> Self {
        self.head_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_puts(self, n: u32) -> Self {
        self.put_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.puts.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn put(&self, request: &PutRequest) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        let digest = digest_file(&request.source_path).map_err(|source| StoreError::LocalIo {
            path: request.source_path.clone(),
            source,
        })?;

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        if Self::take_failure(&self.put_failures) {
            return Err(StoreError::service("503 SlowDown"));
        }

        self.objects
            .lock()
            .unwrap()
            .insert(request.key.clone(), Some(digest.to_hex()));
        self.puts.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<HeadResult, StoreError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.head_failures) {
            return Err(StoreError::service("500 InternalError"));
        }

        Ok(match self.objects.lock().unwrap().get(key) {
            Some(etag) => HeadResult::Found(ObjectMeta { etag: etag.clone() }),
            None => HeadResult::NotFound,
        })
    }

    async fn resolve_region(&self, _bucket: &str) -> Result<String, StoreError> {
        Ok("us-west-2".to_string())
    }

    fn name(&self) -> &str {
        "mock://bucket"
    }
}
