// Page persistence: load/store one page's snapshot against a document store.
//
// Adapters report raw outcomes only. They never retry and never serialize
// concurrent calls; the autosave scheduler and save-all coordinator decide
// retry vs. surface and hold the per-page save lane around every `store`.

pub mod backoff;
pub mod http;
pub mod memory;

use std::future::Future;
use std::time::Duration;

use canvasdeck_common::types::{PageId, PageSnapshot};
use chrono::{DateTime, Utc};

use crate::error::PersistenceError;

pub use backoff::RetryPolicy;
pub use http::HttpPersistenceAdapter;
pub use memory::MemoryPersistence;

/// Snapshot fetched by `load`, with the store's version tag if it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage {
    pub snapshot: PageSnapshot,
    pub etag: Option<String>,
}

/// Acknowledgement of a successful `store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAck {
    pub etag: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl StoreAck {
    pub fn now(etag: Option<String>) -> Self {
        Self { etag, saved_at: Utc::now() }
    }
}

/// Abstraction over the remote document API. Trait-based for testability.
///
/// All methods return `Send` futures so saves can run on spawned tasks.
pub trait PersistenceAdapter: Send + Sync + 'static {
    /// Fetch the current snapshot of a page.
    fn load(
        &self,
        page_id: &PageId,
    ) -> impl Future<Output = Result<LoadedPage, PersistenceError>> + Send;

    /// Send a full snapshot. `if_match` carries the last known etag when
    /// optimistic concurrency is enabled.
    fn store(
        &self,
        page_id: &PageId,
        snapshot: &PageSnapshot,
        if_match: Option<&str>,
    ) -> impl Future<Output = Result<StoreAck, PersistenceError>> + Send;
}

/// Run `store` under a deadline. Elapsing counts as a transient failure.
pub async fn store_with_timeout<A: PersistenceAdapter>(
    adapter: &A,
    page_id: &PageId,
    snapshot: &PageSnapshot,
    if_match: Option<&str>,
    timeout: Duration,
) -> Result<StoreAck, PersistenceError> {
    match tokio::time::timeout(timeout, adapter.store(page_id, snapshot, if_match)).await {
        Ok(result) => result,
        Err(_) => Err(PersistenceError::transient(format!(
            "store timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    struct SlowAdapter {
        delay: Duration,
    }

    impl PersistenceAdapter for SlowAdapter {
        async fn load(&self, _page_id: &PageId) -> Result<LoadedPage, PersistenceError> {
            Ok(LoadedPage { snapshot: PageSnapshot::default(), etag: None })
        }

        async fn store(
            &self,
            _page_id: &PageId,
            _snapshot: &PageSnapshot,
            _if_match: Option<&str>,
        ) -> Result<StoreAck, PersistenceError> {
            tokio::time::sleep(self.delay).await;
            Ok(StoreAck::now(Some("\"1\"".into())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_within_deadline_passes_through() {
        let adapter = SlowAdapter { delay: Duration::from_millis(100) };
        let ack = store_with_timeout(
            &adapter,
            &PageId::new("home"),
            &PageSnapshot::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .expect("store should finish in time");
        assert_eq!(ack.etag.as_deref(), Some("\"1\""));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_transient() {
        let adapter = SlowAdapter { delay: Duration::from_secs(30) };
        let err = store_with_timeout(
            &adapter,
            &PageId::new("home"),
            &PageSnapshot::default(),
            None,
            Duration::from_secs(15),
        )
        .await
        .expect_err("store should time out");
        assert_eq!(err.kind, FailureKind::Transient);
        assert!(err.message.contains("15000ms"));
    }
}
