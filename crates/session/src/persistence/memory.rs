// In-process document store for offline sessions.
//
// Mirrors the remote API's observable contract: versioned etags, `If-Match`
// conflicts, schema validation, and not-found on unknown pages.

use std::collections::HashMap;
use std::sync::Mutex;

use canvasdeck_common::etag::{etag_for_revision, etag_matches};
use canvasdeck_common::types::{PageId, PageSnapshot};

use super::{LoadedPage, PersistenceAdapter, StoreAck};
use crate::error::PersistenceError;
use crate::lock;

#[derive(Debug, Clone)]
struct StoredPage {
    snapshot: PageSnapshot,
    version: u64,
}

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    pages: Mutex<HashMap<PageId, StoredPage>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a page at version 1.
    pub fn seed(&self, page_id: impl Into<PageId>, snapshot: PageSnapshot) {
        lock(&self.pages).insert(page_id.into(), StoredPage { snapshot, version: 1 });
    }

    /// Current stored snapshot, if any.
    pub fn snapshot(&self, page_id: &PageId) -> Option<PageSnapshot> {
        lock(&self.pages).get(page_id).map(|p| p.snapshot.clone())
    }

    pub fn version(&self, page_id: &PageId) -> Option<u64> {
        lock(&self.pages).get(page_id).map(|p| p.version)
    }
}

impl PersistenceAdapter for MemoryPersistence {
    async fn load(&self, page_id: &PageId) -> Result<LoadedPage, PersistenceError> {
        let pages = lock(&self.pages);
        let page = pages
            .get(page_id)
            .ok_or_else(|| PersistenceError::from_status(404, format!("page {page_id} not found")))?;
        Ok(LoadedPage {
            snapshot: page.snapshot.clone(),
            etag: Some(etag_for_revision(page.version)),
        })
    }

    async fn store(
        &self,
        page_id: &PageId,
        snapshot: &PageSnapshot,
        if_match: Option<&str>,
    ) -> Result<StoreAck, PersistenceError> {
        snapshot
            .validate()
            .map_err(|e| PersistenceError::from_status(422, e.to_string()))?;

        let mut pages = lock(&self.pages);
        let version = match pages.get(page_id) {
            Some(existing) => {
                let current = etag_for_revision(existing.version);
                if let Some(expected) = if_match {
                    if !etag_matches(expected, &current) {
                        return Err(PersistenceError::from_status(
                            412,
                            format!("page {page_id} changed remotely (now {current})"),
                        ));
                    }
                }
                existing.version + 1
            }
            None => 1,
        };
        pages.insert(page_id.clone(), StoredPage { snapshot: snapshot.clone(), version });
        Ok(StoreAck::now(Some(etag_for_revision(version))))
    }
}
