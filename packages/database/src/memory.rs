//! In-process geometry store.
//!
//! Each operation runs inside one lock, which gives upserts the same
//! atomicity as the `PostGIS` statement. Latency and transient failures
//! can be injected to exercise callers' timeout and retry handling.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use zoning_map_database_models::{GeometryWrite, StoredGeometry};
use zoning_map_geometry_models::ParentRef;

use crate::{DbError, GeometryStore};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: Vec<StoredGeometry>,
}

/// [`GeometryStore`] that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryGeometryStore {
    state: Mutex<MemoryState>,
    pending_failures: AtomicU32,
    calls: AtomicU32,
    latency: Option<Duration>,
}

impl MemoryGeometryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next `count` operations fail with
    /// [`DbError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of operations attempted so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record in insertion order.
    pub async fn records(&self) -> Vec<StoredGeometry> {
        self.state.lock().await.records.clone()
    }

    async fn begin(&self) -> Result<(), DbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DbError::Unavailable {
                message: "injected failure".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl GeometryStore for MemoryGeometryStore {
    async fn upsert(
        &self,
        parent: &ParentRef,
        write: &GeometryWrite,
    ) -> Result<StoredGeometry, DbError> {
        self.begin().await?;

        let mut state = self.state.lock().await;

        let existing = match parent {
            ParentRef::Unattached => None,
            _ => state.records.iter_mut().find(|r| r.parent == *parent),
        };

        if let Some(record) = existing {
            record.data = write.data.clone();
            record.geom_wkt = write.geom_wkt.clone();
            return Ok(record.clone());
        }

        state.next_id += 1;
        let record = StoredGeometry {
            id: state.next_id,
            parent: *parent,
            data: write.data.clone(),
            geom_wkt: write.geom_wkt.clone(),
        };
        state.records.push(record.clone());
        drop(state);

        Ok(record)
    }

    async fn fetch(&self, parent: &ParentRef) -> Result<Option<StoredGeometry>, DbError> {
        self.begin().await?;

        if *parent == ParentRef::Unattached {
            return Ok(None);
        }

        let state = self.state.lock().await;
        Ok(state.records.iter().find(|r| r.parent == *parent).cloned())
    }
}
