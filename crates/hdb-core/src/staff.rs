//! Staff id cache.
//!
//! The directory holds an immutable snapshot that is swapped wholesale on
//! refresh. Readers clone the `Arc` and never observe a half-updated set.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::UserId,
    errors::Error,
    schedule::{next_run_after, wait_until},
    store::StaffSource,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaffSnapshot {
    pub ids: HashSet<UserId>,
    pub refreshed_at: DateTime<Utc>,
}

impl StaffSnapshot {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.ids.contains(&user)
    }

    /// Ids in ascending order, for stable fan-out.
    pub fn sorted(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.ids.iter().copied().collect();
        ids.sort();
        ids
    }
}

pub struct StaffDirectory {
    source: Arc<dyn StaffSource>,
    current: RwLock<Arc<StaffSnapshot>>,
}

impl StaffDirectory {
    /// Populate once, failing startup when the source is unreachable.
    pub async fn init(source: Arc<dyn StaffSource>) -> Result<Self> {
        let ids = source.list_staff_ids().await?;
        info!(count = ids.len(), "staff directory loaded");
        Ok(Self {
            source,
            current: RwLock::new(Arc::new(StaffSnapshot::new(ids))),
        })
    }

    /// Current point-in-time snapshot.
    pub fn snapshot(&self) -> Arc<StaffSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn is_staff(&self, user: UserId) -> bool {
        self.snapshot().contains(user)
    }

    /// Replace the snapshot. On error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize> {
        let ids = self.source.list_staff_ids().await?;
        let next = Arc::new(StaffSnapshot::new(ids));
        let count = next.ids.len();
        let mut guard = self
            .current
            .write()
            .map_err(|_| Error::Store("staff snapshot lock poisoned".to_string()))?;
        *guard = next;
        Ok(count)
    }

    /// Refresh every `every`; after a failure retry one `poll` later.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        every: Duration,
        poll: Duration,
        cancel: CancellationToken,
    ) {
        let mut next = next_run_after(Utc::now(), every);
        loop {
            if !wait_until(next, poll, &cancel).await {
                info!("staff refresh loop stopped");
                return;
            }
            match self.refresh().await {
                Ok(count) => {
                    info!(count, "staff directory refreshed");
                    next = next_run_after(Utc::now(), every);
                }
                Err(e) => {
                    warn!(error = %e, "staff directory refresh failed; keeping previous snapshot");
                    next = next_run_after(Utc::now(), poll);
                }
            }
        }
    }
}
