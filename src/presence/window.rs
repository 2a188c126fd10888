//! Time-bucketed presence window
//!
//! A ring of `depth` buckets, newest first. Clients write into bucket 0; the
//! rotation driver periodically seals bucket 0 and drops the oldest one. A
//! user therefore ages out `depth` rotations after their last report.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::trace;

use super::PresenceError;
use crate::types::{Coordinate, UserId};

/// One time slice of user → last reported coordinate
pub type Bucket = HashMap<UserId, Coordinate>;

pub(crate) struct Buckets {
    /// Bucket 0, copy-on-write so snapshots never see later inserts
    head: Arc<Bucket>,
    /// Buckets 1..depth, newest first; immutable once sealed
    sealed: VecDeque<Arc<Bucket>>,
}

/// Bounded-staleness store of where each user was last seen
pub struct PresenceWindow {
    depth: usize,
    pub(crate) buckets: RwLock<Buckets>,
    driver_attached: AtomicBool,
}

impl PresenceWindow {
    pub fn new(depth: NonZeroUsize) -> Self {
        let depth = depth.get();
        let sealed = (1..depth).map(|_| Arc::new(Bucket::new())).collect();

        Self {
            depth,
            buckets: RwLock::new(Buckets {
                head: Arc::new(Bucket::new()),
                sealed,
            }),
            driver_attached: AtomicBool::new(false),
        }
    }

    /// Number of buckets, fixed for the window's lifetime
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Oldest age a retained sample can reach at the given rotation period
    pub fn max_staleness(&self, rotation_interval: Duration) -> Duration {
        rotation_interval * self.depth as u32
    }

    /// Insert or overwrite `user`'s entry in the head bucket.
    pub async fn record(&self, user: UserId, coords: Coordinate) {
        let mut buckets = self.buckets.write().await;
        Arc::make_mut(&mut buckets.head).insert(user, coords);
    }

    /// Advance the window by one step: seal the head, start a fresh one and
    /// evict the oldest bucket.
    ///
    /// Must only be driven by a single caller (see
    /// [`RotationDriver`](super::RotationDriver)); two drivers would
    /// double-evict.
    pub async fn rotate(&self) {
        let mut buckets = self.buckets.write().await;
        self.rotate_locked(&mut buckets);
    }

    /// [`rotate`](Self::rotate), giving up if the guard is not available
    /// within `timeout`.
    pub async fn rotate_within(&self, timeout: Duration) -> Result<(), PresenceError> {
        let mut buckets = tokio::time::timeout(timeout, self.buckets.write())
            .await
            .map_err(|_| PresenceError::RotationStalled { timeout })?;
        self.rotate_locked(&mut buckets);
        Ok(())
    }

    fn rotate_locked(&self, buckets: &mut Buckets) {
        let sealed = std::mem::take(&mut buckets.head);
        buckets.sealed.push_front(sealed);

        let evicted = buckets.sealed.pop_back().map(|b| b.len()).unwrap_or(0);
        trace!(evicted, "Presence window rotated");
    }

    /// Consistent newest-first view of all buckets.
    ///
    /// Taking the snapshot only clones `Arc` handles; scanning it afterwards
    /// does not hold up writers or the rotation driver.
    pub async fn snapshot(&self) -> WindowSnapshot {
        let buckets = self.buckets.read().await;

        let mut all = Vec::with_capacity(self.depth);
        all.push(Arc::clone(&buckets.head));
        all.extend(buckets.sealed.iter().take(self.depth - 1).cloned());

        WindowSnapshot { buckets: all }
    }

    /// Claim the single rotation slot. Returns false if already claimed.
    pub(crate) fn claim_driver(&self) -> bool {
        self.driver_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Frozen view of a [`PresenceWindow`]
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    buckets: Vec<Arc<Bucket>>,
}

impl WindowSnapshot {
    /// Buckets newest first
    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter().map(|b| b.as_ref())
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index).map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no bucket holds any user
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }

    /// Most recent coordinate retained for `user`, if any
    pub fn latest(&self, user: UserId) -> Option<&Coordinate> {
        self.buckets().find_map(|b| b.get(&user))
    }
}
