//! Nearby-user search over the presence window
//!
//! Linear scan, newest bucket first, capped at a fixed number of results so
//! the cost of a search stays bounded without a spatial index.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::presence::PresenceWindow;
use crate::types::{Coordinate, UserId};

/// Distance between two coordinates, in whatever unit the caller's radius uses.
///
/// Must be pure. Coordinates the implementation cannot interpret should yield
/// `f64::INFINITY` so they never fall inside a radius.
pub trait Distance: Send + Sync {
    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64;
}

impl<F> Distance for F
where
    F: Fn(&Coordinate, &Coordinate) -> f64 + Send + Sync,
{
    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        self(a, b)
    }
}

/// Answers "who is within `dist` of here", at most `cap` users at a time
pub struct ProximityMatcher {
    window: Arc<PresenceWindow>,
    distance: Arc<dyn Distance>,
    cap: usize,
}

impl ProximityMatcher {
    pub fn new(window: Arc<PresenceWindow>, distance: Arc<dyn Distance>, cap: usize) -> Self {
        Self {
            window,
            distance,
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Users whose most recent sample is within `dist` of `src`.
    ///
    /// Ids are unique and in scan order (newest bucket first). With more
    /// than `cap` matches, which ones are returned depends on scan order.
    pub async fn query(&self, src: &Coordinate, dist: f64) -> Vec<UserId> {
        self.scan(src, dist, HashSet::new()).await
    }

    /// Like [`query`](Self::query), but `user` is neither evaluated nor
    /// counted against the cap.
    pub async fn query_excluding(&self, src: &Coordinate, dist: f64, user: UserId) -> Vec<UserId> {
        self.scan(src, dist, HashSet::from([user])).await
    }

    /// Like [`query_excluding`](Self::query_excluding) for a set of users.
    pub async fn query_excluding_all(
        &self,
        src: &Coordinate,
        dist: f64,
        excluded: &HashSet<UserId>,
    ) -> Vec<UserId> {
        self.scan(src, dist, excluded.clone()).await
    }

    async fn scan(&self, src: &Coordinate, dist: f64, mut seen: HashSet<UserId>) -> Vec<UserId> {
        let snapshot = self.window.snapshot().await;

        let mut found = Vec::new();
        let mut evaluated = 0usize;

        'scan: for bucket in snapshot.buckets() {
            for (&user, coords) in bucket {
                if found.len() >= self.cap {
                    break 'scan;
                }
                // Only a user's newest sample counts.
                if !seen.insert(user) {
                    continue;
                }

                evaluated += 1;
                if self.distance.distance(coords, src) <= dist {
                    found.push(user);
                }
            }
        }

        debug!(
            evaluated,
            matched = found.len(),
            cap = self.cap,
            "Proximity scan complete"
        );
        found
    }
}
