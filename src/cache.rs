//! Snapshot cache for fetched point data.
//!
//! Holds the last successfully fetched point set as an immutable
//! `Arc<[StagePoint]>` and decides freshness through an injected
//! [`InvalidationPolicy`]. Failed fetches never replace the snapshot.
//!
//! The lock is held across the fetch, so concurrent callers share one
//! request: the second caller waits and then sees the fresh snapshot.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Result, StagePoint};

/// Decides when a cached snapshot must be refetched.
pub trait InvalidationPolicy: Send + Sync {
    fn is_stale(&self, fetched_at: Instant, now: Instant) -> bool;
}

/// Snapshot expires a fixed time after it was fetched.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub ttl: Duration,
}

impl TtlPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl InvalidationPolicy for TtlPolicy {
    fn is_stale(&self, fetched_at: Instant, now: Instant) -> bool {
        now.duration_since(fetched_at) >= self.ttl
    }
}

/// Snapshot stays fresh until [`PointCache::invalidate`] is called.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualRefresh;

impl InvalidationPolicy for ManualRefresh {
    fn is_stale(&self, _fetched_at: Instant, _now: Instant) -> bool {
        false
    }
}

struct Snapshot {
    points: Arc<[StagePoint]>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    invalidated: bool,
}

/// Point snapshot cache with a pluggable invalidation policy.
pub struct PointCache<P: InvalidationPolicy> {
    policy: P,
    state: Mutex<CacheState>,
    generation: AtomicU64,
}

impl<P: InvalidationPolicy> PointCache<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Incremented every time a new snapshot is stored.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current snapshot, fresh or not.
    pub async fn current(&self) -> Option<Arc<[StagePoint]>> {
        let state = self.state.lock().await;
        state.snapshot.as_ref().map(|s| Arc::clone(&s.points))
    }

    /// Mark the snapshot stale so the next [`get_or_fetch`](Self::get_or_fetch) refetches.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.invalidated = true;
        debug!("[PointCache] invalidated");
    }

    /// Replace the snapshot.
    pub async fn store(&self, points: Vec<StagePoint>) -> Arc<[StagePoint]> {
        let mut state = self.state.lock().await;
        self.store_locked(&mut state, points)
    }

    /// Return the snapshot if fresh, otherwise await `fetch` and cache its result.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<[StagePoint]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<StagePoint>>>,
    {
        let mut state = self.state.lock().await;

        if !state.invalidated {
            if let Some(snapshot) = &state.snapshot {
                if !self.policy.is_stale(snapshot.fetched_at, Instant::now()) {
                    debug!("[PointCache] hit ({} points)", snapshot.points.len());
                    return Ok(Arc::clone(&snapshot.points));
                }
            }
        }

        match fetch().await {
            Ok(points) => Ok(self.store_locked(&mut state, points)),
            Err(e) => {
                warn!("[PointCache] fetch failed, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }

    fn store_locked(&self, state: &mut CacheState, points: Vec<StagePoint>) -> Arc<[StagePoint]> {
        let points: Arc<[StagePoint]> = points.into();
        state.snapshot = Some(Snapshot {
            points: Arc::clone(&points),
            fetched_at: Instant::now(),
        });
        state.invalidated = false;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!("[PointCache] stored {} points (generation {})", points.len(), generation);
        points
    }
}
