use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use logtap_types::{CACHE_TTL, LineCount, LogSnapshot};

/// Thread-safe single-slot cache for the latest log snapshot.
///
/// Lookups take the read lock and never block each other; stores take the
/// write lock only long enough to swap the `Arc`, so a lookup never sees a
/// half-written snapshot. No fetch ever runs under this lock.
#[derive(Clone)]
pub struct SnapshotCache {
    /// The one live snapshot, if any
    slot: Arc<RwLock<Option<Arc<LogSnapshot>>>>,

    /// Maximum age at which a snapshot still satisfies a lookup
    ttl: Duration,
}

/// A snapshot returned by [`SnapshotCache::peek`]
#[derive(Clone, Debug)]
pub struct PeekedSnapshot {
    pub snapshot: Arc<LogSnapshot>,

    /// Advisory: the snapshot is past its TTL
    pub stale: bool,
}

impl SnapshotCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The snapshot for exactly `requested` lines, if it is still fresh
    pub fn lookup(&self, requested: LineCount) -> Option<Arc<LogSnapshot>> {
        self.lookup_at(requested, Instant::now())
    }

    /// [`lookup`](Self::lookup) as seen at `now`
    pub fn lookup_at(&self, requested: LineCount, now: Instant) -> Option<Arc<LogSnapshot>> {
        self.slot
            .read()
            .as_ref()
            .filter(|s| s.requested() == requested && !s.is_expired_at(now, self.ttl))
            .cloned()
    }

    /// Replace the slot with `snapshot`, whatever it held before
    pub fn store(&self, snapshot: LogSnapshot) -> Arc<LogSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.slot.write() = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Whatever snapshot is held, regardless of age or line count
    pub fn peek(&self) -> Option<PeekedSnapshot> {
        self.peek_at(Instant::now())
    }

    /// [`peek`](Self::peek) as seen at `now`
    pub fn peek_at(&self, now: Instant) -> Option<PeekedSnapshot> {
        let snapshot = self.slot.read().as_ref().cloned()?;
        let stale = snapshot.is_expired_at(now, self.ttl);
        Some(PeekedSnapshot { snapshot, stale })
    }

    /// Check if a snapshot is held
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}
