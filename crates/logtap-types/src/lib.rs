//! Shared types for logtap
//!
//! This crate contains the data structures passed between the log source,
//! the snapshot cache, and the binary: the clamped line count, the cached
//! snapshot, and the JSON response shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

// ============================================================================
// Limits
// ============================================================================

/// Line count used when the caller does not ask for one
pub const DEFAULT_LINES: i64 = 100;

/// Upper bound on the number of lines a single request may ask for
pub const MAX_LINES_CAP: usize = 1000;

/// How long a snapshot may satisfy lookups
pub const CACHE_TTL: Duration = Duration::from_millis(2000);

/// Maximum number of journal reads allowed to run at once
pub const MAX_CONCURRENT_FETCHES: usize = 3;

/// Service unit whose journal is tailed
pub const DEFAULT_UNIT: &str = "cost-web-app";

// ============================================================================
// Request Types
// ============================================================================

/// A requested line count after clamping to `[0, cap]`.
///
/// This is the identity key for cache matching, never the raw input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineCount(usize);

impl LineCount {
    /// Clamp a raw request to `[0, MAX_LINES_CAP]`
    pub fn new(requested: i64) -> Self {
        Self::with_cap(requested, MAX_LINES_CAP)
    }

    /// Clamp a raw request to `[0, cap]`
    pub fn with_cap(requested: i64, cap: usize) -> Self {
        let non_negative = u64::try_from(requested).unwrap_or(0);
        let n = usize::try_from(non_negative).unwrap_or(usize::MAX).min(cap);
        Self(n)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for LineCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// The immutable result of one successful log fetch
#[derive(Clone, Debug)]
pub struct LogSnapshot {
    /// Log lines in journal order
    lines: Vec<String>,

    /// Clamped line count this snapshot was fetched for
    requested: LineCount,

    /// When the fetch completed
    created_at: Instant,
}

impl LogSnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(lines: Vec<String>, requested: LineCount) -> Self {
        Self::with_created_at(lines, requested, Instant::now())
    }

    /// Create a snapshot with an explicit creation time
    pub fn with_created_at(lines: Vec<String>, requested: LineCount, created_at: Instant) -> Self {
        Self {
            lines,
            requested,
            created_at,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn requested(&self) -> LineCount {
        self.requested
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Age of the snapshot as seen at `now`
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Expired once the age strictly exceeds `ttl`
    pub fn is_expired_at(&self, now: Instant, ttl: Duration) -> bool {
        self.age_at(now) > ttl
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Warning attached to snapshots served because admission was refused
pub const LOAD_SHEDDING_WARNING: &str = "Returning cached data to reduce server load.";

/// Error returned when admission is refused and nothing is cached
pub const TOO_MANY_REQUESTS: &str = "Too many requests right now. Please try again shortly.";

/// JSON body of the log endpoint.
///
/// Failures are reported through `success`, never through the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub success: bool,

    /// Number of lines actually returned (successful responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,

    pub logs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,

    /// Set only on degraded delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// Set only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Degraded delivery: whether the served snapshot is past its TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,

    /// Degraded delivery of a snapshot fetched for another line count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_lines: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_lines: Option<usize>,
}

impl LogsResponse {
    fn success(logs: Vec<String>, cached: bool) -> Self {
        Self {
            success: true,
            lines: Some(logs.len()),
            logs,
            cached: Some(cached),
            warning: None,
            error: None,
            stale: None,
            requested_lines: None,
            snapshot_lines: None,
        }
    }

    /// Lines read from the source for this request
    pub fn fresh(logs: Vec<String>) -> Self {
        Self::success(logs, false)
    }

    /// Lines served from a matching, unexpired snapshot
    pub fn cached(snapshot: &LogSnapshot) -> Self {
        Self::success(snapshot.lines().to_vec(), true)
    }

    /// Any snapshot served while shedding load.
    ///
    /// A snapshot fetched for a different line count is still served, but
    /// the mismatch is spelled out in the warning and the two count fields.
    pub fn degraded(snapshot: &LogSnapshot, requested: LineCount, stale: bool) -> Self {
        let mut response = Self::success(snapshot.lines().to_vec(), true);
        response.stale = Some(stale);

        if snapshot.requested() == requested {
            response.warning = Some(LOAD_SHEDDING_WARNING.to_string());
        } else {
            response.warning = Some(format!(
                "{} The cached snapshot was fetched for {} lines, not the {} requested.",
                LOAD_SHEDDING_WARNING,
                snapshot.requested(),
                requested
            ));
            response.requested_lines = Some(requested.get());
            response.snapshot_lines = Some(snapshot.requested().get());
        }

        response
    }

    /// Admission refused with nothing cached
    pub fn too_many_requests() -> Self {
        Self::failure(TOO_MANY_REQUESTS.to_string())
    }

    /// Any other failure, with a caller-safe message
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            lines: None,
            logs: Vec::new(),
            cached: None,
            warning: None,
            error: Some(error),
            stale: None,
            requested_lines: None,
            snapshot_lines: None,
        }
    }

    /// Classify the response for summaries
    pub fn outcome(&self) -> Outcome {
        match (self.success, self.cached, &self.warning, self.error.as_deref()) {
            (true, _, Some(_), _) => Outcome::Degraded,
            (true, Some(true), None, _) => Outcome::Cached,
            (true, _, None, _) => Outcome::Fresh,
            (false, _, _, Some(TOO_MANY_REQUESTS)) => Outcome::Refused,
            (false, _, _, _) => Outcome::Failed,
        }
    }
}

/// How a request was answered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// Read from the log source
    Fresh,
    /// Served from a matching snapshot
    Cached,
    /// Served from any snapshot while shedding load
    Degraded,
    /// Shed with nothing cached
    Refused,
    /// Fetch failed
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Cached => "cached",
            Self::Degraded => "degraded",
            Self::Refused => "refused",
            Self::Failed => "failed",
        }
    }
}
