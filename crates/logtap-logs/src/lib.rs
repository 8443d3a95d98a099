//! Log retrieval for logtap
//!
//! This crate provides the snapshot cache, the admission controller that
//! sheds load when too many journal reads are in flight, and the service
//! that ties both to a log source.

mod admission;
mod cache;
mod service;

pub use admission::{AdmissionController, AdmissionPermit};
pub use cache::{PeekedSnapshot, SnapshotCache};
pub use service::{LogService, ServiceLimits};

// Re-export types used in our public API
pub use logtap_source::{FetchError, LogSource};
pub use logtap_types::{LineCount, LogSnapshot, LogsResponse, Outcome};
