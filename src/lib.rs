// src/lib.rs
// Public library surface for the `ketogo` binary and integration tests.

pub mod admission;
pub mod commentary;
pub mod config;
pub mod fingerprint;
pub mod merge;
pub mod model;
pub mod quota;
pub mod rotation;
pub mod store;

// Collaborators: feeds in, product search in
pub mod ingest;
pub mod products;

// Orchestration
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::admission::{Admission, PolicyKind, Reason, Verdict};
pub use crate::config::CuratorConfig;
pub use crate::model::{ApprovedEntry, Bucket};
pub use crate::pipeline::{run_daily, run_weekly_objects, RunReport};
