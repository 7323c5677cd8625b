//! Collection stages and their orchestration.
//!
//! Extracts local history with git2, queries the hosting platform through a
//! [`collector::RemoteCollector`], and runs the reconcile and chart stages
//! over a bounded [`pool::WorkerPool`]. Every stage persists its output to
//! the snapshot store so later stages can be re-run in isolation.

pub mod collector;
pub mod github;
pub mod mining;
pub mod pipeline;
pub mod pool;
pub mod stages;

pub use collector::RemoteCollector;
pub use github::GitHubClient;
pub use pipeline::{Pipeline, StageReport};
pub use pool::{StageOutcome, WorkerPool};
pub use stages::Stage;
