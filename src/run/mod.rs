//! Orchestration of a whole run: discovery, per-source workers and the final report.

pub mod coordinator;
pub mod progress;
pub mod report;

pub use coordinator::RunCoordinator;
pub use report::{ReportAggregator, RunReport, SourceCounts, SourceReport, SourceState};
