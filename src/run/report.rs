use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::comments::FilterVerdict;
use crate::pipelines::sentiment::DeviceStatus;
use crate::pipelines::stats::ScoringStats;

/// Where a source is in its lifecycle. Only `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Discovered,
    Loading,
    Filtering,
    Scoring,
    Writing,
    Done,
    Failed,
}

impl SourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceState::Done | SourceState::Failed)
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Discovered => "discovered",
            SourceState::Loading => "loading",
            SourceState::Filtering => "filtering",
            SourceState::Scoring => "scoring",
            SourceState::Writing => "writing",
            SourceState::Done => "done",
            SourceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-source tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    /// Comments loaded successfully.
    pub total: usize,
    pub excluded_author: usize,
    pub too_short: usize,
    pub scored: usize,
    pub positive: usize,
    /// Unreadable files plus malformed records.
    pub load_failed: usize,
    pub scoring_failed: usize,
    /// Positive comments that could not be persisted.
    pub write_failed: usize,
    /// Admitted comments that were cut to the token limit.
    pub truncated: usize,
}

impl SourceCounts {
    pub fn record_verdict(&mut self, verdict: FilterVerdict) {
        match verdict {
            FilterVerdict::ExcludedAuthor => self.excluded_author += 1,
            FilterVerdict::TooShort => self.too_short += 1,
            FilterVerdict::Admitted => {}
        }
    }
}

impl AddAssign for SourceCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.excluded_author += rhs.excluded_author;
        self.too_short += rhs.too_short;
        self.scored += rhs.scored;
        self.positive += rhs.positive;
        self.load_failed += rhs.load_failed;
        self.scoring_failed += rhs.scoring_failed;
        self.write_failed += rhs.write_failed;
        self.truncated += rhs.truncated;
    }
}

/// Outcome of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub path: PathBuf,
    pub state: SourceState,
    /// Input files found at discovery.
    pub files: usize,
    pub counts: SourceCounts,
    /// Batch size in effect when the source finished.
    pub batch_size: usize,
    pub stats: ScoringStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, path: impl Into<PathBuf>, files: usize) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            state: SourceState::Discovered,
            files,
            counts: SourceCounts::default(),
            batch_size: 0,
            stats: ScoringStats::default(),
            failure: None,
        }
    }

    /// Moves to `state`, logging the transition.
    pub fn transition(&mut self, state: SourceState) {
        tracing::debug!(source = %self.source, from = %self.state, to = %state, "source state");
        self.state = state;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(source = %self.source, from = %self.state, reason = %reason, "source failed");
        self.state = SourceState::Failed;
        self.failure = Some(reason);
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub model: String,
    /// `None` when nothing needed scoring and the model was never loaded.
    pub device: Option<DeviceStatus>,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    /// True if any source ended in `Failed`.
    pub fn has_failures(&self) -> bool {
        self.sources
            .iter()
            .any(|s| s.state == SourceState::Failed)
    }

    pub fn totals(&self) -> SourceCounts {
        let mut totals = SourceCounts::default();
        for source in &self.sources {
            totals += source.counts;
        }
        totals
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model:  {}", self.model)?;
        match &self.device {
            Some(device) => writeln!(f, "device: {device}")?,
            None => writeln!(f, "device: not loaded")?,
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<24} {:<8} {:>7} {:>9} {:>9} {:>7} {:>8} {:>8} {:>9} {:>9}",
            "source",
            "state",
            "total",
            "excluded",
            "too_short",
            "scored",
            "positive",
            "load_err",
            "score_err",
            "write_err"
        )?;

        for source in &self.sources {
            write_row(f, &source.source, &source.state.to_string(), &source.counts)?;
        }
        write_row(f, "total", "", &self.totals())?;

        for source in &self.sources {
            if let Some(reason) = &source.failure {
                writeln!(f, "{}: {}", source.source, reason)?;
            }
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, state: &str, c: &SourceCounts) -> fmt::Result {
    writeln!(
        f,
        "{:<24} {:<8} {:>7} {:>9} {:>9} {:>7} {:>8} {:>8} {:>9} {:>9}",
        name,
        state,
        c.total,
        c.excluded_author,
        c.too_short,
        c.scored,
        c.positive,
        c.load_failed,
        c.scoring_failed,
        c.write_failed
    )
}

/// Collects source reports from concurrent workers, keeping input order.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    reports: Mutex<BTreeMap<usize, SourceReport>>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the report of the source at position `index` of the input list.
    pub fn record(&self, index: usize, report: SourceReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, report);
    }

    pub fn finish(self, model: impl Into<String>, device: Option<DeviceStatus>) -> RunReport {
        let reports = self
            .reports
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        RunReport {
            model: model.into(),
            device,
            sources: reports.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn done(name: &str, positive: usize) -> SourceReport {
        let mut report = SourceReport::new(name, name, 1);
        report.counts.total = 10;
        report.counts.positive = positive;
        report.transition(SourceState::Done);
        report
    }

    #[test]
    fn aggregator_keeps_input_order() {
        let aggregator = ReportAggregator::new();
        aggregator.record(1, done("b", 2));
        aggregator.record(0, done("a", 1));

        let report = aggregator.finish("m", None);
        let names: Vec<&str> = report.sources.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(report.totals().positive, 3);
        assert_eq!(report.totals().total, 20);
        assert!(!report.has_failures());
    }

    #[test]
    fn a_failed_source_fails_the_run() {
        let aggregator = ReportAggregator::new();
        let mut failed = SourceReport::new("x", "x", 0);
        failed.fail("unreadable");
        aggregator.record(0, failed);
        aggregator.record(1, done("y", 0));

        let report = aggregator.finish("m", None);
        assert!(report.has_failures());
        assert_eq!(report.source("x").unwrap().failure.as_deref(), Some("unreadable"));
        assert!(report.to_string().contains("x: unreadable"));
    }

    #[test]
    fn verdicts_are_tallied_by_reason() {
        let mut counts = SourceCounts::default();
        counts.record_verdict(FilterVerdict::ExcludedAuthor);
        counts.record_verdict(FilterVerdict::TooShort);
        counts.record_verdict(FilterVerdict::TooShort);
        counts.record_verdict(FilterVerdict::Admitted);
        assert_eq!(counts.excluded_author, 1);
        assert_eq!(counts.too_short, 2);
    }
}
