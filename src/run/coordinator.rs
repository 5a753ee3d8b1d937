use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::progress::Progress;
use super::report::{ReportAggregator, RunReport, SourceReport, SourceState};
use crate::comments::record::source_name;
use crate::comments::{evaluate, ResultWriter, ScoredComment, SourceDir};
use crate::config::{FilterConfig, Settings};
use crate::error::{PipelineError, Result};
use crate::pipelines::sentiment::{
    Batcher, Classifier, DeviceRequest, ItemOutcome, ModelProvider, SentimentModel, TextEncoder,
};
use crate::pipelines::stats::ScoringStats;

/// A source after discovery: listed, or rejected before processing.
enum Discovered {
    Ready(SourceDir),
    Rejected { path: PathBuf, reason: String },
}

/// Runs every configured source through load, filter, scoring and write.
///
/// The classifier is loaded once, after discovery, and only if there is at least one input file.
/// Sources are processed by a pool of `workers` threads and fail independently.
///
/// ```rust,no_run
/// use comment_sentiment::config::Settings;
/// use comment_sentiment::run::RunCoordinator;
/// use comment_sentiment::sentiment::HubModelProvider;
///
/// # fn main() -> comment_sentiment::error::Result<()> {
/// let settings = Settings::load(None)?;
/// let provider = HubModelProvider::from_settings(&settings);
/// let report = RunCoordinator::new(&settings, &provider).run()?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct RunCoordinator<'a, P: ModelProvider> {
    settings: &'a Settings,
    provider: &'a P,
}

impl<'a, P: ModelProvider> RunCoordinator<'a, P> {
    pub fn new(settings: &'a Settings, provider: &'a P) -> Self {
        Self { settings, provider }
    }

    /// Processes all sources and returns the aggregated report.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoad`] if the classifier or its tokenizer cannot be loaded,
    /// before any output is written. Per-source failures are reported, not returned.
    pub fn run(&self) -> Result<RunReport> {
        let filter = self.settings.filter_config();
        let discovered = self.discover();
        let total_files: usize = discovered
            .iter()
            .map(|(_, source)| match source {
                Discovered::Ready(dir) => dir.files().len(),
                Discovered::Rejected { .. } => 0,
            })
            .sum();

        let aggregator = ReportAggregator::new();

        if total_files == 0 {
            tracing::warn!("no input files found, skipping model load");
            for (index, source) in discovered {
                aggregator.record(index, idle_report(source));
            }
            return Ok(aggregator.finish(&filter.model_name, None));
        }
        tracing::info!(files = total_files, "input discovered");

        let request = DeviceRequest::from_preference(filter.device, self.settings.cuda_device);
        let classifier = Classifier::load(self.provider, &filter.model_name, request)?;
        let encoder = self
            .provider
            .load_encoder(&filter.model_name, filter.max_token_length)
            .map_err(|e| match e {
                PipelineError::ModelLoad(_) => e,
                other => PipelineError::ModelLoad(format!(
                    "Failed to load tokenizer for '{}': {other}",
                    filter.model_name
                )),
            })?;

        let writer = ResultWriter::new(&self.settings.output_dir);
        let progress = Progress::files(total_files as u64, self.settings.progress);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers)
            .thread_name(|i| format!("source-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::Unexpected(format!("Failed to start worker pool: {e}")))?;

        pool.install(|| {
            discovered.into_par_iter().for_each(|(index, source)| {
                let report = match source {
                    Discovered::Ready(dir) => {
                        let worker = SourceWorker {
                            filter: &filter,
                            settings: self.settings,
                            classifier: &classifier,
                            encoder: &encoder,
                            writer: &writer,
                            progress: &progress,
                        };
                        worker.process(&dir)
                    }
                    rejected => idle_report(rejected),
                };
                aggregator.record(index, report);
            });
        });
        progress.finish_clear();

        let report = aggregator.finish(&filter.model_name, Some(classifier.status().clone()));
        let totals = report.totals();
        tracing::info!(
            sources = report.sources.len(),
            scored = totals.scored,
            positive = totals.positive,
            failed = report.has_failures(),
            "run finished"
        );
        Ok(report)
    }

    /// Lists every input directory. Directories that do not exist are skipped.
    ///
    /// Sources map 1:1 to output collections, so a directory whose name is already taken by an
    /// earlier input is rejected.
    fn discover(&self) -> Vec<(usize, Discovered)> {
        let mut claimed: HashMap<String, &Path> = HashMap::new();
        self.settings
            .input_dirs
            .iter()
            .enumerate()
            .filter_map(|(index, path)| match SourceDir::discover(path) {
                Ok(dir) => {
                    if let Some(first) = claimed.get(dir.name()) {
                        let reason = format!(
                            "duplicate source name '{}', already used by '{}'",
                            dir.name(),
                            first.display()
                        );
                        tracing::warn!(path = %path.display(), "{reason}");
                        return Some((
                            index,
                            Discovered::Rejected {
                                path: path.clone(),
                                reason,
                            },
                        ));
                    }
                    claimed.insert(dir.name().to_string(), path.as_path());
                    tracing::info!(
                        source = dir.name(),
                        files = dir.files().len(),
                        "source discovered"
                    );
                    Some((index, Discovered::Ready(dir)))
                }
                Err(_) if !path.exists() => {
                    tracing::warn!(path = %path.display(), "input directory not found, skipping");
                    None
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "input directory unreadable");
                    Some((
                        index,
                        Discovered::Rejected {
                            path: path.clone(),
                            reason: e.to_string(),
                        },
                    ))
                }
            })
            .collect()
    }
}

/// Report of a source that never reaches the classifier.
fn idle_report(source: Discovered) -> SourceReport {
    match source {
        Discovered::Ready(dir) => {
            let mut report = SourceReport::new(dir.name(), dir.path(), dir.files().len());
            report.transition(SourceState::Done);
            report
        }
        Discovered::Rejected { path, reason } => {
            let name = source_name(&path).unwrap_or_else(|| path.display().to_string());
            let mut report = SourceReport::new(name, path, 0);
            report.fail(reason);
            report
        }
    }
}

/// Per-source state owned by one worker; the classifier and writer are shared.
struct SourceWorker<'r, M: SentimentModel, E> {
    filter: &'r FilterConfig,
    settings: &'r Settings,
    classifier: &'r Classifier<M>,
    encoder: &'r E,
    writer: &'r ResultWriter,
    progress: &'r Progress,
}

impl<M, E> SourceWorker<'_, M, E>
where
    M: SentimentModel,
    E: TextEncoder,
{
    fn process(&self, source: &SourceDir) -> SourceReport {
        let mut report = SourceReport::new(source.name(), source.path(), source.files().len());
        let stats = ScoringStats::start();
        let mut batcher = Batcher::new(
            self.encoder,
            self.filter.max_token_length,
            self.settings.batch_size,
            self.settings.max_batch_halvings,
        );
        let mut positives: Vec<ScoredComment> = Vec::new();

        report.transition(SourceState::Loading);
        self.progress.set_message(source.name());

        let mut stream = source.comments();
        let mut files_ticked = 0;
        while let Some(item) = stream.next() {
            let opened = stream.files_opened();
            self.progress.inc((opened - files_ticked) as u64);
            files_ticked = opened;

            let comment = match item {
                Ok(comment) => comment,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "skipping unreadable input");
                    report.counts.load_failed += 1;
                    continue;
                }
            };
            report.counts.total += 1;
            advance(&mut report, SourceState::Filtering);

            let verdict = evaluate(&comment, self.filter);
            report.counts.record_verdict(verdict);
            if !verdict.is_admitted() {
                continue;
            }

            advance(&mut report, SourceState::Scoring);
            let outcomes = batcher.push(comment, self.classifier);
            self.absorb(outcomes, &mut report, &mut positives);
        }
        let outcomes = batcher.finish(self.classifier);
        self.absorb(outcomes, &mut report, &mut positives);
        self.progress
            .inc((source.files().len().saturating_sub(files_ticked)) as u64);

        report.counts.truncated = batcher.truncated();
        report.batch_size = batcher.batch_size();

        report.transition(SourceState::Writing);
        let written = self.writer.write(source.name(), &positives);
        report.stats = stats.finish(report.counts.scored + report.counts.scoring_failed);
        match written {
            Ok(collection_size) => {
                tracing::info!(
                    source = source.name(),
                    scored = report.counts.scored,
                    positive = report.counts.positive,
                    collection_size,
                    elapsed_ms = report.stats.elapsed.as_millis() as u64,
                    "source done"
                );
                report.transition(SourceState::Done);
            }
            Err(e) => {
                report.counts.write_failed = positives.len();
                report.fail(e.to_string());
            }
        }
        report
    }

    fn absorb(
        &self,
        outcomes: Vec<ItemOutcome>,
        report: &mut SourceReport,
        positives: &mut Vec<ScoredComment>,
    ) {
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Scored(comment, score) => {
                    report.counts.scored += 1;
                    let scored =
                        ScoredComment::new(comment, score, self.filter.positive_threshold);
                    if scored.is_positive {
                        report.counts.positive += 1;
                        positives.push(scored);
                    }
                }
                ItemOutcome::Failed(comment, reason) => {
                    tracing::debug!(
                        source = comment.source(),
                        id = %comment.id(),
                        reason = %reason,
                        "comment not scored"
                    );
                    report.counts.scoring_failed += 1;
                }
            }
        }
    }
}

/// Forward-only transition; the stages interleave while the stream is consumed.
fn advance(report: &mut SourceReport, state: SourceState) {
    if report.state < state {
        report.transition(state);
    }
}
