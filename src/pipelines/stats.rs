use std::time::{Duration, Instant};

use serde::Serialize;

/// Timing of one source's scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringStats {
    /// Wall time from the first file opened to the last write.
    #[serde(with = "duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Comments sent to the classifier.
    pub items_scored: usize,
}

impl ScoringStats {
    /// Starts the clock.
    pub(crate) fn start() -> ScoringStatsBuilder {
        ScoringStatsBuilder {
            start_time: Instant::now(),
        }
    }

    /// Comments scored per second, zero when nothing was timed.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.items_scored as f64 / secs
        } else {
            0.0
        }
    }
}

/// Tracks time from creation to [`ScoringStatsBuilder::finish`].
pub(crate) struct ScoringStatsBuilder {
    start_time: Instant,
}

impl ScoringStatsBuilder {
    pub fn finish(self, items_scored: usize) -> ScoringStats {
        ScoringStats {
            elapsed: self.start_time.elapsed(),
            items_scored,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }
}
