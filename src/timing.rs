//! Stage timing.

use std::time::Instant;

use serde::Serialize;

use crate::error::Stage;

/// How long one stage took.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub seconds: f64,
}

/// A simple timer for measuring pipeline stage durations.
pub struct Timer {
    stage: Stage,
    start: Instant,
}

impl Timer {
    /// Start a new timer for the given stage.
    pub fn start(stage: Stage) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }

    /// Finish the timer and log the elapsed time.
    pub fn finish(self) -> StageTiming {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            tracing::info!(stage = %self.stage, "done in {:.1}m", secs / 60.0);
        } else {
            tracing::info!(stage = %self.stage, "done in {:.1}s", secs);
        }
        StageTiming {
            stage: self.stage,
            seconds: secs,
        }
    }
}
