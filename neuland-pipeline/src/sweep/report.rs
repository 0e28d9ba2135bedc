// Sweep Report
// End-of-sweep tallies and the per-task result list

use crate::error::{PipelineError, PipelineResult};
use crate::stages::{Stage, StageResult, StageStatus};

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::Path;
use std::time::Duration;

/// Counts per terminal status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub stage: Option<Stage>,
    pub total: usize,
    pub completed: usize,
    pub skipped_existing: usize,
    pub skipped_missing_input: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl SweepSummary {
    pub fn from_results(stage: Option<Stage>, results: &[StageResult], duration: Duration) -> Self {
        let mut summary = Self {
            stage,
            total: results.len(),
            duration,
            ..Self::default()
        };
        for result in results {
            match result.status {
                StageStatus::Completed => summary.completed += 1,
                StageStatus::SkippedExisting { .. } => summary.skipped_existing += 1,
                StageStatus::SkippedMissingInput { .. } => summary.skipped_missing_input += 1,
                StageStatus::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Fold another stage's tally into this one
    pub fn merge(&mut self, other: &SweepSummary) {
        if self.stage != other.stage {
            self.stage = None;
        }
        self.total += other.total;
        self.completed += other.completed;
        self.skipped_existing += other.skipped_existing;
        self.skipped_missing_input += other.skipped_missing_input;
        self.failed += other.failed;
        self.duration += other.duration;
    }
}

/// Results of one or more stage sweeps, in submission order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub summary: SweepSummary,
    pub results: Vec<StageResult>,
}

impl SweepReport {
    pub fn new(stage: Stage, results: Vec<StageResult>, duration: Duration) -> Self {
        Self {
            summary: SweepSummary::from_results(Some(stage), &results, duration),
            results,
        }
    }

    /// Append another sweep, e.g. the next pipeline stage
    pub fn extend(&mut self, other: SweepReport) {
        if self.results.is_empty() && self.summary.total == 0 {
            self.summary = other.summary;
        } else {
            self.summary.merge(&other.summary);
        }
        self.results.extend(other.results);
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    pub fn success(&self) -> bool {
        self.summary.success()
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Report(e.to_string()))?;
        fs::write(path, json).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
