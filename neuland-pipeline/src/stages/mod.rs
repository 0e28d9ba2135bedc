// Stages Module
// Pipeline stage identities, their file contracts and terminal results

pub mod runner;

pub use runner::StageRunner;

use crate::artifacts::{ArtifactKind, ArtifactNamer};
use crate::sweep::tuple::ParameterTuple;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// One step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Simulate,
    Digitize,
    Train,
    Reconstruct,
}

impl Stage {
    /// All stages in pipeline order
    pub const PIPELINE: [Stage; 4] = [
        Stage::Simulate,
        Stage::Digitize,
        Stage::Train,
        Stage::Reconstruct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Simulate => "simulate",
            Stage::Digitize => "digitize",
            Stage::Train => "train",
            Stage::Reconstruct => "reconstruct",
        }
    }

    /// Artifact tag used for this stage's log file
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::Simulate => "simulation",
            Stage::Digitize => "digitization",
            Stage::Train => "training",
            Stage::Reconstruct => "reconstruction",
        }
    }

    /// Artifact whose presence marks the stage as done
    pub fn target(&self) -> ArtifactKind {
        match self {
            Stage::Simulate => ArtifactKind::Simulation,
            Stage::Digitize => ArtifactKind::Digitization,
            Stage::Train => ArtifactKind::Training,
            Stage::Reconstruct => ArtifactKind::Reconstruction,
        }
    }

    /// Every artifact the stage writes (removed before an overwrite)
    pub fn produces(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Simulate => &[ArtifactKind::Simulation, ArtifactKind::Parameters],
            Stage::Digitize => &[ArtifactKind::Digitization],
            Stage::Train => &[
                ArtifactKind::Training,
                ArtifactKind::CalibrationCut,
                ArtifactKind::CalibrationTable,
                ArtifactKind::CalibrationPlot,
            ],
            Stage::Reconstruct => &[ArtifactKind::Reconstruction],
        }
    }

    /// Artifacts that must exist after a successful engine run
    pub fn verified_outputs(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Simulate => &[ArtifactKind::Simulation, ArtifactKind::Parameters],
            Stage::Digitize => &[ArtifactKind::Digitization],
            Stage::Train => &[ArtifactKind::Training, ArtifactKind::CalibrationCut],
            Stage::Reconstruct => &[ArtifactKind::Reconstruction],
        }
    }

    /// Upstream files that must exist before the stage may run
    ///
    /// Training for multiplicity n needs the digitization of every multiplicity
    /// 1..=n with all other fields equal. A sweep whose `neutron_counts` skips a
    /// lower multiplicity therefore leaves that training task
    /// [`StageStatus::SkippedMissingInput`].
    pub fn required_inputs(&self, namer: &ArtifactNamer, tuple: &ParameterTuple) -> Vec<PathBuf> {
        match self {
            Stage::Simulate => vec![namer.event_input(tuple)],
            Stage::Digitize => vec![
                namer.path(tuple, ArtifactKind::Simulation),
                namer.path(tuple, ArtifactKind::Parameters),
            ],
            // Calibration for multiplicity n is trained on every multiplicity up to n
            Stage::Train => (1..=tuple.neutrons)
                .map(|n| namer.path(&tuple.with_neutrons(n), ArtifactKind::Digitization))
                .collect(),
            Stage::Reconstruct => vec![
                namer.path(tuple, ArtifactKind::Digitization),
                namer.path(tuple, ArtifactKind::Simulation),
                namer.path(tuple, ArtifactKind::Parameters),
                namer.path(tuple, ArtifactKind::CalibrationCut),
            ],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulate" | "simulation" => Ok(Stage::Simulate),
            "digitize" | "digitization" => Ok(Stage::Digitize),
            "train" | "training" => Ok(Stage::Train),
            "reconstruct" | "reconstruction" => Ok(Stage::Reconstruct),
            other => Err(format!(
                "unknown stage '{}', expected one of: simulate, digitize, train, reconstruct",
                other
            )),
        }
    }
}

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Engine exited non-zero, or was killed by a signal (`exit_code: None`)
    EngineFailure { exit_code: Option<i32> },
    /// Engine reported success but an expected artifact is absent
    MissingOutput { path: PathBuf },
    /// Wall-clock bound exceeded; the process group was killed
    Timeout { after: Duration },
    /// Engine process could not be started
    Spawn { message: String },
    /// Filesystem error while preparing the task
    Io { message: String },
    /// Sweep cancelled before or while the task ran
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::EngineFailure {
                exit_code: Some(code),
            } => write!(f, "engine exited with code {}", code),
            FailureReason::EngineFailure { exit_code: None } => {
                write!(f, "engine terminated by signal")
            }
            FailureReason::MissingOutput { path } => {
                write!(f, "engine produced no {}", path.display())
            }
            FailureReason::Timeout { after } => write!(f, "timed out after {:?}", after),
            FailureReason::Spawn { message } => write!(f, "failed to spawn engine: {}", message),
            FailureReason::Io { message } => write!(f, "I/O error: {}", message),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal state of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Target already present and overwriting is disabled
    SkippedExisting { path: PathBuf },
    /// A required upstream artifact is absent
    SkippedMissingInput { path: PathBuf },
    Failed(FailureReason),
}

impl StageStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            StageStatus::SkippedExisting { .. } | StageStatus::SkippedMissingInput { .. }
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::SkippedExisting { path } => {
                write!(f, "skipped, {} exists", path.display())
            }
            StageStatus::SkippedMissingInput { path } => {
                write!(f, "skipped, input {} missing", path.display())
            }
            StageStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one task, never mutated once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub tuple: ParameterTuple,
    pub status: StageStatus,
    /// Log file of the engine run; `None` when no process was spawned
    pub log_path: Option<PathBuf>,
    pub duration: Duration,
    /// Last lines the engine wrote to stderr
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_tail: Vec<String>,
}

impl StageResult {
    /// Result for a task that never reached the isolation boundary
    pub fn without_run(stage: Stage, tuple: ParameterTuple, status: StageStatus) -> Self {
        Self {
            stage,
            tuple,
            status,
            log_path: None,
            duration: Duration::ZERO,
            stderr_tail: Vec::new(),
        }
    }
}
