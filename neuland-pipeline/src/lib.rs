// NeuLAND Pipeline Library
// Parameter sweeps over the detector simulation chain, one engine process per task

pub mod artifacts;
pub mod config;
pub mod error;
pub mod isolation;
pub mod stages;
pub mod sweep;

// Re-export commonly used types
pub use error::{PipelineError, PipelineResult};

// Re-export configuration types
pub use config::{EngineConfig, ResolvedConfig, SweepConfig, WorkspaceConfig, DEFAULT_CONFIG_FILE};

// Re-export artifact naming
pub use artifacts::{ArtifactKind, ArtifactNamer};

// Re-export isolation types
pub use isolation::{
    CancelToken, EngineCommand, Execution, Invocation, OutputCapture, ProcessExecutor,
    StageExecutor, Termination,
};

// Re-export stage types
pub use stages::{FailureReason, Stage, StageResult, StageRunner, StageStatus};

// Re-export sweep types
pub use sweep::{
    progress_channel, Dimension, EventSender, ParameterTuple, PhysicsModel, ProgressReceiver,
    ProgressSender, Scenario, SchedulerConfig, SweepDimensions, SweepEvent, SweepMatrix,
    SweepReport, SweepScheduler, SweepSummary,
};
