// Sweep Module
// Parameter space expansion, bounded parallel dispatch and reporting

pub mod events;
pub mod matrix;
pub mod report;
pub mod scheduler;
pub mod tuple;

// Re-export key types
pub use events::{progress_channel, EventSender, ProgressReceiver, ProgressSender, SweepEvent};
pub use matrix::{Dimension, MatrixError, SweepDimensions, SweepMatrix};
pub use report::{SweepReport, SweepSummary};
pub use scheduler::{default_workers, SchedulerConfig, SweepScheduler};
pub use tuple::{ParameterTuple, PhysicsModel, Scenario};
