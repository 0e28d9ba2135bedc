// Isolation Module
// Runs each stage invocation in a disposable engine process

pub mod cancel;
pub mod capture;
pub mod process;
pub mod template;

// Re-export key types
pub use cancel::CancelToken;
pub use capture::{CaptureReport, LineCallback, OutputCapture};
pub use process::{EngineCommand, ProcessExecutor};

use crate::stages::{FailureReason, Stage};
use crate::sweep::tuple::ParameterTuple;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Everything an executor needs to run one stage for one tuple
#[derive(Debug, Clone)]
pub struct Invocation {
    pub stage: Stage,
    pub tuple: ParameterTuple,
    /// Where the engine's stdout and stderr are captured
    pub log_path: PathBuf,
    /// Artifact paths available to argument templates, keyed by placeholder
    pub paths: Vec<(&'static str, PathBuf)>,
}

impl Invocation {
    /// Placeholder values derived from the tuple and artifact paths
    pub fn template_values(&self) -> HashMap<&'static str, String> {
        let t = &self.tuple;
        let mut values = HashMap::new();
        values.insert("distance", t.distance.to_string());
        values.insert("double_planes", t.double_planes.to_string());
        values.insert("energy", t.energy.to_string());
        values.insert("relative_energy", t.relative_energy.to_string());
        values.insert("neutrons", t.neutrons.to_string());
        values.insert("physics", t.physics.to_string());
        values.insert("scenario", t.scenario.to_string());
        values.insert("physics_list", t.physics.physics_list().to_string());
        values.insert("log", self.log_path.display().to_string());
        for (name, path) in &self.paths {
            values.insert(*name, path.display().to_string());
        }
        values
    }
}

/// How the engine process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Process exited on its own; `None` when killed by a signal
    Exited(Option<i32>),
    TimedOut(Duration),
    Cancelled,
    SpawnFailed(String),
    Io(String),
}

impl Termination {
    /// Failure reason, or `None` for a clean zero exit
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Termination::Exited(Some(0)) => None,
            Termination::Exited(code) => Some(FailureReason::EngineFailure { exit_code: *code }),
            Termination::TimedOut(after) => Some(FailureReason::Timeout { after: *after }),
            Termination::Cancelled => Some(FailureReason::Cancelled),
            Termination::SpawnFailed(message) => Some(FailureReason::Spawn {
                message: message.clone(),
            }),
            Termination::Io(message) => Some(FailureReason::Io {
                message: message.clone(),
            }),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(Some(code)) => write!(f, "exited with code {}", code),
            Termination::Exited(None) => write!(f, "terminated by signal"),
            Termination::TimedOut(after) => write!(f, "killed after timeout of {:?}", after),
            Termination::Cancelled => write!(f, "killed on cancellation"),
            Termination::SpawnFailed(message) => write!(f, "spawn failed: {}", message),
            Termination::Io(message) => write!(f, "i/o error: {}", message),
        }
    }
}

/// Outcome of one isolated engine run
#[derive(Debug, Clone)]
pub struct Execution {
    pub termination: Termination,
    pub duration: Duration,
    pub stderr_tail: Vec<String>,
}

impl Execution {
    pub fn new(termination: Termination, duration: Duration) -> Self {
        Self {
            termination,
            duration,
            stderr_tail: Vec::new(),
        }
    }
}

/// Capability to run a non-reentrant engine call for one invocation
///
/// Implementations must never reuse an engine instance between invocations:
/// the engine keeps process-wide state that cannot be reinitialized.
#[async_trait::async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> Execution;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::tuple::{PhysicsModel, Scenario};

    #[test]
    fn test_termination_failure_mapping() {
        assert_eq!(Termination::Exited(Some(0)).failure(), None);
        assert_eq!(
            Termination::Exited(Some(3)).failure(),
            Some(FailureReason::EngineFailure { exit_code: Some(3) })
        );
        assert_eq!(
            Termination::Exited(None).failure(),
            Some(FailureReason::EngineFailure { exit_code: None })
        );
        assert_eq!(
            Termination::TimedOut(Duration::from_secs(1)).failure(),
            Some(FailureReason::Timeout {
                after: Duration::from_secs(1)
            })
        );
        assert_eq!(
            Termination::Cancelled.failure(),
            Some(FailureReason::Cancelled)
        );
    }

    #[test]
    fn test_template_values() {
        let invocation = Invocation {
            stage: Stage::Digitize,
            tuple: ParameterTuple {
                distance: 15,
                double_planes: 30,
                energy: 200,
                relative_energy: 500,
                neutrons: 4,
                physics: PhysicsModel::Bic,
                scenario: Scenario::Air,
            },
            log_path: PathBuf::from("out/x.digitization.log"),
            paths: vec![("digitization", PathBuf::from("out/x.digitization.root"))],
        };

        let values = invocation.template_values();
        assert_eq!(values["double_planes"], "30");
        assert_eq!(values["physics_list"], "QGSP_BIC_HP");
        assert_eq!(values["digitization"], "out/x.digitization.root");
        assert_eq!(values["log"], "out/x.digitization.log");
    }
}
