// Stage Runner
// Validates pre- and post-conditions around one opaque engine call

use crate::artifacts::{ArtifactKind, ArtifactNamer};
use crate::isolation::{CancelToken, Invocation, StageExecutor};
use crate::stages::{FailureReason, Stage, StageResult, StageStatus};
use crate::sweep::tuple::ParameterTuple;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Runs a stage for one tuple through an isolation boundary
pub struct StageRunner {
    namer: ArtifactNamer,
    executor: Arc<dyn StageExecutor>,
    overwrite: bool,
}

impl StageRunner {
    pub fn new(namer: ArtifactNamer, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            namer,
            executor,
            overwrite: false,
        }
    }

    /// Re-run stages whose target artifact already exists
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn namer(&self) -> &ArtifactNamer {
        &self.namer
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Decide without spawning anything whether the task can be skipped
    ///
    /// Missing inputs are reported before existing outputs.
    pub fn preflight(&self, stage: Stage, tuple: &ParameterTuple) -> Option<StageResult> {
        if let Some(missing) = stage
            .required_inputs(&self.namer, tuple)
            .into_iter()
            .find(|path| !path.is_file())
        {
            tracing::debug!(%stage, %tuple, input = %missing.display(), "input missing");
            return Some(StageResult::without_run(
                stage,
                tuple.clone(),
                StageStatus::SkippedMissingInput { path: missing },
            ));
        }

        let target = self.namer.path(tuple, stage.target());
        if !self.overwrite && target.is_file() {
            tracing::debug!(%stage, %tuple, "target exists, skipping");
            return Some(StageResult::without_run(
                stage,
                tuple.clone(),
                StageStatus::SkippedExisting { path: target },
            ));
        }

        None
    }

    /// Preflight, run the engine in isolation, then verify its outputs
    pub async fn run(
        &self,
        stage: Stage,
        tuple: &ParameterTuple,
        cancel: &CancelToken,
    ) -> StageResult {
        if let Some(skipped) = self.preflight(stage, tuple) {
            return skipped;
        }
        self.execute(stage, tuple, cancel).await
    }

    /// Run a task that already passed preflight
    pub async fn execute(
        &self,
        stage: Stage,
        tuple: &ParameterTuple,
        cancel: &CancelToken,
    ) -> StageResult {
        let start = Instant::now();

        if cancel.is_cancelled() {
            return StageResult::without_run(
                stage,
                tuple.clone(),
                StageStatus::Failed(FailureReason::Cancelled),
            );
        }

        let invocation = match self.prepare(stage, tuple) {
            Ok(invocation) => invocation,
            Err(e) => {
                return StageResult {
                    duration: start.elapsed(),
                    ..StageResult::without_run(
                        stage,
                        tuple.clone(),
                        StageStatus::Failed(FailureReason::Io {
                            message: e.to_string(),
                        }),
                    )
                };
            }
        };

        let execution = self.executor.execute(&invocation, cancel).await;

        let status = match execution.termination.failure() {
            Some(reason) => StageStatus::Failed(reason),
            None => match self.missing_output(stage, tuple) {
                // Exit code 0 is not trusted on its own
                Some(path) => StageStatus::Failed(FailureReason::MissingOutput { path }),
                None => StageStatus::Completed,
            },
        };

        match &status {
            StageStatus::Failed(reason) => {
                tracing::warn!(%stage, %tuple, log = %invocation.log_path.display(), "stage failed: {}", reason)
            }
            _ => tracing::info!(%stage, %tuple, "stage completed"),
        }

        StageResult {
            stage,
            tuple: tuple.clone(),
            status,
            log_path: Some(invocation.log_path),
            duration: start.elapsed(),
            stderr_tail: execution.stderr_tail,
        }
    }

    /// Create directories, clear stale outputs when overwriting, build the invocation
    fn prepare(&self, stage: Stage, tuple: &ParameterTuple) -> io::Result<Invocation> {
        let log_path = self.namer.prepare(tuple, ArtifactKind::Log(stage))?;

        if self.overwrite {
            for kind in stage.produces() {
                remove_if_present(self.namer.path(tuple, *kind))?;
            }
        }

        Ok(Invocation {
            stage,
            tuple: tuple.clone(),
            log_path,
            paths: self.template_paths(stage, tuple),
        })
    }

    fn template_paths(&self, stage: Stage, tuple: &ParameterTuple) -> Vec<(&'static str, PathBuf)> {
        let path = |kind| self.namer.path(tuple, kind);
        let mut paths = vec![
            ("simulation", path(ArtifactKind::Simulation)),
            ("parameters", path(ArtifactKind::Parameters)),
            ("digitization", path(ArtifactKind::Digitization)),
            ("calibration", path(ArtifactKind::CalibrationCut)),
            ("calibration_table", path(ArtifactKind::CalibrationTable)),
            ("calibration_plot", path(ArtifactKind::CalibrationPlot)),
            ("training", path(ArtifactKind::Training)),
            ("reconstruction", path(ArtifactKind::Reconstruction)),
        ];
        let input = match stage {
            Stage::Simulate => self.namer.event_input(tuple),
            Stage::Digitize => path(ArtifactKind::Simulation),
            Stage::Train | Stage::Reconstruct => path(ArtifactKind::Digitization),
        };
        paths.push(("input", input));
        paths
    }

    fn missing_output(&self, stage: Stage, tuple: &ParameterTuple) -> Option<PathBuf> {
        stage
            .verified_outputs()
            .iter()
            .map(|kind| self.namer.path(tuple, *kind))
            .find(|path| !path.is_file())
    }
}

fn remove_if_present(path: PathBuf) -> io::Result<()> {
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::{Execution, Termination};
    use crate::sweep::tuple::{PhysicsModel, Scenario};

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Executor that writes the requested outputs instead of running an engine
    struct FakeExecutor {
        calls: AtomicUsize,
        exit_code: i32,
        write: Vec<ArtifactKind>,
        namer: ArtifactNamer,
        seen: Mutex<Vec<Invocation>>,
    }

    impl FakeExecutor {
        fn new(namer: &ArtifactNamer, exit_code: i32, write: &[ArtifactKind]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                exit_code,
                write: write.to_vec(),
                namer: namer.clone(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StageExecutor for FakeExecutor {
        async fn execute(&self, invocation: &Invocation, _cancel: &CancelToken) -> Execution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for kind in &self.write {
                fs::write(self.namer.path(&invocation.tuple, *kind), b"data").unwrap();
            }
            self.seen.lock().unwrap().push(invocation.clone());
            Execution::new(Termination::Exited(Some(self.exit_code)), Duration::ZERO)
        }
    }

    fn tuple() -> ParameterTuple {
        ParameterTuple {
            distance: 15,
            double_planes: 8,
            energy: 600,
            relative_energy: 100,
            neutrons: 2,
            physics: PhysicsModel::Inclxx,
            scenario: Scenario::Vacuum,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn setup(dir: &Path) -> ArtifactNamer {
        ArtifactNamer::new(dir.join("output"), dir.join("input"))
    }

    #[tokio::test]
    async fn test_missing_input_never_invokes_engine() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        let fake = Arc::new(FakeExecutor::new(&namer, 0, &[ArtifactKind::Digitization]));
        let runner = StageRunner::new(namer.clone(), fake.clone());

        let result = runner.run(Stage::Digitize, &tuple(), &CancelToken::new()).await;

        assert_eq!(
            result.status,
            StageStatus::SkippedMissingInput {
                path: namer.path(&tuple(), ArtifactKind::Simulation)
            }
        );
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert!(result.log_path.is_none());
    }

    #[tokio::test]
    async fn test_completed_then_skipped_existing() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.path(&tuple(), ArtifactKind::Simulation));
        touch(&namer.path(&tuple(), ArtifactKind::Parameters));
        let fake = Arc::new(FakeExecutor::new(&namer, 0, &[ArtifactKind::Digitization]));
        let runner = StageRunner::new(namer.clone(), fake.clone());

        let first = runner.run(Stage::Digitize, &tuple(), &CancelToken::new()).await;
        assert_eq!(first.status, StageStatus::Completed);
        assert_eq!(
            first.log_path,
            Some(namer.path(&tuple(), ArtifactKind::Log(Stage::Digitize)))
        );

        let second = runner.run(Stage::Digitize, &tuple(), &CancelToken::new()).await;
        assert!(matches!(second.status, StageStatus::SkippedExisting { .. }));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_input_reported_before_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.path(&tuple(), ArtifactKind::Digitization));
        let runner = StageRunner::new(
            namer.clone(),
            Arc::new(FakeExecutor::new(&namer, 0, &[])),
        );

        let result = runner.preflight(Stage::Digitize, &tuple()).unwrap();
        assert!(matches!(result.status, StageStatus::SkippedMissingInput { .. }));
    }

    #[tokio::test]
    async fn test_training_without_lower_multiplicity_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        // Swept over neutron_counts = [2] only
        touch(&namer.path(&tuple(), ArtifactKind::Digitization));
        let fake = Arc::new(FakeExecutor::new(&namer, 0, &[]));
        let runner = StageRunner::new(namer.clone(), fake.clone());

        let result = runner.run(Stage::Train, &tuple(), &CancelToken::new()).await;

        assert_eq!(
            result.status,
            StageStatus::SkippedMissingInput {
                path: namer.path(&tuple().with_neutrons(1), ArtifactKind::Digitization)
            }
        );
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.event_input(&tuple()));
        // Writes the simulation but forgets the parameter database
        let fake = Arc::new(FakeExecutor::new(&namer, 0, &[ArtifactKind::Simulation]));
        let runner = StageRunner::new(namer.clone(), fake);

        let result = runner.run(Stage::Simulate, &tuple(), &CancelToken::new()).await;

        assert_eq!(
            result.status,
            StageStatus::Failed(FailureReason::MissingOutput {
                path: namer.path(&tuple(), ArtifactKind::Parameters)
            })
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.event_input(&tuple()));
        let fake = Arc::new(FakeExecutor::new(
            &namer,
            1,
            &[ArtifactKind::Simulation, ArtifactKind::Parameters],
        ));
        let runner = StageRunner::new(namer, fake);

        let result = runner.run(Stage::Simulate, &tuple(), &CancelToken::new()).await;

        assert_eq!(
            result.status,
            StageStatus::Failed(FailureReason::EngineFailure { exit_code: Some(1) })
        );
    }

    #[tokio::test]
    async fn test_overwrite_removes_stale_outputs_first() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.event_input(&tuple()));
        touch(&namer.path(&tuple(), ArtifactKind::Simulation));
        touch(&namer.path(&tuple(), ArtifactKind::Parameters));
        // Engine claims success but writes nothing: stale files must not count
        let runner = StageRunner::new(namer.clone(), Arc::new(FakeExecutor::new(&namer, 0, &[])))
            .with_overwrite(true);

        let result = runner.run(Stage::Simulate, &tuple(), &CancelToken::new()).await;

        assert!(matches!(
            result.status,
            StageStatus::Failed(FailureReason::MissingOutput { .. })
        ));
        assert!(!namer.path(&tuple(), ArtifactKind::Simulation).exists());
    }

    #[tokio::test]
    async fn test_invocation_paths() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.event_input(&tuple()));
        let fake = Arc::new(FakeExecutor::new(
            &namer,
            0,
            &[ArtifactKind::Simulation, ArtifactKind::Parameters],
        ));
        let runner = StageRunner::new(namer.clone(), fake.clone());

        runner.run(Stage::Simulate, &tuple(), &CancelToken::new()).await;

        let seen = fake.seen.lock().unwrap();
        let values = seen[0].template_values();
        assert_eq!(
            values["input"],
            namer.event_input(&tuple()).display().to_string()
        );
        assert_eq!(
            values["parameters"],
            namer
                .path(&tuple(), ArtifactKind::Parameters)
                .display()
                .to_string()
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let namer = setup(dir.path());
        touch(&namer.event_input(&tuple()));
        let fake = Arc::new(FakeExecutor::new(&namer, 0, &[]));
        let runner = StageRunner::new(namer, fake.clone());
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = runner.run(Stage::Simulate, &tuple(), &cancel).await;

        assert_eq!(result.status, StageStatus::Failed(FailureReason::Cancelled));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }
}
