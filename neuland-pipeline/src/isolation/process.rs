// Process Executor
// Spawns one fresh engine process per stage invocation

use crate::isolation::capture::{LineCallback, OutputCapture};
use crate::isolation::template::{self, TemplateError};
use crate::isolation::{CancelToken, Execution, Invocation, StageExecutor, Termination};
use crate::stages::Stage;
use crate::sweep::events::{EventSender, ProgressSender, SweepEvent};

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

/// External engine entry point for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineCommand {
    /// Program to execute, looked up on `PATH` when it has no separator
    pub program: String,
    /// Argument templates, see [`template::PLACEHOLDERS`]
    #[serde(default)]
    pub args: Vec<String>,
    /// Event count exposed as `{events}`
    #[serde(default = "default_events")]
    pub events: u64,
}

fn default_events() -> u64 {
    10_000
}

impl EngineCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            events: default_events(),
        }
    }

    /// Default entry point: the stage script with positional tuple fields
    pub fn default_for(stage: Stage) -> Self {
        let script = match stage {
            Stage::Simulate => "simulation.py",
            Stage::Digitize => "digitization.py",
            Stage::Train => "train.py",
            Stage::Reconstruct => "reconstruction.py",
        };
        Self::new(
            "python",
            &[
                script,
                "{distance}",
                "{double_planes}",
                "{energy}",
                "{relative_energy}",
                "{neutrons}",
                "{physics}",
                "{scenario}",
            ],
        )
    }

    /// Check every argument template
    pub fn validate(&self) -> Result<(), TemplateError> {
        self.args.iter().try_for_each(|arg| template::validate(arg))
    }

    /// Render the argument list for one invocation
    pub fn render_args(&self, invocation: &Invocation) -> Result<Vec<String>, TemplateError> {
        let mut values = invocation.template_values();
        values.insert("events", self.events.to_string());
        self.args
            .iter()
            .map(|arg| template::render(arg, &values))
            .collect()
    }
}

/// Isolation boundary backed by OS processes
///
/// Every call spawns a new process image in its own process group; the
/// group is killed on timeout or cancellation and the child is always
/// reaped before `execute` returns.
pub struct ProcessExecutor {
    engines: HashMap<Stage, EngineCommand>,
    /// Workspace variables passed explicitly to every engine
    environment: Vec<(String, String)>,
    timeout: Option<Duration>,
    progress: Option<ProgressSender>,
}

impl ProcessExecutor {
    pub fn new(engines: HashMap<Stage, EngineCommand>) -> Self {
        Self {
            engines,
            environment: Vec::new(),
            timeout: None,
            progress: None,
        }
    }

    pub fn with_environment(mut self, environment: Vec<(String, String)>) -> Self {
        self.environment = environment;
        self
    }

    /// Kill engines that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forward engine output lines as [`SweepEvent::TaskOutput`]
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    fn line_callback(&self, invocation: &Invocation) -> Option<LineCallback> {
        let tx = self.progress.clone()?;
        let stage = invocation.stage;
        let tuple = invocation.tuple.clone();
        let callback: LineCallback = Arc::new(move |line: &str, is_error: bool| {
            tx.send_event(SweepEvent::TaskOutput {
                stage,
                tuple: tuple.clone(),
                line: line.to_string(),
                is_error,
            });
        });
        Some(callback)
    }

    /// Environment of one engine run: workspace variables plus per-tuple selections
    fn engine_environment(&self, invocation: &Invocation) -> Vec<(String, String)> {
        let mut env = self.environment.clone();
        env.push((
            "PHYSICSLIST".to_string(),
            invocation.tuple.physics.physics_list().to_string(),
        ));
        env.push((
            "CAVE_GEOMETRY".to_string(),
            invocation.tuple.scenario.cave_geometry().to_string(),
        ));
        env
    }

    fn log_header(&self, invocation: &Invocation, program: &str, args: &[String]) -> String {
        format!(
            "# stage: {}\n# tuple: {}\n# command: {} {}\n\n",
            invocation.stage,
            invocation.tuple,
            program,
            args.join(" ")
        )
    }

    async fn spawn_and_wait(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
        capture: &mut OutputCapture,
        program: &str,
        args: &[String],
    ) -> Termination {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(self.engine_environment(invocation));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Termination::SpawnFailed(format!("'{}': {}", program, e));
            }
        };
        let pid = child.id();
        tracing::debug!(stage = %invocation.stage, tuple = %invocation.tuple, ?pid, "engine spawned");

        if let Err(e) = attach_streams(&mut child, capture).await {
            terminate(&mut child, pid).await;
            return Termination::Io(format!("cannot capture engine output: {}", e));
        }

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = deadline => Waited::Deadline,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        match waited {
            Waited::Exited(Ok(status)) => {
                // Helpers the engine left behind would outlive the task and hold the pipes
                kill_group(pid);
                Termination::Exited(exit_code(status))
            }
            Waited::Exited(Err(e)) => {
                terminate(&mut child, pid).await;
                Termination::Io(format!("waiting for engine failed: {}", e))
            }
            Waited::Deadline => {
                tracing::warn!(stage = %invocation.stage, tuple = %invocation.tuple, ?pid, "engine timed out, killing");
                terminate(&mut child, pid).await;
                Termination::TimedOut(timeout.unwrap_or_default())
            }
            Waited::Cancelled => {
                tracing::debug!(stage = %invocation.stage, tuple = %invocation.tuple, ?pid, "engine cancelled, killing");
                terminate(&mut child, pid).await;
                Termination::Cancelled
            }
        }
    }
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

#[async_trait::async_trait]
impl StageExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation, cancel: &CancelToken) -> Execution {
        let start = Instant::now();

        let Some(engine) = self.engines.get(&invocation.stage) else {
            return Execution::new(
                Termination::SpawnFailed(format!(
                    "no engine configured for stage '{}'",
                    invocation.stage
                )),
                start.elapsed(),
            );
        };

        let args = match engine.render_args(invocation) {
            Ok(args) => args,
            Err(e) => {
                return Execution::new(Termination::SpawnFailed(e.to_string()), start.elapsed())
            }
        };

        let header = self.log_header(invocation, &engine.program, &args);
        let capture = match OutputCapture::create(&invocation.log_path, &header).await {
            Ok(capture) => capture,
            Err(e) => {
                return Execution::new(
                    Termination::Io(format!(
                        "cannot create log {}: {}",
                        invocation.log_path.display(),
                        e
                    )),
                    start.elapsed(),
                )
            }
        };
        let mut capture = match self.line_callback(invocation) {
            Some(callback) => capture.with_line_callback(callback),
            None => capture,
        };

        let termination = self
            .spawn_and_wait(invocation, cancel, &mut capture, &engine.program, &args)
            .await;
        let report = capture.finish(&termination.to_string()).await;

        Execution {
            termination,
            duration: start.elapsed(),
            stderr_tail: report.stderr_tail,
        }
    }
}

async fn attach_streams(child: &mut Child, capture: &mut OutputCapture) -> io::Result<()> {
    if let Some(stdout) = child.stdout.take() {
        capture.attach(stdout, false).await?;
    }
    if let Some(stderr) = child.stderr.take() {
        capture.attach(stderr, true).await?;
    }
    Ok(())
}

/// SIGKILL every process in the engine's group; an empty group is not an error
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The engine leads its own group, so its pid is the group id
        if let Some(pid) = pid {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::debug!(pid, "killpg failed: {}", e),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the engine together with anything it forked, then reap it
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        tracing::warn!("failed to reap engine process: {}", e);
    }
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}
