pub mod stage;
pub mod sweep;

use crate::output;

use std::path::Path;

use color_eyre::Result;
use neuland_pipeline::{CancelToken, StageResult, StageStatus, SweepConfig};

/// Command-line settings that take precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub overwrite: bool,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Load the config file (or defaults) and apply command-line overrides
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<SweepConfig> {
    let mut config = SweepConfig::load(path)?;
    tracing::debug!(?path, ?overrides, "applying command-line overrides");
    if overrides.overwrite {
        config.overwrite = true;
    }
    if overrides.workers.is_some() {
        config.workers = overrides.workers;
    }
    if overrides.timeout_secs.is_some() {
        config.timeout_secs = overrides.timeout_secs;
    }
    Ok(config)
}

/// Cancel the sweep on the first Ctrl-C; running engines are killed
pub fn cancel_on_interrupt(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling running engines");
            output::warning("Interrupted, stopping engines");
            cancel.cancel();
        }
    });
}

/// One-line outcome of a task
pub fn print_result(result: &StageResult) {
    let label = format!("{} {}", result.stage, result.tuple);
    match &result.status {
        StageStatus::Completed => output::success(&format!(
            "{} ({:.2}s)",
            label,
            result.duration.as_secs_f64()
        )),
        StageStatus::Failed(reason) => output::failure(&format!("{}: {}", label, reason)),
        status => output::skip(&format!("{}: {}", label, status)),
    }
}

/// Log location and stderr tail of a failed task
pub fn print_failure_detail(result: &StageResult) {
    if let Some(log) = &result.log_path {
        output::dim(&format!("      log: {}", log.display()));
    }
    for line in &result.stderr_tail {
        output::engine_error(line);
    }
}
