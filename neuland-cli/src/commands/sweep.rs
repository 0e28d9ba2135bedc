use crate::commands::{self, Overrides};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use neuland_pipeline::{
    progress_channel, CancelToken, ParameterTuple, ResolvedConfig, Stage, StageRunner,
    SweepEvent, SweepReport, SweepScheduler,
};

/// Run one or more stages over the configured parameter sweep
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Stages to run, in pipeline order (default: all four)
    #[arg(value_name = "STAGE")]
    pub stages: Vec<Stage>,

    /// Sweep configuration file (default: ./neuland.yaml if present)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Re-run tasks whose output already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Maximum number of engines running at once
    #[arg(long, short = 'j', value_name = "N")]
    pub workers: Option<usize>,

    /// Kill engines running longer than this
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Show what each task would do without spawning engines
    #[arg(long)]
    pub dry_run: bool,

    /// Write the sweep report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

impl SweepArgs {
    fn selected_stages(&self) -> Vec<Stage> {
        if self.stages.is_empty() {
            return Stage::PIPELINE.to_vec();
        }
        let mut stages = self.stages.clone();
        stages.sort();
        stages.dedup();
        stages
    }
}

pub async fn execute(args: SweepArgs, verbose: bool) -> Result<()> {
    let config = commands::load_config(
        args.config.as_deref(),
        Overrides {
            overwrite: args.overwrite,
            workers: args.workers,
            timeout_secs: args.timeout,
        },
    )?;

    let stages = args.selected_stages();
    let resolved = config.resolve(&stages)?;
    let tuples = resolved.tuples()?;

    tracing::info!(
        tuples = tuples.len(),
        workers = resolved.workers,
        ?stages,
        dry_run = args.dry_run,
        "sweep configured"
    );

    let stage_names: Vec<&str> = stages.iter().map(|s| s.as_str()).collect();
    output::info(&format!(
        "{} tuples, stages: {}, {} workers",
        tuples.len(),
        stage_names.join(" -> "),
        resolved.workers
    ));

    if args.dry_run {
        dry_run(&resolved, &stages, &tuples);
        return Ok(());
    }

    let (tx, mut rx) = progress_channel();
    let cancel = CancelToken::new();
    commands::cancel_on_interrupt(cancel.clone());

    let mut executor = resolved.executor();
    if verbose {
        executor = executor.with_progress(tx.clone());
    }
    let scheduler = SweepScheduler::new(resolved.runner(Arc::new(executor)))
        .with_config(resolved.scheduler_config())
        .with_progress(tx)
        .with_cancel(cancel);

    // Run the sweep in the background, render events in the foreground
    let sweep_handle =
        tokio::spawn(async move { scheduler.run_pipeline(&stages, &tuples).await });

    while let Some(event) = rx.recv().await {
        match event {
            SweepEvent::SweepStarted { stage, total } => {
                println!();
                output::stage_header(stage.as_str(), total);
            }

            SweepEvent::TaskQueued { stage, tuple, .. } => {
                if verbose {
                    output::dim(&format!("    queued {} {}", stage, tuple));
                }
            }

            SweepEvent::TaskStarted { stage, tuple, .. } => {
                output::status("Running", &format!("{} {}", stage, tuple));
            }

            SweepEvent::TaskSkipped { result, .. } | SweepEvent::TaskFinished { result, .. } => {
                commands::print_result(&result);
            }

            SweepEvent::TaskOutput { line, is_error, .. } => {
                if is_error {
                    output::engine_error(&line);
                } else {
                    output::engine_output(&line);
                }
            }

            SweepEvent::SweepCompleted { summary } => {
                let line = format!(
                    "  {} done: {} completed, {} skipped, {} failed ({:.2}s)",
                    summary
                        .stage
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "sweep".to_string()),
                    summary.completed,
                    summary.skipped_existing + summary.skipped_missing_input,
                    summary.failed,
                    summary.duration.as_secs_f64()
                );
                if summary.success() {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }
        }
    }

    let report = sweep_handle.await?;
    tracing::info!(
        total = report.summary.total,
        failed = report.summary.failed,
        "sweep finished"
    );
    print_summary(&report);

    if let Some(path) = &args.report {
        report.write_json(path)?;
        output::info(&format!("Report written to {}", path.display()));
    }

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Preflight every task against the files currently on disk
fn dry_run(resolved: &ResolvedConfig, stages: &[Stage], tuples: &[ParameterTuple]) {
    let runner: StageRunner = resolved.runner(Arc::new(resolved.executor()));
    for stage in stages {
        println!();
        output::stage_header(stage.as_str(), tuples.len());
        let mut runnable = 0;
        for tuple in tuples {
            match runner.preflight(*stage, tuple) {
                Some(result) => commands::print_result(&result),
                None => {
                    runnable += 1;
                    output::status("Would run", &format!("{} {}", stage, tuple));
                }
            }
        }
        output::dim(&format!("  {} of {} tasks would run", runnable, tuples.len()));
    }
    if stages.len() > 1 {
        output::warning("Later stages are checked against existing files only");
    }
}

fn print_summary(report: &SweepReport) {
    let summary = &report.summary;
    println!();
    output::header(&format!(
        "{} tasks: {} completed, {} skipped (existing), {} skipped (missing input), {} failed",
        summary.total,
        summary.completed,
        summary.skipped_existing,
        summary.skipped_missing_input,
        summary.failed
    ));

    for result in report.failures() {
        commands::print_result(result);
        commands::print_failure_detail(result);
    }

    if report.success() {
        output::success(&format!(
            "Sweep finished in {:.2}s",
            summary.duration.as_secs_f64()
        ));
    } else {
        output::failure(&format!(
            "Sweep finished with {} failed tasks",
            summary.failed
        ));
    }
}
