use crate::commands::{self, Overrides};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::eyre::bail;
use color_eyre::Result;

use neuland_pipeline::{CancelToken, ParameterTuple, PhysicsModel, Scenario, Stage};

/// Run a single stage for one parameter tuple
#[derive(Args, Debug)]
pub struct StageArgs {
    /// simulate, digitize, train or reconstruct
    pub stage: Stage,

    /// Distance from target to detector in meters
    pub distance: u32,

    /// Number of detector double planes
    pub double_planes: u32,

    /// Beam energy in AMeV
    pub energy: u32,

    /// Relative energy in keV
    pub relative_energy: u32,

    /// Neutron multiplicity
    pub neutrons: u32,

    /// Physics model: bert, bic or inclxx
    pub physics: PhysicsModel,

    /// Cave scenario: air or vacuum
    pub scenario: Scenario,

    /// Re-run even if the output already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Sweep configuration file (default: ./neuland.yaml if present)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Kill the engine if it runs longer than this
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl StageArgs {
    pub fn tuple(&self) -> ParameterTuple {
        ParameterTuple {
            distance: self.distance,
            double_planes: self.double_planes,
            energy: self.energy,
            relative_energy: self.relative_energy,
            neutrons: self.neutrons,
            physics: self.physics,
            scenario: self.scenario,
        }
    }
}

pub async fn execute(args: StageArgs) -> Result<()> {
    let config = commands::load_config(
        args.config.as_deref(),
        Overrides {
            overwrite: args.overwrite,
            workers: None,
            timeout_secs: args.timeout,
        },
    )?;

    let tuple = args.tuple();
    if tuple.neutrons == 0 || tuple.neutrons >= config.projectile_mass {
        bail!(
            "neutron count {} must be between 1 and {}",
            tuple.neutrons,
            config.projectile_mass.saturating_sub(1)
        );
    }

    let resolved = config.resolve(&[args.stage])?;
    let runner = resolved.runner(Arc::new(resolved.executor()));

    let cancel = CancelToken::new();
    commands::cancel_on_interrupt(cancel.clone());

    output::status("Running", &format!("{} {}", args.stage, tuple));
    let result = runner.run(args.stage, &tuple, &cancel).await;
    tracing::info!(stage = %args.stage, %tuple, status = %result.status, "stage finished");

    commands::print_result(&result);
    if result.status.is_failure() {
        commands::print_failure_detail(&result);
        std::process::exit(1);
    }
    if let Some(log) = &result.log_path {
        output::dim(&format!("      log: {}", log.display()));
    }
    Ok(())
}
