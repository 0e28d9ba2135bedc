// Sweep Configuration
// YAML settings for a sweep, validated into a resolved form before dispatch

use crate::artifacts::ArtifactNamer;
use crate::error::{PipelineError, PipelineResult};
use crate::isolation::{EngineCommand, ProcessExecutor, StageExecutor};
use crate::stages::{Stage, StageRunner};
use crate::sweep::matrix::{SweepDimensions, SweepMatrix};
use crate::sweep::scheduler::{default_workers, SchedulerConfig};
use crate::sweep::tuple::ParameterTuple;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File looked up in the current directory when no config is given
pub const DEFAULT_CONFIG_FILE: &str = "neuland.yaml";

/// Where the detector simulation framework is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Environment variable holding the workspace root
    pub variable: String,
    /// Explicit root, takes precedence over `variable`
    pub root: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            variable: "VMCWORKDIR".to_string(),
            root: None,
        }
    }
}

/// Engine entry point for each stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub simulate: EngineCommand,
    pub digitize: EngineCommand,
    pub train: EngineCommand,
    pub reconstruct: EngineCommand,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulate: EngineCommand::default_for(Stage::Simulate),
            digitize: EngineCommand::default_for(Stage::Digitize),
            train: EngineCommand::default_for(Stage::Train),
            reconstruct: EngineCommand::default_for(Stage::Reconstruct),
        }
    }
}

impl EngineConfig {
    pub fn get(&self, stage: Stage) -> &EngineCommand {
        match stage {
            Stage::Simulate => &self.simulate,
            Stage::Digitize => &self.digitize,
            Stage::Train => &self.train,
            Stage::Reconstruct => &self.reconstruct,
        }
    }
}

/// Raw sweep configuration as read from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub output_dir: PathBuf,
    pub input_dir: PathBuf,
    /// Projectile mass number, used to name event input files
    pub projectile_mass: u32,
    pub workspace: WorkspaceConfig,
    pub sweep: SweepDimensions,
    pub overwrite: bool,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub engine: EngineConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            input_dir: PathBuf::from("input"),
            projectile_mass: 132,
            workspace: WorkspaceConfig::default(),
            sweep: SweepDimensions::default(),
            overwrite: false,
            workers: None,
            timeout_secs: None,
            engine: EngineConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Parse a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PipelineError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| PipelineError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load `path`, or `neuland.yaml` if present, or the built-in defaults
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate against the process environment
    pub fn resolve(&self, stages: &[Stage]) -> PipelineResult<ResolvedConfig> {
        self.resolve_with(stages, |name| std::env::var(name).ok())
    }

    /// Validate everything a sweep over `stages` needs before dispatch
    pub fn resolve_with<F>(&self, stages: &[Stage], lookup: F) -> PipelineResult<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace_root = self.workspace_root(&lookup)?;

        SweepMatrix::validate_order(&self.sweep.order)
            .map_err(|e| PipelineError::config(e.to_string()))?;

        if let Some(bad) = self
            .sweep
            .neutron_counts
            .iter()
            .find(|n| **n == 0 || **n >= self.projectile_mass)
        {
            return Err(PipelineError::config(format!(
                "neutron count {} must be between 1 and {}",
                bad,
                self.projectile_mass.saturating_sub(1)
            )));
        }

        let workers = match self.workers {
            Some(0) => return Err(PipelineError::config("workers must be at least 1")),
            Some(n) => n,
            None => default_workers(),
        };

        let mut engines = HashMap::new();
        for stage in stages {
            let mut engine = self.engine.get(*stage).clone();
            engine.validate().map_err(|e| {
                PipelineError::config(format!("engine for stage '{}': {}", stage, e))
            })?;
            engine.program = resolve_program(&engine.program).map_err(|e| {
                PipelineError::config(format!("engine for stage '{}': {}", stage, e))
            })?;
            engines.insert(*stage, engine);
        }

        let empty = self.sweep.empty_dimensions();
        if !empty.is_empty() {
            tracing::warn!(?empty, "sweep dimension without values, nothing to run");
        }

        Ok(ResolvedConfig {
            config: self.clone(),
            workspace_root,
            engines,
            workers,
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }

    fn workspace_root<F>(&self, lookup: &F) -> PipelineResult<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = match &self.workspace.root {
            Some(root) => root.clone(),
            None => lookup(&self.workspace.variable)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| {
                    PipelineError::config(format!(
                        "environment variable {} is not set; point it at the simulation framework installation",
                        self.workspace.variable
                    ))
                })?,
        };

        if !root.is_dir() {
            return Err(PipelineError::config(format!(
                "workspace root {} is not a directory",
                root.display()
            )));
        }
        Ok(root)
    }
}

/// Find an engine program on `PATH`, or check an explicit path
fn resolve_program(program: &str) -> Result<String, String> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return if Path::new(program).is_file() {
            Ok(program.to_string())
        } else {
            Err(format!("program {} does not exist", program))
        };
    }
    which::which(program)
        .map(|path| path.display().to_string())
        .map_err(|e| format!("program '{}' not found on PATH: {}", program, e))
}

/// Configuration checked against the environment, ready to drive a sweep
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: SweepConfig,
    pub workspace_root: PathBuf,
    /// Engines of the stages this config was resolved for
    pub engines: HashMap<Stage, EngineCommand>,
    pub workers: usize,
    pub timeout: Option<Duration>,
}

impl ResolvedConfig {
    /// Workspace variables every engine receives
    pub fn workspace_environment(&self) -> Vec<(String, String)> {
        let root = self.workspace_root.display().to_string();
        vec![
            ("VMCWORKDIR".to_string(), root.clone()),
            ("GEOMPATH".to_string(), format!("{}/geometry", root)),
            ("CONFIG_DIR".to_string(), format!("{}/gconfig", root)),
        ]
    }

    pub fn namer(&self) -> ArtifactNamer {
        ArtifactNamer::new(&self.config.output_dir, &self.config.input_dir)
            .with_projectile_mass(self.config.projectile_mass)
    }

    pub fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(self.engines.clone())
            .with_environment(self.workspace_environment())
            .with_timeout(self.timeout)
    }

    pub fn runner(&self, executor: Arc<dyn StageExecutor>) -> StageRunner {
        StageRunner::new(self.namer(), executor).with_overwrite(self.config.overwrite)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
        }
    }

    /// Every tuple of the configured sweep, in nested order
    pub fn tuples(&self) -> PipelineResult<Vec<ParameterTuple>> {
        SweepMatrix::expand(&self.config.sweep).map_err(|e| PipelineError::config(e.to_string()))
    }
}
