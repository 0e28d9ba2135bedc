// Artifact Naming
// Maps a parameter tuple and artifact kind onto its canonical file path

use crate::stages::Stage;
use crate::sweep::tuple::ParameterTuple;

use serde::{Deserialize, Serialize};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kind of persisted file a stage reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Transport output
    Simulation,
    /// Runtime parameter database written by the simulation
    Parameters,
    /// Digitized hits and clusters
    Digitization,
    /// Multiplicity cuts produced by calibration training
    CalibrationCut,
    /// Plain-text dump of the calibration cuts
    CalibrationTable,
    /// Control plot of the calibration cuts
    CalibrationPlot,
    /// Training output
    Training,
    /// Reconstructed neutrons
    Reconstruction,
    /// Captured engine output of one stage
    Log(Stage),
}

impl ArtifactKind {
    /// Tag placed between the stem and the extension
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactKind::Simulation => "simulation",
            ArtifactKind::Parameters => "parameters",
            ArtifactKind::Digitization => "digitization",
            ArtifactKind::CalibrationCut
            | ArtifactKind::CalibrationTable
            | ArtifactKind::CalibrationPlot => "calibration",
            ArtifactKind::Training => "training",
            ArtifactKind::Reconstruction => "reconstruction",
            ArtifactKind::Log(stage) => stage.tag(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::CalibrationTable => "dat",
            ArtifactKind::CalibrationPlot => "pdf",
            ArtifactKind::Log(_) => "log",
            _ => "root",
        }
    }
}

/// Pure mapping from (tuple, kind) to a path below the output tree
///
/// The grammar is `{output}/{physics}-{scenario}/{stem}.{tag}.{ext}` with
/// `stem = {distance}m_{double_planes}dp_{energy}AMeV_{erel}keV_{neutrons}n`.
/// Every numeric field is followed by a distinct unit suffix and the enum
/// fields never contain `-`, so distinct inputs never share a path. This
/// layout is the contract between stages: a stage finds its inputs by naming
/// them with the same grammar the producing stage used.
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    output_root: PathBuf,
    input_root: PathBuf,
    projectile_mass: u32,
}

impl ArtifactNamer {
    pub fn new(output_root: impl Into<PathBuf>, input_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            input_root: input_root.into(),
            projectile_mass: 132,
        }
    }

    /// Mass number of the projectile before neutron emission
    pub fn with_projectile_mass(mut self, mass: u32) -> Self {
        self.projectile_mass = mass;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    /// Canonical path of an artifact; performs no I/O
    pub fn path(&self, tuple: &ParameterTuple, kind: ArtifactKind) -> PathBuf {
        self.output_root.join(tuple.group()).join(format!(
            "{}.{}.{}",
            tuple.stem(),
            kind.tag(),
            kind.extension()
        ))
    }

    /// Canonical path of an artifact, creating its directory if absent
    pub fn prepare(&self, tuple: &ParameterTuple, kind: ArtifactKind) -> io::Result<PathBuf> {
        let path = self.path(tuple, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Event generator input consumed by the simulation stage
    pub fn event_input(&self, tuple: &ParameterTuple) -> PathBuf {
        let fragment = self.projectile_mass.saturating_sub(tuple.neutrons);
        self.input_root.join(format!(
            "{}Sn_{}n_{}AMeV_{}keV.dat",
            fragment, tuple.neutrons, tuple.energy, tuple.relative_energy
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::tuple::{PhysicsModel, Scenario};

    use proptest::prelude::*;
    use std::collections::HashSet;

    fn tuple(neutrons: u32) -> ParameterTuple {
        ParameterTuple {
            distance: 15,
            double_planes: 8,
            energy: 600,
            relative_energy: 100,
            neutrons,
            physics: PhysicsModel::Inclxx,
            scenario: Scenario::Vacuum,
        }
    }

    const ALL_KINDS: [ArtifactKind; 12] = [
        ArtifactKind::Simulation,
        ArtifactKind::Parameters,
        ArtifactKind::Digitization,
        ArtifactKind::CalibrationCut,
        ArtifactKind::CalibrationTable,
        ArtifactKind::CalibrationPlot,
        ArtifactKind::Training,
        ArtifactKind::Reconstruction,
        ArtifactKind::Log(Stage::Simulate),
        ArtifactKind::Log(Stage::Digitize),
        ArtifactKind::Log(Stage::Train),
        ArtifactKind::Log(Stage::Reconstruct),
    ];

    #[test]
    fn test_path_grammar() {
        let namer = ArtifactNamer::new("output", "input");
        assert_eq!(
            namer.path(&tuple(1), ArtifactKind::Simulation),
            PathBuf::from("output/inclxx-vacuum/15m_8dp_600AMeV_100keV_1n.simulation.root")
        );
        assert_eq!(
            namer.path(&tuple(2), ArtifactKind::Log(Stage::Digitize)),
            PathBuf::from("output/inclxx-vacuum/15m_8dp_600AMeV_100keV_2n.digitization.log")
        );
        assert_eq!(
            namer.path(&tuple(3), ArtifactKind::CalibrationTable),
            PathBuf::from("output/inclxx-vacuum/15m_8dp_600AMeV_100keV_3n.calibration.dat")
        );
    }

    #[test]
    fn test_kinds_never_collide_for_one_tuple() {
        let namer = ArtifactNamer::new("output", "input");
        let paths: HashSet<PathBuf> = ALL_KINDS
            .iter()
            .map(|kind| namer.path(&tuple(1), *kind))
            .collect();
        assert_eq!(paths.len(), ALL_KINDS.len());
    }

    #[test]
    fn test_event_input() {
        let namer = ArtifactNamer::new("output", "input");
        assert_eq!(
            namer.event_input(&tuple(2)),
            PathBuf::from("input/130Sn_2n_600AMeV_100keV.dat")
        );

        let namer = namer.with_projectile_mass(100);
        assert_eq!(
            namer.event_input(&tuple(1)),
            PathBuf::from("input/99Sn_1n_600AMeV_100keV.dat")
        );
    }

    #[test]
    fn test_prepare_creates_directory_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let namer = ArtifactNamer::new(dir.path().join("output"), dir.path().join("input"));

        let first = namer.prepare(&tuple(1), ArtifactKind::Digitization).unwrap();
        let second = namer.prepare(&tuple(1), ArtifactKind::Digitization).unwrap();

        assert_eq!(first, second);
        assert!(first.parent().unwrap().is_dir());
        assert!(!first.exists());
    }

    fn physics() -> impl Strategy<Value = PhysicsModel> {
        prop::sample::select(PhysicsModel::ALL.to_vec())
    }

    fn scenario() -> impl Strategy<Value = Scenario> {
        prop::sample::select(vec![Scenario::Air, Scenario::Vacuum])
    }

    fn any_tuple() -> impl Strategy<Value = ParameterTuple> {
        (
            0u32..100,
            0u32..100,
            0u32..5000,
            0u32..5000,
            0u32..10,
            physics(),
            scenario(),
        )
            .prop_map(
                |(distance, double_planes, energy, relative_energy, neutrons, physics, scenario)| {
                    ParameterTuple {
                        distance,
                        double_planes,
                        energy,
                        relative_energy,
                        neutrons,
                        physics,
                        scenario,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_distinct_tuples_never_share_a_path(
            a in any_tuple(),
            b in any_tuple(),
            kind in prop::sample::select(ALL_KINDS.to_vec()),
        ) {
            let namer = ArtifactNamer::new("output", "input");
            prop_assert_eq!(a == b, namer.path(&a, kind) == namer.path(&b, kind));
        }

        #[test]
        fn prop_path_is_deterministic(t in any_tuple()) {
            let namer = ArtifactNamer::new("output", "input");
            prop_assert_eq!(
                namer.path(&t, ArtifactKind::Reconstruction),
                namer.clone().path(&t.clone(), ArtifactKind::Reconstruction)
            );
        }
    }
}
