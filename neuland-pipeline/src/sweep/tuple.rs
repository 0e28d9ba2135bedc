// Parameter Tuples
// One point of the sweep parameter space and its enumerated dimensions

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Hadronic physics model used by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicsModel {
    Bert,
    Bic,
    Inclxx,
}

impl PhysicsModel {
    pub const ALL: [PhysicsModel; 3] = [
        PhysicsModel::Bert,
        PhysicsModel::Bic,
        PhysicsModel::Inclxx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicsModel::Bert => "bert",
            PhysicsModel::Bic => "bic",
            PhysicsModel::Inclxx => "inclxx",
        }
    }

    /// Name of the engine physics list selected through `PHYSICSLIST`
    pub fn physics_list(&self) -> &'static str {
        match self {
            PhysicsModel::Bert => "QGSP_BERT_HP",
            PhysicsModel::Bic => "QGSP_BIC_HP",
            PhysicsModel::Inclxx => "QGSP_INCLXX_HP",
        }
    }
}

impl fmt::Display for PhysicsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhysicsModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bert" => Ok(PhysicsModel::Bert),
            "bic" => Ok(PhysicsModel::Bic),
            "inclxx" => Ok(PhysicsModel::Inclxx),
            other => Err(format!(
                "unknown physics model '{}', expected one of: bert, bic, inclxx",
                other
            )),
        }
    }
}

/// Environment the detector sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Air,
    Vacuum,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Air => "air",
            Scenario::Vacuum => "vacuum",
        }
    }

    /// Cave geometry file handed to the engine through `CAVE_GEOMETRY`
    pub fn cave_geometry(&self) -> &'static str {
        match self {
            Scenario::Air => "r3b_cave.geo",
            Scenario::Vacuum => "r3b_cave_vacuum.geo",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "air" => Ok(Scenario::Air),
            "vacuum" => Ok(Scenario::Vacuum),
            other => Err(format!(
                "unknown scenario '{}', expected one of: air, vacuum",
                other
            )),
        }
    }
}

/// A single point in the sweep
///
/// Structural equality over all fields is the only identity a tuple has; it is
/// the key every artifact path is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterTuple {
    /// Target-to-detector distance in metres
    pub distance: u32,
    /// Number of double planes in the detector
    pub double_planes: u32,
    /// Beam energy in AMeV
    pub energy: u32,
    /// Relative energy in keV
    pub relative_energy: u32,
    /// Neutron multiplicity
    pub neutrons: u32,
    pub physics: PhysicsModel,
    pub scenario: Scenario,
}

impl ParameterTuple {
    /// File stem shared by every artifact of this tuple
    pub fn stem(&self) -> String {
        format!(
            "{}m_{}dp_{}AMeV_{}keV_{}n",
            self.distance, self.double_planes, self.energy, self.relative_energy, self.neutrons
        )
    }

    /// Output subdirectory grouping tuples by physics model and scenario
    pub fn group(&self) -> String {
        format!("{}-{}", self.physics, self.scenario)
    }

    /// Same point with a different neutron multiplicity
    pub fn with_neutrons(&self, neutrons: u32) -> Self {
        Self {
            neutrons,
            ..self.clone()
        }
    }
}

impl fmt::Display for ParameterTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group(), self.stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple() -> ParameterTuple {
        ParameterTuple {
            distance: 15,
            double_planes: 8,
            energy: 600,
            relative_energy: 100,
            neutrons: 1,
            physics: PhysicsModel::Inclxx,
            scenario: Scenario::Vacuum,
        }
    }

    #[test]
    fn test_stem_and_group() {
        let t = tuple();
        assert_eq!(t.stem(), "15m_8dp_600AMeV_100keV_1n");
        assert_eq!(t.group(), "inclxx-vacuum");
        assert_eq!(t.to_string(), "inclxx-vacuum/15m_8dp_600AMeV_100keV_1n");
    }

    #[test]
    fn test_with_neutrons_keeps_other_fields() {
        let t = tuple().with_neutrons(4);
        assert_eq!(t.neutrons, 4);
        assert_eq!(t.energy, 600);
        assert_eq!(t.physics, PhysicsModel::Inclxx);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("INCLXX".parse::<PhysicsModel>(), Ok(PhysicsModel::Inclxx));
        assert_eq!("air".parse::<Scenario>(), Ok(Scenario::Air));
        assert!("qgsp".parse::<PhysicsModel>().is_err());
        assert!("water".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_engine_mappings() {
        assert_eq!(PhysicsModel::Bert.physics_list(), "QGSP_BERT_HP");
        assert_eq!(Scenario::Vacuum.cave_geometry(), "r3b_cave_vacuum.geo");
    }
}
