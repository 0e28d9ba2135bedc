// Sweep Matrix
// Expands the configured dimension lists into ordered parameter tuples

use crate::sweep::tuple::{ParameterTuple, PhysicsModel, Scenario};

use serde::{Deserialize, Serialize};

use std::fmt;

/// One axis of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Distance,
    DoublePlanes,
    Energy,
    RelativeEnergy,
    Neutrons,
    Physics,
    Scenario,
}

impl Dimension {
    /// Field order of [`ParameterTuple`], the default nesting
    pub const ALL: [Dimension; 7] = [
        Dimension::Distance,
        Dimension::DoublePlanes,
        Dimension::Energy,
        Dimension::RelativeEnergy,
        Dimension::Neutrons,
        Dimension::Physics,
        Dimension::Scenario,
    ];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Distance => "distance",
            Dimension::DoublePlanes => "double_planes",
            Dimension::Energy => "energy",
            Dimension::RelativeEnergy => "relative_energy",
            Dimension::Neutrons => "neutrons",
            Dimension::Physics => "physics",
            Dimension::Scenario => "scenario",
        };
        f.write_str(name)
    }
}

/// Value lists for every sweep dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepDimensions {
    pub distances: Vec<u32>,
    pub double_planes: Vec<u32>,
    pub energies: Vec<u32>,
    pub relative_energies: Vec<u32>,
    pub neutron_counts: Vec<u32>,
    pub physics_models: Vec<PhysicsModel>,
    pub scenarios: Vec<Scenario>,
    /// Nesting order, outermost first
    pub order: Vec<Dimension>,
}

impl Default for SweepDimensions {
    fn default() -> Self {
        Self {
            distances: vec![15, 35],
            double_planes: vec![8, 12, 30],
            energies: vec![200, 600, 1000],
            relative_energies: vec![100, 500, 1000, 2000, 3000],
            neutron_counts: vec![1, 2, 3, 4, 5, 6],
            physics_models: PhysicsModel::ALL.to_vec(),
            scenarios: vec![Scenario::Air, Scenario::Vacuum],
            order: Dimension::ALL.to_vec(),
        }
    }
}

impl SweepDimensions {
    fn len_of(&self, dimension: Dimension) -> usize {
        match dimension {
            Dimension::Distance => self.distances.len(),
            Dimension::DoublePlanes => self.double_planes.len(),
            Dimension::Energy => self.energies.len(),
            Dimension::RelativeEnergy => self.relative_energies.len(),
            Dimension::Neutrons => self.neutron_counts.len(),
            Dimension::Physics => self.physics_models.len(),
            Dimension::Scenario => self.scenarios.len(),
        }
    }

    /// Size of the Cartesian product
    pub fn len(&self) -> usize {
        Dimension::ALL.iter().map(|d| self.len_of(*d)).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensions without any value, which make the product empty
    pub fn empty_dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .iter()
            .copied()
            .filter(|d| self.len_of(*d) == 0)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// `order` is not a permutation of all seven dimensions
    InvalidOrder(Vec<Dimension>),
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::InvalidOrder(order) => {
                let names: Vec<String> = order.iter().map(|d| d.to_string()).collect();
                write!(
                    f,
                    "sweep order [{}] must list each of the 7 dimensions exactly once",
                    names.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for MatrixError {}

/// Cartesian expansion of [`SweepDimensions`]
pub struct SweepMatrix;

impl SweepMatrix {
    /// Check that `order` names every dimension exactly once
    pub fn validate_order(order: &[Dimension]) -> Result<(), MatrixError> {
        let complete = order.len() == Dimension::ALL.len()
            && Dimension::ALL.iter().all(|d| order.contains(d));
        if complete {
            Ok(())
        } else {
            Err(MatrixError::InvalidOrder(order.to_vec()))
        }
    }

    /// All tuples in nested order; the last dimension of `order` varies fastest
    pub fn expand(dimensions: &SweepDimensions) -> Result<Vec<ParameterTuple>, MatrixError> {
        Self::validate_order(&dimensions.order)?;

        let total = dimensions.len();
        let mut tuples = Vec::with_capacity(total);
        if total == 0 {
            return Ok(tuples);
        }

        let order = &dimensions.order;
        let sizes: Vec<usize> = order.iter().map(|d| dimensions.len_of(*d)).collect();
        let mut index = vec![0usize; order.len()];

        loop {
            tuples.push(Self::tuple_at(dimensions, order, &index));

            // Odometer increment from the innermost position
            let mut pos = order.len();
            loop {
                if pos == 0 {
                    return Ok(tuples);
                }
                pos -= 1;
                index[pos] += 1;
                if index[pos] < sizes[pos] {
                    break;
                }
                index[pos] = 0;
            }
        }
    }

    fn tuple_at(
        dimensions: &SweepDimensions,
        order: &[Dimension],
        index: &[usize],
    ) -> ParameterTuple {
        let at = |dimension: Dimension| {
            let pos = order
                .iter()
                .position(|d| *d == dimension)
                .unwrap_or_default();
            index[pos]
        };

        ParameterTuple {
            distance: dimensions.distances[at(Dimension::Distance)],
            double_planes: dimensions.double_planes[at(Dimension::DoublePlanes)],
            energy: dimensions.energies[at(Dimension::Energy)],
            relative_energy: dimensions.relative_energies[at(Dimension::RelativeEnergy)],
            neutrons: dimensions.neutron_counts[at(Dimension::Neutrons)],
            physics: dimensions.physics_models[at(Dimension::Physics)],
            scenario: dimensions.scenarios[at(Dimension::Scenario)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn small() -> SweepDimensions {
        SweepDimensions {
            distances: vec![15],
            double_planes: vec![8],
            energies: vec![600],
            relative_energies: vec![100],
            neutron_counts: vec![1, 2],
            physics_models: vec![PhysicsModel::Inclxx],
            scenarios: vec![Scenario::Vacuum],
            order: Dimension::ALL.to_vec(),
        }
    }

    #[test]
    fn test_two_tuple_sweep() {
        let tuples = SweepMatrix::expand(&small()).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].stem(), "15m_8dp_600AMeV_100keV_1n");
        assert_eq!(tuples[1].stem(), "15m_8dp_600AMeV_100keV_2n");
    }

    #[test]
    fn test_default_product_is_complete_and_unique() {
        let dims = SweepDimensions::default();
        let tuples = SweepMatrix::expand(&dims).unwrap();
        assert_eq!(tuples.len(), 2 * 3 * 3 * 5 * 6 * 3 * 2);
        let unique: HashSet<_> = tuples.iter().collect();
        assert_eq!(unique.len(), tuples.len());
    }

    #[test]
    fn test_innermost_dimension_varies_fastest() {
        let mut dims = small();
        dims.distances = vec![15, 35];
        dims.order = vec![
            Dimension::Neutrons,
            Dimension::Distance,
            Dimension::DoublePlanes,
            Dimension::Energy,
            Dimension::RelativeEnergy,
            Dimension::Physics,
            Dimension::Scenario,
        ];

        let tuples = SweepMatrix::expand(&dims).unwrap();
        let pairs: Vec<(u32, u32)> = tuples.iter().map(|t| (t.neutrons, t.distance)).collect();
        assert_eq!(pairs, vec![(1, 15), (1, 35), (2, 15), (2, 35)]);
    }

    #[test]
    fn test_empty_dimension_yields_nothing() {
        let mut dims = small();
        dims.scenarios.clear();
        assert!(SweepMatrix::expand(&dims).unwrap().is_empty());
        assert_eq!(dims.empty_dimensions(), vec![Dimension::Scenario]);
    }

    #[test]
    fn test_invalid_order_rejected() {
        let mut dims = small();
        dims.order = vec![Dimension::Distance, Dimension::Distance];
        assert!(matches!(
            SweepMatrix::expand(&dims),
            Err(MatrixError::InvalidOrder(_))
        ));
    }
}
