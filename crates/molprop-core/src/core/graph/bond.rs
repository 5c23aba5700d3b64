use nalgebra::DVector;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Feature width produced by [`BondOrder::features`].
pub const BOND_ORDER_FEATURE_DIM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl Default for BondOrder {
    fn default() -> Self {
        BondOrder::Single
    }
}

impl BondOrder {
    /// Encodes the bond order as a one-hot feature vector.
    pub fn features(&self) -> DVector<f64> {
        let mut v = DVector::zeros(BOND_ORDER_FEATURE_DIM);
        let slot = match self {
            Self::Single => 0,
            Self::Double => 1,
            Self::Triple => 2,
            Self::Aromatic => 3,
        };
        v[slot] = 1.0;
        v
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// An attributed edge between two atoms of the same molecule.
///
/// Endpoints are positional atom indices into the owning graph's atom
/// sequence. A bond is stored once per chemical bond; the graph derives the
/// symmetric directed-edge view used by message passing.
#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    source: usize,
    target: usize,
    features: DVector<f64>,
}

impl Bond {
    pub fn new(source: usize, target: usize, features: DVector<f64>) -> Self {
        Self {
            source,
            target,
            features,
        }
    }

    /// Builds a bond whose features are the one-hot encoding of `order`.
    pub fn with_order(source: usize, target: usize, order: BondOrder) -> Self {
        Self::new(source, target, order.features())
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn features(&self) -> &DVector<f64> {
        &self.features
    }

    pub fn feature_dim(&self) -> usize {
        self.features.len()
    }

    pub fn contains(&self, atom_index: usize) -> bool {
        self.source == atom_index || self.target == atom_index
    }
}
