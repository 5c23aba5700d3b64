use super::graph::batch::DimensionMismatchError;
use super::graph::molecule::MolecularGraph;
use super::probability::distribution::DistributionFamily;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Ground-truth label for one molecule, matching the configured output
/// family (`Scalar` for Gaussian, `Binary` for Bernoulli, `Class` for
/// Categorical).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Scalar(f64),
    Binary(bool),
    Class(usize),
}

impl Target {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Binary(_) => "binary",
            Self::Class(_) => "class",
        }
    }

    /// Whether this target kind can be scored under `family`.
    pub fn is_compatible_with(&self, family: &DistributionFamily) -> bool {
        matches!(
            (self, family),
            (Self::Scalar(_), DistributionFamily::Gaussian)
                | (Self::Binary(_), DistributionFamily::Bernoulli)
                | (Self::Class(_), DistributionFamily::Categorical { .. })
        )
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("A dataset requires at least one labeled molecule")]
    Empty,

    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatchError),

    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
}

/// An in-memory supervised dataset: validated molecular graphs paired with
/// their targets. Construction enforces the uniform feature widths a single
/// model instance requires, so training never discovers a mismatch
/// mid-epoch.
#[derive(Debug, Clone)]
pub struct Dataset {
    entries: Vec<(MolecularGraph, Target)>,
    d_atom: usize,
    d_bond: usize,
}

impl Dataset {
    /// Wraps labeled graphs, checking uniform atom/bond feature widths.
    /// Bond-free molecules are compatible with any bond width.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Empty`] for an empty entry list, or a
    /// [`DatasetError::DimensionMismatch`] naming the first offending graph
    /// dimension.
    pub fn new(entries: Vec<(MolecularGraph, Target)>) -> Result<Self, DatasetError> {
        let first = entries.first().ok_or(DatasetError::Empty)?;
        let d_atom = first.0.atom_feature_dim();
        let d_bond = entries
            .iter()
            .find(|(g, _)| g.bond_count() > 0)
            .map_or(0, |(g, _)| g.bond_feature_dim());

        for (graph, _) in &entries {
            if graph.atom_feature_dim() != d_atom {
                return Err(DimensionMismatchError {
                    context: "atom features across dataset",
                    expected: d_atom,
                    found: graph.atom_feature_dim(),
                }
                .into());
            }
            if graph.bond_count() > 0 && graph.bond_feature_dim() != d_bond {
                return Err(DimensionMismatchError {
                    context: "bond features across dataset",
                    expected: d_bond,
                    found: graph.bond_feature_dim(),
                }
                .into());
            }
        }

        Ok(Self {
            entries,
            d_atom,
            d_bond,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> (&MolecularGraph, &Target) {
        let (graph, target) = &self.entries[index];
        (graph, target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MolecularGraph, &Target)> {
        self.entries.iter().map(|(g, t)| (g, t))
    }

    pub fn atom_feature_dim(&self) -> usize {
        self.d_atom
    }

    pub fn bond_feature_dim(&self) -> usize {
        self.d_bond
    }
}

/// One row of a property target table: molecule identifier plus its
/// measured value.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TargetRecord {
    pub molecule_id: String,
    pub value: f64,
}

/// Loads a CSV target table (`molecule_id,value` header) into an id-keyed
/// map, for joining against graphs supplied by the I/O collaborator.
pub fn load_target_table(path: &Path) -> Result<HashMap<String, f64>, DatasetError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| DatasetError::Csv {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    let mut table = HashMap::new();
    for result in reader.deserialize::<TargetRecord>() {
        let record = result.map_err(|e| DatasetError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        table.insert(record.molecule_id, record.value);
    }
    Ok(table)
}
