use super::model::{GraphNetModel, ModelHyperParams};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error for '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("TOML serialization error: {source}")]
    Serialize { source: toml::ser::Error },

    #[error("Checkpoint incompatible with its own hyperparameters: {reason}")]
    Incompatible { reason: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct TensorData {
    rows: usize,
    cols: usize,
    /// Row-major element order.
    data: Vec<f64>,
}

/// On-disk checkpoint layout: the hyperparameters sufficient to rebuild
/// every tensor shape, plus the named tensors themselves.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    model: ModelHyperParams,
    tensors: BTreeMap<String, TensorData>,
}

/// Writes the model's hyperparameters and all learned tensors to `path`.
/// `load(save(model))` round-trips exactly: TOML floats are printed in
/// shortest-roundtrip form.
pub fn save(model: &GraphNetModel, path: &Path) -> Result<(), CheckpointError> {
    let tensors = model
        .named_tensors()
        .into_iter()
        .map(|(name, tensor)| {
            let mut data = Vec::with_capacity(tensor.len());
            for i in 0..tensor.nrows() {
                for j in 0..tensor.ncols() {
                    data.push(tensor[(i, j)]);
                }
            }
            (
                name,
                TensorData {
                    rows: tensor.nrows(),
                    cols: tensor.ncols(),
                    data,
                },
            )
        })
        .collect();

    let file = CheckpointFile {
        model: *model.hyper(),
        tensors,
    };
    let content =
        toml::to_string(&file).map_err(|e| CheckpointError::Serialize { source: e })?;
    std::fs::write(path, content).map_err(|e| CheckpointError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

/// Reconstructs a model from a checkpoint written by [`save`].
///
/// # Errors
///
/// Returns [`CheckpointError::Incompatible`] when the stored tensors do not
/// match the shapes implied by the stored hyperparameters — missing or
/// surplus tensor names, or wrong dimensions.
pub fn load(path: &Path) -> Result<GraphNetModel, CheckpointError> {
    let content = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    let mut file: CheckpointFile =
        toml::from_str(&content).map_err(|e| CheckpointError::Parse {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

    let mut model = GraphNetModel::zeros(file.model);
    let names = model.tensor_names();
    for (name, slot) in names.iter().zip(model.tensors_mut()) {
        let stored = file
            .tensors
            .remove(name)
            .ok_or_else(|| CheckpointError::Incompatible {
                reason: format!("missing tensor '{name}'"),
            })?;
        fill_tensor(name, slot, &stored)?;
    }
    if let Some(extra) = file.tensors.keys().next() {
        return Err(CheckpointError::Incompatible {
            reason: format!("unexpected tensor '{extra}'"),
        });
    }
    Ok(model)
}

fn fill_tensor(
    name: &str,
    slot: &mut DMatrix<f64>,
    stored: &TensorData,
) -> Result<(), CheckpointError> {
    if stored.rows != slot.nrows() || stored.cols != slot.ncols() {
        return Err(CheckpointError::Incompatible {
            reason: format!(
                "tensor '{}' has shape {}x{}, expected {}x{}",
                name,
                stored.rows,
                stored.cols,
                slot.nrows(),
                slot.ncols()
            ),
        });
    }
    if stored.data.len() != stored.rows * stored.cols {
        return Err(CheckpointError::Incompatible {
            reason: format!(
                "tensor '{}' carries {} elements for a {}x{} shape",
                name,
                stored.data.len(),
                stored.rows,
                stored.cols
            ),
        });
    }
    for i in 0..stored.rows {
        for j in 0..stored.cols {
            slot[(i, j)] = stored.data[i * stored.cols + j];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::atom::Atom;
    use crate::core::graph::batch::Batcher;
    use crate::core::graph::bond::{Bond, BondOrder};
    use crate::core::graph::molecule::MolecularGraph;
    use crate::core::net::message_passing::Aggregation;
    use crate::core::net::readout::ReadoutKind;
    use crate::core::probability::distribution::DistributionFamily;
    use nalgebra::DVector;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use tempfile::tempdir;

    fn fixture_model() -> GraphNetModel {
        let mut rng = StdRng::seed_from_u64(77);
        GraphNetModel::new(
            ModelHyperParams {
                atom_features: 3,
                bond_features: 4,
                hidden_dim: 5,
                layer_count: 2,
                aggregation: Aggregation::Mean,
                readout: ReadoutKind::Gated,
                residual: true,
                family: DistributionFamily::Categorical { classes: 3 },
            },
            &mut rng,
        )
    }

    fn fixture_graph() -> MolecularGraph {
        let atoms = vec![
            Atom::new(DVector::from_vec(vec![0.1, 0.2, 0.3])),
            Atom::new(DVector::from_vec(vec![0.4, 0.5, 0.6])),
            Atom::new(DVector::from_vec(vec![0.7, 0.8, 0.9])),
        ];
        let bonds = vec![
            Bond::with_order(0, 1, BondOrder::Single),
            Bond::with_order(1, 2, BondOrder::Aromatic),
        ];
        MolecularGraph::build(atoms, bonds).unwrap()
    }

    #[test]
    fn save_then_load_round_trips_predictions_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let model = fixture_model();
        model.save(&path).unwrap();
        let restored = GraphNetModel::load(&path).unwrap();

        assert_eq!(restored.hyper(), model.hyper());

        let graph = fixture_graph();
        let batch = Batcher::combine(&[&graph]).unwrap();
        let original = model.distributions(&model.forward(&batch).unwrap());
        let reloaded = restored.distributions(&restored.forward(&batch).unwrap());
        assert_eq!(original, reloaded);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let result = GraphNetModel::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CheckpointError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.toml");
        fs::write(&path, "this is not a checkpoint").unwrap();
        let result = GraphNetModel::load(&path);
        assert!(matches!(result, Err(CheckpointError::Parse { .. })));
    }

    #[test]
    fn load_fails_when_a_tensor_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let model = fixture_model();
        model.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let truncated = content.replace("[tensors.\"head.w\"]", "[tensors.\"rogue.w\"]");
        fs::write(&path, truncated).unwrap();

        let result = GraphNetModel::load(&path);
        assert!(matches!(
            result,
            Err(CheckpointError::Incompatible { .. })
        ));
    }

    #[test]
    fn load_fails_when_a_tensor_shape_disagrees_with_hyperparameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let model = fixture_model();
        model.save(&path).unwrap();

        // Shrink the declared hidden width without touching the tensors.
        let content = fs::read_to_string(&path).unwrap();
        let skewed = content.replace("hidden_dim = 5", "hidden_dim = 4");
        fs::write(&path, skewed).unwrap();

        let result = GraphNetModel::load(&path);
        assert!(matches!(
            result,
            Err(CheckpointError::Incompatible { .. })
        ));
    }
}
