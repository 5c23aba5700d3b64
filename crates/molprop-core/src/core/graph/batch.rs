use super::molecule::MolecularGraph;
use nalgebra::DMatrix;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Feature dimension mismatch ({context}): expected {expected}, found {found}")]
pub struct DimensionMismatchError {
    pub context: &'static str,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatchError),

    #[error("Cannot batch an empty list of graphs")]
    EmptyBatch,
}

/// A block-structured view over several molecules for vectorized computation.
///
/// Atom features of all constituent molecules are stacked into one matrix;
/// bonds are expanded into a directed edge list (both directions per bond)
/// with atom indices shifted by per-molecule offsets. The boundary table is
/// strictly increasing and allows exact recovery of each molecule's atom
/// slice, so pooled outputs map back to their source molecules. Because edge
/// indices are offset per molecule, the block adjacency contains no
/// cross-molecule edges by construction.
///
/// Batches are transient: built per forward pass and discarded after.
#[derive(Debug, Clone)]
pub struct BatchedGraph {
    atom_features: DMatrix<f64>,
    edge_features: DMatrix<f64>,
    edge_sources: Vec<usize>,
    edge_targets: Vec<usize>,
    /// `boundaries[m]..boundaries[m + 1]` is molecule `m`'s atom range.
    boundaries: Vec<usize>,
    /// Incoming directed-edge count per atom, for mean aggregation.
    in_degrees: Vec<usize>,
    d_atom: usize,
    d_bond: usize,
}

/// Combines validated molecular graphs into [`BatchedGraph`]s.
pub struct Batcher;

impl Batcher {
    /// Stacks `graphs` into one block-structured batch.
    ///
    /// All graphs must share the same atom feature width; all graphs that
    /// have bonds must share the same bond feature width (bond-free graphs
    /// are compatible with any batch).
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::EmptyBatch`] for an empty input list and
    /// [`BatchError::DimensionMismatch`] for incompatible feature widths.
    pub fn combine(graphs: &[&MolecularGraph]) -> Result<BatchedGraph, BatchError> {
        let first = graphs.first().ok_or(BatchError::EmptyBatch)?;
        let d_atom = first.atom_feature_dim();
        let d_bond = graphs
            .iter()
            .find(|g| g.bond_count() > 0)
            .map_or(0, |g| g.bond_feature_dim());

        for graph in graphs {
            if graph.atom_feature_dim() != d_atom {
                return Err(DimensionMismatchError {
                    context: "atom features across batch",
                    expected: d_atom,
                    found: graph.atom_feature_dim(),
                }
                .into());
            }
            if graph.bond_count() > 0 && graph.bond_feature_dim() != d_bond {
                return Err(DimensionMismatchError {
                    context: "bond features across batch",
                    expected: d_bond,
                    found: graph.bond_feature_dim(),
                }
                .into());
            }
        }

        let total_atoms: usize = graphs.iter().map(|g| g.atom_count()).sum();
        let total_edges: usize = graphs.iter().map(|g| 2 * g.bond_count()).sum();

        let mut atom_features = DMatrix::zeros(total_atoms, d_atom);
        let mut edge_features = DMatrix::zeros(total_edges, d_bond);
        let mut edge_sources = Vec::with_capacity(total_edges);
        let mut edge_targets = Vec::with_capacity(total_edges);
        let mut boundaries = Vec::with_capacity(graphs.len() + 1);
        let mut in_degrees = vec![0usize; total_atoms];

        boundaries.push(0);
        let mut atom_offset = 0;
        let mut edge_offset = 0;
        for graph in graphs {
            for (i, atom) in graph.atoms().iter().enumerate() {
                atom_features
                    .row_mut(atom_offset + i)
                    .copy_from_slice(atom.features().as_slice());
            }
            for bond in graph.bonds() {
                let s = atom_offset + bond.source();
                let t = atom_offset + bond.target();
                for (src, tgt) in [(s, t), (t, s)] {
                    edge_features
                        .row_mut(edge_offset)
                        .copy_from_slice(bond.features().as_slice());
                    edge_sources.push(src);
                    edge_targets.push(tgt);
                    in_degrees[tgt] += 1;
                    edge_offset += 1;
                }
            }
            atom_offset += graph.atom_count();
            boundaries.push(atom_offset);
        }

        Ok(BatchedGraph {
            atom_features,
            edge_features,
            edge_sources,
            edge_targets,
            boundaries,
            in_degrees,
            d_atom,
            d_bond,
        })
    }
}

impl BatchedGraph {
    /// Assembles a batch from raw parts, bypassing validation. Test-only:
    /// lets defensive checks downstream be exercised with states the public
    /// constructors reject.
    #[cfg(test)]
    pub(crate) fn from_raw_parts(
        atom_features: DMatrix<f64>,
        edge_features: DMatrix<f64>,
        edge_sources: Vec<usize>,
        edge_targets: Vec<usize>,
        boundaries: Vec<usize>,
        in_degrees: Vec<usize>,
    ) -> Self {
        let d_atom = atom_features.ncols();
        let d_bond = edge_features.ncols();
        Self {
            atom_features,
            edge_features,
            edge_sources,
            edge_targets,
            boundaries,
            in_degrees,
            d_atom,
            d_bond,
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.atom_features.nrows()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_sources.len()
    }

    pub fn num_molecules(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Stacked atom feature matrix, one row per atom.
    pub fn atom_features(&self) -> &DMatrix<f64> {
        &self.atom_features
    }

    /// Directed-edge feature matrix, one row per directed edge.
    pub fn edge_features(&self) -> &DMatrix<f64> {
        &self.edge_features
    }

    pub fn edge_sources(&self) -> &[usize] {
        &self.edge_sources
    }

    pub fn edge_targets(&self) -> &[usize] {
        &self.edge_targets
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Atom index range owned by molecule `m`.
    pub fn molecule_range(&self, m: usize) -> Range<usize> {
        self.boundaries[m]..self.boundaries[m + 1]
    }

    pub fn in_degrees(&self) -> &[usize] {
        &self.in_degrees
    }

    pub fn atom_feature_dim(&self) -> usize {
        self.d_atom
    }

    pub fn bond_feature_dim(&self) -> usize {
        self.d_bond
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::atom::Atom;
    use crate::core::graph::bond::{Bond, BondOrder};
    use nalgebra::DVector;

    fn graph_with_dims(n: usize, d_atom: usize) -> MolecularGraph {
        let atoms = (0..n)
            .map(|i| Atom::new(DVector::from_element(d_atom, i as f64)))
            .collect();
        let bonds = (0..n.saturating_sub(1))
            .map(|i| Bond::with_order(i, i + 1, BondOrder::Single))
            .collect();
        MolecularGraph::build(atoms, bonds).unwrap()
    }

    #[test]
    fn combine_stacks_atoms_and_tracks_boundaries() {
        let g1 = graph_with_dims(3, 2);
        let g2 = graph_with_dims(2, 2);
        let batch = Batcher::combine(&[&g1, &g2]).unwrap();

        assert_eq!(batch.num_molecules(), 2);
        assert_eq!(batch.num_atoms(), 5);
        assert_eq!(batch.boundaries(), &[0, 3, 5]);
        assert_eq!(batch.molecule_range(0), 0..3);
        assert_eq!(batch.molecule_range(1), 3..5);
        assert_eq!(batch.num_atoms(), g1.atom_count() + g2.atom_count());
    }

    #[test]
    fn combine_expands_bonds_into_symmetric_directed_edges() {
        let g = graph_with_dims(3, 2);
        let batch = Batcher::combine(&[&g]).unwrap();

        assert_eq!(batch.num_edges(), 4);
        let pairs: Vec<(usize, usize)> = batch
            .edge_sources()
            .iter()
            .zip(batch.edge_targets())
            .map(|(&s, &t)| (s, t))
            .collect();
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(1, 0)));
        assert!(pairs.contains(&(1, 2)));
        assert!(pairs.contains(&(2, 1)));
        assert_eq!(batch.in_degrees(), &[1, 2, 1]);
    }

    #[test]
    fn combine_produces_no_cross_molecule_edges() {
        let g1 = graph_with_dims(3, 2);
        let g2 = graph_with_dims(4, 2);
        let batch = Batcher::combine(&[&g1, &g2]).unwrap();

        for (&s, &t) in batch.edge_sources().iter().zip(batch.edge_targets()) {
            let same_molecule = (0..batch.num_molecules()).any(|m| {
                let range = batch.molecule_range(m);
                range.contains(&s) && range.contains(&t)
            });
            assert!(same_molecule, "edge ({s}, {t}) crosses a molecule boundary");
        }
    }

    #[test]
    fn combine_rejects_mismatched_atom_feature_widths() {
        let g8 = graph_with_dims(2, 8);
        let g10 = graph_with_dims(2, 10);
        let result = Batcher::combine(&[&g8, &g10]);
        assert!(matches!(
            result,
            Err(BatchError::DimensionMismatch(DimensionMismatchError {
                expected: 8,
                found: 10,
                ..
            }))
        ));
    }

    #[test]
    fn combine_rejects_mismatched_bond_feature_widths() {
        let g1 = graph_with_dims(2, 3);
        let atoms = vec![
            Atom::new(DVector::from_element(3, 0.0)),
            Atom::new(DVector::from_element(3, 1.0)),
        ];
        let bonds = vec![Bond::new(0, 1, DVector::from_vec(vec![1.0, 2.0]))];
        let g2 = MolecularGraph::build(atoms, bonds).unwrap();

        let result = Batcher::combine(&[&g1, &g2]);
        assert!(matches!(
            result,
            Err(BatchError::DimensionMismatch(DimensionMismatchError {
                expected: 4,
                found: 2,
                ..
            }))
        ));
    }

    #[test]
    fn combine_accepts_bond_free_graph_alongside_bonded_graphs() {
        let bonded = graph_with_dims(3, 2);
        let lone = MolecularGraph::build(vec![Atom::new(DVector::from_element(2, 9.0))], vec![])
            .unwrap();
        let batch = Batcher::combine(&[&bonded, &lone]).unwrap();

        assert_eq!(batch.num_molecules(), 2);
        assert_eq!(batch.bond_feature_dim(), 4);
        assert_eq!(batch.in_degrees()[3], 0);
    }

    #[test]
    fn combine_rejects_empty_graph_list() {
        let result = Batcher::combine(&[]);
        assert!(matches!(result, Err(BatchError::EmptyBatch)));
    }
}
