use super::element;
use nalgebra::DVector;

/// Represents an atom as an attributed node in a molecular graph.
///
/// An atom carries only its numeric feature vector (e.g., element identity,
/// formal charge, hybridization encoded by the upstream I/O layer). Its
/// identity within a molecule is positional: the index of the atom in the
/// sequence passed to `MolecularGraph::build`. Atoms are immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    features: DVector<f64>,
}

impl Atom {
    /// Creates an atom from an already-normalized feature vector.
    ///
    /// # Arguments
    ///
    /// * `features` - The feature vector; its length fixes this atom's
    ///   feature dimension. All atoms in one graph must agree on it.
    pub fn new(features: DVector<f64>) -> Self {
        Self { features }
    }

    /// Creates an atom from an element symbol and formal charge using the
    /// built-in element table.
    ///
    /// This is a convenience for callers that hold element records rather
    /// than precomputed feature vectors. The resulting feature layout is
    /// `[atomic number, electronegativity, covalent radius, valence,
    /// formal charge]`.
    ///
    /// # Return
    ///
    /// Returns `None` if the element symbol is not in the table.
    pub fn from_element(symbol: &str, formal_charge: i8) -> Option<Self> {
        let info = element::lookup(symbol)?;
        let features = DVector::from_vec(vec![
            f64::from(info.atomic_number),
            info.electronegativity,
            info.covalent_radius,
            f64::from(info.valence),
            f64::from(formal_charge),
        ]);
        Some(Self { features })
    }

    /// Returns the atom's feature vector.
    pub fn features(&self) -> &DVector<f64> {
        &self.features
    }

    /// Returns the length of the atom's feature vector.
    pub fn feature_dim(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_preserves_features_and_dimension() {
        let atom = Atom::new(DVector::from_vec(vec![6.0, 0.0, 1.5]));
        assert_eq!(atom.feature_dim(), 3);
        assert_eq!(atom.features()[0], 6.0);
        assert_eq!(atom.features()[2], 1.5);
    }

    #[test]
    fn from_element_builds_expected_feature_layout() {
        let carbon = Atom::from_element("C", 0).unwrap();
        assert_eq!(carbon.feature_dim(), element::ELEMENT_FEATURE_DIM);
        assert_eq!(carbon.features()[0], 6.0);
        assert_eq!(carbon.features()[4], 0.0);

        let charged_nitrogen = Atom::from_element("N", 1).unwrap();
        assert_eq!(charged_nitrogen.features()[0], 7.0);
        assert_eq!(charged_nitrogen.features()[4], 1.0);
    }

    #[test]
    fn from_element_returns_none_for_unknown_symbol() {
        assert!(Atom::from_element("Xx", 0).is_none());
    }
}
