use super::atom::Atom;
use super::bond::Bond;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("A molecular graph requires at least one atom")]
    EmptyAtomList,

    #[error("Bond {bond_index} references atom {atom_index}, but the molecule has {atom_count} atoms")]
    BondAtomOutOfRange {
        bond_index: usize,
        atom_index: usize,
        atom_count: usize,
    },

    #[error("Bond {bond_index} connects atom {atom_index} to itself")]
    SelfReferentialBond {
        bond_index: usize,
        atom_index: usize,
    },

    #[error("Atom {atom_index} has feature width {found}, but the first atom has width {expected}")]
    InconsistentAtomFeatures {
        atom_index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Bond {bond_index} has feature width {found}, but the first bond has width {expected}")]
    InconsistentBondFeatures {
        bond_index: usize,
        expected: usize,
        found: usize,
    },
}

/// An immutable attributed graph describing one molecule.
///
/// Owns an ordered sequence of [`Atom`]s, a set of [`Bond`]s, and a derived
/// incidence structure mapping each atom to its incident bonds. All
/// structural invariants (index ranges, uniform feature widths, non-empty
/// atom list) are checked once at construction; instances are read-only
/// afterwards, so downstream code never re-validates.
#[derive(Debug, Clone, PartialEq)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Per atom: `(neighbor atom index, bond index)` for every incident bond.
    incidence: Vec<Vec<(usize, usize)>>,
    d_atom: usize,
    d_bond: usize,
}

impl MolecularGraph {
    /// Builds a validated molecular graph from atom and bond records.
    ///
    /// Bond records are undirected: each chemical bond appears once, and the
    /// derived incidence structure lists it from both endpoints so message
    /// passing is undirected by construction.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the atom sequence is empty, any bond
    /// endpoint is out of range or self-referential, or feature widths are
    /// inconsistent within the graph.
    pub fn build(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Result<Self, ValidationError> {
        if atoms.is_empty() {
            return Err(ValidationError::EmptyAtomList);
        }

        let d_atom = atoms[0].feature_dim();
        for (atom_index, atom) in atoms.iter().enumerate() {
            if atom.feature_dim() != d_atom {
                return Err(ValidationError::InconsistentAtomFeatures {
                    atom_index,
                    expected: d_atom,
                    found: atom.feature_dim(),
                });
            }
        }

        let d_bond = bonds.first().map_or(0, Bond::feature_dim);
        for (bond_index, bond) in bonds.iter().enumerate() {
            for atom_index in [bond.source(), bond.target()] {
                if atom_index >= atoms.len() {
                    return Err(ValidationError::BondAtomOutOfRange {
                        bond_index,
                        atom_index,
                        atom_count: atoms.len(),
                    });
                }
            }
            if bond.source() == bond.target() {
                return Err(ValidationError::SelfReferentialBond {
                    bond_index,
                    atom_index: bond.source(),
                });
            }
            if bond.feature_dim() != d_bond {
                return Err(ValidationError::InconsistentBondFeatures {
                    bond_index,
                    expected: d_bond,
                    found: bond.feature_dim(),
                });
            }
        }

        let mut incidence = vec![Vec::new(); atoms.len()];
        for (bond_index, bond) in bonds.iter().enumerate() {
            incidence[bond.source()].push((bond.target(), bond_index));
            incidence[bond.target()].push((bond.source(), bond_index));
        }

        Ok(Self {
            atoms,
            bonds,
            incidence,
            d_atom,
            d_bond,
        })
    }

    /// Returns the number of atoms in the molecule.
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Returns the number of (undirected) bonds in the molecule.
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Returns the ordered atom sequence.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Returns the bond set.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Returns `(neighbor, bond index)` pairs incident to `atom_index`.
    pub fn neighbors(&self, atom_index: usize) -> &[(usize, usize)] {
        &self.incidence[atom_index]
    }

    /// Returns the uniform atom feature width.
    pub fn atom_feature_dim(&self) -> usize {
        self.d_atom
    }

    /// Returns the uniform bond feature width (0 for bond-free molecules).
    pub fn bond_feature_dim(&self) -> usize {
        self.d_bond
    }
}
