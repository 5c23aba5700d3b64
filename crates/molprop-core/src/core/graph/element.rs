//! Static element table used for convenience featurization.
//!
//! Covers the organic subset plus halogens, matching the atom vocabulary
//! commonly produced by the upstream molecule I/O layer. Values are Pauling
//! electronegativities and single-bond covalent radii in Angstroms.

/// Number of entries in the feature vector produced by
/// [`Atom::from_element`](super::atom::Atom::from_element).
pub const ELEMENT_FEATURE_DIM: usize = 5;

/// Per-element constants consumed by the featurization helper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementInfo {
    pub atomic_number: u8,
    pub electronegativity: f64,
    pub covalent_radius: f64,
    pub valence: u8,
}

static ELEMENTS: phf::Map<&'static str, ElementInfo> = phf::phf_map! {
    "H" => ElementInfo { atomic_number: 1, electronegativity: 2.20, covalent_radius: 0.31, valence: 1 },
    "B" => ElementInfo { atomic_number: 5, electronegativity: 2.04, covalent_radius: 0.84, valence: 3 },
    "C" => ElementInfo { atomic_number: 6, electronegativity: 2.55, covalent_radius: 0.76, valence: 4 },
    "N" => ElementInfo { atomic_number: 7, electronegativity: 3.04, covalent_radius: 0.71, valence: 3 },
    "O" => ElementInfo { atomic_number: 8, electronegativity: 3.44, covalent_radius: 0.66, valence: 2 },
    "F" => ElementInfo { atomic_number: 9, electronegativity: 3.98, covalent_radius: 0.57, valence: 1 },
    "P" => ElementInfo { atomic_number: 15, electronegativity: 2.19, covalent_radius: 1.07, valence: 3 },
    "S" => ElementInfo { atomic_number: 16, electronegativity: 2.58, covalent_radius: 1.05, valence: 2 },
    "Cl" => ElementInfo { atomic_number: 17, electronegativity: 3.16, covalent_radius: 1.02, valence: 1 },
    "Br" => ElementInfo { atomic_number: 35, electronegativity: 2.96, covalent_radius: 1.20, valence: 1 },
    "I" => ElementInfo { atomic_number: 53, electronegativity: 2.66, covalent_radius: 1.39, valence: 1 },
};

/// Looks up an element by its case-sensitive symbol (e.g. `"C"`, `"Cl"`).
pub fn lookup(symbol: &str) -> Option<&'static ElementInfo> {
    ELEMENTS.get(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_single_and_two_letter_symbols() {
        assert_eq!(lookup("C").unwrap().atomic_number, 6);
        assert_eq!(lookup("Cl").unwrap().atomic_number, 17);
        assert_eq!(lookup("Br").unwrap().valence, 1);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(lookup("c").is_none());
        assert!(lookup("CL").is_none());
    }

    #[test]
    fn lookup_returns_none_for_unknown_symbol() {
        assert!(lookup("Xx").is_none());
        assert!(lookup("").is_none());
    }
}
