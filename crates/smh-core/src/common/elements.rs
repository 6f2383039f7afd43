//! Element symbols and MOOG-style species codes.
//!
//! Atomic species are written `Z.i` (26.1 is singly ionised iron). Molecules
//! concatenate two-digit atomic numbers in the integer part, lightest first
//! (106.0 is CH, 607.0 is CN).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const MAX_ATOMIC_NUMBER: usize = 99;

const ELEMENT_SYMBOLS: [&str; MAX_ATOMIC_NUMBER] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es",
];

const IONISATION_NUMERALS: [&str; 6] = ["I", "II", "III", "IV", "V", "VI"];

pub fn element_symbol(atomic_number: usize) -> Option<&'static str> {
    if atomic_number == 0 || atomic_number > MAX_ATOMIC_NUMBER {
        return None;
    }
    Some(ELEMENT_SYMBOLS[atomic_number - 1])
}

pub fn atomic_number_for_symbol(symbol: &str) -> Option<usize> {
    let normalized = symbol.trim();
    if normalized.is_empty() {
        return None;
    }

    ELEMENT_SYMBOLS
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(normalized))
        .map(|index| index + 1)
}

/// Canonical capitalisation of an element symbol, if it names a known element.
pub fn canonical_symbol(symbol: &str) -> Option<&'static str> {
    atomic_number_for_symbol(symbol).and_then(element_symbol)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Species(f64);

impl Species {
    pub fn new(code: f64) -> Option<Self> {
        if !code.is_finite() || code < 1.0 {
            return None;
        }
        let species = Self(code);
        if species.atomic_numbers().is_empty() {
            return None;
        }
        Some(species)
    }

    pub const fn code(self) -> f64 {
        self.0
    }

    fn integer_part(self) -> u64 {
        self.0.trunc() as u64
    }

    pub fn is_molecule(self) -> bool {
        self.integer_part() > 100
    }

    /// Ionisation stage: 0 for neutral, 1 for singly ionised, ...
    pub fn ionisation(self) -> u8 {
        ((self.0 - self.0.trunc()) * 10.0).round().clamp(0.0, 9.0) as u8
    }

    pub fn atomic_numbers(self) -> Vec<usize> {
        let mut integer = self.integer_part();
        if integer <= MAX_ATOMIC_NUMBER as u64 {
            return vec![integer as usize];
        }

        let mut numbers = Vec::new();
        while integer > 0 {
            let z = (integer % 100) as usize;
            if z == 0 || z > MAX_ATOMIC_NUMBER {
                return Vec::new();
            }
            numbers.push(z);
            integer /= 100;
        }
        numbers.reverse();
        numbers
    }

    pub fn element_symbols(self) -> Vec<&'static str> {
        self.atomic_numbers()
            .into_iter()
            .filter_map(element_symbol)
            .collect()
    }

    /// Display label: `Fe II` for atoms, `C-N` for molecules.
    pub fn label(self) -> String {
        let symbols = self.element_symbols();
        if self.is_molecule() {
            return symbols.join("-");
        }
        let numeral = IONISATION_NUMERALS
            .get(self.ionisation() as usize)
            .copied()
            .unwrap_or("?");
        format!("{} {}", symbols.first().copied().unwrap_or("?"), numeral)
    }
}

impl Display for Species {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::{Species, atomic_number_for_symbol, canonical_symbol, element_symbol};

    #[test]
    fn known_symbol_roundtrip_matches_atomic_number() {
        assert_eq!(atomic_number_for_symbol("Fe"), Some(26));
        assert_eq!(atomic_number_for_symbol(" fe "), Some(26));
        assert_eq!(element_symbol(56), Some("Ba"));
        assert_eq!(element_symbol(0), None);
        assert_eq!(element_symbol(100), None);
        assert_eq!(canonical_symbol("EU"), Some("Eu"));
        assert_eq!(atomic_number_for_symbol("Xx"), None);
    }

    #[test]
    fn atomic_species_render_ionisation_stage() {
        let fe2 = Species::new(26.1).expect("valid species");
        assert!(!fe2.is_molecule());
        assert_eq!(fe2.ionisation(), 1);
        assert_eq!(fe2.atomic_numbers(), vec![26]);
        assert_eq!(fe2.label(), "Fe II");
        assert_eq!(Species::new(26.0).expect("valid").label(), "Fe I");
    }

    #[test]
    fn molecular_species_split_into_constituents() {
        let cn = Species::new(607.0).expect("valid species");
        assert!(cn.is_molecule());
        assert_eq!(cn.atomic_numbers(), vec![6, 7]);
        assert_eq!(cn.label(), "C-N");

        let ch = Species::new(106.0).expect("valid species");
        assert_eq!(ch.element_symbols(), vec!["H", "C"]);
    }

    #[test]
    fn invalid_species_codes_are_rejected() {
        assert!(Species::new(0.5).is_none());
        assert!(Species::new(f64::NAN).is_none());
        assert!(Species::new(100.0).is_none());
    }
}
