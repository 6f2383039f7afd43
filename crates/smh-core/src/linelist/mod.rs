//! Ordered atomic-transition store keyed by content hash.

mod parser;

use crate::common::constants::WAVELENGTH_MATCH_TOLERANCE;
use crate::common::elements::Species;
use crate::domain::{SmhError, SmhResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::str::FromStr;

const CHECKSUM_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const CHECKSUM_PRIME: u64 = 0x00000100000001B3;
const CONFLICT_PREVIEW_LIMIT: usize = 5;

/// Identity of a transition: FNV-1a/64 over its physical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionHash(u64);

impl TransitionHash {
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Display for TransitionHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for TransitionHash {
    type Err = SmhError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if token.len() != 16 {
            return Err(SmhError::input_validation(
                "LINELIST.HASH_FORMAT",
                format!("transition hash '{token}' must be 16 hexadecimal digits"),
            ));
        }
        u64::from_str_radix(token, 16).map(Self).map_err(|_| {
            SmhError::input_validation(
                "LINELIST.HASH_FORMAT",
                format!("transition hash '{token}' is not hexadecimal"),
            )
        })
    }
}

impl Serialize for TransitionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransitionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// Mutable input fields of a transition before validation and hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub wavelength: f64,
    pub species: f64,
    pub excitation_potential: f64,
    pub log_gf: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damping: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissociation_energy: Option<f64>,
    #[serde(default)]
    pub comment: String,
    /// Pre-measured equivalent width in mA; only meaningful on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equivalent_width: Option<f64>,
}

impl TransitionRecord {
    pub fn new(wavelength: f64, species: f64, excitation_potential: f64, log_gf: f64) -> Self {
        Self {
            wavelength,
            species,
            excitation_potential,
            log_gf,
            damping: None,
            dissociation_energy: None,
            comment: String::new(),
            equivalent_width: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TransitionWire {
    #[serde(flatten)]
    record: TransitionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<TransitionHash>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransitionWire", into = "TransitionWire")]
pub struct Transition {
    wavelength: f64,
    species: Species,
    excitation_potential: f64,
    log_gf: f64,
    damping: Option<f64>,
    dissociation_energy: Option<f64>,
    comment: String,
    equivalent_width: Option<f64>,
    hash: TransitionHash,
}

impl Transition {
    pub fn new(record: TransitionRecord) -> SmhResult<Self> {
        if !(record.wavelength.is_finite() && record.wavelength > 0.0) {
            return Err(SmhError::input_validation(
                "LINELIST.WAVELENGTH",
                format!("wavelength must be positive and finite, got {}", record.wavelength),
            ));
        }
        let species = Species::new(record.species).ok_or_else(|| {
            SmhError::input_validation(
                "LINELIST.SPECIES",
                format!("'{}' is not a valid species code", record.species),
            )
        })?;
        for (label, value) in [
            ("excitation potential", record.excitation_potential),
            ("log(gf)", record.log_gf),
        ] {
            if !value.is_finite() {
                return Err(SmhError::input_validation(
                    "LINELIST.FIELD",
                    format!("{label} must be finite, got {value}"),
                ));
            }
        }

        let damping = record.damping.filter(|value| value.is_finite());
        let dissociation_energy = record.dissociation_energy.filter(|value| value.is_finite());
        let equivalent_width = record.equivalent_width.filter(|value| value.is_finite());
        let hash = content_hash(
            record.wavelength,
            species,
            record.excitation_potential,
            record.log_gf,
            damping,
            dissociation_energy,
        );

        Ok(Self {
            wavelength: record.wavelength,
            species,
            excitation_potential: record.excitation_potential,
            log_gf: record.log_gf,
            damping,
            dissociation_energy,
            comment: record.comment.trim().to_string(),
            equivalent_width,
            hash,
        })
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn excitation_potential(&self) -> f64 {
        self.excitation_potential
    }

    pub fn log_gf(&self) -> f64 {
        self.log_gf
    }

    pub fn damping(&self) -> Option<f64> {
        self.damping
    }

    pub fn dissociation_energy(&self) -> Option<f64> {
        self.dissociation_energy
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn equivalent_width(&self) -> Option<f64> {
        self.equivalent_width
    }

    pub fn hash(&self) -> TransitionHash {
        self.hash
    }

    pub fn record(&self) -> TransitionRecord {
        TransitionRecord {
            wavelength: self.wavelength,
            species: self.species.code(),
            excitation_potential: self.excitation_potential,
            log_gf: self.log_gf,
            damping: self.damping,
            dissociation_energy: self.dissociation_energy,
            comment: self.comment.clone(),
            equivalent_width: self.equivalent_width,
        }
    }

    fn matches_line_of(&self, other: &Transition) -> bool {
        self.species.code() == other.species.code()
            && (self.wavelength - other.wavelength).abs() <= WAVELENGTH_MATCH_TOLERANCE
    }
}

impl TryFrom<TransitionWire> for Transition {
    type Error = SmhError;

    fn try_from(wire: TransitionWire) -> Result<Self, Self::Error> {
        let transition = Transition::new(wire.record)?;
        if let Some(expected) = wire.hash {
            if expected != transition.hash {
                return Err(SmhError::parse(
                    "LINELIST.HASH_MISMATCH",
                    format!(
                        "stored hash {expected} does not match computed hash {} for {:.4} {}",
                        transition.hash, transition.wavelength, transition.species
                    ),
                ));
            }
        }
        Ok(transition)
    }
}

impl From<Transition> for TransitionWire {
    fn from(transition: Transition) -> Self {
        Self {
            hash: Some(transition.hash),
            record: transition.record(),
        }
    }
}

fn content_hash(
    wavelength: f64,
    species: Species,
    excitation_potential: f64,
    log_gf: f64,
    damping: Option<f64>,
    dissociation_energy: Option<f64>,
) -> TransitionHash {
    // -0.0 and 0.0 must hash alike.
    let optional = |value: Option<f64>| {
        value
            .map(|value| format!("{:.6}", value + 0.0))
            .unwrap_or_default()
    };
    let canonical = format!(
        "{:.6}|{:.6}|{:.6}|{:.6}|{}|{}",
        wavelength + 0.0,
        species.code() + 0.0,
        excitation_potential + 0.0,
        log_gf + 0.0,
        optional(damping),
        optional(dissociation_energy),
    );
    TransitionHash(fnv1a64(canonical.as_bytes()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = CHECKSUM_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(CHECKSUM_PRIME);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Wavelength,
    Species,
    ExcitationPotential,
    LogGf,
    Damping,
    DissociationEnergy,
    Comment,
    Hash,
}

impl SortField {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "wavelength" => Some(Self::Wavelength),
            "species" | "element" => Some(Self::Species),
            "expot" | "excitation-potential" => Some(Self::ExcitationPotential),
            "loggf" | "log-gf" => Some(Self::LogGf),
            "damp_vdw" | "damping" => Some(Self::Damping),
            "dissoc_e" | "dissociation-energy" => Some(Self::DissociationEnergy),
            "comments" | "comment" => Some(Self::Comment),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }

    fn compare(self, lhs: &Transition, rhs: &Transition) -> Ordering {
        // Absent optional values sort last in ascending order.
        let optional = |lhs: Option<f64>, rhs: Option<f64>| match (lhs, rhs) {
            (Some(lhs), Some(rhs)) => lhs.total_cmp(&rhs),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match self {
            Self::Wavelength => lhs.wavelength.total_cmp(&rhs.wavelength),
            Self::Species => lhs.species.code().total_cmp(&rhs.species.code()),
            Self::ExcitationPotential => lhs
                .excitation_potential
                .total_cmp(&rhs.excitation_potential),
            Self::LogGf => lhs.log_gf.total_cmp(&rhs.log_gf),
            Self::Damping => optional(lhs.damping, rhs.damping),
            Self::DissociationEnergy => {
                optional(lhs.dissociation_energy, rhs.dissociation_energy)
            }
            Self::Comment => lhs.comment.cmp(&rhs.comment),
            Self::Hash => lhs.hash.cmp(&rhs.hash),
        }
    }
}

/// Ordered transitions plus a hash -> position index that is rebuilt before
/// any mutating call returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionStore {
    transitions: Vec<Transition>,
    index: HashMap<TransitionHash, usize>,
    generation: u64,
}

impl TransitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate hashes with a `ConflictError`.
    pub fn from_transitions(transitions: Vec<Transition>) -> SmhResult<Self> {
        let mut seen = HashSet::with_capacity(transitions.len());
        for transition in &transitions {
            if !seen.insert(transition.hash) {
                return Err(SmhError::conflict(
                    "LINELIST.DUPLICATE",
                    format!(
                        "transition {:.4} {} (hash {}) appears more than once",
                        transition.wavelength, transition.species, transition.hash
                    ),
                ));
            }
        }

        let mut store = Self {
            transitions,
            index: HashMap::new(),
            generation: 0,
        };
        store.rebuild_index();
        Ok(store)
    }

    pub fn read(path: impl AsRef<Path>) -> SmhResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            SmhError::parse(
                "LINELIST.READ",
                format!("failed to read line list '{}': {}", path.display(), source),
            )
        })?;
        parser::parse_line_list(&source).map_err(|error| {
            SmhError::new(
                error.category(),
                error.placeholder(),
                format!("{}: {}", path.display(), error.message()),
            )
        })
    }

    pub fn from_source(source: &str) -> SmhResult<Self> {
        parser::parse_line_list(source)
    }

    pub fn to_table(&self) -> String {
        parser::render_line_list(&self.transitions)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> SmhResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_table()).map_err(|source| {
            SmhError::parse(
                "LINELIST.WRITE",
                format!("failed to write line list '{}': {}", path.display(), source),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn hashes(&self) -> Vec<TransitionHash> {
        self.transitions.iter().map(Transition::hash).collect()
    }

    pub fn position(&self, hash: TransitionHash) -> Option<usize> {
        self.index.get(&hash).copied()
    }

    pub fn contains(&self, hash: TransitionHash) -> bool {
        self.index.contains_key(&hash)
    }

    pub fn get(&self, hash: TransitionHash) -> Option<&Transition> {
        self.position(hash).map(|position| &self.transitions[position])
    }

    /// Resolve every hash, failing on the first one the store does not hold.
    pub fn resolve(&self, hashes: &[TransitionHash]) -> SmhResult<Vec<&Transition>> {
        hashes
            .iter()
            .map(|hash| {
                self.get(*hash).ok_or_else(|| {
                    SmhError::input_validation(
                        "LINELIST.UNKNOWN_HASH",
                        format!("transition {hash} is not in the line list"),
                    )
                })
            })
            .collect()
    }

    /// Element symbols present in the store, in atomic-number order.
    pub fn unique_elements(&self) -> Vec<&'static str> {
        let numbers: BTreeSet<usize> = self
            .transitions
            .iter()
            .flat_map(|transition| transition.species.atomic_numbers())
            .collect();
        numbers
            .into_iter()
            .filter_map(crate::common::elements::element_symbol)
            .collect()
    }

    /// Copy of the listed transitions in store order.
    pub fn subset(&self, hashes: &[TransitionHash]) -> SmhResult<Self> {
        self.resolve(hashes)?;
        let wanted: HashSet<TransitionHash> = hashes.iter().copied().collect();
        let transitions = self
            .transitions
            .iter()
            .filter(|transition| wanted.contains(&transition.hash))
            .cloned()
            .collect();
        Self::from_transitions(transitions)
    }

    /// Union of `self` followed by the new records of `other`.
    pub fn merge(
        &self,
        other: &TransitionStore,
        skip_exactly_equal: bool,
        ignore_conflicts: bool,
    ) -> SmhResult<Self> {
        let mut by_species: HashMap<u64, Vec<usize>> = HashMap::new();
        for (position, transition) in self.transitions.iter().enumerate() {
            by_species
                .entry(transition.species.code().to_bits())
                .or_default()
                .push(position);
        }

        let mut merged = self.transitions.clone();
        let mut seen: HashSet<TransitionHash> = self.index.keys().copied().collect();
        let mut duplicates = Vec::new();
        let mut conflicts = Vec::new();

        for candidate in &other.transitions {
            if seen.contains(&candidate.hash) {
                if !skip_exactly_equal {
                    duplicates.push(candidate);
                }
                continue;
            }

            let clashes = by_species
                .get(&candidate.species.code().to_bits())
                .is_some_and(|positions| {
                    positions
                        .iter()
                        .any(|position| merged[*position].matches_line_of(candidate))
                });
            if clashes && !ignore_conflicts {
                conflicts.push(candidate);
                continue;
            }

            seen.insert(candidate.hash);
            by_species
                .entry(candidate.species.code().to_bits())
                .or_default()
                .push(merged.len());
            merged.push(candidate.clone());
        }

        if !duplicates.is_empty() {
            return Err(SmhError::conflict(
                "LINELIST.MERGE_DUPLICATE",
                format!(
                    "{} transition(s) already present: {}",
                    duplicates.len(),
                    describe(&duplicates)
                ),
            ));
        }
        if !conflicts.is_empty() {
            return Err(SmhError::conflict(
                "LINELIST.MERGE_CONFLICT",
                format!(
                    "{} transition(s) match an existing line within {} A but differ in other fields: {}",
                    conflicts.len(),
                    WAVELENGTH_MATCH_TOLERANCE,
                    describe(&conflicts)
                ),
            ));
        }

        let mut store = Self {
            transitions: merged,
            index: HashMap::new(),
            generation: self.generation + 1,
        };
        store.rebuild_index();
        Ok(store)
    }

    pub fn sort(&mut self, field: SortField, descending: bool) {
        if descending {
            self.transitions
                .sort_by(|lhs, rhs| field.compare(rhs, lhs));
        } else {
            self.transitions.sort_by(|lhs, rhs| field.compare(lhs, rhs));
        }
        self.rebuild_index();
        self.generation += 1;
    }

    /// Remove the listed transitions. Nothing is removed if any hash is
    /// unknown or appears in `referenced`.
    pub fn delete(
        &mut self,
        hashes: &[TransitionHash],
        referenced: &HashSet<TransitionHash>,
    ) -> SmhResult<usize> {
        self.resolve(hashes)?;

        let in_use: Vec<String> = hashes
            .iter()
            .filter(|hash| referenced.contains(hash))
            .map(ToString::to_string)
            .collect();
        if !in_use.is_empty() {
            return Err(SmhError::in_use(
                "LINELIST.IN_USE",
                format!(
                    "{} transition(s) are referenced by spectral models: {}",
                    in_use.len(),
                    in_use.join(", ")
                ),
            ));
        }

        let doomed: HashSet<TransitionHash> = hashes.iter().copied().collect();
        let before = self.transitions.len();
        self.transitions
            .retain(|transition| !doomed.contains(&transition.hash));
        self.rebuild_index();
        self.generation += 1;
        Ok(before - self.transitions.len())
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .transitions
            .iter()
            .enumerate()
            .map(|(position, transition)| (transition.hash, position))
            .collect();
    }
}

fn describe(transitions: &[&Transition]) -> String {
    let mut rendered: Vec<String> = transitions
        .iter()
        .take(CONFLICT_PREVIEW_LIMIT)
        .map(|transition| format!("{:.4} {}", transition.wavelength, transition.species))
        .collect();
    if transitions.len() > CONFLICT_PREVIEW_LIMIT {
        rendered.push(format!("... and {} more", transitions.len() - CONFLICT_PREVIEW_LIMIT));
    }
    rendered.join("; ")
}

#[cfg(test)]
mod tests {
    use super::{SortField, Transition, TransitionHash, TransitionRecord, TransitionStore};
    use crate::domain::SmhErrorCategory;
    use std::collections::HashSet;

    fn transition(wavelength: f64, species: f64, log_gf: f64) -> Transition {
        Transition::new(TransitionRecord::new(wavelength, species, 2.0, log_gf))
            .expect("transition should be valid")
    }

    fn store(transitions: Vec<Transition>) -> TransitionStore {
        TransitionStore::from_transitions(transitions).expect("store should build")
    }

    #[test]
    fn hash_ignores_comment_and_equivalent_width() {
        let mut record = TransitionRecord::new(5000.0, 26.0, 1.0, -1.0);
        let plain = Transition::new(record.clone()).expect("valid");
        record.comment = "from VALD".to_string();
        record.equivalent_width = Some(42.0);
        let annotated = Transition::new(record).expect("valid");

        assert_eq!(plain.hash(), annotated.hash());
        assert_eq!(plain.hash().to_string().len(), 16);
        assert_ne!(plain.hash(), transition(5000.0, 26.1, -1.0).hash());
    }

    #[test]
    fn hash_parses_from_its_rendering() {
        let hash = transition(5000.0, 26.0, -1.0).hash();
        let parsed: TransitionHash = hash.to_string().parse().expect("hash should parse");
        assert_eq!(parsed, hash);
        assert!("xyz".parse::<TransitionHash>().is_err());
    }

    #[test]
    fn invalid_records_are_rejected() {
        let error = Transition::new(TransitionRecord::new(-1.0, 26.0, 1.0, 0.0))
            .expect_err("negative wavelength should fail");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);

        assert!(Transition::new(TransitionRecord::new(5000.0, 0.5, 1.0, 0.0)).is_err());
        assert!(Transition::new(TransitionRecord::new(5000.0, 26.0, f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn self_merge_with_skip_is_idempotent() {
        let base = store(vec![
            transition(5000.0, 26.0, -1.0),
            transition(5001.0, 26.1, -2.0),
            transition(5002.0, 22.0, -0.5),
        ]);

        let merged = base.merge(&base, true, false).expect("self merge");
        assert_eq!(merged.len(), base.len());
        assert_eq!(merged.hashes(), base.hashes());
        assert!(merged.generation() > base.generation());
    }

    #[test]
    fn exact_duplicates_conflict_without_skip() {
        let base = store(vec![transition(5000.0, 26.0, -1.0)]);
        let error = base
            .merge(&base, false, true)
            .expect_err("duplicates cannot be kept twice");
        assert_eq!(error.category(), SmhErrorCategory::Conflict);
        assert_eq!(error.placeholder(), "LINELIST.MERGE_DUPLICATE");
    }

    #[test]
    fn near_coincident_lines_conflict_unless_ignored() {
        let base = store(vec![transition(5000.0, 26.0, -1.0)]);
        let other = store(vec![
            transition(5000.0005, 26.0, -1.3),
            transition(6000.0, 26.0, -1.0),
        ]);

        let error = base
            .merge(&other, true, false)
            .expect_err("different log(gf) at the same line should conflict");
        assert_eq!(error.category(), SmhErrorCategory::Conflict);
        assert_eq!(error.placeholder(), "LINELIST.MERGE_CONFLICT");

        let merged = base.merge(&other, true, true).expect("ignored conflicts");
        assert_eq!(merged.len(), 3);

        let separate_species = store(vec![transition(5000.0, 26.1, -1.3)]);
        assert_eq!(
            base.merge(&separate_species, true, false)
                .expect("different species never conflict")
                .len(),
            2
        );
    }

    #[test]
    fn sort_is_stable_and_rebuilds_index() {
        let a = transition(5002.0, 26.0, -1.0);
        let b = transition(5001.0, 26.0, -2.0);
        let c = transition(5000.0, 22.0, -1.0);
        let mut store = store(vec![a.clone(), b.clone(), c.clone()]);

        store.sort(SortField::Wavelength, false);
        assert_eq!(store.position(c.hash()), Some(0));
        assert_eq!(store.position(a.hash()), Some(2));

        store.sort(SortField::LogGf, false);
        assert_eq!(store.hashes(), vec![b.hash(), c.hash(), a.hash()]);

        store.sort(SortField::Species, true);
        assert_eq!(store.hashes(), vec![b.hash(), a.hash(), c.hash()]);
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn delete_rejects_referenced_and_unknown_hashes_atomically() {
        let a = transition(5000.0, 26.0, -1.0);
        let b = transition(5001.0, 26.0, -1.0);
        let mut store = store(vec![a.clone(), b.clone()]);
        let referenced: HashSet<TransitionHash> = [a.hash()].into_iter().collect();

        let error = store
            .delete(&[a.hash(), b.hash()], &referenced)
            .expect_err("referenced transition should block deletion");
        assert_eq!(error.category(), SmhErrorCategory::InUse);
        assert_eq!(store.len(), 2);
        assert_eq!(store.generation(), 0);

        let stranger = transition(7000.0, 8.0, 0.0).hash();
        let error = store
            .delete(&[stranger], &referenced)
            .expect_err("unknown hash should fail");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);

        assert_eq!(store.delete(&[b.hash()], &referenced).expect("delete"), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.position(a.hash()), Some(0));
        assert!(!store.contains(b.hash()));
    }

    #[test]
    fn unique_elements_follow_atomic_number() {
        let store = store(vec![
            transition(5000.0, 26.0, -1.0),
            transition(5001.0, 22.1, -1.0),
            transition(5002.0, 607.0, -1.0),
            transition(5003.0, 26.1, -1.0),
        ]);
        assert_eq!(store.unique_elements(), vec!["C", "N", "Ti", "Fe"]);
    }

    #[test]
    fn from_transitions_rejects_duplicate_hashes() {
        let a = transition(5000.0, 26.0, -1.0);
        let error = TransitionStore::from_transitions(vec![a.clone(), a])
            .expect_err("duplicate hashes cannot coexist");
        assert_eq!(error.category(), SmhErrorCategory::Conflict);
    }

    #[test]
    fn transitions_roundtrip_through_json_with_hash_check() {
        let original = transition(5000.0, 26.0, -1.0);
        let json = serde_json::to_string(&original).expect("serialize");
        assert!(json.contains(&original.hash().to_string()));
        let restored: Transition = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, original);

        let tampered = json.replace("\"log_gf\":-1.0", "\"log_gf\":-1.5");
        assert!(serde_json::from_str::<Transition>(&tampered).is_err());
    }
}
