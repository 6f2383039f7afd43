//! The measurement session: one line list, an ordered list of spectral
//! models, their conflict groups and generation-checked caches.
//!
//! Every successful mutation bumps the session generation. Structural
//! mutations (anything that changes which transitions a model owns, or the
//! model list itself) recompute the conflict groups before returning.

mod batch;
mod caches;

pub use batch::{AbundanceEntry, AbundanceReport, BulkFitReport, ModelFailure};
pub use caches::MeasurementCaches;

use crate::archive::ModelArchive;
use crate::common::SessionDefaults;
use crate::common::constants::MILLI_ANGSTROM_PER_ANGSTROM;
use crate::conflicts::{self, ConflictGroup};
use crate::domain::{ModelSortKey, SmhError, SmhResult, UsageFlag};
use crate::fitting::{FitContext, FitResult};
use crate::linelist::{SortField, TransitionHash, TransitionStore};
use crate::model::{ModelKind, SpectralModel};
use crate::radiative::{Photosphere, RadiativeTransfer};
use crate::spectrum::Spectrum;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct MeasurementSession {
    store: TransitionStore,
    models: Vec<SpectralModel>,
    conflict_groups: Vec<ConflictGroup>,
    photosphere: Option<Photosphere>,
    defaults: SessionDefaults,
    caches: MeasurementCaches,
    generation: u64,
}

impl MeasurementSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: SessionDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn store(&self) -> &TransitionStore {
        &self.store
    }

    pub fn models(&self) -> &[SpectralModel] {
        &self.models
    }

    pub fn model(&self, index: usize) -> SmhResult<&SpectralModel> {
        self.models.get(index).ok_or_else(|| unknown_model(index, self.models.len()))
    }

    /// Mutable access for option, mask and flag edits. Transition edits must
    /// go through [`MeasurementSession::set_model_transitions`] so conflict
    /// groups stay current.
    pub fn model_mut(&mut self, index: usize) -> SmhResult<&mut SpectralModel> {
        let count = self.models.len();
        if index >= count {
            return Err(unknown_model(index, count));
        }
        self.bump_generation();
        Ok(&mut self.models[index])
    }

    pub fn conflict_groups(&self) -> &[ConflictGroup] {
        &self.conflict_groups
    }

    pub fn photosphere(&self) -> Option<&Photosphere> {
        self.photosphere.as_ref()
    }

    pub fn set_photosphere(&mut self, photosphere: Option<Photosphere>) {
        self.photosphere = photosphere;
        self.bump_generation();
    }

    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    fn recompute_conflicts(&mut self) {
        self.conflict_groups = conflicts::compute(&self.models, &self.store);
        debug!(groups = self.conflict_groups.len(), "conflict groups recomputed");
    }

    fn structural_change(&mut self) {
        self.recompute_conflicts();
        self.bump_generation();
    }

    fn referenced_hashes(&self) -> HashSet<TransitionHash> {
        self.models
            .iter()
            .flat_map(|model| model.transition_hashes().iter().copied())
            .collect()
    }

    fn check_indices(&self, indices: &[usize]) -> SmhResult<()> {
        match indices.iter().find(|index| **index >= self.models.len()) {
            Some(index) => Err(unknown_model(*index, self.models.len())),
            None => Ok(()),
        }
    }

    /// Merge `other` into the session line list; returns how many
    /// transitions were added.
    pub fn import_transitions(
        &mut self,
        other: &TransitionStore,
        skip_exactly_equal: bool,
        ignore_conflicts: bool,
    ) -> SmhResult<usize> {
        let merged = self
            .store
            .merge(other, skip_exactly_equal, ignore_conflicts)?;
        let added = merged.len() - self.store.len();
        self.store = merged;
        self.structural_change();
        info!(added, total = self.store.len(), "transitions imported");
        Ok(added)
    }

    pub fn delete_transitions(&mut self, hashes: &[TransitionHash]) -> SmhResult<usize> {
        let referenced = self.referenced_hashes();
        let removed = self.store.delete(hashes, &referenced)?;
        self.structural_change();
        Ok(removed)
    }

    pub fn sort_transitions(&mut self, field: SortField, descending: bool) {
        self.store.sort(field, descending);
        self.bump_generation();
    }

    /// One profile model per transition, seeded from the session defaults.
    pub fn add_profile_models(&mut self, hashes: &[TransitionHash]) -> SmhResult<Range<usize>> {
        let created = hashes
            .iter()
            .map(|hash| SpectralModel::profile_with_defaults(&self.store, &[*hash], &self.defaults))
            .collect::<SmhResult<Vec<_>>>()?;
        Ok(self.append_models(created))
    }

    pub fn add_synthesis_model<S: AsRef<str>>(
        &mut self,
        hashes: &[TransitionHash],
        elements: &[S],
    ) -> SmhResult<usize> {
        let model =
            SpectralModel::synthesis_with_defaults(&self.store, hashes, elements, &self.defaults)?;
        Ok(self.append_models(vec![model]).start)
    }

    /// Append a model built elsewhere; its transitions must resolve in this
    /// session's line list.
    pub fn add_model(&mut self, model: SpectralModel) -> SmhResult<usize> {
        self.store.resolve(model.transition_hashes())?;
        Ok(self.append_models(vec![model]).start)
    }

    fn append_models(&mut self, created: Vec<SpectralModel>) -> Range<usize> {
        let start = self.models.len();
        self.models.extend(created);
        let range = start..self.models.len();
        self.structural_change();
        range
    }

    pub fn remove_models(&mut self, indices: &[usize]) -> SmhResult<usize> {
        self.check_indices(indices)?;
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let before = self.models.len();
        let mut position = 0;
        self.models.retain(|_| {
            let keep = !doomed.contains(&position);
            position += 1;
            keep
        });
        self.structural_change();
        Ok(before - self.models.len())
    }

    pub fn set_model_transitions(
        &mut self,
        index: usize,
        hashes: &[TransitionHash],
    ) -> SmhResult<()> {
        let count = self.models.len();
        let model = self
            .models
            .get_mut(index)
            .ok_or_else(|| unknown_model(index, count))?;
        model.set_transitions(&self.store, hashes)?;
        self.structural_change();
        Ok(())
    }

    /// Stable reorder of the model list. Boolean keys put `true` first in
    /// ascending order; NaN wavelengths sort last.
    pub fn sort_models(&mut self, key: ModelSortKey, descending: bool) {
        let store = &self.store;
        let mut order: Vec<usize> = (0..self.models.len()).collect();
        let models = &self.models;
        let compare = |lhs: usize, rhs: usize| -> Ordering {
            let (left, right) = (&models[lhs], &models[rhs]);
            match key {
                ModelSortKey::Wavelength => left
                    .representative_wavelength(store)
                    .total_cmp(&right.representative_wavelength(store)),
                ModelSortKey::Elements => left
                    .element_summary(store)
                    .cmp(&right.element_summary(store)),
                ModelSortKey::Kind => left.kind().label().cmp(right.kind().label()),
                ModelSortKey::StellarParameters => right
                    .flag(UsageFlag::StellarParameters)
                    .cmp(&left.flag(UsageFlag::StellarParameters)),
                ModelSortKey::StellarAbundances => right
                    .flag(UsageFlag::StellarAbundances)
                    .cmp(&left.flag(UsageFlag::StellarAbundances)),
            }
        };
        if descending {
            order.sort_by(|lhs, rhs| compare(*rhs, *lhs));
        } else {
            order.sort_by(|lhs, rhs| compare(*lhs, *rhs));
        }

        let mut slots: Vec<Option<SpectralModel>> = self.models.drain(..).map(Some).collect();
        self.models = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        self.structural_change();
    }

    pub fn set_usage_flags(
        &mut self,
        indices: &[usize],
        flag: UsageFlag,
        value: bool,
    ) -> SmhResult<()> {
        self.check_indices(indices)?;
        for index in indices {
            self.models[*index].set_flag(flag, value);
        }
        self.bump_generation();
        Ok(())
    }

    /// Create acceptable profile models for every transition of `other` that
    /// carries a pre-measured equivalent width (mA). The transitions are
    /// merged into the line list first; exact duplicates are reused.
    pub fn import_measured_equivalent_widths(
        &mut self,
        other: &TransitionStore,
    ) -> SmhResult<Range<usize>> {
        let merged = self.store.merge(other, true, false)?;
        let mut created = Vec::new();
        for transition in other.iter() {
            let Some(equivalent_width) = transition.equivalent_width() else {
                continue;
            };
            let mut model =
                SpectralModel::profile_with_defaults(&merged, &[transition.hash()], &self.defaults)?;
            model.set_fit_result(FitResult::from_measured_equivalent_width(
                equivalent_width / MILLI_ANGSTROM_PER_ANGSTROM,
                transition.wavelength(),
            ));
            model.set_flag(UsageFlag::Acceptable, true);
            created.push(model);
        }

        self.store = merged;
        let range = self.append_models(created);
        info!(models = range.len(), "measured equivalent widths imported");
        Ok(range)
    }

    /// Fit one model. Synthesis models need a photosphere on the session and
    /// a backend.
    pub fn fit_model(
        &mut self,
        index: usize,
        spectrum: &Spectrum,
        backend: Option<&dyn RadiativeTransfer>,
    ) -> SmhResult<&FitResult> {
        let count = self.models.len();
        if index >= count {
            return Err(unknown_model(index, count));
        }
        let photosphere = self.photosphere;
        let mut context = FitContext::new(&self.store, spectrum);
        if let (Some(photosphere), Some(backend)) = (photosphere.as_ref(), backend) {
            context = context.with_radiative_transfer(photosphere, backend);
        }
        let chi_square = self.models[index].fit(&context)?.diagnostics.chi_square;
        debug!(model = index, chi_square, "model fitted");
        self.bump_generation();
        self.models[index].fit_result().ok_or_else(|| {
            SmhError::fit("FIT.RESULT_MISSING", format!("model {index} has no fit result"))
        })
    }

    /// Snapshot REW and abundance arrays at the current generation.
    pub fn refresh_caches(&mut self) -> &MeasurementCaches {
        self.caches = MeasurementCaches::snapshot(&self.models, &self.store, self.generation);
        &self.caches
    }

    pub fn caches(&self) -> SmhResult<&MeasurementCaches> {
        self.caches.check_current(self.generation)
    }

    /// Archive the listed models together with the transitions they use.
    pub fn export_models(&self, indices: &[usize]) -> SmhResult<ModelArchive> {
        self.check_indices(indices)?;
        let mut hashes = Vec::new();
        let mut seen = HashSet::new();
        for index in indices {
            for hash in self.models[*index].transition_hashes() {
                if seen.insert(*hash) {
                    hashes.push(*hash);
                }
            }
        }
        let subset = self.store.subset(&hashes)?;
        Ok(ModelArchive {
            transitions: subset.transitions().to_vec(),
            models: indices
                .iter()
                .map(|index| self.models[*index].state())
                .collect(),
        })
    }

    /// Append archived models, merging their transitions into the line list.
    pub fn import_models(&mut self, archive: &ModelArchive) -> SmhResult<Range<usize>> {
        let incoming = archive.store()?;
        let merged = self.store.merge(&incoming, true, false)?;
        let created = archive
            .models
            .iter()
            .cloned()
            .map(|state| SpectralModel::from_state(&merged, state))
            .collect::<SmhResult<Vec<_>>>()?;
        self.store = merged;
        Ok(self.append_models(created))
    }

    /// Indices of the profile models in list order.
    pub fn profile_model_indices(&self) -> Vec<usize> {
        self.models
            .iter()
            .enumerate()
            .filter(|(_, model)| matches!(model.kind(), ModelKind::ProfileFitting(_)))
            .map(|(index, _)| index)
            .collect()
    }
}

fn unknown_model(index: usize, count: usize) -> SmhError {
    SmhError::input_validation(
        "SESSION.MODEL_INDEX",
        format!("model index {index} is out of range for {count} model(s)"),
    )
}

#[cfg(test)]
mod tests {
    use super::MeasurementSession;
    use crate::domain::{ModelSortKey, SmhErrorCategory, UsageFlag};
    use crate::linelist::{Transition, TransitionRecord, TransitionStore};

    fn store(wavelengths: &[f64]) -> TransitionStore {
        TransitionStore::from_transitions(
            wavelengths
                .iter()
                .map(|wavelength| {
                    Transition::new(TransitionRecord::new(*wavelength, 26.0, 1.0, -1.0))
                        .expect("valid")
                })
                .collect(),
        )
        .expect("distinct")
    }

    #[test]
    fn structural_edits_recompute_conflicts() {
        let mut session = MeasurementSession::new();
        session
            .import_transitions(&store(&[5000.0, 5001.0, 5002.0]), true, false)
            .expect("import");
        let h = session.store().hashes();
        session.add_profile_models(&h[..1]).expect("profile");
        session.add_profile_models(&h[1..2]).expect("profile");
        assert!(session.conflict_groups().is_empty());

        session.set_model_transitions(1, &[h[0], h[1]]).expect("edit");
        assert_eq!(session.conflict_groups().len(), 1);

        session.remove_models(&[0]).expect("remove");
        assert!(session.conflict_groups().is_empty());
        assert_eq!(session.models().len(), 1);
    }

    #[test]
    fn rejected_edits_leave_the_session_untouched() {
        let mut session = MeasurementSession::new();
        session
            .import_transitions(&store(&[5000.0]), true, false)
            .expect("import");
        let h = session.store().hashes();
        session.add_profile_models(&h).expect("profile");
        let generation = session.generation();

        let error = session.delete_transitions(&h).expect_err("referenced");
        assert_eq!(error.category(), SmhErrorCategory::InUse);
        let error = session.remove_models(&[3]).expect_err("out of range");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);
        assert_eq!(session.generation(), generation);
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.models().len(), 1);
    }

    #[test]
    fn models_sort_by_wavelength_and_flags() {
        let mut session = MeasurementSession::new();
        session
            .import_transitions(&store(&[6000.0, 5000.0, 5500.0]), true, false)
            .expect("import");
        let h = session.store().hashes();
        session.add_profile_models(&h).expect("profiles");

        session.sort_models(ModelSortKey::Wavelength, false);
        let order: Vec<f64> = session
            .models()
            .iter()
            .map(|model| model.representative_wavelength(session.store()))
            .collect();
        assert_eq!(order, vec![5000.0, 5500.0, 6000.0]);

        session
            .set_usage_flags(&[2], UsageFlag::StellarAbundances, false)
            .expect("flags");
        session.sort_models(ModelSortKey::StellarAbundances, true);
        assert!(!session.models()[0].flag(UsageFlag::StellarAbundances));
    }

    #[test]
    fn measured_equivalent_widths_become_acceptable_models() {
        let mut with_ew = TransitionRecord::new(5000.0, 26.0, 1.0, -1.0);
        with_ew.equivalent_width = Some(50.0);
        let source = TransitionStore::from_transitions(vec![
            Transition::new(with_ew).expect("valid"),
            Transition::new(TransitionRecord::new(5100.0, 26.0, 1.0, -1.0)).expect("valid"),
        ])
        .expect("distinct");

        let mut session = MeasurementSession::new();
        let created = session
            .import_measured_equivalent_widths(&source)
            .expect("import");
        assert_eq!(created, 0..1);
        assert_eq!(session.store().len(), 2);
        let model = &session.models()[0];
        assert!(model.flag(UsageFlag::Acceptable));
        assert!((model.equivalent_width() - 0.05).abs() < 1.0e-15);
        assert!((model.reduced_equivalent_width(session.store()) + 5.0).abs() < 1.0e-12);
    }
}
