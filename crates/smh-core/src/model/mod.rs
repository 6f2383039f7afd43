//! Fittable spectral models: a tagged kind, typed options, masks, usage
//! flags and the most recent fit result.

pub mod mask;
pub mod options;

pub use mask::{MaskInterval, MaskSet};
pub use options::{
    CommonOptions, ParameterBounds, ProfileOptions, ProfileShape, SynthesisOptions,
    abundance_parameter_name, synthesis_parameter_name_is_valid,
};

use crate::common::SessionDefaults;
use crate::domain::{SmhError, SmhResult, UsageFlag};
use crate::fitting::{FitContext, FitResult, fit_spectral_model, reduced_equivalent_width};
use crate::linelist::{TransitionHash, TransitionStore};
use crate::numerics::stable_mean;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const IRON_ATOMIC_NUMBER: usize = 26;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "settings", rename_all = "snake_case")]
pub enum ModelKind {
    ProfileFitting(ProfileOptions),
    SpectralSynthesis(SynthesisOptions),
}

impl ModelKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ProfileFitting(_) => "profile",
            Self::SpectralSynthesis(_) => "synthesis",
        }
    }

    pub fn is_profile(&self) -> bool {
        matches!(self, Self::ProfileFitting(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralModel {
    transition_hashes: Vec<TransitionHash>,
    kind: ModelKind,
    options: CommonOptions,
    masks: MaskSet,
    use_for_stellar_parameters: bool,
    use_for_stellar_abundances: bool,
    is_acceptable: bool,
    is_upper_limit: bool,
    fit_result: Option<FitResult>,
}

/// Serializable part of a model: everything except the fit result and the
/// acceptance flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub transition_hashes: Vec<TransitionHash>,
    pub kind: ModelKind,
    #[serde(default)]
    pub options: CommonOptions,
    #[serde(default)]
    pub masks: MaskSet,
    #[serde(default)]
    pub use_for_stellar_parameters: bool,
    #[serde(default = "default_true")]
    pub use_for_stellar_abundances: bool,
    #[serde(default)]
    pub is_upper_limit: bool,
}

fn default_true() -> bool {
    true
}

fn validate_hashes(store: &TransitionStore, hashes: &[TransitionHash]) -> SmhResult<()> {
    if hashes.is_empty() {
        return Err(SmhError::input_validation(
            "MODEL.TRANSITIONS",
            "a spectral model needs at least one transition",
        ));
    }
    let mut seen = HashSet::with_capacity(hashes.len());
    if let Some(repeated) = hashes.iter().find(|hash| !seen.insert(**hash)) {
        return Err(SmhError::input_validation(
            "MODEL.TRANSITIONS",
            format!("transition {repeated} is listed more than once"),
        ));
    }
    store.resolve(hashes).map(|_| ())
}

impl SpectralModel {
    pub fn new(
        store: &TransitionStore,
        hashes: &[TransitionHash],
        kind: ModelKind,
        options: CommonOptions,
    ) -> SmhResult<Self> {
        validate_hashes(store, hashes)?;
        options.validate()?;
        let kind = match kind {
            ModelKind::ProfileFitting(profile) => {
                profile.validate()?;
                ModelKind::ProfileFitting(profile)
            }
            ModelKind::SpectralSynthesis(synthesis) => {
                ModelKind::SpectralSynthesis(synthesis.canonicalized()?)
            }
        };

        let all_iron = store.resolve(hashes)?.iter().all(|transition| {
            transition.species().atomic_numbers().as_slice() == [IRON_ATOMIC_NUMBER]
        });
        Ok(Self {
            transition_hashes: hashes.to_vec(),
            use_for_stellar_parameters: kind.is_profile() && all_iron,
            kind,
            options,
            masks: MaskSet::default(),
            use_for_stellar_abundances: true,
            is_acceptable: false,
            is_upper_limit: false,
            fit_result: None,
        })
    }

    pub fn profile(store: &TransitionStore, hashes: &[TransitionHash]) -> SmhResult<Self> {
        Self::new(
            store,
            hashes,
            ModelKind::ProfileFitting(ProfileOptions::default()),
            CommonOptions::default(),
        )
    }

    pub fn synthesis<S: AsRef<str>>(
        store: &TransitionStore,
        hashes: &[TransitionHash],
        elements: &[S],
    ) -> SmhResult<Self> {
        Self::new(
            store,
            hashes,
            ModelKind::SpectralSynthesis(SynthesisOptions::new(elements)?),
            CommonOptions::default(),
        )
    }

    pub fn profile_with_defaults(
        store: &TransitionStore,
        hashes: &[TransitionHash],
        defaults: &SessionDefaults,
    ) -> SmhResult<Self> {
        Self::new(
            store,
            hashes,
            ModelKind::ProfileFitting(defaults.profile.clone()),
            defaults.common.clone(),
        )
    }

    pub fn synthesis_with_defaults<S: AsRef<str>>(
        store: &TransitionStore,
        hashes: &[TransitionHash],
        elements: &[S],
        defaults: &SessionDefaults,
    ) -> SmhResult<Self> {
        let mut synthesis = SynthesisOptions::new(elements)?;
        synthesis.set_initial_abundance_bound(defaults.synthesis.initial_abundance_bound)?;
        synthesis.set_smoothing(defaults.synthesis.smoothing)?;
        Self::new(
            store,
            hashes,
            ModelKind::SpectralSynthesis(synthesis),
            defaults.common.clone(),
        )
    }

    pub fn from_state(store: &TransitionStore, state: ModelState) -> SmhResult<Self> {
        let mut masks = MaskSet::default();
        masks.set_antimask(state.masks.is_antimask());
        for interval in state.masks.intervals() {
            masks.add(MaskInterval::new(interval.start(), interval.end())?);
        }

        let mut model = Self::new(store, &state.transition_hashes, state.kind, state.options)?;
        model.masks = masks;
        model.use_for_stellar_parameters = state.use_for_stellar_parameters;
        model.use_for_stellar_abundances = state.use_for_stellar_abundances;
        model.is_upper_limit = state.is_upper_limit;
        Ok(model)
    }

    pub fn state(&self) -> ModelState {
        ModelState {
            transition_hashes: self.transition_hashes.clone(),
            kind: self.kind.clone(),
            options: self.options.clone(),
            masks: self.masks.clone(),
            use_for_stellar_parameters: self.use_for_stellar_parameters,
            use_for_stellar_abundances: self.use_for_stellar_abundances,
            is_upper_limit: self.is_upper_limit,
        }
    }

    pub fn transition_hashes(&self) -> &[TransitionHash] {
        &self.transition_hashes
    }

    /// Replace the owned transitions. The previous fit no longer describes
    /// the model and is dropped.
    pub fn set_transitions(
        &mut self,
        store: &TransitionStore,
        hashes: &[TransitionHash],
    ) -> SmhResult<()> {
        validate_hashes(store, hashes)?;
        self.transition_hashes = hashes.to_vec();
        self.fit_result = None;
        self.is_acceptable = false;
        Ok(())
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn options(&self) -> &CommonOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CommonOptions {
        &mut self.options
    }

    pub fn profile_options_mut(&mut self) -> Option<&mut ProfileOptions> {
        match &mut self.kind {
            ModelKind::ProfileFitting(profile) => Some(profile),
            ModelKind::SpectralSynthesis(_) => None,
        }
    }

    pub fn synthesis_options_mut(&mut self) -> Option<&mut SynthesisOptions> {
        match &mut self.kind {
            ModelKind::SpectralSynthesis(synthesis) => Some(synthesis),
            ModelKind::ProfileFitting(_) => None,
        }
    }

    pub fn masks(&self) -> &MaskSet {
        &self.masks
    }

    pub fn add_mask(&mut self, interval: MaskInterval) {
        self.masks.add(interval);
    }

    /// Drop the most recently added interval containing `wavelength`.
    pub fn remove_mask_containing(&mut self, wavelength: f64) -> bool {
        self.masks.remove_containing(wavelength)
    }

    pub fn set_antimask(&mut self, antimask: bool) {
        self.masks.set_antimask(antimask);
    }

    pub fn flag(&self, flag: UsageFlag) -> bool {
        match flag {
            UsageFlag::StellarParameters => self.use_for_stellar_parameters,
            UsageFlag::StellarAbundances => self.use_for_stellar_abundances,
            UsageFlag::Acceptable => self.is_acceptable,
            UsageFlag::UpperLimit => self.is_upper_limit,
        }
    }

    pub fn set_flag(&mut self, flag: UsageFlag, value: bool) {
        let slot = match flag {
            UsageFlag::StellarParameters => &mut self.use_for_stellar_parameters,
            UsageFlag::StellarAbundances => &mut self.use_for_stellar_abundances,
            UsageFlag::Acceptable => &mut self.is_acceptable,
            UsageFlag::UpperLimit => &mut self.is_upper_limit,
        };
        *slot = value;
    }

    pub fn is_acceptable(&self) -> bool {
        self.is_acceptable
    }

    /// Fit against `context.spectrum`. The stored result is replaced only
    /// when the fit succeeds.
    pub fn fit(&mut self, context: &FitContext<'_>) -> SmhResult<&FitResult> {
        let result = fit_spectral_model(self, context)?;
        self.is_acceptable = true;
        Ok(self.fit_result.insert(result))
    }

    pub fn fit_result(&self) -> Option<&FitResult> {
        self.fit_result.as_ref()
    }

    pub(crate) fn fit_result_mut(&mut self) -> Option<&mut FitResult> {
        self.fit_result.as_mut()
    }

    pub(crate) fn set_fit_result(&mut self, result: FitResult) {
        self.fit_result = Some(result);
    }

    /// Mean rest wavelength of the owned transitions; NaN if any no longer
    /// resolves.
    pub fn representative_wavelength(&self, store: &TransitionStore) -> f64 {
        let Ok(transitions) = store.resolve(&self.transition_hashes) else {
            return f64::NAN;
        };
        let wavelengths: Vec<f64> = transitions
            .iter()
            .map(|transition| transition.wavelength())
            .collect();
        stable_mean(&wavelengths).unwrap_or(f64::NAN)
    }

    /// `Fe I` style species labels for profile models, measured elements for
    /// synthesis models.
    pub fn element_summary(&self, store: &TransitionStore) -> String {
        match &self.kind {
            ModelKind::SpectralSynthesis(synthesis) => synthesis.elements().join(", "),
            ModelKind::ProfileFitting(_) => {
                let mut labels: Vec<String> = Vec::new();
                for hash in &self.transition_hashes {
                    if let Some(transition) = store.get(*hash) {
                        let label = transition.species().label();
                        if !labels.contains(&label) {
                            labels.push(label);
                        }
                    }
                }
                labels.join(", ")
            }
        }
    }

    /// Angstrom.
    pub fn equivalent_width(&self) -> f64 {
        self.fit_result
            .as_ref()
            .map_or(f64::NAN, |result| result.diagnostics.equivalent_width)
    }

    pub fn equivalent_width_uncertainty(&self) -> f64 {
        self.fit_result.as_ref().map_or(f64::NAN, |result| {
            result.diagnostics.equivalent_width_uncertainty
        })
    }

    pub fn reduced_equivalent_width(&self, store: &TransitionStore) -> f64 {
        reduced_equivalent_width(
            self.equivalent_width(),
            self.representative_wavelength(store),
        )
    }

    pub fn abundances(&self) -> &[f64] {
        self.fit_result
            .as_ref()
            .map(|result| result.diagnostics.abundances.as_slice())
            .unwrap_or(&[])
    }
}
