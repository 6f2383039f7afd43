//! Per-model fitting: window selection, mask filtering, profile and synthesis
//! least-squares fits.

mod profile;
mod synthesis;
mod window;

use crate::domain::{SmhError, SmhResult};
use crate::linelist::TransitionStore;
use crate::model::{ModelKind, SpectralModel};
use crate::radiative::{Photosphere, RadiativeTransfer};
use crate::spectrum::Spectrum;
use serde::Serialize;

/// A significant absorption feature near the target that was removed from
/// the fit data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NearbyLine {
    pub wavelength: f64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub model_wavelength: Vec<f64>,
    pub model_flux: Vec<f64>,
    pub model_flux_uncertainty: Vec<f64>,
    pub residuals: Vec<f64>,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    /// NaN when no degrees of freedom remain.
    pub reduced_chi_square: f64,
    /// Angstrom; NaN for synthesis fits.
    pub equivalent_width: f64,
    pub equivalent_width_uncertainty: f64,
    pub reduced_equivalent_width: f64,
    pub nearby_lines: Vec<NearbyLine>,
    pub abundances: Vec<f64>,
    pub abundance_uncertainties: Vec<f64>,
}

impl Default for FitDiagnostics {
    fn default() -> Self {
        Self {
            model_wavelength: Vec::new(),
            model_flux: Vec::new(),
            model_flux_uncertainty: Vec::new(),
            residuals: Vec::new(),
            chi_square: f64::NAN,
            degrees_of_freedom: 0,
            reduced_chi_square: f64::NAN,
            equivalent_width: f64::NAN,
            equivalent_width_uncertainty: f64::NAN,
            reduced_equivalent_width: f64::NAN,
            nearby_lines: Vec::new(),
            abundances: Vec::new(),
            abundance_uncertainties: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub parameter_names: Vec<String>,
    pub parameters: Vec<f64>,
    /// Row-major; zero rows and columns for parameters held fixed.
    pub covariance: Vec<Vec<f64>>,
    pub diagnostics: FitDiagnostics,
}

impl FitResult {
    /// Result carrying only an externally measured equivalent width (Angstrom).
    pub fn from_measured_equivalent_width(equivalent_width: f64, wavelength: f64) -> Self {
        Self {
            parameter_names: Vec::new(),
            parameters: Vec::new(),
            covariance: Vec::new(),
            diagnostics: FitDiagnostics {
                equivalent_width,
                equivalent_width_uncertainty: 0.0,
                reduced_equivalent_width: reduced_equivalent_width(equivalent_width, wavelength),
                ..FitDiagnostics::default()
            },
        }
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| self.parameters[index])
    }
}

/// `log10(EW / wavelength)`, NaN unless both are positive and finite.
pub fn reduced_equivalent_width(equivalent_width: f64, wavelength: f64) -> f64 {
    if equivalent_width > 0.0 && equivalent_width.is_finite() && wavelength > 0.0 {
        (equivalent_width / wavelength).log10()
    } else {
        f64::NAN
    }
}

/// Everything a fit needs beyond the model itself.
#[derive(Clone, Copy)]
pub struct FitContext<'a> {
    pub store: &'a TransitionStore,
    pub spectrum: &'a Spectrum,
    pub photosphere: Option<&'a Photosphere>,
    pub backend: Option<&'a dyn RadiativeTransfer>,
}

impl<'a> FitContext<'a> {
    pub fn new(store: &'a TransitionStore, spectrum: &'a Spectrum) -> Self {
        Self {
            store,
            spectrum,
            photosphere: None,
            backend: None,
        }
    }

    pub fn with_radiative_transfer(
        mut self,
        photosphere: &'a Photosphere,
        backend: &'a dyn RadiativeTransfer,
    ) -> Self {
        self.photosphere = Some(photosphere);
        self.backend = Some(backend);
        self
    }
}

pub fn fit_spectral_model(model: &SpectralModel, context: &FitContext<'_>) -> SmhResult<FitResult> {
    match model.kind() {
        ModelKind::ProfileFitting(profile_options) => {
            profile_options.validate()?;
            model.options().validate()?;
            let transitions = context.store.resolve(model.transition_hashes())?;
            profile::fit_profile(
                &profile::ProfileFitInput {
                    transitions: &transitions,
                    common: model.options(),
                    profile: profile_options,
                    masks: model.masks(),
                },
                context.spectrum,
            )
        }
        ModelKind::SpectralSynthesis(synthesis_options) => {
            synthesis_options.validate()?;
            model.options().validate()?;
            let transitions = context.store.resolve(model.transition_hashes())?;
            let (Some(photosphere), Some(backend)) = (context.photosphere, context.backend) else {
                return Err(SmhError::input_validation(
                    "FIT.RADIATIVE_TRANSFER_MISSING",
                    "synthesis fits need a photosphere and a radiative transfer backend",
                ));
            };
            synthesis::fit_synthesis(
                &synthesis::SynthesisFitInput {
                    transitions: &transitions,
                    common: model.options(),
                    synthesis: synthesis_options,
                    masks: model.masks(),
                    photosphere,
                    backend,
                },
                context.spectrum,
            )
        }
    }
}
