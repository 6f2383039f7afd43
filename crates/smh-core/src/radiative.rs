//! Interface to the radiative-transfer collaborator used for curve-of-growth
//! abundances and spectrum synthesis.

use crate::domain::SmhError;
use crate::linelist::Transition;
use serde::{Deserialize, Serialize};

/// Stellar atmosphere parameters handed to the radiative-transfer backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photosphere {
    pub effective_temperature: f64,
    pub surface_gravity: f64,
    pub metallicity: f64,
    pub microturbulence: f64,
}

/// A transition together with its measured equivalent width in mA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredTransition<'a> {
    pub transition: &'a Transition,
    pub equivalent_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest<'a> {
    pub transitions: &'a [&'a Transition],
    /// `(element symbol, log epsilon)` pairs.
    pub abundances: &'a [(String, f64)],
    pub wavelength_range: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticSpectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
}

impl SyntheticSpectrum {
    pub(crate) fn validate(&self) -> Result<(), TransferError> {
        if self.wavelength.len() != self.flux.len() || self.wavelength.len() < 2 {
            return Err(TransferError::MalformedSpectrum(format!(
                "{} wavelength and {} flux samples",
                self.wavelength.len(),
                self.flux.len()
            )));
        }
        if !self.wavelength.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(TransferError::MalformedSpectrum(
                "wavelength grid is not strictly ascending".to_string(),
            ));
        }
        if self.flux.iter().any(|value| !value.is_finite()) {
            return Err(TransferError::MalformedSpectrum(
                "flux contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransferError {
    #[error("radiative transfer backend failed: {0}")]
    Backend(String),
    #[error("expected {expected} abundance(s) from the backend, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("synthetic spectrum is malformed: {0}")]
    MalformedSpectrum(String),
    #[error("no photosphere has been set")]
    MissingPhotosphere,
}

impl From<TransferError> for SmhError {
    fn from(error: TransferError) -> Self {
        SmhError::fit("FIT.RADIATIVE_TRANSFER", error.to_string())
    }
}

pub trait RadiativeTransfer {
    /// Curve-of-growth abundance (log epsilon) for every measured transition,
    /// in input order.
    fn abundance_cog(
        &self,
        photosphere: &Photosphere,
        transitions: &[MeasuredTransition<'_>],
    ) -> Result<Vec<f64>, TransferError>;

    fn synthesize(
        &self,
        photosphere: &Photosphere,
        request: &SynthesisRequest<'_>,
    ) -> Result<SyntheticSpectrum, TransferError>;
}

#[cfg(test)]
mod tests {
    use super::{SyntheticSpectrum, TransferError};
    use crate::domain::{SmhError, SmhErrorCategory};

    #[test]
    fn transfer_errors_surface_as_fit_errors() {
        let error = SmhError::from(TransferError::Backend("moog exited 1".to_string()));
        assert_eq!(error.category(), SmhErrorCategory::Fit);
        assert!(error.message().contains("moog exited 1"));
    }

    #[test]
    fn synthetic_spectra_are_validated() {
        let valid = SyntheticSpectrum {
            wavelength: vec![1.0, 2.0],
            flux: vec![1.0, 0.9],
        };
        assert!(valid.validate().is_ok());

        let unsorted = SyntheticSpectrum {
            wavelength: vec![2.0, 1.0],
            flux: vec![1.0, 0.9],
        };
        assert!(matches!(
            unsorted.validate(),
            Err(TransferError::MalformedSpectrum(_))
        ));
    }
}
