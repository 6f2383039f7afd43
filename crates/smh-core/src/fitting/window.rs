use crate::domain::{SmhError, SmhResult};
use crate::linelist::Transition;
use crate::model::MaskSet;
use crate::numerics::{median_spacing, stable_mean};
use crate::spectrum::Spectrum;

/// Finite, positive-ivar spectrum samples inside a fitting window, with the
/// mask decision recorded per sample.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct WindowSamples {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    pub pixel: Vec<usize>,
    pub included: Vec<bool>,
}

impl WindowSamples {
    pub fn collect(spectrum: &Spectrum, lower: f64, upper: f64, masks: &MaskSet) -> Self {
        let mut samples = Self {
            wavelength: Vec::new(),
            flux: Vec::new(),
            ivar: Vec::new(),
            pixel: Vec::new(),
            included: Vec::new(),
        };

        for pixel in spectrum.indices_between(lower, upper) {
            let wavelength = spectrum.wavelength()[pixel];
            let flux = spectrum.flux()[pixel];
            let ivar = spectrum.ivar()[pixel];
            if !flux.is_finite() || !ivar.is_finite() || ivar <= 0.0 {
                continue;
            }
            samples.wavelength.push(wavelength);
            samples.flux.push(flux);
            samples.ivar.push(ivar);
            samples.pixel.push(pixel);
            samples.included.push(masks.allows(wavelength));
        }
        samples
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn usable_count(&self) -> usize {
        self.included.iter().filter(|included| **included).count()
    }

    pub fn exclude_between(&mut self, start: f64, end: f64) {
        for (wavelength, included) in self.wavelength.iter().zip(self.included.iter_mut()) {
            if *wavelength >= start && *wavelength <= end {
                *included = false;
            }
        }
    }

    /// `(wavelength, flux, ivar)` of the samples that survived masking.
    pub fn usable(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut wavelength = Vec::with_capacity(self.len());
        let mut flux = Vec::with_capacity(self.len());
        let mut ivar = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            if self.included[index] {
                wavelength.push(self.wavelength[index]);
                flux.push(self.flux[index]);
                ivar.push(self.ivar[index]);
            }
        }
        (wavelength, flux, ivar)
    }

    pub fn pixel_spacing(&self) -> f64 {
        median_spacing(&self.wavelength).unwrap_or(0.0)
    }

    pub fn require_usable(&self, lower: f64, upper: f64) -> SmhResult<()> {
        if self.usable_count() == 0 {
            return Err(SmhError::insufficient_data(
                "FIT.NO_USABLE_DATA",
                format!(
                    "no finite, unmasked spectrum samples between {lower:.3} and {upper:.3} A"
                ),
            ));
        }
        Ok(())
    }
}

/// `[min wavelength - half_width, max wavelength + half_width]`.
pub(super) fn fitting_window(transitions: &[&Transition], half_width: f64) -> (f64, f64) {
    let lower = transitions
        .iter()
        .map(|transition| transition.wavelength())
        .fold(f64::INFINITY, f64::min);
    let upper = transitions
        .iter()
        .map(|transition| transition.wavelength())
        .fold(f64::NEG_INFINITY, f64::max);
    (lower - half_width, upper + half_width)
}

pub(super) fn mean_wavelength(transitions: &[&Transition]) -> f64 {
    let wavelengths: Vec<f64> = transitions
        .iter()
        .map(|transition| transition.wavelength())
        .collect();
    stable_mean(&wavelengths).unwrap_or(f64::NAN)
}
