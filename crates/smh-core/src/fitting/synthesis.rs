use super::profile::propagate_columns;
use super::window::{WindowSamples, fitting_window, mean_wavelength};
use super::{FitDiagnostics, FitResult};
use crate::common::constants::SPEED_OF_LIGHT_KMS;
use crate::common::solar::solar_abundance;
use crate::domain::{SmhError, SmhResult};
use crate::linelist::Transition;
use crate::model::{CommonOptions, MaskSet, SynthesisOptions, abundance_parameter_name};
use crate::numerics::{
    ParameterSpec, SolverOptions, finite_median, gaussian_smooth, interpolate_onto, minimize,
    polynomial, stable_sum_of_squares,
};
use crate::radiative::{Photosphere, RadiativeTransfer, SynthesisRequest};
use crate::spectrum::Spectrum;
use tracing::debug;

const SCAN_FRACTIONS: [f64; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];
const SMOOTHING_PADDING_SIGMAS: f64 = 4.0;

pub(super) struct SynthesisFitInput<'a> {
    pub transitions: &'a [&'a Transition],
    pub common: &'a CommonOptions,
    pub synthesis: &'a SynthesisOptions,
    pub masks: &'a MaskSet,
    pub photosphere: &'a Photosphere,
    pub backend: &'a dyn RadiativeTransfer,
}

/// Parameter vector layout: abundances, continuum, then optional
/// radial velocity and smoothing sigma.
struct SynthesisLayout {
    elements: Vec<String>,
    continuum_terms: usize,
    velocity: bool,
    smoothing: bool,
    center: f64,
}

impl SynthesisLayout {
    fn continuum_start(&self) -> usize {
        self.elements.len()
    }

    fn velocity_index(&self) -> Option<usize> {
        self.velocity
            .then_some(self.continuum_start() + self.continuum_terms)
    }

    fn smoothing_index(&self) -> Option<usize> {
        self.smoothing.then_some(
            self.continuum_start() + self.continuum_terms + usize::from(self.velocity),
        )
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .elements
            .iter()
            .map(|element| abundance_parameter_name(element))
            .collect();
        names.extend((0..self.continuum_terms).map(|order| format!("c{order}")));
        if self.velocity {
            names.push("vrad".to_string());
        }
        if self.smoothing {
            names.push("sigma_smooth".to_string());
        }
        names
    }
}

struct Synthesizer<'a> {
    input: &'a SynthesisFitInput<'a>,
    layout: &'a SynthesisLayout,
    range: (f64, f64),
}

impl Synthesizer<'_> {
    fn model_flux(&self, parameters: &[f64], wavelength: &[f64]) -> SmhResult<Vec<f64>> {
        let abundances: Vec<(String, f64)> = self
            .layout
            .elements
            .iter()
            .cloned()
            .zip(parameters.iter().copied())
            .collect();
        let request = SynthesisRequest {
            transitions: self.input.transitions,
            abundances: &abundances,
            wavelength_range: self.range,
        };
        let synthetic = self
            .input
            .backend
            .synthesize(self.input.photosphere, &request)?;
        synthetic.validate()?;

        let velocity = self
            .layout
            .velocity_index()
            .map_or(0.0, |index| parameters[index]);
        let shift = 1.0 + velocity / SPEED_OF_LIGHT_KMS;
        let shifted: Vec<f64> = synthetic
            .wavelength
            .iter()
            .map(|value| value * shift)
            .collect();

        let smoothed = match self.layout.smoothing_index() {
            Some(index) => gaussian_smooth(&shifted, &synthetic.flux, parameters[index]),
            None => synthetic.flux,
        };
        let mut flux = interpolate_onto(&shifted, &smoothed, wavelength).ok_or_else(|| {
            SmhError::fit(
                "FIT.SYNTHESIS_GRID",
                "synthetic spectrum could not be interpolated onto the observed grid",
            )
        })?;

        if self.layout.continuum_terms > 0 {
            let start = self.layout.continuum_start();
            let coefficients = &parameters[start..start + self.layout.continuum_terms];
            for (value, observed) in flux.iter_mut().zip(wavelength) {
                *value *= polynomial(coefficients, observed - self.layout.center);
            }
        }
        Ok(flux)
    }
}

pub(super) fn fit_synthesis(input: &SynthesisFitInput<'_>, spectrum: &Spectrum) -> SmhResult<FitResult> {
    let center = mean_wavelength(input.transitions);
    let (lower, upper) = fitting_window(input.transitions, input.common.window());
    let samples = WindowSamples::collect(spectrum, lower, upper, input.masks);
    samples.require_usable(lower, upper)?;
    let (x, y, ivar) = samples.usable();
    let weights: Vec<f64> = ivar.iter().map(|value| value.sqrt()).collect();

    let layout = SynthesisLayout {
        elements: input.synthesis.elements().to_vec(),
        continuum_terms: input.common.continuum_terms(),
        velocity: input.common.velocity_tolerance().is_some(),
        smoothing: input.synthesis.smoothing().is_some(),
        center,
    };
    let mut specs = initial_parameters(&layout, input, &y)?;

    let max_velocity = input.common.velocity_tolerance().unwrap_or(0.0);
    let max_sigma = input
        .synthesis
        .smoothing()
        .map_or(0.0, |bounds| bounds.upper());
    let padding = SMOOTHING_PADDING_SIGMAS * max_sigma + upper * max_velocity / SPEED_OF_LIGHT_KMS;
    let synthesizer = Synthesizer {
        input,
        layout: &layout,
        range: (lower - padding, upper + padding),
    };
    let residuals = |parameters: &[f64]| -> SmhResult<Vec<f64>> {
        let model = synthesizer.model_flux(parameters, &x)?;
        Ok(model
            .iter()
            .zip(&y)
            .zip(&weights)
            .map(|((model, observed), weight)| (model - observed) * weight)
            .collect())
    };

    coarse_abundance_scan(
        &mut specs,
        layout.elements.len(),
        input.synthesis.initial_abundance_bound(),
        &residuals,
    )?;

    let solution = minimize(residuals, &specs, &SolverOptions::default())?;
    let fitted = solution.parameters.clone();
    let covariance = solution.covariance.clone();

    let model_flux = synthesizer.model_flux(&fitted, &samples.wavelength)?;
    let residual_series: Vec<f64> = samples
        .flux
        .iter()
        .zip(&model_flux)
        .map(|(observed, model)| observed - model)
        .collect();
    let model_flux_uncertainty = propagate_columns(&fitted, &covariance, |parameters| {
        synthesizer.model_flux(parameters, &samples.wavelength)
    })?;

    let abundances = fitted[..layout.elements.len()].to_vec();
    let abundance_uncertainties = (0..layout.elements.len())
        .map(|index| solution.standard_error(index))
        .collect();

    debug!(
        wavelength = center,
        elements = %layout.elements.join(","),
        chi_square = solution.chi_square,
        reduced_chi_square = solution.reduced_chi_square(),
        iterations = solution.iterations,
        "synthesis fit converged"
    );

    Ok(FitResult {
        parameter_names: layout.names(),
        parameters: fitted,
        covariance,
        diagnostics: FitDiagnostics {
            model_wavelength: samples.wavelength.clone(),
            model_flux,
            model_flux_uncertainty,
            residuals: residual_series,
            chi_square: solution.chi_square,
            degrees_of_freedom: solution
                .residual_count
                .saturating_sub(solution.free_parameter_count),
            reduced_chi_square: solution.reduced_chi_square(),
            abundances,
            abundance_uncertainties,
            ..FitDiagnostics::default()
        },
    })
}

fn initial_parameters(
    layout: &SynthesisLayout,
    input: &SynthesisFitInput<'_>,
    flux: &[f64],
) -> SmhResult<Vec<ParameterSpec>> {
    let names = layout.names();
    let user_bounds = input.synthesis.parameter_bounds();
    if let Some(unknown) = user_bounds.keys().find(|name| !names.contains(name)) {
        return Err(SmhError::input_validation(
            "FIT.UNKNOWN_PARAMETER",
            format!(
                "bounds were given for '{unknown}', which this model does not fit (parameters: {})",
                names.join(", ")
            ),
        ));
    }

    let mut initial = Vec::with_capacity(names.len());
    let mut defaults = Vec::with_capacity(names.len());
    for element in &layout.elements {
        let start = input
            .synthesis
            .initial_abundance(element)
            .or_else(|| {
                solar_abundance(element).map(|solar| solar + input.photosphere.metallicity)
            })
            .filter(|value| value.is_finite())
            .ok_or_else(|| {
                SmhError::input_validation(
                    "FIT.INITIAL_ABUNDANCE",
                    format!("no initial abundance or solar value is available for {element}"),
                )
            })?;
        initial.push(start);
        defaults.push(ParameterSpec::free(start));
    }

    if layout.continuum_terms > 0 {
        let continuum = finite_median(flux).unwrap_or(1.0);
        initial.push(continuum);
        defaults.push(ParameterSpec::free(continuum));
        for _ in 1..layout.continuum_terms {
            initial.push(0.0);
            defaults.push(ParameterSpec::free(0.0));
        }
    }

    if let Some(tolerance) = input.common.velocity_tolerance() {
        initial.push(0.0);
        defaults.push(if tolerance > 0.0 {
            ParameterSpec::bounded(0.0, -tolerance, tolerance)
        } else {
            ParameterSpec::fixed(0.0)
        });
    }

    if let Some(smoothing) = input.synthesis.smoothing() {
        let start = 0.5 * (smoothing.lower() + smoothing.upper());
        initial.push(start);
        defaults.push(ParameterSpec::bounded(start, smoothing.lower(), smoothing.upper()));
    }

    Ok(names
        .iter()
        .zip(initial)
        .zip(defaults)
        .map(|((name, start), default)| match user_bounds.get(name) {
            Some(bounds) => ParameterSpec::bounded(
                start.clamp(bounds.lower(), bounds.upper()),
                bounds.lower(),
                bounds.upper(),
            ),
            None => default,
        })
        .collect())
}

/// Per-element grid search over `start +/- bound` that seeds the solver.
fn coarse_abundance_scan<F>(
    specs: &mut [ParameterSpec],
    element_count: usize,
    bound: f64,
    residuals: &F,
) -> SmhResult<()>
where
    F: Fn(&[f64]) -> SmhResult<Vec<f64>>,
{
    let mut point: Vec<f64> = specs.iter().map(|spec| spec.value).collect();
    for index in 0..element_count {
        let spec = specs[index];
        let start = point[index];
        let mut best = (f64::INFINITY, start);
        for fraction in SCAN_FRACTIONS {
            let candidate = (start + fraction * bound).clamp(spec.lower, spec.upper);
            point[index] = candidate;
            let chi_square = stable_sum_of_squares(&residuals(&point)?);
            if chi_square < best.0 {
                best = (chi_square, candidate);
            }
        }
        point[index] = best.1;
        specs[index].value = best.1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{SynthesisFitInput, fit_synthesis};
    use crate::domain::SmhErrorCategory;
    use crate::linelist::{Transition, TransitionRecord};
    use crate::model::{CommonOptions, MaskSet, ParameterBounds, SynthesisOptions};
    use crate::radiative::{
        MeasuredTransition, Photosphere, RadiativeTransfer, SynthesisRequest, SyntheticSpectrum,
        TransferError,
    };
    use crate::spectrum::Spectrum;
    use std::cell::Cell;

    /// Single Gaussian line whose depth grows linearly with log epsilon.
    struct LinearDepthBackend {
        calls: Cell<usize>,
        fail: bool,
    }

    fn depth(log_eps: f64) -> f64 {
        (0.3 * (1.0 + (log_eps - 7.5))).clamp(0.0, 0.9)
    }

    fn line_flux(wavelength: f64, log_eps: f64) -> f64 {
        let scaled = (wavelength - 5000.0) / 0.05;
        1.0 - depth(log_eps) * (-0.5 * scaled * scaled).exp()
    }

    impl RadiativeTransfer for LinearDepthBackend {
        fn abundance_cog(
            &self,
            _photosphere: &Photosphere,
            transitions: &[MeasuredTransition<'_>],
        ) -> Result<Vec<f64>, TransferError> {
            Ok(vec![7.5; transitions.len()])
        }

        fn synthesize(
            &self,
            _photosphere: &Photosphere,
            request: &SynthesisRequest<'_>,
        ) -> Result<SyntheticSpectrum, TransferError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(TransferError::Backend("model atmosphere missing".to_string()));
            }
            let (lower, upper) = request.wavelength_range;
            let log_eps = request.abundances[0].1;
            let steps = ((upper - lower) / 0.005).ceil() as usize;
            let wavelength: Vec<f64> = (0..=steps).map(|index| lower + index as f64 * 0.005).collect();
            let flux = wavelength.iter().map(|value| line_flux(*value, log_eps)).collect();
            Ok(SyntheticSpectrum { wavelength, flux })
        }
    }

    fn photosphere() -> Photosphere {
        Photosphere {
            effective_temperature: 5777.0,
            surface_gravity: 4.44,
            metallicity: 0.0,
            microturbulence: 1.0,
        }
    }

    fn observed(log_eps: f64) -> Spectrum {
        let wavelength: Vec<f64> = (0..=200).map(|index| 4999.0 + index as f64 * 0.01).collect();
        let flux = wavelength.iter().map(|value| line_flux(*value, log_eps)).collect();
        Spectrum::new(wavelength, flux, vec![1.0e4; 201]).expect("valid spectrum")
    }

    fn common() -> CommonOptions {
        let mut common = CommonOptions::default();
        common.set_window(0.8).expect("window");
        common.set_continuum_order(Some(0)).expect("flat continuum");
        common
    }

    #[test]
    fn synthesis_fit_recovers_abundance() {
        let line = Transition::new(TransitionRecord::new(5000.0, 26.0, 2.0, -1.0)).expect("valid");
        let backend = LinearDepthBackend {
            calls: Cell::new(0),
            fail: false,
        };
        let synthesis = SynthesisOptions::new(&["Fe"]).expect("options");
        let common = common();
        let photosphere = photosphere();
        let masks = MaskSet::default();

        let result = fit_synthesis(
            &SynthesisFitInput {
                transitions: &[&line],
                common: &common,
                synthesis: &synthesis,
                masks: &masks,
                photosphere: &photosphere,
                backend: &backend,
            },
            &observed(7.3),
        )
        .expect("synthesis fit should converge");

        assert!((result.diagnostics.abundances[0] - 7.3).abs() < 1.0e-4);
        assert_eq!(result.parameter_names, vec!["log_eps(Fe)", "c0"]);
        assert!(result.diagnostics.equivalent_width.is_nan());
        assert!(backend.calls.get() > 5);
    }

    #[test]
    fn smoothing_and_velocity_become_parameters() {
        let line = Transition::new(TransitionRecord::new(5000.0, 26.0, 2.0, -1.0)).expect("valid");
        let backend = LinearDepthBackend {
            calls: Cell::new(0),
            fail: false,
        };
        let mut synthesis = SynthesisOptions::new(&["Fe"]).expect("options");
        synthesis
            .set_smoothing(Some(ParameterBounds::new(0.0, 0.05).expect("ordered")))
            .expect("smoothing");
        let mut common = common();
        common.set_velocity_tolerance(Some(5.0)).expect("velocity");
        let photosphere = photosphere();
        let masks = MaskSet::default();

        let result = fit_synthesis(
            &SynthesisFitInput {
                transitions: &[&line],
                common: &common,
                synthesis: &synthesis,
                masks: &masks,
                photosphere: &photosphere,
                backend: &backend,
            },
            &observed(7.6),
        )
        .expect("synthesis fit should converge");

        assert_eq!(
            result.parameter_names,
            vec!["log_eps(Fe)", "c0", "vrad", "sigma_smooth"]
        );
        let vrad = result.parameter("vrad").expect("vrad");
        assert!(vrad.abs() <= 5.0);
    }

    #[test]
    fn backend_failures_surface_as_fit_errors() {
        let line = Transition::new(TransitionRecord::new(5000.0, 26.0, 2.0, -1.0)).expect("valid");
        let backend = LinearDepthBackend {
            calls: Cell::new(0),
            fail: true,
        };
        let synthesis = SynthesisOptions::new(&["Fe"]).expect("options");
        let common = common();
        let photosphere = photosphere();
        let masks = MaskSet::default();

        let error = fit_synthesis(
            &SynthesisFitInput {
                transitions: &[&line],
                common: &common,
                synthesis: &synthesis,
                masks: &masks,
                photosphere: &photosphere,
                backend: &backend,
            },
            &observed(7.3),
        )
        .expect_err("backend failure should surface");
        assert_eq!(error.category(), SmhErrorCategory::Fit);
        assert_eq!(error.placeholder(), "FIT.RADIATIVE_TRANSFER");
    }

    #[test]
    fn bounds_for_absent_parameters_are_rejected() {
        let line = Transition::new(TransitionRecord::new(5000.0, 26.0, 2.0, -1.0)).expect("valid");
        let backend = LinearDepthBackend {
            calls: Cell::new(0),
            fail: false,
        };
        let mut synthesis = SynthesisOptions::new(&["Fe"]).expect("options");
        synthesis
            .set_parameter_bounds("vrad", -1.0, 1.0)
            .expect("name is well formed");
        let common = common();
        let photosphere = photosphere();
        let masks = MaskSet::default();

        let error = fit_synthesis(
            &SynthesisFitInput {
                transitions: &[&line],
                common: &common,
                synthesis: &synthesis,
                masks: &masks,
                photosphere: &photosphere,
                backend: &backend,
            },
            &observed(7.3),
        )
        .expect_err("vrad is not fitted without a velocity tolerance");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);
        assert_eq!(backend.calls.get(), 0);
    }
}
