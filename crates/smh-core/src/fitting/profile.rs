use super::window::{WindowSamples, fitting_window, mean_wavelength};
use super::{FitDiagnostics, FitResult, NearbyLine, reduced_equivalent_width};
use crate::common::constants::SPEED_OF_LIGHT_KMS;
use crate::domain::SmhResult;
use crate::linelist::Transition;
use crate::model::{CommonOptions, MaskSet, ProfileOptions, ProfileShape};
use crate::numerics::{
    LineShape, ParameterSpec, SolverOptions, finite_median, line_profile, minimize, polynomial,
    profile_integral,
};
use crate::spectrum::Spectrum;
use tracing::debug;

const MINIMUM_WIDTH: f64 = 1.0e-5;
const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;
const GRADIENT_RELATIVE_STEP: f64 = 1.0e-6;

pub(super) struct ProfileFitInput<'a> {
    pub transitions: &'a [&'a Transition],
    pub common: &'a CommonOptions,
    pub profile: &'a ProfileOptions,
    pub masks: &'a MaskSet,
}

/// Parameter vector layout: centroid offset, width(s), depth, continuum.
#[derive(Debug, Clone, Copy)]
struct ProfileLayout {
    shape: ProfileShape,
    continuum_terms: usize,
    center: f64,
}

impl ProfileLayout {
    fn width_count(&self) -> usize {
        match self.shape {
            ProfileShape::Voigt => 2,
            ProfileShape::Gaussian | ProfileShape::Lorentzian => 1,
        }
    }

    fn depth_index(&self) -> usize {
        1 + self.width_count()
    }

    fn continuum_start(&self) -> usize {
        self.depth_index() + 1
    }

    fn len(&self) -> usize {
        self.continuum_start() + self.continuum_terms
    }

    fn names(&self) -> Vec<String> {
        let mut names = vec!["wavelength".to_string()];
        match self.shape {
            ProfileShape::Gaussian => names.push("sigma".to_string()),
            ProfileShape::Lorentzian => names.push("gamma".to_string()),
            ProfileShape::Voigt => {
                names.push("sigma".to_string());
                names.push("gamma".to_string());
            }
        }
        names.push("depth".to_string());
        names.extend((0..self.continuum_terms).map(|order| format!("c{order}")));
        names
    }

    fn line_shape(&self, parameters: &[f64]) -> LineShape {
        match self.shape {
            ProfileShape::Gaussian => LineShape::Gaussian {
                sigma: parameters[1],
            },
            ProfileShape::Lorentzian => LineShape::Lorentzian {
                gamma: parameters[1],
            },
            ProfileShape::Voigt => LineShape::Voigt {
                sigma: parameters[1],
                gamma: parameters[2],
            },
        }
    }

    fn continuum(&self, parameters: &[f64], wavelength: f64) -> f64 {
        if self.continuum_terms == 0 {
            return 1.0;
        }
        polynomial(&parameters[self.continuum_start()..], wavelength - self.center)
    }

    fn evaluate(&self, parameters: &[f64], wavelength: f64) -> f64 {
        let shape = self.line_shape(parameters);
        let offset = wavelength - (self.center + parameters[0]);
        let depth = parameters[self.depth_index()];
        self.continuum(parameters, wavelength) * (1.0 - depth * line_profile(shape, offset))
    }

    fn equivalent_width(&self, parameters: &[f64]) -> f64 {
        parameters[self.depth_index()] * profile_integral(self.line_shape(parameters))
    }
}

pub(super) fn fit_profile(input: &ProfileFitInput<'_>, spectrum: &Spectrum) -> SmhResult<FitResult> {
    let half_width = input.common.window();
    let center = mean_wavelength(input.transitions);
    let (lower, upper) = fitting_window(input.transitions, half_width);

    let mut samples = WindowSamples::collect(spectrum, lower, upper, input.masks);
    samples.require_usable(lower, upper)?;

    let pixel = samples.pixel_spacing();
    let protection = input
        .profile
        .wavelength_tolerance()
        .unwrap_or(0.0)
        .max(2.0 * pixel);
    let nearby_lines = detect_nearby_lines(&samples, center, protection, input.profile);
    for line in &nearby_lines {
        samples.exclude_between(line.start, line.end);
    }
    samples.require_usable(lower, upper)?;

    let (x, y, ivar) = samples.usable();
    let layout = ProfileLayout {
        shape: input.profile.profile(),
        continuum_terms: input.common.continuum_terms(),
        center,
    };
    let weights: Vec<f64> = x
        .iter()
        .zip(&ivar)
        .map(|(wavelength, ivar)| {
            let taper = if input.profile.central_weighting() {
                let scaled = (wavelength - center) / (0.5 * half_width);
                (-0.5 * scaled * scaled).exp()
            } else {
                1.0
            };
            (ivar * taper).sqrt()
        })
        .collect();

    let specs = initial_parameters(&layout, &x, &y, input, pixel.max(MINIMUM_WIDTH));
    let solution = minimize(
        |parameters| {
            Ok(x.iter()
                .zip(&y)
                .zip(&weights)
                .map(|((wavelength, flux), weight)| {
                    (layout.evaluate(parameters, *wavelength) - flux) * weight
                })
                .collect())
        },
        &specs,
        &SolverOptions::default(),
    )?;

    let fitted = solution.parameters.clone();
    let covariance = solution.covariance.clone();

    let model_flux: Vec<f64> = samples
        .wavelength
        .iter()
        .map(|wavelength| layout.evaluate(&fitted, *wavelength))
        .collect();
    let residuals: Vec<f64> = samples
        .flux
        .iter()
        .zip(&model_flux)
        .map(|(observed, model)| observed - model)
        .collect();
    let model_flux_uncertainty: Vec<f64> = samples
        .wavelength
        .iter()
        .map(|wavelength| {
            propagate(&fitted, &covariance, |parameters| {
                layout.evaluate(parameters, *wavelength)
            })
        })
        .collect();

    let equivalent_width = layout.equivalent_width(&fitted);
    let equivalent_width_uncertainty =
        propagate(&fitted, &covariance, |parameters| layout.equivalent_width(parameters));

    debug!(
        wavelength = center,
        profile = %layout.shape,
        chi_square = solution.chi_square,
        reduced_chi_square = solution.reduced_chi_square(),
        iterations = solution.iterations,
        nearby_lines = nearby_lines.len(),
        "profile fit converged"
    );

    let mut parameters = fitted;
    parameters[0] += center;
    Ok(FitResult {
        parameter_names: layout.names(),
        parameters,
        covariance,
        diagnostics: FitDiagnostics {
            model_wavelength: samples.wavelength.clone(),
            model_flux,
            model_flux_uncertainty,
            residuals,
            chi_square: solution.chi_square,
            degrees_of_freedom: solution
                .residual_count
                .saturating_sub(solution.free_parameter_count),
            reduced_chi_square: solution.reduced_chi_square(),
            equivalent_width,
            equivalent_width_uncertainty,
            reduced_equivalent_width: reduced_equivalent_width(equivalent_width, center),
            nearby_lines,
            abundances: Vec::new(),
            abundance_uncertainties: Vec::new(),
        },
    })
}

fn initial_parameters(
    layout: &ProfileLayout,
    x: &[f64],
    y: &[f64],
    input: &ProfileFitInput<'_>,
    pixel: f64,
) -> Vec<ParameterSpec> {
    let half_width = input.common.window();
    let continuum = finite_median(y).unwrap_or(1.0);
    let nearest = x
        .iter()
        .enumerate()
        .min_by(|lhs, rhs| {
            (lhs.1 - layout.center)
                .abs()
                .total_cmp(&(rhs.1 - layout.center).abs())
        })
        .map_or(0, |(index, _)| index);
    let depth = if continuum > 0.0 {
        (1.0 - y[nearest] / continuum).clamp(0.01, 0.99)
    } else {
        0.5
    };

    // Walk outwards until the absorption falls below half depth.
    let half_depth = |index: usize| continuum > 0.0 && 1.0 - y[index] / continuum >= 0.5 * depth;
    let mut left = nearest;
    while left > 0 && half_depth(left - 1) {
        left -= 1;
    }
    let mut right = nearest;
    while right + 1 < x.len() && half_depth(right + 1) {
        right += 1;
    }
    let fwhm = (x[right] - x[left]).max(2.0 * pixel);

    let mut specs = Vec::with_capacity(layout.len());
    specs.push(centroid_spec(layout.center, input));

    let width_upper = half_width.max(2.0 * MINIMUM_WIDTH);
    let bounded_width = |value: f64| {
        ParameterSpec::bounded(
            value.clamp(MINIMUM_WIDTH, width_upper),
            MINIMUM_WIDTH,
            width_upper,
        )
    };
    match layout.shape {
        ProfileShape::Gaussian => specs.push(bounded_width(fwhm / FWHM_PER_SIGMA)),
        ProfileShape::Lorentzian => specs.push(bounded_width(0.5 * fwhm)),
        ProfileShape::Voigt => {
            specs.push(bounded_width(0.5 * fwhm / FWHM_PER_SIGMA));
            specs.push(bounded_width(0.25 * fwhm));
        }
    }
    specs.push(ParameterSpec::bounded(depth, 0.0, 1.0));

    if layout.continuum_terms > 0 {
        specs.push(ParameterSpec::free(continuum));
        specs.extend((1..layout.continuum_terms).map(|_| ParameterSpec::free(0.0)));
    }
    specs
}

/// Centroid offset bounds: the tighter of the wavelength and velocity
/// tolerances, or the window when neither is set.
fn centroid_spec(center: f64, input: &ProfileFitInput<'_>) -> ParameterSpec {
    let from_velocity = input
        .common
        .velocity_tolerance()
        .map(|velocity| center * velocity / SPEED_OF_LIGHT_KMS);
    let tolerance = match (input.profile.wavelength_tolerance(), from_velocity) {
        (Some(wavelength), Some(velocity)) => wavelength.min(velocity),
        (Some(wavelength), None) => wavelength,
        (None, Some(velocity)) => velocity,
        (None, None) => input.common.window(),
    };

    if tolerance <= 0.0 {
        ParameterSpec::fixed(0.0)
    } else {
        ParameterSpec::bounded(0.0, -tolerance, tolerance)
    }
}

/// Runs of at least `detection_pixels` contiguous samples lying
/// `detection_sigma` below the median continuum that do not touch the
/// protected region around the target.
fn detect_nearby_lines(
    samples: &WindowSamples,
    center: f64,
    protection: f64,
    options: &ProfileOptions,
) -> Vec<NearbyLine> {
    let Some(continuum) = finite_median(&samples.flux) else {
        return Vec::new();
    };
    let significant: Vec<bool> = samples
        .flux
        .iter()
        .zip(&samples.ivar)
        .map(|(flux, ivar)| (continuum - flux) * ivar.sqrt() > options.detection_sigma())
        .collect();

    let minimum_run = options.detection_pixels() as usize;
    let mut lines = Vec::new();
    let mut index = 0;
    while index < samples.len() {
        if !significant[index] {
            index += 1;
            continue;
        }

        let start = index;
        while index + 1 < samples.len()
            && significant[index + 1]
            && samples.pixel[index + 1] == samples.pixel[index] + 1
        {
            index += 1;
        }
        let end = index;
        index += 1;

        if end + 1 - start < minimum_run {
            continue;
        }
        let run_start = samples.wavelength[start];
        let run_end = samples.wavelength[end];
        if run_start <= center + protection && run_end >= center - protection {
            continue;
        }

        let deepest = (start..=end)
            .min_by(|lhs, rhs| samples.flux[*lhs].total_cmp(&samples.flux[*rhs]))
            .unwrap_or(start);
        lines.push(NearbyLine {
            wavelength: samples.wavelength[deepest],
            start: samples.wavelength[start.saturating_sub(1)],
            end: samples.wavelength[(end + 1).min(samples.len() - 1)],
        });
    }
    lines
}

/// `sqrt(g^T C g)` with `g` the central-difference gradient of `quantity`.
pub(super) fn propagate<F>(parameters: &[f64], covariance: &[Vec<f64>], quantity: F) -> f64
where
    F: Fn(&[f64]) -> f64,
{
    let mut shifted = parameters.to_vec();
    let gradient: Vec<f64> = (0..parameters.len())
        .map(|index| {
            if covariance[index][index] == 0.0 {
                return 0.0;
            }
            let step = GRADIENT_RELATIVE_STEP * parameters[index].abs().max(1.0e-3);
            shifted[index] = parameters[index] + step;
            let forward = quantity(&shifted);
            shifted[index] = parameters[index] - step;
            let backward = quantity(&shifted);
            shifted[index] = parameters[index];
            (forward - backward) / (2.0 * step)
        })
        .collect();

    let mut variance = 0.0;
    for (row, gradient_row) in gradient.iter().enumerate() {
        for (col, gradient_col) in gradient.iter().enumerate() {
            variance += gradient_row * covariance[row][col] * gradient_col;
        }
    }
    variance.max(0.0).sqrt()
}

/// Pointwise `sqrt(g_i^T C g_i)` for a vector-valued model, with one forward
/// and one backward evaluation per free parameter.
pub(super) fn propagate_columns<F>(
    parameters: &[f64],
    covariance: &[Vec<f64>],
    model: F,
) -> SmhResult<Vec<f64>>
where
    F: Fn(&[f64]) -> SmhResult<Vec<f64>>,
{
    let mut shifted = parameters.to_vec();
    let mut columns: Vec<Option<Vec<f64>>> = Vec::with_capacity(parameters.len());
    for index in 0..parameters.len() {
        if covariance[index][index] == 0.0 {
            columns.push(None);
            continue;
        }
        let step = GRADIENT_RELATIVE_STEP * parameters[index].abs().max(1.0e-3);
        shifted[index] = parameters[index] + step;
        let forward = model(&shifted)?;
        shifted[index] = parameters[index] - step;
        let backward = model(&shifted)?;
        shifted[index] = parameters[index];
        columns.push(Some(
            forward
                .iter()
                .zip(&backward)
                .map(|(ahead, behind)| (ahead - behind) / (2.0 * step))
                .collect(),
        ));
    }

    let length = columns.iter().flatten().map(Vec::len).max().unwrap_or(0);
    let mut uncertainty = Vec::with_capacity(length);
    for point in 0..length {
        let mut variance = 0.0;
        for (row, row_column) in columns.iter().enumerate() {
            let Some(row_column) = row_column else { continue };
            for (col, col_column) in columns.iter().enumerate() {
                let Some(col_column) = col_column else { continue };
                variance += row_column[point] * covariance[row][col] * col_column[point];
            }
        }
        uncertainty.push(variance.max(0.0).sqrt());
    }
    Ok(uncertainty)
}

#[cfg(test)]
mod tests {
    use super::{ProfileFitInput, fit_profile};
    use crate::domain::SmhErrorCategory;
    use crate::linelist::{Transition, TransitionRecord};
    use crate::model::{CommonOptions, MaskInterval, MaskSet, ProfileOptions, ProfileShape};
    use crate::numerics::{LineShape, line_profile};
    use crate::spectrum::Spectrum;

    fn synthetic_spectrum(lines: &[(f64, LineShape, f64)]) -> Spectrum {
        let wavelength: Vec<f64> = (0..=600).map(|index| 4997.0 + index as f64 * 0.01).collect();
        let flux = wavelength
            .iter()
            .map(|value| {
                lines.iter().fold(1.0, |flux, (center, shape, depth)| {
                    flux * (1.0 - depth * line_profile(*shape, value - center))
                })
            })
            .collect();
        let ivar = vec![1.0e4; wavelength.len()];
        Spectrum::new(wavelength, flux, ivar).expect("valid spectrum")
    }

    fn transition(wavelength: f64) -> Transition {
        Transition::new(TransitionRecord::new(wavelength, 26.0, 2.0, -1.0)).expect("valid")
    }

    fn flat_options() -> CommonOptions {
        let mut common = CommonOptions::default();
        common.set_window(1.5).expect("window");
        common.set_continuum_order(None).expect("continuum off");
        common
    }

    #[test]
    fn gaussian_fit_recovers_equivalent_width_and_excludes_neighbour() {
        let target = LineShape::Gaussian { sigma: 0.05 };
        let spectrum = synthetic_spectrum(&[
            (5000.0, target, 0.5),
            (5001.0, LineShape::Gaussian { sigma: 0.04 }, 0.4),
        ]);
        let line = transition(5000.0);
        let common = flat_options();
        let profile = ProfileOptions::default();
        let masks = MaskSet::default();

        let result = fit_profile(
            &ProfileFitInput {
                transitions: &[&line],
                common: &common,
                profile: &profile,
                masks: &masks,
            },
            &spectrum,
        )
        .expect("fit should converge");

        let expected = 0.5 * 0.05 * (2.0 * std::f64::consts::PI).sqrt();
        let relative = (result.diagnostics.equivalent_width - expected).abs() / expected;
        assert!(relative < 0.02, "relative EW error {relative}");
        assert_eq!(result.diagnostics.nearby_lines.len(), 1);
        let nearby = result.diagnostics.nearby_lines[0];
        assert!(nearby.start < 5001.0 && nearby.end > 5001.0);
        assert!((nearby.wavelength - 5001.0).abs() < 0.011);
        assert!((result.parameter("wavelength").expect("centroid") - 5000.0).abs() < 1.0e-3);
        assert_eq!(
            result.diagnostics.model_flux.len(),
            result.diagnostics.model_wavelength.len()
        );
        assert!(result.diagnostics.equivalent_width_uncertainty.is_finite());
        let diagnostics = &result.diagnostics;
        assert!(diagnostics.degrees_of_freedom > 0);
        assert_eq!(
            diagnostics.reduced_chi_square,
            diagnostics.chi_square / diagnostics.degrees_of_freedom as f64
        );
    }

    #[test]
    fn lorentzian_and_voigt_fits_converge_with_continuum() {
        let spectrum = synthetic_spectrum(&[(
            5000.0,
            LineShape::Voigt {
                sigma: 0.04,
                gamma: 0.02,
            },
            0.4,
        )]);
        let line = transition(5000.0);
        let mut common = CommonOptions::default();
        common.set_window(1.0).expect("window");
        let masks = MaskSet::default();

        for shape in [ProfileShape::Lorentzian, ProfileShape::Voigt] {
            let mut profile = ProfileOptions::default();
            profile.set_profile(shape);
            let result = fit_profile(
                &ProfileFitInput {
                    transitions: &[&line],
                    common: &common,
                    profile: &profile,
                    masks: &masks,
                },
                &spectrum,
            )
            .expect("fit should converge");
            assert!(result.diagnostics.equivalent_width > 0.0);
            assert!(result.parameter("c1").is_some());
        }
    }

    #[test]
    fn fixed_centroid_stays_at_the_transition() {
        let spectrum = synthetic_spectrum(&[(5000.02, LineShape::Gaussian { sigma: 0.05 }, 0.3)]);
        let line = transition(5000.0);
        let common = flat_options();
        let mut profile = ProfileOptions::default();
        profile.set_wavelength_tolerance(Some(0.0)).expect("fixed");
        let masks = MaskSet::default();

        let result = fit_profile(
            &ProfileFitInput {
                transitions: &[&line],
                common: &common,
                profile: &profile,
                masks: &masks,
            },
            &spectrum,
        )
        .expect("fit should converge");
        assert_eq!(result.parameter("wavelength"), Some(5000.0));
        assert_eq!(result.covariance[0][0], 0.0);
    }

    #[test]
    fn fully_masked_window_is_insufficient_data() {
        let spectrum = synthetic_spectrum(&[(5000.0, LineShape::Gaussian { sigma: 0.05 }, 0.5)]);
        let line = transition(5000.0);
        let common = flat_options();
        let profile = ProfileOptions::default();
        let mut masks = MaskSet::default();
        masks.add(MaskInterval::new(4990.0, 5010.0).expect("interval"));

        let error = fit_profile(
            &ProfileFitInput {
                transitions: &[&line],
                common: &common,
                profile: &profile,
                masks: &masks,
            },
            &spectrum,
        )
        .expect_err("masked window should fail");
        assert_eq!(error.category(), SmhErrorCategory::InsufficientData);
    }
}
