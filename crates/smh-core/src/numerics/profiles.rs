//! Unit-peak absorption line shapes and the Gaussian smoothing kernel used by
//! synthesis fits.

use crate::common::constants::{SQRT_PI, SQRT_TWO, SQRT_TWO_PI};
use num_complex::Complex64;

const SMOOTHING_KERNEL_HALF_WIDTH_SIGMAS: f64 = 4.0;

/// Width parameters of a line shape, in Angstrom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineShape {
    Gaussian { sigma: f64 },
    Lorentzian { gamma: f64 },
    Voigt { sigma: f64, gamma: f64 },
}

/// Profile value at `offset` Angstrom from the line centre, scaled so the
/// peak is exactly one.
pub fn line_profile(shape: LineShape, offset: f64) -> f64 {
    match shape {
        LineShape::Gaussian { sigma } => {
            let scaled = offset / sigma;
            (-0.5 * scaled * scaled).exp()
        }
        LineShape::Lorentzian { gamma } => {
            let scaled = offset / gamma;
            1.0 / (1.0 + scaled * scaled)
        }
        LineShape::Voigt { sigma, gamma } => {
            let denominator = sigma * SQRT_TWO;
            let peak = faddeeva(Complex64::new(0.0, gamma / denominator)).re;
            faddeeva(Complex64::new(offset / denominator, gamma / denominator)).re / peak
        }
    }
}

/// Integral of the unit-peak profile over all wavelengths. Multiplying by the
/// fractional depth gives the equivalent width.
pub fn profile_integral(shape: LineShape) -> f64 {
    match shape {
        LineShape::Gaussian { sigma } => sigma * SQRT_TWO_PI,
        LineShape::Lorentzian { gamma } => std::f64::consts::PI * gamma,
        LineShape::Voigt { sigma, gamma } => {
            let peak = faddeeva(Complex64::new(0.0, gamma / (sigma * SQRT_TWO))).re;
            sigma * SQRT_TWO_PI / peak
        }
    }
}

/// Faddeeva function `w(z) = exp(-z^2) erfc(-iz)` for `Im z >= 0`, using
/// Humlicek's four-region rational approximation (relative error ~1e-4).
pub fn faddeeva(z: Complex64) -> Complex64 {
    let x = z.re;
    let y = z.im.max(0.0);
    let t = Complex64::new(y, -x);
    let s = x.abs() + y;

    if s >= 15.0 {
        return t * (1.0 / SQRT_PI) / (0.5 + t * t);
    }

    if s >= 5.5 {
        let u = t * t;
        return t * (1.410474 + u * (1.0 / SQRT_PI)) / (0.75 + u * (3.0 + u));
    }

    if y >= 0.195 * x.abs() - 0.176 {
        let numerator =
            16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236)));
        let denominator = 16.4955
            + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t))));
        return numerator / denominator;
    }

    let u = t * t;
    let numerator = t
        * (36183.31
            - u * (3321.9905
                - u * (1540.787 - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
    let denominator = 32066.6
        - u * (24322.84
            - u * (9022.228
                - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
    u.exp() - numerator / denominator
}

/// Convolve `flux` sampled on the non-decreasing `wavelength` grid with a
/// Gaussian of standard deviation `sigma` Angstrom. Non-positive widths
/// return the input unchanged.
pub fn gaussian_smooth(wavelength: &[f64], flux: &[f64], sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0) || wavelength.len() != flux.len() {
        return flux.to_vec();
    }

    let half_width = SMOOTHING_KERNEL_HALF_WIDTH_SIGMAS * sigma;
    let mut smoothed = Vec::with_capacity(flux.len());
    for (index, &center) in wavelength.iter().enumerate() {
        let start = wavelength.partition_point(|sample| *sample < center - half_width);
        let end = wavelength.partition_point(|sample| *sample <= center + half_width);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for (&sample_wavelength, &sample_flux) in
            wavelength[start..end].iter().zip(&flux[start..end])
        {
            let scaled = (sample_wavelength - center) / sigma;
            let weight = (-0.5 * scaled * scaled).exp();
            weighted += weight * sample_flux;
            total += weight;
        }

        smoothed.push(if total > 0.0 {
            weighted / total
        } else {
            flux[index]
        });
    }
    smoothed
}

#[cfg(test)]
mod tests {
    use super::{LineShape, faddeeva, gaussian_smooth, line_profile, profile_integral};
    use num_complex::Complex64;

    fn numeric_integral(shape: LineShape, half_range: f64, steps: usize) -> f64 {
        let step = 2.0 * half_range / steps as f64;
        (0..=steps)
            .map(|index| {
                let offset = -half_range + index as f64 * step;
                let weight = if index == 0 || index == steps { 0.5 } else { 1.0 };
                weight * line_profile(shape, offset) * step
            })
            .sum()
    }

    #[test]
    fn profiles_have_unit_peak() {
        for shape in [
            LineShape::Gaussian { sigma: 0.1 },
            LineShape::Lorentzian { gamma: 0.05 },
            LineShape::Voigt {
                sigma: 0.08,
                gamma: 0.03,
            },
        ] {
            assert!((line_profile(shape, 0.0) - 1.0).abs() < 1.0e-12, "{shape:?}");
            assert!(line_profile(shape, 0.2) < 1.0);
        }
    }

    #[test]
    fn gaussian_integral_matches_closed_form() {
        let shape = LineShape::Gaussian { sigma: 0.1 };
        let numeric = numeric_integral(shape, 2.0, 40_000);
        assert!((numeric - profile_integral(shape)).abs() < 1.0e-9);
    }

    #[test]
    fn voigt_integral_matches_quadrature() {
        let shape = LineShape::Voigt {
            sigma: 0.08,
            gamma: 0.02,
        };
        let numeric = numeric_integral(shape, 200.0, 400_000);
        let relative = (numeric - profile_integral(shape)).abs() / profile_integral(shape);
        assert!(relative < 2.0e-3, "relative error {relative}");
    }

    #[test]
    fn faddeeva_reproduces_reference_values() {
        let at_origin = faddeeva(Complex64::new(0.0, 0.0));
        assert!((at_origin.re - 1.0).abs() < 1.0e-4);

        // w(i) = exp(1) erfc(1)
        let on_axis = faddeeva(Complex64::new(0.0, 1.0));
        assert!((on_axis.re - 0.427_583_576_155_807).abs() < 1.0e-4);

        let far = faddeeva(Complex64::new(20.0, 1.0));
        let asymptotic = Complex64::new(0.0, 1.0) / (std::f64::consts::PI.sqrt() * Complex64::new(20.0, 1.0));
        assert!((far - asymptotic).norm() < 1.0e-4);
    }

    #[test]
    fn gaussian_smoothing_preserves_flat_spectra_and_broadens_lines() {
        let wavelength: Vec<f64> = (0..201).map(|index| 5000.0 + index as f64 * 0.01).collect();
        let flat = vec![1.0; wavelength.len()];
        let smoothed = gaussian_smooth(&wavelength, &flat, 0.05);
        assert!(smoothed.iter().all(|value| (value - 1.0).abs() < 1.0e-12));

        let mut spike = vec![0.0; wavelength.len()];
        spike[100] = 1.0;
        let broadened = gaussian_smooth(&wavelength, &spike, 0.05);
        assert!(broadened[100] < 1.0);
        assert!(broadened[95] > 0.0);

        assert_eq!(gaussian_smooth(&wavelength, &spike, 0.0), spike);
    }
}
