//! Physical and numerical constants shared by the fitting kernels.

pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458_f64;
pub const SQRT_TWO: f64 = std::f64::consts::SQRT_2;
pub const SQRT_PI: f64 = 1.772_453_850_905_516_027_298_167_483_341_f64;
pub const SQRT_TWO_PI: f64 = 2.506_628_274_631_000_502_415_765_284_811_f64;
pub const MILLI_ANGSTROM_PER_ANGSTROM: f64 = 1.0e3;

/// Wavelength agreement (Å) under which two records of the same species are
/// treated as the same physical line during a line-list merge.
pub const WAVELENGTH_MATCH_TOLERANCE: f64 = 1.0e-3;

#[cfg(test)]
mod tests {
    use super::{SQRT_PI, SQRT_TWO, SQRT_TWO_PI, SPEED_OF_LIGHT_KMS};

    #[test]
    fn constants_match_expected_relationships() {
        assert!((SQRT_PI * SQRT_PI - std::f64::consts::PI).abs() <= 1.0e-14);
        assert!((SQRT_TWO * SQRT_PI - SQRT_TWO_PI).abs() <= 1.0e-14);
        assert!(SPEED_OF_LIGHT_KMS > 2.99e5 && SPEED_OF_LIGHT_KMS < 3.0e5);
    }
}
