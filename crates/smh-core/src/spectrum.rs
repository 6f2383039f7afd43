//! Observed spectrum: wavelength, flux and inverse variance on one grid.

use crate::domain::{SmhError, SmhResult};
use std::fs;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
    ivar: Vec<f64>,
}

impl Spectrum {
    /// Wavelengths must be finite and strictly ascending; flux and ivar may
    /// hold non-finite values, which the fitting engine discards.
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>, ivar: Vec<f64>) -> SmhResult<Self> {
        if wavelength.len() != flux.len() || wavelength.len() != ivar.len() {
            return Err(SmhError::input_validation(
                "SPECTRUM.LENGTH",
                format!(
                    "wavelength, flux and ivar lengths differ ({}, {}, {})",
                    wavelength.len(),
                    flux.len(),
                    ivar.len()
                ),
            ));
        }
        if wavelength.iter().any(|value| !value.is_finite()) {
            return Err(SmhError::input_validation(
                "SPECTRUM.WAVELENGTH",
                "wavelength grid contains non-finite values",
            ));
        }
        if let Some(position) = wavelength.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(SmhError::input_validation(
                "SPECTRUM.WAVELENGTH",
                format!(
                    "wavelength grid must be strictly ascending (sample {})",
                    position + 1
                ),
            ));
        }

        Ok(Self {
            wavelength,
            flux,
            ivar,
        })
    }

    /// Whitespace-separated columns `wavelength flux [ivar]`; ivar defaults to 1.
    pub fn from_source(source: &str) -> SmhResult<Self> {
        let mut wavelength = Vec::new();
        let mut flux = Vec::new();
        let mut ivar = Vec::new();

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let values: Vec<f64> = line
                .split_whitespace()
                .map(|token| token.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|error| {
                    SmhError::parse(
                        "SPECTRUM.PARSE",
                        format!("line {}: {}", index + 1, error),
                    )
                })?;

            match values.as_slice() {
                [w, f] => {
                    wavelength.push(*w);
                    flux.push(*f);
                    ivar.push(1.0);
                }
                [w, f, v] => {
                    wavelength.push(*w);
                    flux.push(*f);
                    ivar.push(*v);
                }
                other => {
                    return Err(SmhError::parse(
                        "SPECTRUM.PARSE",
                        format!(
                            "line {}: expected 2 or 3 columns, found {}",
                            index + 1,
                            other.len()
                        ),
                    ));
                }
            }
        }

        Self::new(wavelength, flux, ivar)
    }

    pub fn read(path: impl AsRef<Path>) -> SmhResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            SmhError::io_system(
                "IO.SPECTRUM_READ",
                format!("failed to read spectrum '{}': {}", path.display(), source),
            )
        })?;
        Self::from_source(&source)
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn ivar(&self) -> &[f64] {
        &self.ivar
    }

    /// Sample indices whose wavelength lies in `[lower, upper]`.
    pub fn indices_between(&self, lower: f64, upper: f64) -> Range<usize> {
        let start = self.wavelength.partition_point(|value| *value < lower);
        let end = self.wavelength.partition_point(|value| *value <= upper);
        start..end.max(start)
    }
}

#[cfg(test)]
mod tests {
    use super::Spectrum;
    use crate::domain::SmhErrorCategory;

    #[test]
    fn parses_two_and_three_column_sources() {
        let spectrum = Spectrum::from_source("# w f v\n5000.0 1.0\n5000.1 0.9 400\n\n")
            .expect("source should parse");
        assert_eq!(spectrum.len(), 2);
        assert_eq!(spectrum.ivar(), &[1.0, 400.0]);
    }

    #[test]
    fn rejects_unsorted_or_mismatched_arrays() {
        let error = Spectrum::new(vec![2.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0])
            .expect_err("descending grid should fail");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);

        assert!(Spectrum::new(vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0]).is_err());
        let error = Spectrum::from_source("5000 1 1 1\n").expect_err("four columns");
        assert_eq!(error.category(), SmhErrorCategory::Parse);
    }

    #[test]
    fn indices_between_is_inclusive() {
        let spectrum = Spectrum::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0; 4],
            vec![1.0; 4],
        )
        .expect("valid spectrum");
        assert_eq!(spectrum.indices_between(2.0, 3.0), 1..3);
        assert_eq!(spectrum.indices_between(5.0, 6.0), 4..4);
        assert!(spectrum.indices_between(3.5, 2.5).is_empty());
    }
}
