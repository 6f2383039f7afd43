//! Typed, validated configuration for spectral models.

use crate::common::elements::canonical_symbol;
use crate::domain::{SmhError, SmhResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub const DEFAULT_WINDOW: f64 = 5.0;
pub const MAX_WINDOW: f64 = 1000.0;
pub const MAX_CONTINUUM_ORDER: u8 = 9;
pub const MAX_VELOCITY_TOLERANCE: f64 = 100.0;
pub const MAX_DETECTION_SIGMA: f64 = 100.0;
pub const MAX_DETECTION_PIXELS: u32 = 100;
pub const MAX_WAVELENGTH_TOLERANCE: f64 = 10.0;
pub const MAX_INITIAL_ABUNDANCE_BOUND: f64 = 2.0;
pub const MAX_SMOOTHING_SIGMA: f64 = 10.0;

fn check_range(
    placeholder: &'static str,
    label: &str,
    value: f64,
    lower: f64,
    upper: f64,
    lower_inclusive: bool,
) -> SmhResult<()> {
    let above = if lower_inclusive {
        value >= lower
    } else {
        value > lower
    };
    if value.is_finite() && above && value <= upper {
        return Ok(());
    }
    let open = if lower_inclusive { '[' } else { '(' };
    Err(SmhError::input_validation(
        placeholder,
        format!("{label} must lie in {open}{lower}, {upper}], got {value}"),
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonOptions {
    window: f64,
    continuum_order: Option<u8>,
    velocity_tolerance: Option<f64>,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            continuum_order: Some(1),
            velocity_tolerance: None,
        }
    }
}

impl CommonOptions {
    /// Half-width in Angstrom added on both sides of the owned transitions.
    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn continuum_order(&self) -> Option<u8> {
        self.continuum_order
    }

    pub fn velocity_tolerance(&self) -> Option<f64> {
        self.velocity_tolerance
    }

    /// Number of continuum polynomial coefficients; zero when the continuum is off.
    pub fn continuum_terms(&self) -> usize {
        self.continuum_order.map_or(0, |order| usize::from(order) + 1)
    }

    pub fn set_window(&mut self, window: f64) -> SmhResult<()> {
        check_range("OPTIONS.WINDOW", "window", window, 0.0, MAX_WINDOW, false)?;
        self.window = window;
        Ok(())
    }

    pub fn set_continuum_order(&mut self, order: Option<u8>) -> SmhResult<()> {
        if let Some(order) = order {
            if order > MAX_CONTINUUM_ORDER {
                return Err(SmhError::input_validation(
                    "OPTIONS.CONTINUUM_ORDER",
                    format!("continuum order must be at most {MAX_CONTINUUM_ORDER}, got {order}"),
                ));
            }
        }
        self.continuum_order = order;
        Ok(())
    }

    pub fn set_velocity_tolerance(&mut self, tolerance: Option<f64>) -> SmhResult<()> {
        if let Some(tolerance) = tolerance {
            check_range(
                "OPTIONS.VELOCITY_TOLERANCE",
                "velocity tolerance",
                tolerance,
                0.0,
                MAX_VELOCITY_TOLERANCE,
                true,
            )?;
        }
        self.velocity_tolerance = tolerance;
        Ok(())
    }

    pub fn validate(&self) -> SmhResult<()> {
        let mut copy = Self::default();
        copy.set_window(self.window)?;
        copy.set_continuum_order(self.continuum_order)?;
        copy.set_velocity_tolerance(self.velocity_tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileShape {
    #[default]
    Gaussian,
    Lorentzian,
    Voigt,
}

impl ProfileShape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::Lorentzian => "lorentzian",
            Self::Voigt => "voigt",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Some(Self::Gaussian),
            "lorentzian" => Some(Self::Lorentzian),
            "voigt" => Some(Self::Voigt),
            _ => None,
        }
    }
}

impl Display for ProfileShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileOptions {
    profile: ProfileShape,
    detection_sigma: f64,
    detection_pixels: u32,
    central_weighting: bool,
    wavelength_tolerance: Option<f64>,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            profile: ProfileShape::Gaussian,
            detection_sigma: 0.5,
            detection_pixels: 3,
            central_weighting: true,
            wavelength_tolerance: None,
        }
    }
}

impl ProfileOptions {
    pub fn profile(&self) -> ProfileShape {
        self.profile
    }

    /// Significance (in noise units) below the continuum that marks a nearby line.
    pub fn detection_sigma(&self) -> f64 {
        self.detection_sigma
    }

    pub fn detection_pixels(&self) -> u32 {
        self.detection_pixels
    }

    pub fn central_weighting(&self) -> bool {
        self.central_weighting
    }

    pub fn wavelength_tolerance(&self) -> Option<f64> {
        self.wavelength_tolerance
    }

    pub fn set_profile(&mut self, profile: ProfileShape) {
        self.profile = profile;
    }

    pub fn set_detection_sigma(&mut self, sigma: f64) -> SmhResult<()> {
        check_range(
            "OPTIONS.DETECTION_SIGMA",
            "detection sigma",
            sigma,
            0.0,
            MAX_DETECTION_SIGMA,
            true,
        )?;
        self.detection_sigma = sigma;
        Ok(())
    }

    pub fn set_detection_pixels(&mut self, pixels: u32) -> SmhResult<()> {
        if pixels == 0 || pixels > MAX_DETECTION_PIXELS {
            return Err(SmhError::input_validation(
                "OPTIONS.DETECTION_PIXELS",
                format!("detection pixels must lie in [1, {MAX_DETECTION_PIXELS}], got {pixels}"),
            ));
        }
        self.detection_pixels = pixels;
        Ok(())
    }

    pub fn set_central_weighting(&mut self, enabled: bool) {
        self.central_weighting = enabled;
    }

    /// `Some(0.0)` holds the centroid at the transition wavelength.
    pub fn set_wavelength_tolerance(&mut self, tolerance: Option<f64>) -> SmhResult<()> {
        if let Some(tolerance) = tolerance {
            check_range(
                "OPTIONS.WAVELENGTH_TOLERANCE",
                "wavelength tolerance",
                tolerance,
                0.0,
                MAX_WAVELENGTH_TOLERANCE,
                true,
            )?;
        }
        self.wavelength_tolerance = tolerance;
        Ok(())
    }

    pub fn validate(&self) -> SmhResult<()> {
        let mut copy = Self::default();
        copy.set_detection_sigma(self.detection_sigma)?;
        copy.set_detection_pixels(self.detection_pixels)?;
        copy.set_wavelength_tolerance(self.wavelength_tolerance)
    }
}

/// Closed interval `[lower, upper]` with `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    lower: f64,
    upper: f64,
}

impl ParameterBounds {
    pub fn new(lower: f64, upper: f64) -> SmhResult<Self> {
        let bounds = Self { lower, upper };
        bounds.validate("bounds")?;
        Ok(bounds)
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    fn validate(&self, label: &str) -> SmhResult<()> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower >= self.upper {
            return Err(SmhError::bounds(
                "OPTIONS.BOUNDS",
                format!(
                    "{label}: lower bound {} must be strictly less than upper bound {}",
                    self.lower, self.upper
                ),
            ));
        }
        Ok(())
    }
}

/// Recognised synthesis parameter names: `log_eps(<El>)`, `c<k>`, `vrad`
/// and `sigma_smooth`.
pub fn synthesis_parameter_name_is_valid(name: &str, elements: &[String]) -> bool {
    if name == "vrad" || name == "sigma_smooth" {
        return true;
    }
    if let Some(order) = name.strip_prefix('c') {
        return order
            .parse::<u8>()
            .is_ok_and(|order| order <= MAX_CONTINUUM_ORDER);
    }
    name.strip_prefix("log_eps(")
        .and_then(|rest| rest.strip_suffix(')'))
        .is_some_and(|element| elements.iter().any(|known| known == element))
}

pub fn abundance_parameter_name(element: &str) -> String {
    format!("log_eps({element})")
}

fn canonical_parameter_name(name: &str) -> String {
    name.strip_prefix("log_eps(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(canonical_symbol)
        .map_or_else(|| name.to_string(), abundance_parameter_name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOptions {
    elements: Vec<String>,
    #[serde(default = "default_initial_abundance_bound")]
    initial_abundance_bound: f64,
    #[serde(default)]
    smoothing: Option<ParameterBounds>,
    #[serde(default)]
    initial_abundances: BTreeMap<String, f64>,
    #[serde(default)]
    parameter_bounds: BTreeMap<String, ParameterBounds>,
}

fn default_initial_abundance_bound() -> f64 {
    1.0
}

impl SynthesisOptions {
    pub fn new<S: AsRef<str>>(elements: &[S]) -> SmhResult<Self> {
        let mut canonical: Vec<String> = Vec::with_capacity(elements.len());
        for element in elements {
            let element = element.as_ref();
            let symbol = canonical_symbol(element).ok_or_else(|| {
                SmhError::input_validation(
                    "OPTIONS.ELEMENTS",
                    format!("'{element}' is not an element symbol"),
                )
            })?;
            if canonical.iter().any(|known| known == symbol) {
                return Err(SmhError::input_validation(
                    "OPTIONS.ELEMENTS",
                    format!("element '{symbol}' is listed twice"),
                ));
            }
            canonical.push(symbol.to_string());
        }
        if canonical.is_empty() {
            return Err(SmhError::input_validation(
                "OPTIONS.ELEMENTS",
                "a synthesis model must measure at least one element",
            ));
        }

        Ok(Self {
            elements: canonical,
            initial_abundance_bound: default_initial_abundance_bound(),
            smoothing: None,
            initial_abundances: BTreeMap::new(),
            parameter_bounds: BTreeMap::new(),
        })
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn initial_abundance_bound(&self) -> f64 {
        self.initial_abundance_bound
    }

    pub fn smoothing(&self) -> Option<ParameterBounds> {
        self.smoothing
    }

    pub fn initial_abundance(&self, element: &str) -> Option<f64> {
        self.initial_abundances.get(element).copied()
    }

    pub fn parameter_bounds(&self) -> &BTreeMap<String, ParameterBounds> {
        &self.parameter_bounds
    }

    pub fn set_initial_abundance_bound(&mut self, bound: f64) -> SmhResult<()> {
        check_range(
            "OPTIONS.INITIAL_ABUNDANCE_BOUND",
            "initial abundance bound",
            bound,
            0.0,
            MAX_INITIAL_ABUNDANCE_BOUND,
            false,
        )?;
        self.initial_abundance_bound = bound;
        Ok(())
    }

    /// Allowed range of the Gaussian smoothing sigma (Angstrom); `None` disables smoothing.
    pub fn set_smoothing(&mut self, smoothing: Option<ParameterBounds>) -> SmhResult<()> {
        if let Some(bounds) = smoothing {
            bounds.validate("sigma_smooth")?;
            if bounds.lower < 0.0 || bounds.upper > MAX_SMOOTHING_SIGMA {
                return Err(SmhError::input_validation(
                    "OPTIONS.SMOOTHING",
                    format!(
                        "smoothing sigma range must lie in [0, {MAX_SMOOTHING_SIGMA}], got [{}, {}]",
                        bounds.lower, bounds.upper
                    ),
                ));
            }
        }
        self.smoothing = smoothing;
        Ok(())
    }

    pub fn set_initial_abundance(&mut self, element: &str, log_eps: f64) -> SmhResult<()> {
        let symbol = self.measured_symbol(element)?;
        if !log_eps.is_finite() {
            return Err(SmhError::input_validation(
                "OPTIONS.INITIAL_ABUNDANCE",
                format!("initial abundance for {symbol} must be finite"),
            ));
        }
        self.initial_abundances.insert(symbol, log_eps);
        Ok(())
    }

    /// User bounds for one synthesis parameter. Inverted or empty ranges
    /// are a `BoundsError`.
    pub fn set_parameter_bounds(&mut self, name: &str, lower: f64, upper: f64) -> SmhResult<()> {
        let bounds = ParameterBounds { lower, upper };
        bounds.validate(name)?;
        if !synthesis_parameter_name_is_valid(name, &self.elements) {
            return Err(SmhError::input_validation(
                "OPTIONS.PARAMETER_NAME",
                format!("'{name}' is not a parameter of this synthesis model"),
            ));
        }
        self.parameter_bounds.insert(name.to_string(), bounds);
        Ok(())
    }

    pub fn clear_parameter_bounds(&mut self, name: &str) -> bool {
        self.parameter_bounds.remove(name).is_some()
    }

    pub fn validate(&self) -> SmhResult<()> {
        self.canonicalized().map(|_| ())
    }

    /// Rebuild through the validating setters. Element symbols, including
    /// those inside `log_eps(...)` bound names, come back in canonical case.
    pub fn canonicalized(&self) -> SmhResult<Self> {
        let mut copy = Self::new(self.elements.as_slice())?;
        copy.set_initial_abundance_bound(self.initial_abundance_bound)?;
        copy.set_smoothing(self.smoothing)?;
        for (element, value) in &self.initial_abundances {
            copy.set_initial_abundance(element, *value)?;
        }
        for (name, bounds) in &self.parameter_bounds {
            copy.set_parameter_bounds(&canonical_parameter_name(name), bounds.lower, bounds.upper)?;
        }
        Ok(copy)
    }

    fn measured_symbol(&self, element: &str) -> SmhResult<String> {
        canonical_symbol(element)
            .filter(|symbol| self.elements.iter().any(|known| known == symbol))
            .map(str::to_string)
            .ok_or_else(|| {
                SmhError::input_validation(
                    "OPTIONS.ELEMENTS",
                    format!("'{element}' is not measured by this synthesis model"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommonOptions, ParameterBounds, ProfileOptions, ProfileShape, SynthesisOptions,
        synthesis_parameter_name_is_valid,
    };
    use crate::domain::SmhErrorCategory;

    #[test]
    fn common_options_reject_out_of_range_values_without_mutating() {
        let mut options = CommonOptions::default();
        assert_eq!(options.continuum_terms(), 2);

        let error = options.set_window(0.0).expect_err("zero window should fail");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);
        assert!(options.set_window(f64::NAN).is_err());
        assert!(options.set_window(1000.5).is_err());
        assert_eq!(options.window(), 5.0);

        assert!(options.set_continuum_order(Some(10)).is_err());
        options.set_continuum_order(None).expect("continuum off");
        assert_eq!(options.continuum_terms(), 0);

        assert!(options.set_velocity_tolerance(Some(-1.0)).is_err());
        options
            .set_velocity_tolerance(Some(5.0))
            .expect("tolerance should be accepted");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn profile_options_validate_detection_thresholds() {
        let mut options = ProfileOptions::default();
        assert_eq!(options.profile(), ProfileShape::Gaussian);
        assert!(options.set_detection_pixels(0).is_err());
        assert!(options.set_detection_sigma(101.0).is_err());
        assert!(options.set_wavelength_tolerance(Some(11.0)).is_err());
        options
            .set_wavelength_tolerance(Some(0.0))
            .expect("zero tolerance fixes the centroid");
        assert_eq!(ProfileShape::from_token("Voigt"), Some(ProfileShape::Voigt));
    }

    #[test]
    fn options_deserialize_with_defaults_for_missing_keys() {
        let options: CommonOptions =
            serde_json::from_str(r#"{"window": 2.5}"#).expect("partial options");
        assert_eq!(options.window(), 2.5);
        assert_eq!(options.continuum_order(), Some(1));

        let profile: ProfileOptions =
            serde_json::from_str(r#"{"profile": "voigt", "detectionPixels": 0}"#)
                .expect("profile options");
        assert_eq!(profile.profile(), ProfileShape::Voigt);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn inverted_synthesis_bounds_are_bounds_errors() {
        let mut options = SynthesisOptions::new(&["fe"]).expect("valid elements");
        assert_eq!(options.elements(), &["Fe".to_string()]);

        let error = options
            .set_parameter_bounds("log_eps(Fe)", 0.2, 0.1)
            .expect_err("inverted bounds should fail");
        assert_eq!(error.category(), SmhErrorCategory::Bounds);
        assert!(options.parameter_bounds().is_empty());

        let error = options
            .set_parameter_bounds("log_eps(Ti)", 0.1, 0.2)
            .expect_err("unmeasured element");
        assert_eq!(error.category(), SmhErrorCategory::InputValidation);

        options
            .set_parameter_bounds("log_eps(Fe)", 7.0, 8.0)
            .expect("valid bounds");
        assert!(options.validate().is_ok());

        let error = ParameterBounds::new(1.0, 1.0).expect_err("empty interval");
        assert_eq!(error.category(), SmhErrorCategory::Bounds);
    }

    #[test]
    fn synthesis_options_validate_elements_and_smoothing() {
        assert!(SynthesisOptions::new::<&str>(&[]).is_err());
        assert!(SynthesisOptions::new(&["Fe", "FE"]).is_err());
        assert!(SynthesisOptions::new(&["Qq"]).is_err());

        let mut options = SynthesisOptions::new(&["Fe", "Ti"]).expect("valid");
        assert!(options.set_initial_abundance_bound(0.0).is_err());
        assert!(options.set_initial_abundance_bound(2.5).is_err());
        let smoothing = ParameterBounds::new(0.0, 20.0).expect("ordered");
        assert!(options.set_smoothing(Some(smoothing)).is_err());
        options
            .set_smoothing(Some(ParameterBounds::new(0.01, 0.3).expect("ordered")))
            .expect("valid smoothing");
        options.set_initial_abundance("ti", 5.0).expect("measured element");
        assert_eq!(options.initial_abundance("Ti"), Some(5.0));
        assert!(options.set_initial_abundance("Ni", 6.0).is_err());
    }

    #[test]
    fn parameter_names_follow_synthesis_layout() {
        let elements = vec!["Fe".to_string()];
        assert!(synthesis_parameter_name_is_valid("log_eps(Fe)", &elements));
        assert!(synthesis_parameter_name_is_valid("c3", &elements));
        assert!(synthesis_parameter_name_is_valid("vrad", &elements));
        assert!(!synthesis_parameter_name_is_valid("c12", &elements));
        assert!(!synthesis_parameter_name_is_valid("log_eps(Ni)", &elements));
    }
}
