pub mod errors;

pub use errors::{SmhError, SmhErrorCategory, SmhResult};

use std::fmt::{Display, Formatter};

/// Which subset of the model list a batch fit visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FitPolicy {
    All,
    Acceptable,
    /// Acceptable models only, or every model when none is acceptable.
    #[default]
    AcceptableOrAll,
}

impl FitPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Acceptable => "acceptable",
            Self::AcceptableOrAll => "acceptable-or-all",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "acceptable" => Some(Self::Acceptable),
            "acceptable-or-all" | "auto" => Some(Self::AcceptableOrAll),
            _ => None,
        }
    }
}

impl Display for FitPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageFlag {
    StellarParameters,
    StellarAbundances,
    Acceptable,
    UpperLimit,
}

impl UsageFlag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StellarParameters => "use_for_stellar_parameters",
            Self::StellarAbundances => "use_for_stellar_abundances",
            Self::Acceptable => "is_acceptable",
            Self::UpperLimit => "is_upper_limit",
        }
    }
}

impl Display for UsageFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Sort keys offered for the spectral model list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSortKey {
    Wavelength,
    Elements,
    Kind,
    StellarParameters,
    StellarAbundances,
}

impl ModelSortKey {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "wavelength" => Some(Self::Wavelength),
            "elements" | "element" => Some(Self::Elements),
            "kind" | "type" => Some(Self::Kind),
            "stellar-parameters" => Some(Self::StellarParameters),
            "stellar-abundances" => Some(Self::StellarAbundances),
            _ => None,
        }
    }
}
