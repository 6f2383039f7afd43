use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SmhResult<T> = Result<T, SmhError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmhErrorCategory {
    Parse,
    Conflict,
    InUse,
    InsufficientData,
    Fit,
    Bounds,
    InputValidation,
    IoSystem,
    StaleCache,
}

impl SmhErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation => 2,
            Self::Parse => 3,
            Self::IoSystem => 4,
            Self::Conflict => 5,
            Self::InUse => 6,
            Self::Bounds => 7,
            Self::InsufficientData => 8,
            Self::Fit => 9,
            Self::StaleCache => 10,
        }
    }

    pub const fn rust_category(self) -> &'static str {
        match self {
            Self::Parse => "ParseError",
            Self::Conflict => "ConflictError",
            Self::InUse => "InUseError",
            Self::InsufficientData => "InsufficientDataError",
            Self::Fit => "FitError",
            Self::Bounds => "BoundsError",
            Self::InputValidation => "InputValidationError",
            Self::IoSystem => "IoSystemError",
            Self::StaleCache => "StaleCacheError",
        }
    }

    /// Structural errors are rejected atomically: the receiver is left untouched.
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Conflict | Self::InUse)
    }
}

impl Display for SmhErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.rust_category())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmhError {
    category: SmhErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl SmhError {
    pub fn new(
        category: SmhErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn parse(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::Parse, placeholder, message)
    }

    pub fn conflict(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::Conflict, placeholder, message)
    }

    pub fn in_use(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::InUse, placeholder, message)
    }

    pub fn insufficient_data(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::InsufficientData, placeholder, message)
    }

    pub fn fit(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::Fit, placeholder, message)
    }

    pub fn bounds(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::Bounds, placeholder, message)
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::InputValidation, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::IoSystem, placeholder, message)
    }

    pub fn stale_cache(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(SmhErrorCategory::StaleCache, placeholder, message)
    }

    pub const fn category(&self) -> SmhErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }
}

impl Display for SmhError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.rust_category(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for SmhError {}
