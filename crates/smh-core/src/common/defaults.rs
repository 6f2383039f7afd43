//! Session-wide defaults applied to newly created spectral models.

use crate::domain::SmhError;
use crate::model::{CommonOptions, ParameterBounds, ProfileOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionDefaults {
    pub common: CommonOptions,
    pub profile: ProfileOptions,
    pub synthesis: SynthesisDefaults,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisDefaults {
    pub initial_abundance_bound: f64,
    pub smoothing: Option<ParameterBounds>,
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            initial_abundance_bound: 1.0,
            smoothing: None,
        }
    }
}

impl SessionDefaults {
    pub fn validate(&self) -> Result<(), SmhError> {
        self.common.validate()?;
        self.profile.validate()?;
        let mut candidate = crate::model::SynthesisOptions::new(&["Fe"])?;
        candidate.set_initial_abundance_bound(self.synthesis.initial_abundance_bound)?;
        candidate.set_smoothing(self.synthesis.smoothing)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DefaultsError {
    #[error("failed to read session defaults '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse session defaults '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid session defaults '{}': {source}", path.display())]
    Invalid { path: PathBuf, source: SmhError },
}

impl From<DefaultsError> for SmhError {
    fn from(error: DefaultsError) -> Self {
        match &error {
            DefaultsError::Read { .. } => SmhError::io_system("IO.DEFAULTS_READ", error.to_string()),
            DefaultsError::Parse { .. } => SmhError::parse("DEFAULTS.PARSE", error.to_string()),
            DefaultsError::Invalid { source, .. } => {
                SmhError::new(source.category(), "DEFAULTS.INVALID", error.to_string())
            }
        }
    }
}

pub fn load_session_defaults(
    defaults_path: impl AsRef<Path>,
) -> Result<SessionDefaults, DefaultsError> {
    let defaults_path = defaults_path.as_ref();
    let source = fs::read_to_string(defaults_path).map_err(|source| DefaultsError::Read {
        path: defaults_path.to_path_buf(),
        source,
    })?;
    let defaults: SessionDefaults =
        serde_json::from_str(&source).map_err(|source| DefaultsError::Parse {
            path: defaults_path.to_path_buf(),
            source,
        })?;
    defaults.validate().map_err(|source| DefaultsError::Invalid {
        path: defaults_path.to_path_buf(),
        source,
    })?;
    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::{DefaultsError, SessionDefaults, load_session_defaults};
    use crate::domain::{SmhError, SmhErrorCategory};
    use crate::model::ProfileShape;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_session_defaults_fills_missing_keys() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("defaults.json");
        fs::write(
            &path,
            r#"{"common": {"window": 2.0, "continuumOrder": null}, "profile": {"profile": "lorentzian"}}"#,
        )
        .expect("defaults should be written");

        let defaults = load_session_defaults(&path).expect("defaults should load");
        assert_eq!(defaults.common.window(), 2.0);
        assert_eq!(defaults.common.continuum_order(), None);
        assert_eq!(defaults.profile.profile(), ProfileShape::Lorentzian);
        assert_eq!(defaults.profile.detection_pixels(), 3);
        assert_eq!(defaults.synthesis.initial_abundance_bound, 1.0);
    }

    #[test]
    fn load_session_defaults_reports_read_parse_and_range_failures() {
        let temp = TempDir::new().expect("tempdir should be created");

        let missing = load_session_defaults(temp.path().join("absent.json"))
            .expect_err("missing file should fail");
        assert!(matches!(missing, DefaultsError::Read { .. }));
        assert_eq!(
            SmhError::from(missing).category(),
            SmhErrorCategory::IoSystem
        );

        let malformed = temp.path().join("malformed.json");
        fs::write(&malformed, "{ not json").expect("file should be written");
        let error = load_session_defaults(&malformed).expect_err("malformed json should fail");
        assert!(matches!(error, DefaultsError::Parse { .. }));

        let out_of_range = temp.path().join("range.json");
        fs::write(&out_of_range, r#"{"common": {"window": -1.0}}"#).expect("file should be written");
        let error = load_session_defaults(&out_of_range).expect_err("negative window should fail");
        assert!(matches!(error, DefaultsError::Invalid { .. }));
        assert_eq!(
            SmhError::from(error).category(),
            SmhErrorCategory::InputValidation
        );
    }

    #[test]
    fn default_session_defaults_are_valid() {
        assert!(SessionDefaults::default().validate().is_ok());
    }
}
