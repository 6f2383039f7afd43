//! JSON archive of exported spectral models and the transitions they use.

use crate::conflicts::{self, ConflictGroup};
use crate::domain::{SmhError, SmhResult};
use crate::linelist::{Transition, TransitionStore};
use crate::model::{ModelState, SpectralModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fit results and acceptance flags are not archived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArchive {
    pub transitions: Vec<Transition>,
    pub models: Vec<ModelState>,
}

impl ModelArchive {
    pub fn to_json(&self) -> SmhResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| {
            SmhError::parse(
                "ARCHIVE.SERIALIZE",
                format!("failed to serialize model archive: {source}"),
            )
        })
    }

    pub fn from_json(source: &str) -> SmhResult<Self> {
        serde_json::from_str(source).map_err(|source| {
            SmhError::parse(
                "ARCHIVE.PARSE",
                format!("failed to parse model archive: {source}"),
            )
        })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> SmhResult<()> {
        let path = path.as_ref();
        let payload = self.to_json()?;
        fs::write(path, payload).map_err(|source| {
            SmhError::io_system(
                "IO.ARCHIVE_WRITE",
                format!("failed to write model archive '{}': {}", path.display(), source),
            )
        })
    }

    pub fn read(path: impl AsRef<Path>) -> SmhResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            SmhError::io_system(
                "IO.ARCHIVE_READ",
                format!("failed to read model archive '{}': {}", path.display(), source),
            )
        })?;
        Self::from_json(&source)
    }

    pub fn store(&self) -> SmhResult<TransitionStore> {
        TransitionStore::from_transitions(self.transitions.clone())
    }

    /// Rebuild the archived models against the archive's own transitions.
    pub fn restore(&self) -> SmhResult<(TransitionStore, Vec<SpectralModel>)> {
        let store = self.store()?;
        let models = self
            .models
            .iter()
            .cloned()
            .map(|state| SpectralModel::from_state(&store, state))
            .collect::<SmhResult<Vec<_>>>()?;
        Ok((store, models))
    }

    pub fn conflict_groups(&self) -> SmhResult<Vec<ConflictGroup>> {
        let (store, models) = self.restore()?;
        Ok(conflicts::compute(&models, &store))
    }
}

#[cfg(test)]
mod tests {
    use super::ModelArchive;
    use crate::domain::SmhErrorCategory;
    use crate::linelist::{Transition, TransitionRecord, TransitionStore};
    use crate::model::{MaskInterval, SpectralModel};
    use tempfile::TempDir;

    fn archive() -> ModelArchive {
        let store = TransitionStore::from_transitions(vec![
            Transition::new(TransitionRecord::new(5000.0, 26.0, 1.0, -1.0)).expect("valid"),
            Transition::new(TransitionRecord::new(5002.0, 26.0, 2.0, -1.5)).expect("valid"),
        ])
        .expect("store");
        let hashes = store.hashes();
        let mut first = SpectralModel::profile(&store, &hashes).expect("model");
        first.add_mask(MaskInterval::new(5000.5, 5001.0).expect("finite"));
        let second = SpectralModel::profile(&store, &hashes[1..]).expect("model");
        ModelArchive {
            transitions: store.transitions().to_vec(),
            models: vec![first.state(), second.state()],
        }
    }

    #[test]
    fn archive_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("models.json");
        let original = archive();
        original.write(&path).expect("archive should be written");

        let restored = ModelArchive::read(&path).expect("archive should parse");
        assert_eq!(restored, original);
        let groups = restored.conflict_groups().expect("conflicts");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members(), &[0, 1]);
    }

    #[test]
    fn malformed_archives_are_parse_errors() {
        let error = ModelArchive::from_json("{\"transitions\": 3}").expect_err("malformed");
        assert_eq!(error.category(), SmhErrorCategory::Parse);
        assert_eq!(error.placeholder(), "ARCHIVE.PARSE");

        let missing = ModelArchive::read("/nonexistent/models.json").expect_err("missing");
        assert_eq!(missing.category(), SmhErrorCategory::IoSystem);
    }
}
