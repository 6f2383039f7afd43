use crate::domain::{SmhError, SmhResult};
use crate::linelist::TransitionStore;
use crate::model::SpectralModel;
use serde::Serialize;

/// Per-model reduced equivalent widths and abundances captured at one
/// session generation. Entries are NaN where nothing is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementCaches {
    pub reduced_equivalent_widths: Vec<f64>,
    pub abundances: Vec<f64>,
    pub generation: u64,
}

impl MeasurementCaches {
    pub(super) fn snapshot(
        models: &[SpectralModel],
        store: &TransitionStore,
        generation: u64,
    ) -> Self {
        Self {
            reduced_equivalent_widths: models
                .iter()
                .map(|model| model.reduced_equivalent_width(store))
                .collect(),
            abundances: models
                .iter()
                .map(|model| model.abundances().first().copied().unwrap_or(f64::NAN))
                .collect(),
            generation,
        }
    }

    pub(super) fn check_current(&self, generation: u64) -> SmhResult<&Self> {
        if self.generation != generation {
            return Err(SmhError::stale_cache(
                "SESSION.STALE_CACHE",
                format!(
                    "measurement caches were taken at generation {} but the session is at {}; refresh them first",
                    self.generation, generation
                ),
            ));
        }
        Ok(self)
    }
}
