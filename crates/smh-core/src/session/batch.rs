use super::{MeasurementSession, unknown_model};
use crate::common::constants::MILLI_ANGSTROM_PER_ANGSTROM;
use crate::domain::{FitPolicy, SmhError, SmhResult, UsageFlag};
use crate::fitting::FitContext;
use crate::model::ModelKind;
use crate::radiative::{MeasuredTransition, RadiativeTransfer, TransferError};
use crate::spectrum::Spectrum;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelFailure {
    pub index: usize,
    pub error: String,
    pub placeholder: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkFitReport {
    pub attempted: Vec<usize>,
    pub succeeded: Vec<usize>,
    pub failures: Vec<ModelFailure>,
}

impl BulkFitReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbundanceEntry {
    pub index: usize,
    pub abundance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AbundanceReport {
    pub entries: Vec<AbundanceEntry>,
    /// Fitted profile models left out because their equivalent width is not finite.
    pub skipped: Vec<usize>,
}

impl MeasurementSession {
    fn fit_targets(&self, models: Option<&[usize]>, policy: FitPolicy) -> SmhResult<Vec<usize>> {
        let count = self.models.len();
        let candidates: Vec<usize> = match models {
            Some(indices) => {
                let mut selected = indices.to_vec();
                selected.sort_unstable();
                selected.dedup();
                if let Some(&index) = selected.iter().find(|index| **index >= count) {
                    return Err(unknown_model(index, count));
                }
                selected
            }
            None => (0..count).collect(),
        };
        let acceptable: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|index| self.models[*index].flag(UsageFlag::Acceptable))
            .collect();
        Ok(match policy {
            FitPolicy::All => candidates,
            FitPolicy::Acceptable => acceptable,
            FitPolicy::AcceptableOrAll if acceptable.is_empty() => candidates,
            FitPolicy::AcceptableOrAll => acceptable,
        })
    }

    /// Fit the models selected by `policy` in index order, drawn from
    /// `models` or from the whole session when `None`. Failures are recorded
    /// per model and never stop the batch; an out-of-range index rejects the
    /// call before anything is fitted.
    pub fn bulk_fit(
        &mut self,
        models: Option<&[usize]>,
        policy: FitPolicy,
        spectrum: &Spectrum,
        backend: Option<&dyn RadiativeTransfer>,
    ) -> SmhResult<BulkFitReport> {
        let targets = self.fit_targets(models, policy)?;
        let mut report = BulkFitReport {
            attempted: targets.clone(),
            ..BulkFitReport::default()
        };

        let photosphere = self.photosphere;
        let mut context = FitContext::new(&self.store, spectrum);
        if let (Some(photosphere), Some(backend)) = (photosphere.as_ref(), backend) {
            context = context.with_radiative_transfer(photosphere, backend);
        }

        for index in targets {
            match self.models[index].fit(&context) {
                Ok(result) => {
                    debug!(
                        model = index,
                        chi_square = result.diagnostics.chi_square,
                        "model fitted"
                    );
                    report.succeeded.push(index);
                }
                Err(error) => {
                    warn!(model = index, error = %error.diagnostic_line(), "model fit failed");
                    report.failures.push(ModelFailure {
                        index,
                        error: error.message().to_string(),
                        placeholder: error.placeholder(),
                    });
                }
            }
        }

        if !report.succeeded.is_empty() {
            self.bump_generation();
        }
        info!(
            policy = %policy,
            attempted = report.attempted.len(),
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "bulk fit finished"
        );
        Ok(report)
    }

    /// Curve-of-growth abundances for every fitted profile model with a
    /// finite equivalent width, in one backend call. Nothing is written
    /// unless the backend returns exactly one value per line.
    pub fn compute_abundances(
        &mut self,
        backend: &dyn RadiativeTransfer,
    ) -> SmhResult<AbundanceReport> {
        let photosphere = self
            .photosphere
            .ok_or(TransferError::MissingPhotosphere)?;

        let mut targets = Vec::new();
        let mut skipped = Vec::new();
        let mut measured = Vec::new();
        for (index, model) in self.models.iter().enumerate() {
            if !matches!(model.kind(), ModelKind::ProfileFitting(_)) || model.fit_result().is_none() {
                continue;
            }
            let equivalent_width = model.equivalent_width();
            if !equivalent_width.is_finite() {
                skipped.push(index);
                continue;
            }
            let Some(first) = model.transition_hashes().first() else {
                continue;
            };
            let transition = self.store.get(*first).ok_or_else(|| {
                SmhError::input_validation(
                    "SESSION.UNKNOWN_HASH",
                    format!("model {index} references transition {first}, which is not in the line list"),
                )
            })?;
            targets.push(index);
            measured.push(MeasuredTransition {
                transition,
                equivalent_width: equivalent_width * MILLI_ANGSTROM_PER_ANGSTROM,
            });
        }

        if measured.is_empty() {
            return Err(SmhError::insufficient_data(
                "SESSION.NO_EQUIVALENT_WIDTHS",
                "no fitted profile model has a finite equivalent width",
            ));
        }

        let abundances = backend.abundance_cog(&photosphere, &measured)?;
        if abundances.len() != measured.len() {
            return Err(TransferError::LengthMismatch {
                expected: measured.len(),
                actual: abundances.len(),
            }
            .into());
        }

        let mut entries = Vec::with_capacity(targets.len());
        for (index, abundance) in targets.into_iter().zip(abundances) {
            if let Some(result) = self.models[index].fit_result_mut() {
                result.diagnostics.abundances = vec![abundance];
                result.diagnostics.abundance_uncertainties = vec![f64::NAN];
            }
            entries.push(AbundanceEntry { index, abundance });
        }
        self.bump_generation();
        info!(
            measured = entries.len(),
            skipped = skipped.len(),
            "abundances computed"
        );
        Ok(AbundanceReport { entries, skipped })
    }
}
