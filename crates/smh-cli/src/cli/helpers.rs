use super::CliError;
use anyhow::Context;
use serde::Serialize;
use smh_core::common::constants::MILLI_ANGSTROM_PER_ANGSTROM;
use smh_core::common::{SessionDefaults, load_session_defaults};
use smh_core::domain::SmhError;
use smh_core::linelist::TransitionStore;
use smh_core::session::{BulkFitReport, MeasurementSession};
use std::fs;
use std::path::Path;

pub(super) fn load_defaults(path: Option<&Path>) -> Result<SessionDefaults, CliError> {
    match path {
        Some(path) => load_session_defaults(path).map_err(|error| CliError::Compute(error.into())),
        None => Ok(SessionDefaults::default()),
    }
}

pub(super) fn read_line_list(path: &Path) -> Result<TransitionStore, CliError> {
    TransitionStore::read(path).map_err(CliError::Compute)
}

pub(super) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).context("failed to serialize JSON report")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| {
                CliError::Compute(SmhError::io_system(
                    "IO.CLI_REPORT_DIR",
                    format!("failed to create '{}': {}", parent.display(), source),
                ))
            })?;
        }
    }
    fs::write(path, payload).map_err(|source| {
        CliError::Compute(SmhError::io_system(
            "IO.CLI_REPORT_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        ))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FitReportRow {
    pub(super) model: usize,
    pub(super) hash: String,
    pub(super) wavelength: f64,
    pub(super) species: String,
    /// mA
    pub(super) equivalent_width: Option<f64>,
    pub(super) equivalent_width_uncertainty: Option<f64>,
    pub(super) reduced_equivalent_width: Option<f64>,
    pub(super) chi_square: Option<f64>,
    pub(super) error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FitReport {
    pub(super) attempted: usize,
    pub(super) succeeded: usize,
    pub(super) failed: usize,
    pub(super) rows: Vec<FitReportRow>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

pub(super) fn build_fit_report(session: &MeasurementSession, batch: &BulkFitReport) -> FitReport {
    let store = session.store();
    let rows = session
        .models()
        .iter()
        .enumerate()
        .map(|(index, model)| {
            let hash = model.transition_hashes()[0];
            let failure = batch.failures.iter().find(|failure| failure.index == index);
            let result = model.fit_result();
            FitReportRow {
                model: index,
                hash: hash.to_string(),
                wavelength: model.representative_wavelength(store),
                species: model.element_summary(store),
                equivalent_width: finite(model.equivalent_width() * MILLI_ANGSTROM_PER_ANGSTROM),
                equivalent_width_uncertainty: finite(model.equivalent_width_uncertainty() * MILLI_ANGSTROM_PER_ANGSTROM),
                reduced_equivalent_width: finite(model.reduced_equivalent_width(store)),
                chi_square: result.and_then(|result| finite(result.diagnostics.chi_square)),
                error: failure.map(|failure| format!("[{}] {}", failure.placeholder, failure.error)),
            }
        })
        .collect();

    FitReport {
        attempted: batch.attempted.len(),
        succeeded: batch.succeeded.len(),
        failed: batch.failures.len(),
        rows,
    }
}

pub(super) fn render_fit_summary(report: &FitReport) -> String {
    let mut lines = vec![format!(
        "{:>10} {:>8} {:>10} {:>8} {:>8}  status",
        "wavelength", "species", "EW(mA)", "err", "REW"
    )];
    for row in &report.rows {
        let number = |value: Option<f64>, digits: usize| {
            value.map_or_else(|| "-".to_string(), |value| format!("{value:.digits$}"))
        };
        lines.push(format!(
            "{:>10.3} {:>8} {:>10} {:>8} {:>8}  {}",
            row.wavelength,
            row.species,
            number(row.equivalent_width, 2),
            number(row.equivalent_width_uncertainty, 2),
            number(row.reduced_equivalent_width, 3),
            row.error.as_deref().unwrap_or("ok"),
        ));
    }
    lines.push(format!(
        "Fitted {}/{} model(s); {} failed.",
        report.succeeded, report.attempted, report.failed
    ));
    lines.join("\n")
}
