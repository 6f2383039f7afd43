use super::CliError;
use super::helpers::*;
use smh_core::archive::ModelArchive;
use smh_core::domain::{FitPolicy, SmhError};
use smh_core::linelist::{SortField, TransitionStore};
use smh_core::model::ProfileShape;
use smh_core::session::MeasurementSession;
use smh_core::spectrum::Spectrum;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(clap::Args)]
pub(super) struct MergeArgs {
    /// Line lists to merge, in order
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output line list path
    #[arg(long, short)]
    output: PathBuf,

    /// Treat exact duplicates as conflicts instead of skipping them
    #[arg(long)]
    keep_duplicates: bool,

    /// Keep both records when two lines match in species and wavelength
    #[arg(long)]
    ignore_conflicts: bool,
}

#[derive(clap::Args)]
pub(super) struct SortArgs {
    /// Line list to sort
    input: PathBuf,

    /// Column to sort by (wavelength, species, expot, loggf, damp_vdw, dissoc_E, comments, hash)
    #[arg(long, default_value = "wavelength")]
    by: String,

    /// Sort in descending order
    #[arg(long)]
    descending: bool,

    /// Output path; defaults to rewriting the input
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Line list; one profile model is created per transition
    linelist: PathBuf,

    /// Observed spectrum (wavelength flux [ivar])
    spectrum: PathBuf,

    /// Session defaults JSON
    #[arg(long)]
    defaults: Option<PathBuf>,

    /// Profile shape (gaussian, lorentzian, voigt)
    #[arg(long)]
    profile: Option<String>,

    /// Fitting window half-width in Angstrom
    #[arg(long)]
    window: Option<f64>,

    /// JSON report output path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the fitted models to a model archive
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ConflictsArgs {
    /// Model archive JSON
    archive: PathBuf,
}

pub(super) fn run_merge_command(args: MergeArgs) -> Result<i32, CliError> {
    let mut merged = TransitionStore::new();
    for path in &args.inputs {
        let incoming = read_line_list(path)?;
        debug!(path = %path.display(), transitions = incoming.len(), "line list read");
        merged = merged
            .merge(&incoming, !args.keep_duplicates, args.ignore_conflicts)
            .map_err(CliError::Compute)?;
    }
    merged.write(&args.output).map_err(CliError::Compute)?;
    info!(
        inputs = args.inputs.len(),
        transitions = merged.len(),
        "line lists merged"
    );
    println!(
        "Merged {} line list(s) into {} transition(s): {}",
        args.inputs.len(),
        merged.len(),
        args.output.display()
    );
    Ok(0)
}

pub(super) fn run_sort_command(args: SortArgs) -> Result<i32, CliError> {
    let field = SortField::from_token(&args.by).ok_or_else(|| {
        CliError::Usage(format!(
            "Unknown sort column '{}'; expected one of wavelength, species, expot, loggf, damp_vdw, dissoc_E, comments, hash.",
            args.by
        ))
    })?;
    let mut store = read_line_list(&args.input)?;
    store.sort(field, args.descending);
    info!(column = %args.by, descending = args.descending, "line list sorted");
    let output = args.output.unwrap_or_else(|| args.input.clone());
    store.write(&output).map_err(CliError::Compute)?;
    println!("Sorted {} transition(s): {}", store.len(), output.display());
    Ok(0)
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    let mut defaults = load_defaults(args.defaults.as_deref())?;
    if let Some(token) = args.profile.as_deref() {
        let shape = ProfileShape::from_token(token).ok_or_else(|| {
            CliError::Usage(format!(
                "Unknown profile '{token}'; expected gaussian, lorentzian or voigt."
            ))
        })?;
        defaults.profile.set_profile(shape);
    }
    if let Some(window) = args.window {
        defaults
            .common
            .set_window(window)
            .map_err(CliError::Compute)?;
    }

    let line_list = read_line_list(&args.linelist)?;
    let spectrum = Spectrum::read(&args.spectrum).map_err(CliError::Compute)?;

    let mut session = MeasurementSession::with_defaults(defaults);
    session
        .import_transitions(&line_list, true, false)
        .map_err(CliError::Compute)?;
    let hashes = session.store().hashes();
    if hashes.is_empty() {
        return Err(CliError::Compute(SmhError::insufficient_data(
            "INPUT.CLI_EMPTY_LINELIST",
            format!("line list '{}' has no transitions", args.linelist.display()),
        )));
    }
    session
        .add_profile_models(&hashes)
        .map_err(CliError::Compute)?;

    info!(
        models = session.models().len(),
        spectrum_points = spectrum.len(),
        "fitting profile models"
    );
    let batch = session
        .bulk_fit(None, FitPolicy::All, &spectrum, None)
        .map_err(CliError::Compute)?;
    let report = build_fit_report(&session, &batch);
    println!("{}", render_fit_summary(&report));

    if let Some(path) = args.report.as_deref() {
        write_json(path, &report)?;
        println!("JSON report: {}", path.display());
    }
    if let Some(path) = args.export.as_deref() {
        let indices: Vec<usize> = (0..session.models().len()).collect();
        let archive = session.export_models(&indices).map_err(CliError::Compute)?;
        archive.write(path).map_err(CliError::Compute)?;
        println!("Model archive: {}", path.display());
    }

    if batch.is_complete() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_conflicts_command(args: ConflictsArgs) -> Result<i32, CliError> {
    let archive = ModelArchive::read(&args.archive).map_err(CliError::Compute)?;
    let (store, models) = archive.restore().map_err(CliError::Compute)?;
    let groups = smh_core::conflicts::compute(&models, &store);
    info!(models = models.len(), groups = groups.len(), "conflict groups computed");

    if groups.is_empty() {
        println!("No conflicts among {} model(s).", models.len());
        return Ok(0);
    }
    for (number, group) in groups.iter().enumerate() {
        let members: Vec<String> = group
            .members()
            .iter()
            .map(|index| {
                format!(
                    "{} ({:.3} {})",
                    index,
                    models[*index].representative_wavelength(&store),
                    models[*index].element_summary(&store)
                )
            })
            .collect();
        println!("Group {}: {}", number + 1, members.join(", "));
    }
    println!("{} conflict group(s) among {} model(s).", groups.len(), models.len());
    Ok(0)
}
