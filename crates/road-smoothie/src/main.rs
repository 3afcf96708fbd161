mod settings;

use clap::Parser;
use geo::Rect;
use rand::SeedableRng;
use rand::rngs::StdRng;
use road_smoothie_lib::{Network, Outcome, SmoothieError, read_fragments, smooth_to_reference};
use serde::Serialize;
use settings::Settings;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process::ExitCode;

/// Error types of the command line tool
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Smoothie(#[from] SmoothieError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of the `--plan` output
#[derive(Serialize)]
struct FetchPlan<'a> {
    reference: Option<&'a str>,
    rects: &'a [Rect<f64>],
}

fn main() -> ExitCode {
    setup_logging();

    let settings = Settings::parse();
    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, `info` unless RUST_LOG says otherwise
fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(settings: &Settings) -> Result<(), CliError> {
    let config = settings.load_config()?;
    tracing::debug!("Using {config:?}");

    let selected = read_fragments(BufReader::new(File::open(&settings.reference)?))?;
    let mut source: Network = serde_json::from_reader(BufReader::new(File::open(&settings.network)?))?;

    // Whatever the user already has on screen counts as loaded
    let mut network = match settings.loaded_view() {
        Some(view) => source.extract(view),
        None => Network::new(),
    };

    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let outcome = smooth_to_reference(
        selected,
        &mut network,
        &mut source,
        &config,
        &mut rng,
        chrono::Utc::now(),
    )?;
    report(&outcome);

    if let Some(path) = &settings.output {
        write_json(path, &network)?;
        tracing::info!("Wrote {} ways to {}", network.way_count(), path.display());
    }
    if let Some(path) = &settings.plan {
        let plan = FetchPlan {
            reference: outcome.reference.as_deref(),
            rects: &outcome.fetch_plan,
        };
        write_json(path, &plan)?;
    }

    Ok(())
}

fn report(outcome: &Outcome) {
    let report = &outcome.report;
    if let Some(focus) = outcome.focus {
        tracing::info!("Review around lat {:.6}, lon {:.6}", focus.y, focus.x);
    }
    tracing::info!(
        "{} ways processed, {} skipped: {} nodes moved, {} added, {} removed, {} conflicts",
        report.ways_processed,
        report.ways_skipped,
        report.vertices_moved,
        report.vertices_inserted,
        report.vertices_deleted,
        report.conflicts
    );

    let diagnostics = &report.diagnostics;
    if let (Some(title), Some(summary)) = (diagnostics.title(), diagnostics.summary()) {
        if diagnostics.has_errors() {
            tracing::error!("{title}\n{summary}");
        } else {
            tracing::warn!("{title}\n{summary}");
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CliError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
