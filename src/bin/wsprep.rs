use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use watershed_prep::app::{self, AcquireOptions, App};
use watershed_prep::config::ConfigLoader;
use watershed_prep::crs::Crs;
use watershed_prep::domain::RegionSelector;
use watershed_prep::error::PrepError;
use watershed_prep::fetch::HttpFetcher;
use watershed_prep::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "wsprep")]
#[command(about = "Prepare outlets and MERIT-Hydro datasets for watershed delineation")]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download rasters and vectors for region codes (or `all`)")]
    Fetch(FetchArgs),
    #[command(about = "Normalize an outlet CSV or GeoJSON into the canonical outlet table")]
    Outlets(OutletArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Region codes such as `11 12`, `11,12` or `all`.
    #[arg(required = true, num_args = 1..)]
    region: Vec<String>,

    /// Root of the canonical dataset tree.
    #[arg(long)]
    path: Option<PathBuf>,

    #[arg(long)]
    config: Option<String>,

    /// Number of region codes processed concurrently.
    #[arg(long)]
    jobs: Option<usize>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct OutletArgs {
    input: PathBuf,

    #[arg(long, short, default_value = "outlets.csv")]
    output: PathBuf,

    /// CRS of the input coordinates, e.g. EPSG:3857. Overrides the file.
    #[arg(long)]
    crs: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PrepError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PrepError) -> u8 {
    match error {
        PrepError::Schema { .. }
        | PrepError::UnsupportedFormat(_)
        | PrepError::InvalidRegionCode(_)
        | PrepError::NonPointGeometry { .. }
        | PrepError::InvalidCoordinate { .. }
        | PrepError::Crs(_) => 2,
        PrepError::Fetch { .. } | PrepError::Archive { .. } => 3,
        _ => 1,
    }
}

/// `RUST_LOG` when set and valid, otherwise warnings and errors.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Outlets(args) => run_outlets(args, output_mode),
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let selector = RegionSelector::from_args(&args.region)?;

    let mut settings = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(path) = args.path {
        let path = camino::Utf8PathBuf::from_path_buf(path)
            .map_err(|path| PrepError::Filesystem(format!("non-utf8 path {}", path.display())))?;
        settings = settings.with_base_path(path);
    }
    if let Some(jobs) = args.jobs {
        settings.jobs = jobs.max(1);
    }

    let fetcher = HttpFetcher::new(&settings)?;
    let app = App::new(settings, fetcher);
    let options = AcquireOptions {
        dry_run: args.dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.acquire(&selector, options, &JsonOutput)?;
            JsonOutput::print_acquire(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.acquire(&selector, options, &TextOutput)?;
            TextOutput::print_acquire(&result);
        }
    }
    Ok(())
}

fn run_outlets(args: OutletArgs, output_mode: OutputMode) -> miette::Result<()> {
    let crs = args.crs.as_deref().map(str::parse::<Crs>).transpose()?;

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app::normalize_outlets(&args.input, &args.output, crs, &JsonOutput)?;
            JsonOutput::print_normalize(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app::normalize_outlets(&args.input, &args.output, crs, &TextOutput)?;
            TextOutput::print_normalize(&result);
        }
    }
    Ok(())
}
