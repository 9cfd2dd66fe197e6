use std::io::Write;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use fundperf::app::App;
use fundperf::config::{ConfigLoader, ResolvedConfig};
use fundperf::domain::{RequestCombination, RunTimestamp};
use fundperf::driver::AuthPolicy;
use fundperf::error::FundPerfError;
use fundperf::fetch::{FetchClient, FetchOutcome, FundFetcher, TransientCause};
use fundperf::frontend::Frontend;
use fundperf::output::{JsonOutput, LogProgress, OutputMode, print_batch_summary};
use fundperf::store::{PartitionedStore, ReportDir};
use fundperf::taxonomy::{CombinationPlan, TaxonomyRegistry};

#[derive(Parser)]
#[command(name = "fundperf")]
#[command(about = "Harvest AMFI fund-performance tables into formatted Excel workbooks")]
#[command(version)]
struct Cli {
    /// Path to fundperf.json (defaults to ./fundperf.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Gateway report date, e.g. 24-Apr-2024
    #[arg(long, global = true)]
    report_date: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every combination and write one partitioned workbook per combination")]
    Batch(BatchArgs),
    #[command(about = "Fetch every combination and write one merged workbook under the static dir")]
    Export(ExportArgs),
    #[command(about = "Copy a previously generated workbook out of the static dir")]
    Download(DownloadArgs),
    #[command(about = "List the combinations a run would request")]
    Plan,
    #[command(about = "Print the landing page HTML")]
    Page,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    /// Skip remaining combinations after the first 401/403
    #[arg(long)]
    stop_on_auth_failure: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long)]
    static_dir: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct DownloadArgs {
    filename: String,

    /// Destination file; stdout when omitted
    #[arg(long)]
    out: Option<Utf8PathBuf>,

    #[arg(long)]
    static_dir: Option<Utf8PathBuf>,
}

/// Stand-in fetcher for commands that never touch the gateway.
struct NopFetcher;

impl FundFetcher for NopFetcher {
    fn fetch(&self, _combination: &RequestCombination) -> FetchOutcome {
        FetchOutcome::TransientFailure(TransientCause::Error("offline command".to_string()))
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FundPerfError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FundPerfError) -> u8 {
    match error {
        FundPerfError::ReportNotFound(_)
        | FundPerfError::InvalidReportName(_)
        | FundPerfError::ConfigRead(_)
        | FundPerfError::ConfigParse(_) => 2,
        FundPerfError::Http(_) | FundPerfError::MissingCredential | FundPerfError::NoData => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let registry = TaxonomyRegistry::standard();
    let mut config = ConfigLoader::resolve(cli.config.as_deref(), &registry)?;
    if let Some(date) = &cli.report_date {
        config.report_date = date.parse()?;
    }

    match cli.command {
        Commands::Batch(args) => run_batch(args, registry, config, output_mode),
        Commands::Export(args) => run_export(args, registry, config),
        Commands::Download(args) => run_download(args, registry, config),
        Commands::Plan => run_plan(&registry, &config, output_mode),
        Commands::Page => {
            let frontend = offline_frontend(registry, &config, None);
            print!("{}", frontend.landing_page());
            Ok(())
        }
    }
}

fn run_batch(
    args: BatchArgs,
    registry: TaxonomyRegistry,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.stop_on_auth_failure {
        config.stop_on_auth_failure = true;
    }

    let plan = batch_plan(&config);
    let client = FetchClient::from_config(&config)?;
    let app = App::new(
        registry,
        client,
        AuthPolicy::from_flag(config.stop_on_auth_failure),
        PartitionedStore::new(config.output_dir.clone()),
        ReportDir::new(config.static_dir.clone()),
    );
    let report = app.run_batch(&plan, RunTimestamp::now(), &LogProgress);

    match output_mode {
        OutputMode::Json => JsonOutput::print_batch(&report).into_diagnostic()?,
        OutputMode::Human => print_batch_summary(&report),
    }
    Ok(())
}

fn run_export(
    args: ExportArgs,
    registry: TaxonomyRegistry,
    mut config: ResolvedConfig,
) -> miette::Result<()> {
    if let Some(dir) = args.static_dir {
        config.static_dir = dir;
    }
    let plan = CombinationPlan {
        maturity_types: registry.maturity_types().to_vec(),
        fund_id: config.fund_id,
        report_date: config.report_date,
    };
    let response = match FetchClient::from_config(&config) {
        Ok(client) => {
            let app = App::new(
                registry,
                client,
                AuthPolicy::from_flag(config.stop_on_auth_failure),
                PartitionedStore::new(config.output_dir.clone()),
                ReportDir::new(config.static_dir.clone()),
            );
            Frontend::new(app, plan).generate(&LogProgress)
        }
        Err(err) => fundperf::frontend::GenerateResponse::failed(err.to_string()),
    };
    JsonOutput::print_generate(&response).into_diagnostic()?;
    Ok(())
}

fn run_download(
    args: DownloadArgs,
    registry: TaxonomyRegistry,
    config: ResolvedConfig,
) -> miette::Result<()> {
    let frontend = offline_frontend(registry, &config, args.static_dir);
    let file = frontend.download(&args.filename)?;
    let bytes = file.bytes()?;
    match args.out {
        Some(out) => {
            std::fs::write(out.as_std_path(), &bytes).into_diagnostic()?;
            eprintln!("wrote {} ({} bytes)", out, bytes.len());
        }
        None => std::io::stdout().write_all(&bytes).into_diagnostic()?,
    }
    Ok(())
}

fn run_plan(
    registry: &TaxonomyRegistry,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let plan = batch_plan(config);
    let combinations: Vec<_> = registry.all_combinations(&plan).collect();
    match output_mode {
        OutputMode::Json => {
            let payloads: Vec<_> = combinations.iter().map(|c| c.payload()).collect();
            let json = serde_json::to_string_pretty(&payloads).into_diagnostic()?;
            println!("{json}");
        }
        OutputMode::Human => {
            println!(
                "taxonomy v{}: {} combinations",
                registry.version(),
                combinations.len()
            );
            for (index, combination) in combinations.iter().enumerate() {
                println!("{:>3}. {combination}", index + 1);
            }
        }
    }
    Ok(())
}

fn batch_plan(config: &ResolvedConfig) -> CombinationPlan {
    CombinationPlan {
        maturity_types: config.maturity_types.clone(),
        fund_id: config.fund_id,
        report_date: config.report_date,
    }
}

fn offline_frontend(
    registry: TaxonomyRegistry,
    config: &ResolvedConfig,
    static_dir: Option<Utf8PathBuf>,
) -> Frontend<NopFetcher> {
    let plan = batch_plan(config);
    let app = App::new(
        registry,
        NopFetcher,
        AuthPolicy::Continue,
        PartitionedStore::new(config.output_dir.clone()),
        ReportDir::new(static_dir.unwrap_or_else(|| config.static_dir.clone())),
    );
    Frontend::new(app, plan)
}
