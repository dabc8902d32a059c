//! Jobs SupaSync CLI

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use jobs_supasync::config::SAMPLE_CONFIG;
use jobs_supasync::{SyncClient, SyncConfig, SyncMode, SyncPhase, SyncReport, SyncStatus};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "jobs-supasync")]
#[command(author, version, about = "Incrementally sync job postings from PostgreSQL to Supabase")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "LOG_FORMAT")]
    log_format: LogFormat,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sync (default)
    Sync {
        /// Fetch and normalize only, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Exit non-zero when the success rate (percent) falls below this
        #[arg(long)]
        min_success_rate: Option<f64>,
    },
    /// Test connectivity
    Test,
    /// Show the sync window and pending row count
    Status,
    /// Generate sample config
    Init {
        #[arg(short, long, default_value = "jobs-supasync.toml")]
        output: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    init_logging(&cli.log_level, cli.log_format, quiet, cli.json);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            // No subscriber is installed in quiet mode
            if quiet {
                eprintln!("Error: {}", e);
            } else {
                error!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Init doesn't need config
    if let Some(Commands::Init { output }) = &cli.command {
        return run_init(output);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => run_sync(config, SyncArgs::default(), cli.json, cli.quiet).await,
        Some(Commands::Sync {
            dry_run,
            batch_size,
            min_success_rate,
        }) => {
            let args = SyncArgs {
                dry_run,
                batch_size,
                min_success_rate,
            };
            run_sync(config, args, cli.json, cli.quiet).await
        }
        Some(Commands::Test) => run_test(config, cli.json).await,
        Some(Commands::Status) => run_status(config, cli.json).await,
        Some(Commands::Init { .. }) => unreachable!(), // Handled above
    }
}

fn load_config(path: Option<&str>) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    if let Some(p) = path {
        info!("Loading config from: {}", p);
        return Ok(SyncConfig::from_file(p)?);
    }

    for default in &["jobs-supasync.toml", ".jobs-supasync.toml"] {
        if std::path::Path::new(default).exists() {
            info!("Loading config from: {}", default);
            return Ok(SyncConfig::from_file(default)?);
        }
    }

    info!("Loading config from environment");
    Ok(SyncConfig::from_env()?)
}

#[derive(Default)]
struct SyncArgs {
    dry_run: bool,
    batch_size: Option<usize>,
    min_success_rate: Option<f64>,
}

async fn run_sync(
    mut config: SyncConfig,
    args: SyncArgs,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(size) = args.batch_size {
        config.sync.batch_size = size;
        config.validate()?;
    }

    let mode = if args.dry_run {
        SyncMode::DryRun
    } else {
        SyncMode::Incremental
    };

    let show_progress = !quiet && !json;
    if show_progress {
        println!("Jobs SupaSync v{}", jobs_supasync::VERSION);
        println!("Mode: {}\n", mode);
    }

    let mut client = SyncClient::new(config).await?;

    let bar = show_progress.then(batch_progress_bar);
    if let Some(pb) = bar.clone() {
        client = client.with_progress(move |progress| {
            if progress.phase != SyncPhase::Writing {
                return;
            }
            match progress.batch {
                None => {
                    pb.set_length(progress.total_records.unwrap_or(0) as u64);
                    pb.set_position(0);
                }
                Some(batch) => {
                    let line = match batch.error {
                        None => format!(
                            "{} Batch {}: Inserted {}/{} rows",
                            style("✓").green(),
                            batch.index,
                            batch.inserted,
                            batch.attempted
                        ),
                        Some(e) => format!("{} Batch {}: Error - {}", style("✗").red(), batch.index, e),
                    };
                    pb.println(line);
                    pb.set_position(progress.records_processed as u64);
                }
            }
        });
    }

    let report = client.sync(mode).await?;
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report);
    }

    if let (Some(min), Some(actual)) = (args.min_success_rate, report.success_percent()) {
        if actual < min {
            return Err(format!("Success rate {:.2}% below threshold {:.2}%", actual, min).into());
        }
    }

    Ok(())
}

fn batch_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} rows ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn print_report(report: &SyncReport) {
    println!();
    println!("Window: {} → {}", report.window.low, report.window.high);
    println!("Fetched: {} rows", report.records_fetched);

    match report.status {
        SyncStatus::NoNewRecords => {
            println!("\n{} No new jobs to sync", style("✓").green());
        }
        SyncStatus::DryRun => {
            println!("Prepared: {} rows (dry run, nothing written)", report.records_prepared);
        }
        SyncStatus::Completed => {
            let icon = if report.is_clean() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!("\n{} Sync complete", icon);
            println!("Total rows inserted successfully: {}", report.rows_inserted);
            if report.rows_failed > 0 {
                println!(
                    "Total rows with errors: {} ({} batches)",
                    report.rows_failed,
                    report.failed_batches()
                );
            }
            if report.rows_unconfirmed > 0 {
                println!("Rows not confirmed: {}", report.rows_unconfirmed);
            }
            if let Some(percent) = report.success_percent() {
                println!("Success rate: {:.2}%", percent);
            }
        }
    }
    println!("Duration: {}ms", report.duration_ms);
}

async fn run_test(config: SyncConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("Testing connectivity...\n");
    }

    let client = SyncClient::new(config).await?;
    client.test_connectivity().await?;

    if json {
        println!(r#"{{"postgres":"ok","supabase":"ok"}}"#);
    } else {
        println!("\n{} All connectivity tests passed!", style("✓").green());
    }
    Ok(())
}

async fn run_status(config: SyncConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let client = SyncClient::new(config).await?;
    let (window, pending) = client.pending().await?;

    if json {
        let status = serde_json::json!({
            "window": window,
            "pending": pending,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Sync window\n");
        println!("  low:  {}", window.low);
        println!("  high: {}", window.high);
        if window.is_full_resync() {
            println!("  (full resync)");
        }
        println!("\nPending: {} jobs", pending);
    }
    Ok(())
}

fn run_init(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(output, SAMPLE_CONFIG)?;
    println!("✓ Created: {}", output);
    println!("\nEdit the file or use environment variables:");
    println!("  PSQL_KEY, SUPABASE_URL, SUPABASE_KEY");
    Ok(())
}

fn init_logging(level: &str, format: LogFormat, quiet: bool, json_output: bool) {
    if quiet {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Keep stdout clean for the JSON report
    match (format, json_output) {
        (LogFormat::Json, true) => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        (LogFormat::Json, false) => fmt().json().with_env_filter(filter).init(),
        (LogFormat::Text, true) => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        (LogFormat::Text, false) => fmt().with_env_filter(filter).with_target(false).init(),
    }
}
