//! CLI entry point for `docharvest`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use docharvest::bundle::{build_bundle, BundleOptions, BundleReport};
use docharvest::config::Config;
use docharvest::feed::{open_feed, ChannelId, DocumentFilter, FeedSource};
use docharvest::scan::{DownloadState, ScanOptions, ScanReport, Scanner};

#[derive(Parser)]
#[command(
    name = "docharvest",
    version,
    about = "Harvest document attachments from a message feed and build deduplicated upload bundles"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Download new document attachments from a feed channel
    Scan {
        /// Channel to scan: an MBOX path for the mbox source, a numeric id or @name for http
        #[arg(long, env = "DOCHARVEST_CHANNEL")]
        channel: String,
        /// Feed backend (defaults to feed.source from the config file)
        #[arg(long, value_enum)]
        source: Option<FeedSource>,
        /// Output directory for downloaded documents
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// State file used to resume and avoid duplicate downloads
        #[arg(long)]
        state_file: Option<PathBuf>,
        /// Maximum number of messages to scan (0 = no limit)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Only consider messages with an id above this value
        #[arg(long, default_value_t = 0)]
        min_message_id: u64,
        #[arg(long)]
        json: bool,
    },
    /// Deduplicate downloaded documents into an upload bundle with manifests
    Bundle {
        /// Directory tree containing documents (searched recursively)
        #[arg(long)]
        in_dir: Option<PathBuf>,
        /// Output directory for the bundle
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Remove previously bundled documents before copying
        #[arg(long)]
        clean: bool,
        /// Fingerprint files one at a time
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show download state and the current high-water mark
    State {
        #[arg(long)]
        state_file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = docharvest::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Scan {
            channel,
            source,
            out_dir,
            state_file,
            limit,
            min_message_id,
            json,
        } => {
            let source = source.unwrap_or(config.feed.source);
            let options = ScanOptions {
                channel: channel.parse::<ChannelId>()?,
                out_dir: out_dir.unwrap_or_else(|| config.scan.out_dir.clone()),
                state_file: state_file.unwrap_or_else(|| config.scan.state_file.clone()),
                limit: (limit > 0).then_some(limit),
                min_message_id,
                filter: DocumentFilter::from_config(&config.documents),
            };
            cmd_scan(&config, source, options, json)
        }
        Commands::Bundle {
            in_dir,
            out_dir,
            clean,
            sequential,
            json,
        } => {
            let options = BundleOptions {
                in_dir: in_dir.unwrap_or_else(|| config.bundle.in_dir.clone()),
                out_dir: out_dir.unwrap_or_else(|| config.bundle.out_dir.clone()),
                documents_subdir: config.bundle.documents_subdir.clone(),
                filter: DocumentFilter::from_config(&config.documents),
                chunk_size: config.bundle.hash_chunk_size,
                parallel: config.bundle.parallel && !sequential,
                clean,
            };
            cmd_bundle(&options, json)
        }
        Commands::State { state_file, json } => {
            let state_file = state_file.unwrap_or_else(|| config.scan.state_file.clone());
            cmd_state(&state_file, json)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = docharvest::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender =
            tracing_appender::rolling::never(&log_dir, docharvest::config::LOG_FILE_NAME);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "docharvest", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Scan a feed channel and download new documents.
fn cmd_scan(
    config: &Config,
    source: FeedSource,
    options: ScanOptions,
    json: bool,
) -> anyhow::Result<()> {
    // Configuration problems surface here, before any disk or network I/O.
    let mut feed = open_feed(source, config)?;

    let mut state = DownloadState::load(&options.state_file)?;
    std::fs::create_dir_all(&options.out_dir)?;

    feed.connect(&options.channel)?;

    let pb = match options.limit {
        Some(limit) => {
            let pb = ProgressBar::new(limit as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} Scanning [{bar:40.cyan/blue}] {pos}/{len} msg")
                    .expect("valid template")
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} Scanning {pos} msg ({per_sec})")
                    .expect("valid template"),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        }
    };

    let start = Instant::now();
    let scanner = Scanner::new(feed.as_ref(), options);
    let result = scanner.run(
        &mut state,
        Some(&|scanned: usize| {
            pb.set_position(scanned as u64);
        }),
    );
    pb.finish_and_clear();
    let report = result?;

    if json {
        print_scan_json(&report, start.elapsed())?;
    } else {
        print_scan_table(&report, config.scan.recent_downloads_shown);
    }
    Ok(())
}

/// Build an upload bundle.
fn cmd_bundle(options: &BundleOptions, json: bool) -> anyhow::Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Hashing [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let result = build_bundle(
        options,
        Some(&|done: usize, total: usize| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        }),
    );
    pb.finish_and_clear();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_bundle_table(&report);
    }
    Ok(())
}

/// Summarize the download state.
fn cmd_state(state_file: &Path, json: bool) -> anyhow::Result<()> {
    let state = DownloadState::load(state_file)?;

    if json {
        let out = serde_json::json!({
            "state_file": state_file.to_string_lossy(),
            "downloaded": state.len(),
            "high_water_mark": state.high_water_mark(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {:<22} {}", "State file", state_file.display());
    println!("  {:<22} {}", "Downloaded documents", state.len());
    match state.high_water_mark() {
        Some(mark) => println!("  {:<22} {}", "High-water mark", mark),
        None => println!("  {:<22} -", "High-water mark"),
    }
    println!();
    Ok(())
}

fn print_scan_table(report: &ScanReport, recent: usize) {
    println!("Scanned messages: {}", report.scanned);
    println!("New documents downloaded: {}", report.downloaded.len());
    if !report.failed.is_empty() {
        println!("Failed downloads (will retry next run): {}", report.failed.len());
        for f in &report.failed {
            println!("- {}: {}", f.message_id, f.reason);
        }
    }
    if !report.downloaded.is_empty() && recent > 0 {
        println!("Latest downloads:");
        let skip = report.downloaded.len().saturating_sub(recent);
        for r in &report.downloaded[skip..] {
            println!("- {}: {}", r.message_id, r.file_path.display());
        }
    }
}

fn print_scan_json(report: &ScanReport, elapsed: Duration) -> anyhow::Result<()> {
    let mut value = serde_json::to_value(report)?;
    value["elapsed_ms"] = serde_json::json!(elapsed.as_millis() as u64);
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_bundle_table(report: &BundleReport) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<26} {}", "Input documents found", report.input_files);
    println!("  {:<26} {}", "Unique documents bundled", report.unique_files);
    println!("  {:<26} {}", "Duplicates skipped", report.duplicates_skipped);
    println!(
        "  {:<26} {}",
        "Bundled size",
        format_size(report.bytes_bundled, BINARY)
    );
    println!("  {:<26} {}", "Bundle folder", report.out_dir.display());
    println!("  {:<26} {}", "Manifest (JSON)", report.json_manifest.display());
    println!("  {:<26} {}", "Manifest (CSV)", report.csv_manifest.display());
    println!();
}
