//! kpiboard - provider billing and visit KPI dashboard
//!
//! A CLI tool that loads provider KPI data and claims exports from files or
//! URLs, builds the facility to provider navigation tree and renders the
//! selected provider's monthly table.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, unreadable configuration or a failed offline tool

mod analysis;
mod cli;
mod config;
mod dashboard;
mod ingest;
mod models;
mod navigation;
mod report;
mod shell;

use anyhow::{Context, Result};
use cli::{Args, Mode, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use dashboard::{Dashboard, Sources};
use indicatif::{ProgressBar, ProgressStyle};
use ingest::{DataSource, Loader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    init_logging(level)?;

    info!("kpiboard v{}", env!("CARGO_PKG_VERSION"));
    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args, &config).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .kpiboard.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to point at your data sources and adjust the display.");
    Ok(())
}

/// Initialize logging. Log lines go to stderr so rendered output stays clean.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load configuration from an explicit path, the default file, or defaults.
///
/// Returns the path the configuration came from, if any.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        None => Ok((Config::default(), None)),
    }
}

/// Dispatch on the selected mode.
async fn run(args: &Args, config: &Config) -> Result<()> {
    let output = config.general.output.as_deref().map(Path::new);

    match args.mode() {
        Mode::InitConfig => handle_init_config(),
        Mode::CombineReports(dir) => handle_combine_reports(&dir, output, !args.quiet),
        Mode::BuildKpis(source) => handle_build_kpis(&source, config, output).await,
        Mode::ConvertCsv(file) => handle_convert_csv(&file, output),
        Mode::Render => {
            let dashboard = load_dashboard(config, args.quiet).await?;
            let selection = if args.select.is_some() {
                dashboard.absolute_path(&args.selection())
            } else {
                vec![dashboard.root_label().to_string()]
            };
            let view = dashboard.view_of(&selection);
            let content = report::render_view(&view, config.display.format)?;
            write_output(&content, output)
        }
        Mode::Tree => {
            let mut dashboard = load_dashboard(config, args.quiet).await?;
            expand_initial(&mut dashboard, args.expand_all);
            if args.select.is_some() {
                let selection = dashboard.absolute_path(&args.selection());
                dashboard.select(&selection);
            }

            let content = match config.display.format {
                OutputFormat::Json => serde_json::to_string_pretty(&dashboard.data().navigation)
                    .context("Failed to serialize navigation tree")?,
                _ => report::render_tree(
                    &dashboard.data().navigation,
                    dashboard.expanded(),
                    dashboard.selection(),
                ),
            };
            write_output(&content, output)
        }
        Mode::Interactive => {
            let mut dashboard = load_dashboard(config, args.quiet).await?;
            expand_initial(&mut dashboard, args.expand_all);
            if args.select.is_some() {
                let selection = dashboard.absolute_path(&args.selection());
                dashboard.select(&selection);
            }
            shell::run_shell(&mut dashboard, config.display.format).await
        }
    }
}

fn expand_initial(dashboard: &mut Dashboard, expand_all: bool) {
    if expand_all {
        dashboard.expand_all();
    } else {
        let root = vec![dashboard.root_label().to_string()];
        dashboard.expand(&root);
    }
}

/// Build the dashboard and load every configured source.
async fn load_dashboard(config: &Config, quiet: bool) -> Result<Dashboard> {
    let loader = Loader::new(config.data.timeout()).context("Failed to create loader")?;
    let sources = Sources::from_config(&config.data);
    debug!("Sources: {:?}", sources);

    let mut dashboard = Dashboard::new(sources, loader, config.display.clone());

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };
    spinner.set_message("Loading data sources...");

    dashboard.load().await;

    spinner.finish_and_clear();
    Ok(dashboard)
}

/// Handle --combine-reports: merge monthly CSV directories into one JSON document.
fn handle_combine_reports(dir: &Path, output: Option<&Path>, show_progress: bool) -> Result<()> {
    info!("Combining reports under {}", dir.display());

    let combined = ingest::reports::combine_monthly_reports(dir, show_progress)
        .with_context(|| format!("Failed to combine reports in {}", dir.display()))?;

    let content =
        serde_json::to_string_pretty(&combined).context("Failed to serialize combined report")?;
    write_output(&content, output)
}

/// Handle --build-kpis: aggregate a combined report into provider KPI JSON.
async fn handle_build_kpis(source: &str, config: &Config, output: Option<&Path>) -> Result<()> {
    let source = DataSource::from(source);
    let loader = Loader::new(config.data.timeout()).context("Failed to create loader")?;

    let text = loader
        .fetch_text(&source)
        .await
        .with_context(|| format!("Failed to read combined report {}", source))?;
    let report = ingest::reports::parse_detailed_report(&text, &source.to_string())?;

    let aggregation = analysis::aggregate_detailed_report(&report);
    info!(
        "Built KPIs for {} providers ({} rows, {} skipped)",
        aggregation.summaries.len(),
        aggregation.stats.accepted,
        aggregation.stats.dropped()
    );

    let content = serde_json::to_string_pretty(&aggregation.summaries)
        .context("Failed to serialize provider KPIs")?;
    write_output(&content, output)
}

/// Handle --convert-csv: convert a header-based CSV into a JSON array of objects.
fn handle_convert_csv(file: &Path, output: Option<&Path>) -> Result<()> {
    let rows = ingest::reports::read_csv_rows(file)
        .with_context(|| format!("Failed to convert {}", file.display()))?;
    info!("Converted {} rows from {}", rows.len(), file.display());

    let content = serde_json::to_string_pretty(&rows).context("Failed to serialize rows")?;
    write_output(&content, output)
}

/// Write to the output file, creating parent directories, or to stdout.
fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
