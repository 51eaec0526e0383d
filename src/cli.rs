//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// kpiboard - provider billing and visit KPI dashboard
///
/// Loads provider KPIs and claims exports from files or URLs, builds the
/// facility and provider navigation tree, and renders the selected
/// provider's monthly table.
///
/// Examples:
///   kpiboard --select "Overall/ALAMANCE HEALTH CARE CENTER/Jane Smith"
///   kpiboard --kpis https://example.com/data/provider_kpis.json --tree
///   kpiboard --claims claims_data.json --kpis "" --format markdown
///   kpiboard --interactive
///   kpiboard --combine-reports "exports/Detailed Charges Report" -o detailed.json
///   kpiboard --build-kpis detailed.json -o data/provider_kpis.json
///   kpiboard --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Provider KPI JSON (path or http(s) URL)
    ///
    /// Pass an empty value to derive summaries from the claims export instead.
    #[arg(long, value_name = "SOURCE", env = "KPIBOARD_KPIS")]
    pub kpis: Option<String>,

    /// Claims JSON export used for the navigation tree (path or URL)
    #[arg(long, value_name = "SOURCE", env = "KPIBOARD_CLAIMS")]
    pub claims: Option<String>,

    /// Submitted-claims CSV summed by month (path or URL)
    #[arg(long, value_name = "SOURCE", env = "KPIBOARD_CSV")]
    pub csv: Option<String>,

    /// Navigation path to show, labels separated by '/'
    ///
    /// Example: --select "Overall/AHOSKIE HEALTH AND REHAB/John Arney"
    #[arg(short, long, value_name = "PATH")]
    pub select: Option<String>,

    /// Output format (text, markdown, json)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the navigation tree
    #[arg(long)]
    pub tree: bool,

    /// Expand every node when printing the tree
    #[arg(long)]
    pub expand_all: bool,

    /// Start an interactive shell
    #[arg(short, long)]
    pub interactive: bool,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .kpiboard.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress)
    #[arg(short, long)]
    pub quiet: bool,

    /// Combine a tree of monthly CSV report directories into one JSON file
    #[arg(long, value_name = "DIR")]
    pub combine_reports: Option<PathBuf>,

    /// Build provider KPI JSON from a combined report (path or URL)
    #[arg(long, value_name = "SOURCE")]
    pub build_kpis: Option<String>,

    /// Convert a CSV file with a header row into a JSON array of objects
    #[arg(long, value_name = "FILE")]
    pub convert_csv: Option<PathBuf>,

    /// Generate a default .kpiboard.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for rendered views.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned plain text (default)
    #[default]
    Text,
    /// Markdown tables
    Markdown,
    /// JSON document
    Json,
}

/// What a run does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Render the selected view once.
    Render,
    /// Print the navigation tree.
    Tree,
    /// Interactive shell.
    Interactive,
    CombineReports(PathBuf),
    BuildKpis(String),
    ConvertCsv(PathBuf),
    InitConfig,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The selected mode; validation guarantees at most one mode flag is set.
    pub fn mode(&self) -> Mode {
        if self.init_config {
            Mode::InitConfig
        } else if let Some(ref dir) = self.combine_reports {
            Mode::CombineReports(dir.clone())
        } else if let Some(ref source) = self.build_kpis {
            Mode::BuildKpis(source.clone())
        } else if let Some(ref file) = self.convert_csv {
            Mode::ConvertCsv(file.clone())
        } else if self.interactive {
            Mode::Interactive
        } else if self.tree {
            Mode::Tree
        } else {
            Mode::Render
        }
    }

    /// Labels of the --select path.
    pub fn selection(&self) -> Vec<String> {
        self.select
            .as_deref()
            .map(crate::navigation::parse_path)
            .unwrap_or_default()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        let modes = [
            self.init_config,
            self.combine_reports.is_some(),
            self.build_kpis.is_some(),
            self.convert_csv.is_some(),
            self.interactive,
            self.tree,
        ];
        if modes.iter().filter(|m| **m).count() > 1 {
            return Err(
                "Use only one of --init-config, --combine-reports, --build-kpis, \
                 --convert-csv, --interactive and --tree"
                    .to_string(),
            );
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.interactive && self.output.is_some() {
            return Err("--output cannot be used with --interactive".to_string());
        }

        if self.expand_all && !(self.tree || self.interactive) {
            return Err("--expand-all requires --tree or --interactive".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref dir) = self.combine_reports {
            if !dir.is_dir() {
                return Err(format!("Report directory does not exist: {}", dir.display()));
            }
        }

        if let Some(ref file) = self.convert_csv {
            if !file.is_file() {
                return Err(format!("CSV file does not exist: {}", file.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            kpis: None,
            claims: None,
            csv: None,
            select: None,
            format: None,
            output: None,
            tree: false,
            expand_all: false,
            interactive: false,
            timeout: None,
            config: None,
            verbose: false,
            quiet: false,
            combine_reports: None,
            build_kpis: None,
            convert_csv: None,
            init_config: false,
        }
    }

    #[test]
    fn test_default_mode_is_render() {
        let args = make_args();
        assert_eq!(args.mode(), Mode::Render);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_modes_are_exclusive() {
        let mut args = make_args();
        args.tree = true;
        args.interactive = true;
        assert!(args.validate().is_err());

        args.interactive = false;
        assert!(args.validate().is_ok());
        assert_eq!(args.mode(), Mode::Tree);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_inputs() {
        let mut args = make_args();
        args.combine_reports = Some(PathBuf::from("/nonexistent/reports"));
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.convert_csv = Some(PathBuf::from("/nonexistent/claims.csv"));
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_expand_all_needs_tree() {
        let mut args = make_args();
        args.expand_all = true;
        assert!(args.validate().is_err());
        args.tree = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_selection_parsing() {
        let mut args = make_args();
        assert!(args.selection().is_empty());
        args.select = Some("Overall/A/Smith, Jane".to_string());
        assert_eq!(args.selection(), vec!["Overall", "A", "Smith, Jane"]);
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
