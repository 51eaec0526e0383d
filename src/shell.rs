//! Interactive shell.
//!
//! A line-oriented loop over stdin. Each line is parsed into a [`Command`]
//! and applied to the [`Dashboard`]; the output of every command is printed
//! before the next prompt.

use crate::cli::OutputFormat;
use crate::dashboard::{Dashboard, View, SELECT_PROMPT};
use crate::navigation::parse_path;
use crate::report::{render_tree, render_view};
use anyhow::{Context, Result};
use std::io::Write;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
Commands:
  ls                 List children of the current node
  cd <label>         Open a child of the current node
  cd ..              Go to the parent node
  cd /               Go to the root
  select <a/b/c>     Select a node by path
  show               Show the current node
  tree               Show the navigation tree
  expand [a/b]       Expand a node (default: current)
  collapse [a/b]     Collapse a node (default: current)
  toggle [a/b]       Toggle a node (default: current)
  reload             Reload every data source
  stats              Show what was loaded
  help               Show this help
  quit, exit         Leave the shell";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open(String),
    Up,
    Home,
    Select(Vec<String>),
    Show,
    Tree,
    Expand(Vec<String>),
    Collapse(Vec<String>),
    Toggle(Vec<String>),
    Reload,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}', type 'help' for a list of commands")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "ls" => Command::List,
        "cd" => match arg {
            "" | "/" => Command::Home,
            ".." => Command::Up,
            label => Command::Open(label.to_string()),
        },
        "select" => {
            let path = parse_path(arg);
            if path.is_empty() {
                return Err(ParseError::MissingArgument("select"));
            }
            Command::Select(path)
        }
        "show" => Command::Show,
        "tree" => Command::Tree,
        "expand" => Command::Expand(parse_path(arg)),
        "collapse" => Command::Collapse(parse_path(arg)),
        "toggle" => Command::Toggle(parse_path(arg)),
        "reload" => Command::Reload,
        "stats" => Command::Stats,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

/// What the loop does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Reload,
    Quit,
}

/// Apply a command to the dashboard. Reloading is left to the caller.
pub fn apply(dashboard: &mut Dashboard, command: Command, format: OutputFormat) -> Result<Outcome> {
    let output = match command {
        Command::List => {
            let view = dashboard.view_of(&current_or_root(dashboard));
            match view {
                View::Node(node) if !node.children.is_empty() => {
                    node.children.join("\n")
                }
                View::Node(_) => "(no children)".to_string(),
                View::Placeholder { message } => message,
            }
        }
        Command::Open(label) => {
            if dashboard.open_child(&label) {
                show(dashboard, format)?
            } else {
                SELECT_PROMPT.to_string()
            }
        }
        Command::Up => {
            dashboard.go_up();
            show(dashboard, format)?
        }
        Command::Home => {
            dashboard.go_home();
            show(dashboard, format)?
        }
        Command::Select(path) => {
            let path = dashboard.absolute_path(&path);
            if dashboard.select(&path) {
                show(dashboard, format)?
            } else {
                SELECT_PROMPT.to_string()
            }
        }
        Command::Show => show(dashboard, format)?,
        Command::Tree => render_tree(
            &dashboard.data().navigation,
            dashboard.expanded(),
            dashboard.selection(),
        ),
        Command::Expand(path) => {
            let path = target(dashboard, &path);
            if dashboard.expand(&path) {
                format!("Expanded {}", path.join("/"))
            } else {
                format!("Nothing to expand at {}", path.join("/"))
            }
        }
        Command::Collapse(path) => {
            let path = target(dashboard, &path);
            if dashboard.collapse(&path) {
                format!("Collapsed {}", path.join("/"))
            } else {
                format!("{} is not expanded", path.join("/"))
            }
        }
        Command::Toggle(path) => {
            let path = target(dashboard, &path);
            let state = if dashboard.toggle(&path) {
                "expanded"
            } else {
                "collapsed"
            };
            format!("{} is {}", path.join("/"), state)
        }
        Command::Stats => stats_text(dashboard),
        Command::Help => HELP.to_string(),
        Command::Reload => return Ok(Outcome::Reload),
        Command::Quit => return Ok(Outcome::Quit),
    };

    Ok(Outcome::Continue(output))
}

fn show(dashboard: &Dashboard, format: OutputFormat) -> Result<String> {
    render_view(&dashboard.view(), format)
}

fn current_or_root(dashboard: &Dashboard) -> Vec<String> {
    if dashboard.selection().is_empty() {
        vec![dashboard.root_label().to_string()]
    } else {
        dashboard.selection().to_vec()
    }
}

fn target(dashboard: &Dashboard, path: &[String]) -> Vec<String> {
    if path.is_empty() {
        current_or_root(dashboard)
    } else {
        dashboard.absolute_path(path)
    }
}

/// Summary of the loaded data sets.
pub fn stats_text(dashboard: &Dashboard) -> String {
    let data = dashboard.data();
    let sources = dashboard.sources();
    let describe = |source: &Option<crate::ingest::DataSource>| {
        source
            .as_ref()
            .map(|s| {
                if s.is_remote() {
                    format!("{} (remote)", s)
                } else {
                    s.to_string()
                }
            })
            .unwrap_or_else(|| "(not configured)".to_string())
    };

    let mut lines = vec![
        format!("KPI source:     {}", describe(&sources.kpis)),
        format!("Claims source:  {}", describe(&sources.claims)),
        format!("CSV source:     {}", describe(&sources.csv)),
        format!("Providers:      {}", data.kpis.len()),
        format!("Facilities:     {}", data.navigation.children.len()),
        format!("Claim rows:     {}", data.claim_rows),
    ];

    if let Some(stats) = data.stats {
        lines.push(format!(
            "Aggregated:     {} accepted, {} dropped (date {}, amount {}, uncategorized {}, provider {}, overflow {})",
            stats.accepted,
            stats.dropped(),
            stats.dropped_bad_date,
            stats.dropped_bad_amount,
            stats.dropped_uncategorized,
            stats.dropped_missing_provider,
            stats.dropped_overflow
        ));
    }

    if let Some(ref totals) = data.csv_totals {
        lines.push(format!(
            "CSV rows:       {} accepted, {} dropped, {} billed",
            totals.stats.accepted,
            totals.stats.dropped(),
            totals.bucket.total()
        ));
    }

    match data.loaded_at {
        Some(at) => lines.push(format!("Loaded at:      {}", at.format("%Y-%m-%d %H:%M:%S"))),
        None => lines.push("Loaded at:      (never)".to_string()),
    }

    lines.join("\n")
}

fn prompt(dashboard: &Dashboard) -> Result<()> {
    let location = if dashboard.selection().is_empty() {
        String::new()
    } else {
        dashboard.selection().join("/")
    };
    let mut stdout = std::io::stdout();
    write!(stdout, "kpiboard:/{}> ", location)?;
    stdout.flush().context("Failed to flush stdout")
}

/// Run the shell until `quit` or end of input.
pub async fn run_shell(dashboard: &mut Dashboard, format: OutputFormat) -> Result<()> {
    println!("kpiboard v{}. Type 'help' for commands.", env!("CARGO_PKG_VERSION"));
    println!("{}", render_view(&dashboard.view(), format)?.trim_end());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt(dashboard)?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            println!();
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        debug!("Shell command: {:?}", command);

        match apply(dashboard, command, format)? {
            Outcome::Continue(output) => println!("{}", output.trim_end()),
            Outcome::Reload => {
                dashboard.load().await;
                println!("{}", stats_text(dashboard));
            }
            Outcome::Quit => break,
        }
    }

    Ok(())
}
