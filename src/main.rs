//! cseview - Progressive browser for oneM2M resource trees.
//!
//! Usage:
//!   cseview --base URL tree          Load the whole tree and print it
//!   cseview --base URL get PATH      Resolve one path on demand
//!   cseview --base URL stats         Load the whole tree and show counts
//!   cseview --base URL export        Export the loaded tree to JSON
//!   cseview --base URL browse        Load in the background, read
//!                                    `expand PATH` / `select PATH` from stdin
//!   cseview --help                   Show help

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cseview_core::{ExpansionMode, NodePath, ResourceNode, SyncConfig};
use cseview_fetch::HttpResourceClient;
use cseview_sync::{
    ExpandOutcome, Session, SurfaceEvent, SurfaceResponse, SyncComplete, SyncEvent,
};

/// Capacity of the channel carrying on-demand expansion results.
const SURFACE_CHANNEL_SIZE: usize = 64;

#[derive(Parser)]
#[command(
    name = "cseview",
    version,
    about = "Progressive browser for oneM2M resource trees",
    long_about = "cseview mirrors the resource hierarchy below a base container.\n\n\
                  The first level is fetched at startup; the rest is filled in \
                  batch by batch, or on demand for a single path with `get`."
)]
struct Cli {
    /// TOML file with session settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base container address (overrides the config file)
    #[arg(short, long, global = true)]
    base: Option<String>,

    /// Fetch only direct children when expanding on demand
    #[arg(long, global = true)]
    shallow: bool,

    /// Top-level branches loaded per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, global = true)]
    batch_delay_ms: Option<u64>,

    /// Log verbosely (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the whole tree and print it
    Tree {
        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Show all levels (no depth limit on display)
        #[arg(short, long)]
        all: bool,

        /// Number of entries to show per branch
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Resolve a single path and print its content or children
    Get {
        /// Slash-separated path starting with the base container name
        path: String,
    },

    /// Load the whole tree and show summary counts
    Stats,

    /// Load the whole tree and export it to JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the tree in the background while answering commands on stdin
    Browse,
}

/// A line read by `browse`.
#[derive(Debug, PartialEq)]
enum BrowseCommand {
    Expand(NodePath),
    Select(NodePath),
    Quit,
}

impl BrowseCommand {
    /// Parse one input line. Blank lines yield `None`.
    fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let path = words.next().map(|p| NodePath::new(p.trim_matches('/')));
        if words.next().is_some() {
            bail!("Too many arguments: {line}");
        }

        let command = match (verb, path) {
            ("expand" | "e", Some(path)) => Self::Expand(path),
            ("select" | "s", Some(path)) => Self::Select(path),
            ("quit" | "q", None) => Self::Quit,
            ("expand" | "e" | "select" | "s", None) => bail!("{verb} needs a PATH"),
            _ => bail!("Unknown command: {line} (try expand PATH, select PATH or quit)"),
        };
        Ok(Some(command))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let client = HttpResourceClient::new(&config).context("Failed to create HTTP client")?;

    eprintln!("Connecting to {}...", config.base());
    let session = Session::bootstrap(Arc::new(client), config)
        .await
        .context("Failed to load the base container")?;

    match cli.command {
        Command::Tree { depth, all, top } => {
            let complete = load_all(&session).await?;
            let root = session.store().root();
            print_node(&root, 0, if all { u32::MAX } else { depth }, top);
            print_footer(&complete);
        }
        Command::Get { path } => {
            run_get(&session, &NodePath::new(path.trim_matches('/'))).await?;
        }
        Command::Stats => {
            let complete = load_all(&session).await?;
            run_stats(&session, &complete);
        }
        Command::Export { output } => {
            load_all(&session).await?;
            run_export(&session, output.as_deref())?;
        }
        Command::Browse => run_browse(session).await?,
    }

    Ok(())
}

/// Install a stderr subscriber honouring `RUST_LOG`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Read the config file, if any, and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<SyncConfig>(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => {
            let base = cli
                .base
                .clone()
                .ok_or_else(|| eyre!("Either --base or --config is required"))?;
            SyncConfig::builder()
                .base_address(base)
                .build()
                .context("Invalid configuration")?
        }
    };

    if let Some(base) = &cli.base {
        config.base_address = base.clone();
    }
    if cli.shallow {
        config.expansion_mode = ExpansionMode::Shallow;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(delay) = cli.batch_delay_ms {
        config.batch_delay_ms = delay;
    }

    if config.base().trim().is_empty() {
        return Err(eyre!("Base address cannot be empty"));
    }
    if config.batch_size == 0 || config.max_in_flight == 0 {
        return Err(eyre!("Batch size and in-flight limit must be at least 1"));
    }
    Ok(config)
}

/// Run the background loader to completion, showing progress on stderr.
async fn load_all(session: &Session) -> Result<SyncComplete> {
    let mut load = session.start_background();
    let interactive = std::io::stderr().is_terminal();

    let mut complete = None;
    while let Some(event) = load.events.recv().await {
        match event {
            SyncEvent::Progress(progress) if interactive => {
                eprint!(
                    "\rLoading... {:>5.1}% (batch {}/{})",
                    progress.percentage(),
                    progress.batches_done,
                    progress.batch_count
                );
                std::io::stderr().flush().ok();
            }
            SyncEvent::ProgressFinished if interactive => eprintln!(),
            SyncEvent::SubtreeFailed { path, error } => {
                tracing::warn!(path = %path, error = %error, "branch left unloaded");
            }
            SyncEvent::Complete(result) => complete = Some(result),
            _ => {}
        }
    }

    let (_, joined) = load.finish().await;
    joined
        .or(complete)
        .ok_or_else(|| eyre!("Background loader stopped unexpectedly"))
}

/// Populate the tree in the background and answer stdin commands until
/// `quit` or end of input.
async fn run_browse(mut session: Session) -> Result<()> {
    let (surface_tx, mut surface_rx) = mpsc::channel(SURFACE_CHANNEL_SIZE);
    session.attach_surface(surface_tx);

    let mut load = session.start_background();
    let mut loading = true;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Commands: expand PATH, select PATH, quit");
    loop {
        tokio::select! {
            event = load.events.recv(), if loading => match event {
                Some(event) => report_event(&event),
                None => loading = false,
            },
            Some(event) = surface_rx.recv() => report_event(&event),
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let event = match BrowseCommand::parse(&line) {
                    Ok(Some(BrowseCommand::Expand(path))) => SurfaceEvent::ExpandBranch(path),
                    Ok(Some(BrowseCommand::Select(path))) => SurfaceEvent::SelectLeaf(path),
                    Ok(Some(BrowseCommand::Quit)) => break,
                    Ok(None) => continue,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                let response = session.handle(event.clone()).await;
                print_response(&session, &event, &response);
            }
        }
    }

    load.cancel();
    let (_, complete) = load.finish().await;
    if let Some(complete) = complete {
        print_footer(&complete);
    }
    Ok(())
}

/// Show a background or on-demand event.
fn report_event(event: &SyncEvent) {
    match event {
        SyncEvent::Progress(progress) => eprintln!(
            "Loading... {:>5.1}% (batch {}/{})",
            progress.percentage(),
            progress.batches_done,
            progress.batch_count
        ),
        SyncEvent::ProgressFinished => eprintln!("Background load finished"),
        SyncEvent::SubtreeLoaded { path } => tracing::debug!(path = %path, "branch loaded"),
        SyncEvent::SubtreeFailed { path, error } => eprintln!("{path}: not loaded ({error})"),
        SyncEvent::Complete(complete) => {
            tracing::info!(summary = %complete.summary(), "background load stopped");
        }
        SyncEvent::Expanded { path, children } => eprintln!("{path}: opened ({children} children)"),
        SyncEvent::ExpandFailed { path, error } => eprintln!("{path}: failed to open ({error})"),
    }
}

/// Print the answer to a browse command. Finished expansions list the
/// branch's children; failures arrive as events.
fn print_response(session: &Session, event: &SurfaceEvent, response: &SurfaceResponse) {
    let path = match event {
        SurfaceEvent::ExpandBranch(path) | SurfaceEvent::SelectLeaf(path) => path,
    };
    match response {
        SurfaceResponse::Content(content) => println!("{content}"),
        SurfaceResponse::NotALeaf(path) => println!("{path} is a branch; use expand"),
        SurfaceResponse::NotFound(path) => println!("{path}: not found"),
        SurfaceResponse::Expansion(outcome) if outcome.is_loaded() => {
            let Some(node) = session.store().lookup(path) else {
                return;
            };
            for child in node.children() {
                match (child.is_branch(), child.is_loaded()) {
                    (false, _) => println!("{}", child.path),
                    (true, true) => println!("{}/", child.path),
                    (true, false) => println!("{}/ (not loaded)", child.path),
                }
            }
        }
        SurfaceResponse::Expansion(ExpandOutcome::AlreadyLoading) => {
            println!("{path}: still loading");
        }
        SurfaceResponse::Expansion(ExpandOutcome::NotABranch) => {
            println!("{path} is a leaf; use select");
        }
        SurfaceResponse::Expansion(ExpandOutcome::NotFound) => println!("{path}: not found"),
        SurfaceResponse::Expansion(ExpandOutcome::Rejected(err)) => println!("{path}: {err}"),
        SurfaceResponse::Expansion(_) => {}
    }
}

/// Resolve one path and print it.
async fn run_get(session: &Session, path: &NodePath) -> Result<()> {
    let node = session
        .resolve(path)
        .await
        .with_context(|| format!("Failed to resolve {path}"))?;

    match node.display_content() {
        Some(content) => println!("{content}"),
        None => {
            for child in node.children() {
                let marker = if child.is_branch() { "/" } else { "" };
                println!("{}{}", child.name, marker);
            }
        }
    }
    Ok(())
}

fn run_stats(session: &Session, complete: &SyncComplete) {
    let stats = session.store().stats();
    let root = session.store().root();

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} ({})", root.name, session.config().base());
    println!("{}", "─".repeat(60));
    println!(" Branches:          {}", stats.branches);
    println!(" Leaves:            {}", stats.leaves);
    println!(" Unloaded branches: {}", stats.unloaded_branches);
    println!(" Maximum depth:     {}", stats.max_depth);
    println!(" Requests:          {}", complete.requests);
    println!(" Loaded in {:.2}s", complete.elapsed.as_secs_f64());
    println!();
}

/// Export the loaded tree to JSON.
fn run_export(session: &Session, output: Option<&Path>) -> Result<()> {
    let root = session.store().root();
    let json = serde_json::to_string_pretty(&*root)?;

    match output {
        Some(output_path) => {
            std::fs::write(output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_footer(complete: &SyncComplete) {
    println!();
    println!("{}", complete.summary());
}

/// Print a node and its children.
fn print_node(node: &ResourceNode, depth: u32, max_depth: u32, top_n: usize) {
    let indent = "  ".repeat(depth as usize);

    if let Some(content) = node.display_content() {
        println!("{}  {:<32} {}", indent, truncate(&node.name, 32), truncate(&content, 40));
        return;
    }

    let (marker, detail) = if node.is_loaded() {
        ("▼ ", format!("{} children", node.child_count()))
    } else {
        ("▶ ", "not loaded".to_string())
    };
    println!(
        "{}{}{:<32} {}",
        indent,
        marker,
        truncate(&format!("{}/", node.name), 32),
        detail
    );

    if depth < max_depth {
        let remaining = node.child_count().saturating_sub(top_n);
        for child in node.children().take(top_n) {
            print_node(child, depth + 1, max_depth, top_n);
        }

        if remaining > 0 {
            let indent = "  ".repeat((depth + 1) as usize);
            println!("{}  ... and {} more", indent, remaining);
        }
    }
}

/// Truncate a string to max characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{}…", kept)
    }
}
