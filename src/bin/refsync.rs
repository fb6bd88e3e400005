//! # Refsync CLI - Archival referential synchronization
//!
//! Command-line interface over a filesystem store.
//!
//! ## Usage
//! ```bash
//! # Create a store for unit ACV and write containers and vocabularies
//! refsync init --unit acv
//!
//! # Synchronize a ledger export
//! refsync load acv1.0.0.csv --version 1.0.0
//!
//! # Apply a newer export, closing nodes that left the ledger
//! refsync update acv1.0.0.csv acv1.1.0.csv --from 1.0.0 --to 1.1.0
//!
//! # Show the tree as it stood at 1.0.0
//! refsync tree --version 1.0.0
//! ```

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use refsync::reconstruct::OutlineNode;
use refsync::store::{FsStore, RemoteStore};
use refsync::utils::format_bytes;
use refsync::{
    NodeKey, OrphanPolicy, OutcomeStatus, Referential, ReferentialBuilder, RefsyncConfig, RefsyncError, Result,
    RunReport,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "refsync.json";

/// Refsync CLI - keep an archival referential in step with its ledger
#[derive(Parser)]
#[command(name = "refsync")]
#[command(version)]
#[command(about = "Synchronize archival classification trees with a versioned store")]
#[command(long_about = None)]
struct Cli {
    /// Store directory (defaults to .refsync)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a store for a unit and write containers and vocabularies
    Init {
        /// Unit code
        #[arg(short, long)]
        unit: String,

        /// Unit description written on the unit root
        #[arg(short, long)]
        description: Option<String>,

        /// Creator agent name
        #[arg(long)]
        creator: Option<String>,

        /// Orphan handling
        #[arg(long, value_enum, default_value = "reject")]
        orphans: OrphanMode,

        /// Column delimiter of ledger exports
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Synchronize a ledger export
    Load {
        /// Ledger file
        file: PathBuf,

        /// Snapshot version label
        #[arg(long)]
        version: Option<String>,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Apply a newer ledger export over an older one
    Update {
        /// Previous ledger file
        old: PathBuf,

        /// New ledger file
        new: PathBuf,

        /// Version label of the previous file
        #[arg(long)]
        from: String,

        /// Version label of the new file
        #[arg(long)]
        to: String,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Load an agents export (Code,PARENT,Acronyme,Nom) under the agents container
    Agents {
        /// Agents file
        file: PathBuf,
    },

    /// Load a records ledger, or list dossiers when no file is given
    Records {
        /// Records file
        file: Option<PathBuf>,
    },

    /// Close a dossier
    Close {
        /// Dossier id
        dossier: String,

        /// Closing time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Move a node under another parent
    #[command(alias = "mv")]
    Move {
        /// Node id or path
        node: String,

        /// New parent id or path
        parent: String,
    },

    /// Show the stored tree
    Tree {
        /// Subtree root id or path (defaults to the unit root)
        node: Option<String>,

        /// Snapshot version to reconstruct
        #[arg(long)]
        version: Option<String>,

        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Show the history of a node
    History {
        /// Node id or path
        node: String,
    },

    /// Check the stored tree for inconsistencies
    Verify,

    /// Render a node's graph payload or a subtree outline
    Render {
        /// Node id or path (defaults to the unit root)
        node: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "turtle")]
        format: RenderFormat,

        /// Base prefixed to node paths in turtle output
        #[arg(long, default_value = "")]
        base: String,

        /// Snapshot version to reconstruct (html only)
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OrphanMode {
    Reject,
    AttachToRoot,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum RenderFormat {
    Turtle,
    Html,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refsync=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let store_path = cli.store.unwrap_or_else(|| PathBuf::from(".refsync"));

    match cli.command {
        Commands::Init {
            unit,
            description,
            creator,
            orphans,
            delimiter,
        } => cmd_init(store_path, unit, description, creator, orphans, delimiter),
        Commands::Load { file, version, progress } => cmd_load(store_path, file, version, progress),
        Commands::Update {
            old,
            new,
            from,
            to,
            progress,
        } => cmd_update(store_path, old, new, from, to, progress),
        Commands::Agents { file } => cmd_agents(store_path, file),
        Commands::Records { file } => cmd_records(store_path, file),
        Commands::Close { dossier, at } => cmd_close(store_path, dossier, at),
        Commands::Move { node, parent } => cmd_move(store_path, node, parent),
        Commands::Tree { node, version, json } => cmd_tree(store_path, node, version, json),
        Commands::History { node } => cmd_history(store_path, node),
        Commands::Verify => cmd_verify(store_path),
        Commands::Render {
            node,
            format,
            base,
            version,
        } => cmd_render(store_path, node, format, base, version),
    }
}

/// Create the store, save the unit configuration and bootstrap vocabularies
fn cmd_init(
    store_path: PathBuf,
    unit: String,
    description: Option<String>,
    creator: Option<String>,
    orphans: OrphanMode,
    delimiter: Option<char>,
) -> Result<()> {
    println!("{}", "Initializing refsync store...".blue().bold());

    let mut builder = ReferentialBuilder::new(unit).orphan_policy(match orphans {
        OrphanMode::Reject => OrphanPolicy::Reject,
        OrphanMode::AttachToRoot => OrphanPolicy::AttachToRoot,
    });
    if let Some(description) = description {
        builder = builder.unit_description(description);
    }
    if let Some(creator) = creator {
        builder = builder.creator(creator);
    }
    if let Some(delimiter) = delimiter {
        builder = builder.delimiter(delimiter);
    }

    let store = FsStore::init(store_path.clone())?;
    let referential = builder.build(store)?;
    referential.config().save(&store_path.join(CONFIG_FILE))?;

    let report = referential.bootstrap();
    print_report(&report);

    println!("{} Initialized store for unit {}", "✓".green().bold(), referential.unit().yellow());
    println!("  Store: {}", store_path.display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Synchronize a ledger: {}", "refsync load <file> --version 1.0.0".yellow());
    println!("  - View the tree: {}", "refsync tree".yellow());

    Ok(())
}

/// Synchronize one ledger export
fn cmd_load(store_path: PathBuf, file: PathBuf, version: Option<String>, show_progress: bool) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let start = Instant::now();

    let snapshot = referential.load_snapshot(&file, version.as_deref())?;
    println!(
        "{} {} ({} rows, version {})",
        "Synchronizing".blue().bold(),
        file.display().to_string().cyan(),
        snapshot.len(),
        snapshot.version.yellow()
    );

    let progress = spinner(show_progress, "Writing nodes...");
    let report = referential.synchronize(&snapshot)?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    print_report(&report);
    println!("  Time: {}", format_duration(trim_millis(start.elapsed())).to_string().cyan());
    Ok(())
}

/// Close removed nodes and synchronize the new export
fn cmd_update(
    store_path: PathBuf,
    old: PathBuf,
    new: PathBuf,
    from: String,
    to: String,
    show_progress: bool,
) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let start = Instant::now();

    let old = referential.load_snapshot(&old, Some(&from))?;
    let new = referential.load_snapshot(&new, Some(&to))?;

    let progress = spinner(show_progress, "Applying update...");
    let update = referential.update(&old, &new)?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    println!(
        "{} {} -> {}",
        "Update".blue().bold(),
        update.diff.from_version.yellow(),
        update.diff.to_version.yellow()
    );
    println!(
        "  Added: {} | Removed: {} | Retained: {}",
        update.diff.stats.added.to_string().green(),
        update.diff.stats.removed.to_string().red(),
        update.diff.stats.retained
    );
    if update.diff.stats.held > 0 {
        println!(
            "  Held: {} (rejected in {}, left open)",
            update.diff.stats.held.to_string().yellow(),
            update.diff.to_version
        );
    }
    println!("\n{}", "Closing:".bold());
    print_report(&update.closed);
    println!("\n{}", "Synchronizing:".bold());
    print_report(&update.synchronized);
    println!("  Time: {}", format_duration(trim_millis(start.elapsed())).to_string().cyan());
    Ok(())
}

/// Load the agents hierarchy
fn cmd_agents(store_path: PathBuf, file: PathBuf) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let start = Instant::now();

    println!("{} {}", "Loading agents from".blue().bold(), file.display().to_string().cyan());
    let report = referential.load_agents(&file)?;
    print_report(&report);
    println!("  Time: {}", format_duration(trim_millis(start.elapsed())).to_string().cyan());
    Ok(())
}

/// Load dossiers and documents, or list the stored dossiers
fn cmd_records(store_path: PathBuf, file: Option<PathBuf>) -> Result<()> {
    let referential = open_referential(&store_path)?;

    if let Some(file) = file {
        println!("{} {}", "Loading records from".blue().bold(), file.display().to_string().cyan());
        let report = referential.load_records(&file)?;
        print_report(&report);
        return Ok(());
    }

    let dossiers = referential.list_dossiers()?;
    if dossiers.is_empty() {
        println!("{}", "No dossiers found.".yellow());
        return Ok(());
    }

    println!("{}", "Dossiers:".blue().bold());
    for dossier in dossiers {
        let state = if dossier.state.is_closed() {
            dossier.state.to_string().red()
        } else {
            dossier.state.to_string().green()
        };
        println!(
            "  {} {} {} ({} documents)",
            dossier.identifier.yellow().bold(),
            dossier.title.cyan(),
            state,
            dossier.documents
        );
    }
    Ok(())
}

/// Close a dossier
fn cmd_close(store_path: PathBuf, dossier: String, at: Option<DateTime<Utc>>) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let outcome = referential.close_dossier(&dossier, at)?;

    if outcome.is_closed_now() {
        println!("{} Closed dossier {}", "✓".green().bold(), dossier.yellow());
    } else {
        println!("{} Dossier {} was already closed", "⚠".yellow().bold(), dossier.yellow());
    }
    Ok(())
}

/// Move a node under a new parent
fn cmd_move(store_path: PathBuf, node: String, parent: String) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let node = resolve_key(&referential, &node)?;
    let parent = resolve_key(&referential, &parent)?;

    let outcome = referential.move_node(&node, &parent)?;
    println!("{} Moved {}", "✓".green().bold(), outcome.node.to_string().yellow());
    if let Some(old) = &outcome.old_parent {
        println!("  From: {}", old.to_string().dimmed());
    }
    println!("  To: {}", outcome.new_parent.to_string().cyan());
    println!(
        "  Identifier: {} -> {}",
        outcome.old_identifier.dimmed(),
        outcome.new_identifier.yellow()
    );
    Ok(())
}

/// Print a reconstructed tree
fn cmd_tree(store_path: PathBuf, node: Option<String>, version: Option<String>, json: bool) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let key = match node {
        Some(node) => resolve_key(&referential, &node)?,
        None => referential.root_key(),
    };

    let reconstruction = referential.reconstruct(&key, version.as_deref());
    if json {
        println!("{}", serde_json::to_string_pretty(&reconstruction)?);
        return Ok(());
    }

    match &reconstruction.version {
        Some(version) => println!("{} at {}", "Tree".blue().bold(), version.yellow()),
        None => println!("{}", "Tree".blue().bold()),
    }
    println!();
    print_outline(&reconstruction.root, "", true, true);

    if !reconstruction.is_complete() {
        println!("\n{}", "Truncated subtrees:".yellow().bold());
        for truncated in &reconstruction.truncated {
            println!("  - {}: {}", truncated.key.to_string().yellow(), truncated.reason);
        }
    }
    println!("\n{}", format!("{} nodes", reconstruction.node_count()).dimmed());
    Ok(())
}

/// Print the history of a node
fn cmd_history(store_path: PathBuf, node: String) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let key = resolve_key(&referential, &node)?;
    let store = referential.store();

    let history = store.read_history(&key)?;
    if history.is_empty() {
        return Err(RefsyncError::NodeNotFound(key.path()));
    }

    println!("{} {}", "History of".blue().bold(), key.to_string().yellow());
    println!();
    for entry in history {
        let rep = store.read_at(&entry)?;
        print!(
            "  {} {} ",
            format!("#{}", entry.seq).yellow().bold(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
        if let Some(version) = &rep.version {
            print!("{} ", version.cyan());
        }
        if let Some(state) = rep.state {
            print!("{} ", state);
        }
        println!("{}", rep.label());
    }
    Ok(())
}

/// Check the stored tree
fn cmd_verify(store_path: PathBuf) -> Result<()> {
    let referential = open_referential(&store_path)?;
    println!("{} {}", "Verifying unit".blue().bold(), referential.unit().yellow());
    println!(
        "  Store: {} ({})",
        store_path.display().to_string().cyan(),
        store_size(&store_path)
    );

    let report = referential.verify()?;
    if report.is_valid() {
        println!("{} {}", "✓".green().bold(), report.summary());
        return Ok(());
    }

    println!("{} {}", "✗".red().bold(), report.summary());
    for mismatch in &report.parent_mismatches {
        println!(
            "  Parent mismatch: {} listed by {} links to {}",
            mismatch.child.to_string().yellow(),
            mismatch.listed_by,
            mismatch.parent_link.as_ref().map(|k| k.path()).unwrap_or_else(|| "nothing".to_string())
        );
    }
    for mismatch in &report.kind_mismatches {
        println!(
            "  Kind mismatch: {} is {} with {} children",
            mismatch.key.to_string().yellow(),
            mismatch.kind,
            mismatch.children
        );
    }
    for key in &report.dangling_links {
        println!("  Dangling link: {}", key.to_string().red());
    }
    for key in &report.unlisted_nodes {
        println!("  Unlisted node: {}", key.to_string().yellow());
    }
    for node in &report.unreadable {
        println!("  Unreadable: {} ({})", node.key.to_string().red(), node.error);
    }
    Err(RefsyncError::internal(format!("{} consistency issues found", report.issue_count())))
}

/// Render a node's payload or a subtree outline
fn cmd_render(
    store_path: PathBuf,
    node: Option<String>,
    format: RenderFormat,
    base: String,
    version: Option<String>,
) -> Result<()> {
    let referential = open_referential(&store_path)?;
    let key = match node {
        Some(node) => resolve_key(&referential, &node)?,
        None => referential.root_key(),
    };

    match format {
        RenderFormat::Turtle => {
            let stored = referential
                .store()
                .read(&key)?
                .ok_or_else(|| RefsyncError::NodeNotFound(key.path()))?;
            println!("{}", stored.representation.render_turtle(&base));
        }
        RenderFormat::Html => {
            println!("{}", referential.reconstruct(&key, version.as_deref()).render_html());
        }
    }
    Ok(())
}

// Helper functions

/// Open the store and its saved configuration
fn open_referential(store_path: &Path) -> Result<Referential<FsStore>> {
    let store = FsStore::open(store_path.to_path_buf())?;
    let config_path = store_path.join(CONFIG_FILE);
    if !config_path.exists() {
        return Err(RefsyncError::StoreNotInitialized(store_path.to_path_buf()));
    }
    let config = RefsyncConfig::from_file(&config_path)?;
    ReferentialBuilder::from_config(config).build(store)
}

/// Parse a full node path, or treat a bare segment as a node id of the unit
fn resolve_key<S: RemoteStore>(referential: &Referential<S>, arg: &str) -> Result<NodeKey> {
    if arg.contains('/') {
        arg.parse()
    } else {
        let key = referential.node_key(arg);
        key.validate()?;
        Ok(key)
    }
}

fn spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    Some(pb)
}

fn trim_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

fn print_report(report: &RunReport) {
    println!(
        "  Written: {} | Unchanged: {} | Closed: {} | Rejected: {} | Failed: {}",
        report.written().to_string().green(),
        report.unchanged(),
        report.closed().to_string().yellow(),
        report.rejected().to_string().red(),
        report.failed().to_string().red()
    );

    for invalid in &report.invalid_rows {
        println!("  {} {}", "✗".red(), invalid);
    }
    for outcome in report.problems() {
        let detail = match &outcome.status {
            OutcomeStatus::Rejected { error } => error.to_string(),
            OutcomeStatus::Failed { error } => error.clone(),
            other => other.label().to_string(),
        };
        println!("  {} {}: {}", "✗".red(), outcome.key.to_string().yellow(), detail);
    }
}

fn print_outline(node: &OutlineNode, prefix: &str, is_last: bool, is_root: bool) {
    let connector = if is_root {
        ""
    } else if is_last {
        "└── "
    } else {
        "├── "
    };

    let label = if node.truncated {
        node.key.to_string().red().to_string()
    } else if node.identifier.is_empty() {
        node.title.cyan().to_string()
    } else {
        format!("{} {}", node.identifier.yellow().bold(), node.title.cyan())
    };
    let closed = node.state.is_some_and(|s| s.is_closed());
    if closed {
        println!("{}{}{} {}", prefix, connector, label, "(closed)".dimmed());
    } else {
        println!("{}{}{}", prefix, connector, label);
    }

    let child_prefix = if is_root {
        String::new()
    } else if is_last {
        format!("{}    ", prefix)
    } else {
        format!("{}│   ", prefix)
    };
    for (i, child) in node.children.iter().enumerate() {
        print_outline(child, &child_prefix, i + 1 == node.children.len(), false);
    }
}

fn store_size(store_path: &Path) -> String {
    let total: u64 = walkdir::WalkDir::new(store_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    format_bytes(total)
}
