//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use seolens_analysis::HeuristicRules;
use seolens_collector::Collector;
use seolens_core::AuditEngine;
use seolens_shared::{
    AppConfig, AuditId, AuditStatus, CrawlConfig, config_dir, init_config, load_config,
};
use seolens_storage::{AuditStore, LibsqlStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// seolens — audit a website's pages for SEO/GEO quality.
#[derive(Parser)]
#[command(
    name = "seolens",
    version,
    about = "Crawl a domain, score its pages, and benchmark against competitors.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run an audit against a URL and stream its progress.
    Audit {
        /// Target URL (absolute, http or https).
        url: String,

        /// Competitor URL to benchmark against (repeatable). Competitors
        /// must have been audited before to appear in the ranking.
        #[arg(short, long = "competitor")]
        competitors: Vec<String>,

        /// Emit one JSON progress event per line instead of a progress bar.
        #[arg(long)]
        json: bool,

        /// Override the page cap for this audit.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Database path (defaults to ~/.seolens/seolens.db).
        #[arg(long)]
        db: Option<String>,
    },

    /// Show a finished or running audit.
    Show {
        /// Audit id.
        audit_id: String,

        /// Include the full page/issue graph.
        #[arg(long)]
        pages: bool,

        /// Database path (defaults to ~/.seolens/seolens.db).
        #[arg(long)]
        db: Option<String>,
    },

    /// List all audits.
    List {
        /// Database path (defaults to ~/.seolens/seolens.db).
        #[arg(long)]
        db: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seolens=info",
        1 => "seolens=debug",
        _ => "seolens=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Audit {
            url,
            competitors,
            json,
            max_pages,
            db,
        } => cmd_audit(&url, &competitors, json, max_pages, db.as_deref()).await,
        Command::Show {
            audit_id,
            pages,
            db,
        } => cmd_show(&audit_id, pages, db.as_deref()).await,
        Command::List { db } => cmd_list(db.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn database_path(db: Option<&str>) -> Result<PathBuf> {
    match db {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join("seolens.db")),
    }
}

async fn open_store(db: Option<&str>) -> Result<LibsqlStore> {
    let path = database_path(db)?;
    Ok(LibsqlStore::open(&path).await?)
}

async fn cmd_audit(
    url: &str,
    competitors: &[String],
    json: bool,
    max_pages: Option<usize>,
    db: Option<&str>,
) -> Result<()> {
    let config = load_config()?;

    let mut crawl_config = CrawlConfig::from(&config);
    if let Some(cap) = max_pages {
        crawl_config.max_pages = cap;
    }

    let store = Arc::new(open_store(db).await?);
    let collector = Arc::new(Collector::new(crawl_config)?);
    let rules = Arc::new(HeuristicRules);
    let engine = AuditEngine::new(store, collector, rules, &config)?;

    info!(url, competitors = competitors.len(), "starting audit");

    let audit_id = engine.start_audit(url, competitors).await?;
    let mut stream = engine.subscribe(&audit_id).await?;

    let bar = (!json).then(|| {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        bar
    });

    let mut terminal = None;
    while let Some(event) = stream.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else if let Some(bar) = &bar {
            bar.set_position(event.percentage as u64);
            let pages = event
                .delta
                .pages_processed
                .map(|p| format!(" ({p} pages)"))
                .unwrap_or_default();
            bar.set_message(format!("{}{pages}", event.status));
        }
        if event.terminal {
            terminal = Some(event);
        }
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let terminal = terminal.ok_or_else(|| eyre!("progress stream ended without a terminal event"))?;
    let audit = engine.get_audit(&audit_id).await?;

    if terminal.status == AuditStatus::Failed {
        return Err(eyre!(
            "audit {audit_id} failed: {}",
            audit.failure_reason.as_deref().unwrap_or("unknown reason")
        ));
    }

    println!();
    println!("  Audit completed");
    println!("  ID:          {audit_id}");
    println!("  URL:         {}", audit.url);
    println!("  Pages:       {}", audit.stats.total_pages);
    println!(
        "  Issues:      {} ({} critical, {} warning)",
        audit.stats.issues_found, audit.stats.critical_issues, audit.stats.warning_issues
    );
    println!("  Overall:     {:.1}", audit.scores.overall);
    println!("  Structure:   {:.1}", audit.scores.structure);
    println!("  Content:     {:.1}", audit.scores.content);
    println!("  E-E-A-T:     {:.1}", audit.scores.eeat);
    println!("  Schema:      {:.1}", audit.scores.schema);
    if !audit.subdomains.is_empty() {
        println!("  Subdomains:  {}", audit.subdomains.join(", "));
    }
    if let Some(report) = &audit.comparison {
        println!();
        println!("  Competitive ranking (#{} of {}):", report.subject_rank, report.entries.len());
        for entry in &report.entries {
            let marker = if entry.is_subject { " <- this audit" } else { "" };
            println!(
                "    {}. {:.1}  {}{marker}",
                entry.rank, entry.scores.overall, entry.url
            );
        }
    }
    println!();

    Ok(())
}

async fn cmd_show(audit_id: &str, pages: bool, db: Option<&str>) -> Result<()> {
    let id: AuditId = audit_id
        .parse()
        .map_err(|e| eyre!("invalid audit id '{audit_id}': {e}"))?;

    let store = open_store(db).await?;
    let audit = store
        .get_audit(&id)
        .await?
        .ok_or_else(|| eyre!("no audit with id {audit_id}"))?;

    println!("{}", serde_json::to_string_pretty(&audit)?);

    if pages {
        let pages = store.list_pages(&id).await?;
        println!("{}", serde_json::to_string_pretty(&pages)?);
    }

    Ok(())
}

async fn cmd_list(db: Option<&str>) -> Result<()> {
    let store = open_store(db).await?;
    let audits = store.list_audits().await?;

    if audits.is_empty() {
        println!("No audits yet. Run `seolens audit <url>` to start one.");
        return Ok(());
    }

    for audit in audits {
        println!(
            "{}  {:<12} {:>5.1}  {}",
            audit.id, audit.status, audit.scores.overall, audit.url
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
