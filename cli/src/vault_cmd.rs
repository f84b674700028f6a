use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use owo_colors::OwoColorize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use vault_index::IndexPhase;
use vault_index::IndexProgress;
use vault_index::ProgressCallback;
use vault_index::ScanReport;
use vault_index::SearchOptions;
use vault_index::VaultConfig;
use vault_index::VaultContext;
use vault_index::search::compile_search;

/// Index and search a vault of JSON notes
#[derive(Debug, Parser)]
#[command(name = "vault", version)]
pub struct VaultCli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Vault root (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub vault: Option<PathBuf>,

    /// Index database (defaults to <vault>/.vault/index.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: VaultCommand,
}

#[derive(Debug, Subcommand)]
pub enum VaultCommand {
    /// Search indexed documents
    Search(SearchArgs),

    /// Show how a query compiles, without running it
    Explain(ExplainArgs),

    /// Bring the index up to date with the vault
    Index(IndexArgs),

    /// Index, then keep the index updated as files change
    Watch,

    /// Show index statistics
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Search query
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ExplainArgs {
    /// Search query
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Print the compiled query as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Clear the index and rebuild it from scratch
    #[arg(long)]
    pub full: bool,

    /// Only print the summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl VaultCli {
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        match self.command {
            VaultCommand::Search(args) => run_search(config, args).await,
            VaultCommand::Explain(args) => run_explain(args),
            VaultCommand::Index(args) => run_index(config, args).await,
            VaultCommand::Watch => run_watch(config).await,
            VaultCommand::Status(args) => run_status(config, args).await,
        }
    }

    /// Config file first, then `--vault` / `--db` on top.
    fn resolve_config(&self) -> Result<VaultConfig> {
        let mut config = match &self.config {
            Some(path) => VaultConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let root = match &self.vault {
                    Some(root) => root.clone(),
                    None => std::env::current_dir().context("Failed to get current directory")?,
                };
                VaultConfig::for_vault(root)
            }
        };
        if let Some(root) = &self.vault {
            config.vault_root = root.clone();
        }
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

async fn open(config: VaultConfig) -> Result<VaultContext> {
    let database = config.database_path.clone();
    VaultContext::open(config)
        .await
        .with_context(|| format!("Failed to open index at {}", database.display()))
}

async fn run_search(config: VaultConfig, args: SearchArgs) -> Result<()> {
    let context = open(config).await?;
    let result = print_search(&context, args).await;
    context.close().await;
    result
}

async fn print_search(context: &VaultContext, args: SearchArgs) -> Result<()> {
    let mut options = context.search().default_options();
    if let Some(limit) = args.limit {
        options = SearchOptions { limit, ..options };
    }

    let hits = context
        .search()
        .search(&args.query, options)
        .await
        .context("Search failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("{} No results found", "✗".bright_red());
        return Ok(());
    }

    println!(
        "{} Found {} results\n",
        "✓".bright_green(),
        hits.len().to_string().bright_cyan()
    );
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {}",
            (i + 1).to_string().bright_yellow(),
            hit.title.bold(),
            format!("[{}]", hit.project_alias).bright_black()
        );
        println!("   {}", hit.path.bright_cyan());
    }
    Ok(())
}

fn run_explain(args: ExplainArgs) -> Result<()> {
    let compiled = compile_search(&args.query)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
        return Ok(());
    }

    let list = |values: &[String]| {
        if values.is_empty() {
            "(none)".to_string()
        } else {
            values.join(", ")
        }
    };
    println!("{} {}", "FTS5:    ".bright_black(), compiled.match_expression);
    println!("{} {}", "Projects:".bright_black(), list(&compiled.filters.projects));
    println!("{} {}", "Tags:    ".bright_black(), list(&compiled.filters.tags));
    Ok(())
}

async fn run_index(config: VaultConfig, args: IndexArgs) -> Result<()> {
    let root = config.vault_root.clone();
    let context = open(config).await?;
    if !args.quiet {
        println!("{} Indexing vault at {}", "▶".bright_blue(), root.display());
    }

    let progress = (!args.quiet).then(progress_printer);
    let report = if args.full {
        context.indexer().rebuild(progress).await
    } else {
        context.indexer().scan_and_index_vault(progress).await
    };
    context.close().await;

    print_report(&report.context("Failed to index vault")?);
    Ok(())
}

async fn run_watch(config: VaultConfig) -> Result<()> {
    let root = config.vault_root.clone();
    let context = open(config).await?;
    let result = watch_until_interrupted(&context, &root).await;
    context.close().await;
    result?;
    println!("{} Stopped", "✓".bright_green());
    Ok(())
}

async fn watch_until_interrupted(context: &VaultContext, root: &Path) -> Result<()> {
    let report = context
        .indexer()
        .scan_and_index_vault(None)
        .await
        .context("Failed to index vault")?;
    print_report(&report);

    let mut watcher = context.watcher();
    let mut errors = watcher.errors();
    let cancel = CancellationToken::new();
    watcher
        .start(cancel.clone())
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    println!(
        "{} Watching {} (Ctrl-C to stop)",
        "▶".bright_blue(),
        root.display()
    );

    let logger = tokio::spawn(async move {
        if let Some(errors) = errors.as_mut() {
            while let Some(err) = errors.recv().await {
                warn!("{err}");
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    cancel.cancel();
    watcher.stop().await;
    drop(watcher);
    logger.abort();
    Ok(())
}

async fn run_status(config: VaultConfig, args: StatusArgs) -> Result<()> {
    let database = config.database_path.clone();
    let context = open(config).await?;
    let stats = context.store().stats().await.context("Failed to read index");
    context.close().await;
    let stats = stats?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} Index Status", "▶".bright_blue());
    println!("  Location: {}", database.display().to_string().bright_cyan());
    println!("  Projects: {}", stats.projects.bright_cyan());
    println!("  Documents: {}", stats.documents.bright_cyan());
    println!("  Deleted: {}", stats.deleted_documents.bright_cyan());
    println!("  Tags: {}", stats.tags.bright_cyan());
    println!("  Links: {}", stats.links.bright_cyan());
    println!("  Assets: {}", stats.assets.bright_cyan());
    Ok(())
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|progress: IndexProgress| match progress.phase {
        IndexPhase::Indexing | IndexPhase::Pruning => {
            if let Some(file) = progress.current_file {
                eprintln!(
                    "  {} [{}/{}] {}",
                    phase_label(progress.phase).bright_black(),
                    progress.current,
                    progress.total,
                    file
                );
            }
        }
        phase => eprintln!("{} {}", "▶".bright_blue(), phase_label(phase)),
    })
}

fn phase_label(phase: IndexPhase) -> &'static str {
    match phase {
        IndexPhase::Clearing => "Clearing index",
        IndexPhase::Discovering => "Discovering documents",
        IndexPhase::Indexing => "indexed",
        IndexPhase::Pruning => "pruned",
        IndexPhase::Complete => "Done",
    }
}

fn print_report(report: &ScanReport) {
    println!(
        "{} Indexed {} documents ({} unchanged, {} pruned) in {} projects",
        "✓".bright_green(),
        report.indexed.bright_cyan(),
        report.unchanged,
        report.pruned,
        report.projects
    );
    if !report.failures.is_empty() {
        println!(
            "{} {} documents failed:",
            "✗".bright_red(),
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  {}: {}", failure.path.bright_red(), failure.error);
        }
    }
}
