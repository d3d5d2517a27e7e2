//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use lobgraph_core::{
    EnrichOptions, ProgressReporter, ScrapeOptions, export_all, import_tree, run_enrichment,
    scrape_profile_html, scrape_users,
};
use lobgraph_forum::{Fetcher, ProfileExtractor, parse_user_list, profile_url};
use lobgraph_search::ExaClient;
use lobgraph_shared::{
    AppConfig, FetchConfig, SearchConfig, forum_host, init_config, load_config, validate_api_key,
};
use lobgraph_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LobGraph: map who invited whom on a Lobsters-style forum.
#[derive(Parser)]
#[command(
    name = "lobgraph",
    version,
    about = "Scrape a forum's invitation tree and member profiles into a graph.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (defaults to <data_dir>/<db_file> from the config).
    #[arg(long, global = true, env = "LOBGRAPH_DB")]
    pub db: Option<PathBuf>,

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
    /// Create the database and apply migrations.
    Init,

    /// Import the invitation tree from a saved users page.
    ImportTree {
        /// Saved users page (defaults to <data_dir>/users.html).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Scrape the profile of every user listed on a saved users page.
    Scrape {
        /// Saved users page (defaults to <data_dir>/users_page.html).
        #[arg(long)]
        users_page: Option<PathBuf>,

        /// Stop after this many profile fetches.
        #[arg(long)]
        max: Option<usize>,

        /// Re-scrape users that were already scraped.
        #[arg(long)]
        force: bool,
    },

    /// Scrape a single profile, from a saved file or live.
    ScrapeProfile {
        /// Username to scrape.
        username: String,

        /// Saved profile page; fetched live when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Enrich scraped users through the people-search API.
    Enrich {
        /// Cap on the number of users searched.
        #[arg(long)]
        max: Option<usize>,

        /// Print the queries that would be issued without calling the API.
        #[arg(long)]
        dry_run: bool,
    },

    /// Write graph.json and enriched.json for the viewer.
    Export {
        /// Output directory (defaults to export_dir from the config).
        #[arg(short, long)]
        out: Option<PathBuf>,
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
        0 => "lobgraph=info",
        1 => "lobgraph=debug",
        _ => "lobgraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Init => cmd_config_init(),
                ConfigAction::Show => cmd_config_show(),
            };
        }
        other => other,
    };

    let config = load_config()?;
    let db_path = cli.db.unwrap_or_else(|| config.paths.db_path());

    match command {
        Command::Init => cmd_init(&db_path).await,
        Command::ImportTree { file } => {
            let file = file.unwrap_or_else(|| config.paths.data_file("users.html"));
            cmd_import_tree(&db_path, &file).await
        }
        Command::Scrape {
            users_page,
            max,
            force,
        } => {
            let users_page = users_page.unwrap_or_else(|| config.paths.data_file("users_page.html"));
            cmd_scrape(&config, &db_path, &users_page, max, force).await
        }
        Command::ScrapeProfile { username, file } => {
            cmd_scrape_profile(&config, &db_path, &username, file.as_deref()).await
        }
        Command::Enrich { max, dry_run } => cmd_enrich(&config, &db_path, max, dry_run).await,
        Command::Export { out } => {
            let out = out.unwrap_or_else(|| PathBuf::from(&config.paths.export_dir));
            cmd_export(&config, &db_path, &out).await
        }
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_init(db_path: &Path) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let users = storage.count_users().await?;
    println!("Database ready at {} ({users} users)", db_path.display());
    Ok(())
}

async fn cmd_import_tree(db_path: &Path, file: &Path) -> Result<()> {
    let html = read_page(file)?;
    let storage = Storage::open(db_path).await?;

    info!(file = %file.display(), "importing invitation tree");
    let summary = import_tree(&storage, &html).await?;

    if !summary.found {
        println!("No invitation tree found in {}", file.display());
        return Ok(());
    }

    println!();
    println!("  Invitation tree imported");
    println!("  Users:    {}", summary.total);
    println!("  Roots:    {}", summary.roots);
    println!("  Inactive: {}", summary.inactive);
    println!("  Stored:   {}", storage.count_users().await?);
    println!();
    println!("  Top karma:");
    for (name, karma) in &summary.top_karma {
        println!("    {name:<24} {karma}");
    }
    println!("  Top inviters:");
    for (name, count) in &summary.top_inviters {
        println!("    {name:<24} {count}");
    }
    println!();

    Ok(())
}

async fn cmd_scrape(
    config: &AppConfig,
    db_path: &Path,
    users_page: &Path,
    max: Option<usize>,
    force: bool,
) -> Result<()> {
    let html = read_page(users_page)?;
    let usernames = parse_user_list(&html);
    if usernames.is_empty() {
        return Err(eyre!("no usernames found in {}", users_page.display()));
    }

    let storage = Storage::open(db_path).await?;
    let fetcher = Fetcher::new(FetchConfig::from(config))?;
    let extractor = ProfileExtractor::new(forum_host(config)?);
    let opts = ScrapeOptions {
        base_url: config.forum.base_url.clone(),
        max,
        force,
    };

    info!(users = usernames.len(), ?max, force, "scraping profiles");
    let reporter = CliProgress::new();
    let summary = scrape_users(&storage, &fetcher, &extractor, &usernames, &opts, &reporter).await?;

    println!();
    println!("  Profiles scraped");
    println!("  Listed:  {}", summary.listed);
    println!("  Scraped: {}", summary.scraped);
    println!("  Failed:  {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    println!();

    Ok(())
}

async fn cmd_scrape_profile(
    config: &AppConfig,
    db_path: &Path,
    username: &str,
    file: Option<&Path>,
) -> Result<()> {
    let html = match file {
        Some(path) => read_page(path)?,
        None => {
            let fetcher = Fetcher::new(FetchConfig::from(config))?;
            let url = profile_url(&config.forum.base_url, username);
            fetcher
                .fetch(&url)
                .await
                .ok_or_else(|| eyre!("could not fetch {url}"))?
        }
    };

    let storage = Storage::open(db_path).await?;
    let extractor = ProfileExtractor::new(forum_host(config)?);
    let facts = scrape_profile_html(&storage, &extractor, username, &html).await?;

    let show = |v: Option<&str>| v.unwrap_or("-").to_string();
    println!();
    println!("  Profile: {}", facts.username);
    println!("  Karma:      {}", facts.karma.map_or("-".into(), |k| k.to_string()));
    println!("  Joined:     {}", show(facts.created_at.as_deref()));
    println!("  Invited by: {}", show(facts.invited_by_username.as_deref()));
    println!("  GitHub:     {}", show(facts.github_username.as_deref()));
    println!("  Twitter:    {}", show(facts.twitter_username.as_deref()));
    println!("  Website:    {}", show(facts.website.as_deref()));
    println!();

    Ok(())
}

async fn cmd_enrich(
    config: &AppConfig,
    db_path: &Path,
    max: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let search_config = SearchConfig::from(config);
    let opts = EnrichOptions {
        dry_run,
        max_users: max,
        num_results: search_config.num_results,
        delay: search_config.request_delay,
    };

    let client = if dry_run {
        None
    } else {
        let api_key = validate_api_key(config)?;
        Some(ExaClient::new(&search_config, api_key)?)
    };

    let storage = Storage::open(db_path).await?;
    let reporter = CliProgress::new();
    let summary = run_enrichment(&storage, client.as_ref(), &opts, &reporter).await?;

    if dry_run {
        println!();
        println!("  Dry run: {} queries", summary.planned.len());
        for (username, query) in &summary.planned {
            println!("    {username:<24} {query}");
        }
        println!("  Without a query: {}", summary.no_query);
        println!();
        return Ok(());
    }

    println!();
    println!("  Enrichment complete");
    println!("  Eligible:   {}", summary.eligible);
    println!("  Enriched:   {}", summary.enriched);
    println!("  No results: {}", summary.no_results);
    println!("  No query:   {}", summary.no_query);
    println!("  Failed:     {}", summary.failed);
    println!();

    Ok(())
}

async fn cmd_export(config: &AppConfig, db_path: &Path, out: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let summary = export_all(&storage, out, config.export.top_inviters).await?;

    println!();
    println!("  Export written");
    println!("  Users:    {}", summary.users);
    println!("  Edges:    {}", summary.edges);
    println!("  Dangling: {}", summary.dangling);
    println!("  Enriched: {}", summary.enriched);
    println!("  Graph:    {}", summary.graph_path.display());
    println!("  Profiles: {}", summary.enriched_path.display());
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn read_page(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_prefix(name.to_string());
        self.spinner.set_message("");
    }

    fn item(&self, label: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {label}"));
    }

    fn done(&self, _summary: &str) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
