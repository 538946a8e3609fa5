//! gmkit CLI
//!
//! CLI tool for testing match patterns and managing a userscript directory.

mod http;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use url::Url;

use gm_core::UrlPattern;
use gm_manager::{
    parse_metadata, DirStorage, Downloader, ManagerConfig, RunAt, Script, ScriptManager, ScriptSets, UrlRule,
};

use crate::http::{HttpDownloader, OfflineDownloader};

#[derive(Parser)]
#[command(name = "gm")]
#[command(about = "Userscript match patterns and script manager tools")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test URLs against a match pattern
    MatchPattern {
        /// Pattern such as `*://*.example.com/*`
        pattern: String,

        /// URLs to test
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show the metadata of a userscript file
    Inspect {
        /// Userscript file
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the scripts in a scripts directory
    List {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show which scripts run on a URL
    ScriptsFor {
        /// URL to query
        url: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the injectable code of a script, requirements resolved
    Code {
        /// Script filename inside the scripts directory
        filename: String,

        #[command(flatten)]
        store: StoreArgs,

        /// Download requirements again instead of using the cache
        #[arg(long)]
        force: bool,
    },

    /// Copy a userscript into the scripts directory and fetch its requirements
    Install {
        /// Userscript file
        file: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Scripts directory (overrides `scripts_dir` from the config)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::MatchPattern { pattern, urls } => cmd_match_pattern(&pattern, &urls),
        Commands::Inspect { file, json } => cmd_inspect(&file, json),
        Commands::List { store } => cmd_list(&store),
        Commands::ScriptsFor { url, store } => cmd_scripts_for(&url, &store),
        Commands::Code {
            filename,
            store,
            force,
        } => cmd_code(&filename, &store, force),
        Commands::Install { file, store } => cmd_install(&file, &store),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

// =============================================================================
// Patterns and Metadata
// =============================================================================

fn cmd_match_pattern(pattern: &str, urls: &[String]) -> Result<(), String> {
    let pattern = UrlPattern::parse(pattern).map_err(|e| format!("Invalid pattern '{}': {}", pattern, e))?;

    for raw in urls {
        let url = Url::parse(raw).map_err(|e| format!("Invalid URL '{}': {}", raw, e))?;
        let verdict = if pattern.matches(&url) { "match" } else { "-" };
        println!("{:<6} {}", verdict, raw);
    }

    Ok(())
}

#[derive(Serialize)]
struct MetadataSummary {
    name: Option<String>,
    namespace: Option<String>,
    description: Option<String>,
    version: Option<String>,
    run_at: RunAt,
    includes: Vec<String>,
    excludes: Vec<String>,
    matches: Vec<String>,
    requires: Vec<String>,
    grants: Vec<String>,
    noframes: bool,
    warnings: Vec<String>,
}

fn rule_sources(rules: &[UrlRule]) -> Vec<String> {
    rules.iter().map(|rule| rule.to_string()).collect()
}

fn cmd_inspect(file: &Path, json: bool) -> Result<(), String> {
    let source = fs::read_to_string(file).map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    let parsed = parse_metadata(&source);
    let meta = parsed.metadata;

    let summary = MetadataSummary {
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        description: meta.description.clone(),
        version: meta.version.clone(),
        run_at: meta.run_at,
        includes: rule_sources(&meta.includes),
        excludes: rule_sources(&meta.excludes),
        matches: rule_sources(&meta.matches),
        requires: meta.requires.clone(),
        grants: meta.grants.clone(),
        noframes: meta.noframes,
        warnings: parsed.warnings.iter().map(|w| w.to_string()).collect(),
    };

    if json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| format!("Failed to encode JSON: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Script: {}", file.display());
    println!("  Name:        {}", summary.name.as_deref().unwrap_or("-"));
    println!("  Namespace:   {}", summary.namespace.as_deref().unwrap_or("-"));
    println!("  Version:     {}", summary.version.as_deref().unwrap_or("-"));
    println!("  Run at:      {}", summary.run_at);
    println!("  No frames:   {}", summary.noframes);
    print_list("Includes", &summary.includes);
    print_list("Excludes", &summary.excludes);
    print_list("Matches", &summary.matches);
    print_list("Requires", &summary.requires);
    print_list("Grants", &summary.grants);
    print_list("Warnings", &summary.warnings);

    Ok(())
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {}:", label);
    for item in items {
        println!("    {}", item);
    }
}

// =============================================================================
// Scripts Directory
// =============================================================================


fn load_config(store: &StoreArgs) -> Result<ManagerConfig, String> {
    let mut config = match &store.config {
        Some(path) => ManagerConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => ManagerConfig::default(),
    };
    if let Some(dir) = &store.dir {
        config.scripts_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Load the scripts directory. Read-only commands pass an
/// [`OfflineDownloader`] so nothing is fetched.
fn open_manager<D>(store: &StoreArgs, force: bool, downloader: D) -> Result<ScriptManager<DirStorage, D>, String>
where
    D: Downloader,
{
    let config = load_config(store)?;
    let dir = config
        .scripts_dir
        .clone()
        .ok_or_else(|| "No scripts directory (use --dir or scripts_dir in --config)".to_string())?;

    let mut manager = ScriptManager::new(config, DirStorage::new(&dir), downloader);

    let loaded = if force {
        manager.load_scripts_forced()
    } else {
        manager.load_scripts()
    };
    let count = loaded.map_err(|e| format!("Failed to load scripts: {}", e))?;
    log::info!("loaded {} scripts from {}", count, dir.display());

    Ok(manager)
}

fn new_runtime() -> Result<Runtime, String> {
    Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))
}

fn http_downloader(runtime: &Runtime) -> Result<HttpDownloader, String> {
    HttpDownloader::new(runtime.handle().clone()).map_err(|e| format!("Failed to create HTTP client: {}", e))
}

fn describe(script: &Script) -> String {
    let state = if script.is_ready() { "" } else { " [pending]" };
    format!("{} ({}){}", script.name(), script.filename(), state)
}

fn cmd_list(store: &StoreArgs) -> Result<(), String> {
    let manager = open_manager(store, false, OfflineDownloader)?;

    let scripts = manager.all_scripts();
    println!("{} scripts (generation {})", scripts.len(), manager.generation());
    for script in &scripts {
        println!("  {:<14} {}", script.run_at().as_str(), describe(script));
    }

    let in_flight = manager.in_flight_downloads();
    if !in_flight.is_empty() {
        println!("{} requirement(s) not cached yet", in_flight.len());
    }

    Ok(())
}

fn cmd_scripts_for(raw: &str, store: &StoreArgs) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid URL '{}': {}", raw, e))?;
    let manager = open_manager(store, false, OfflineDownloader)?;

    let sets: ScriptSets = manager.scripts_for(&url);
    if sets.is_empty() {
        println!("No scripts run on {}", url);
        return Ok(());
    }

    for run_at in [RunAt::DocumentStart, RunAt::DocumentEnd, RunAt::DocumentIdle] {
        let bucket = sets.bucket(run_at);
        if bucket.is_empty() {
            continue;
        }
        println!("{}:", run_at);
        for script in bucket {
            println!("  {}", describe(script));
        }
    }

    Ok(())
}

fn cmd_code(filename: &str, store: &StoreArgs, force: bool) -> Result<(), String> {
    let runtime = new_runtime()?;
    let mut manager = open_manager(store, force, http_downloader(&runtime)?)?;
    runtime.block_on(manager.wait_for_requirements());

    let script = manager
        .get(filename)
        .ok_or_else(|| format!("No script named '{}'", filename))?;
    println!("{}", script.code());

    Ok(())
}

fn cmd_install(file: &Path, store: &StoreArgs) -> Result<(), String> {
    let source = fs::read_to_string(file).map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("Invalid script path '{}'", file.display()))?;

    let runtime = new_runtime()?;
    let mut manager = open_manager(store, false, http_downloader(&runtime)?)?;
    let script = manager
        .install_script(filename, &source)
        .map_err(|e| format!("Failed to install '{}': {}", filename, e))?;
    runtime.block_on(manager.wait_for_requirements());

    println!("Installed {} as {}", script.name(), filename);
    println!("  Requires:    {}", script.requires().len());

    Ok(())
}
