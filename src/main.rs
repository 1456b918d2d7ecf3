use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use gcp_discovery::gcp::{GcpClient, RestProvider};
use gcp_discovery::{
    Config, Discovery, Item, ItemStream, MemoryCache, QueryContext, QueryError, Registry,
    WILDCARD_SCOPE,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Discover GCP resources and the links between them
#[derive(Parser, Debug)]
#[command(name = "gcp-discovery", version = gcp_discovery::VERSION, about, long_about = None)]
struct Args {
    /// Config file (JSON or YAML); defaults to the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GCP project to discover in (repeatable)
    #[arg(short, long)]
    project: Vec<String>,

    /// Region to discover in (repeatable)
    #[arg(short, long)]
    region: Vec<String>,

    /// Zone to discover in (repeatable)
    #[arg(short, long)]
    zone: Vec<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Skip cache lookups
    #[arg(long)]
    ignore_cache: bool,

    /// Send every API call to this root URL instead (emulators)
    #[arg(long)]
    api_root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one item
    Get {
        item_type: String,
        scope: String,
        /// Query parts, separately or joined with '|'
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// List items in a scope, or everywhere with '*'
    List {
        item_type: String,
        #[arg(default_value = WILDCARD_SCOPE)]
        scope: String,
    },
    /// Search items in a scope
    Search {
        item_type: String,
        scope: String,
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Show registered types and the permissions they need
    Types,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcp-discovery started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcp-discovery").join("gcp-discovery.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcp-discovery").join("gcp-discovery.log");
    }
    PathBuf::from("gcp-discovery.log")
}

/// Config file, then CLI flags, then gcloud defaults for anything still unset
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if !args.project.is_empty() {
        config.projects = args.project.clone();
    }
    if !args.region.is_empty() {
        config.regions = args.region.clone();
    }
    if !args.zone.is_empty() {
        config.zones = args.zone.clone();
    }
    config.apply_gcloud_defaults();

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let registry = Registry::builtin().context("Failed to load resource definitions")?;
    if let Command::Types = args.command {
        print_types(&registry)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&args)?;
    if config.projects.is_empty() {
        anyhow::bail!("No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project flag");
    }
    tracing::info!(
        "Discovering in projects {:?}, regions {:?}, zones {:?}",
        config.projects,
        config.effective_regions(),
        config.zones
    );

    let mut client = GcpClient::new(registry.services().clone()).await?;
    if let Some(root) = &args.api_root {
        client.override_roots(root);
    }

    let discovery = Discovery::new(
        &registry,
        &config,
        Arc::new(RestProvider::new(client)),
        Arc::new(MemoryCache::new()),
    );

    let ctx = QueryContext::new().ignore_cache(args.ignore_cache);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // `_log_guard` has to drop before the process exits
    let clean = run(&discovery, &ctx, &args.command).await?;
    Ok(exit_code(clean))
}

/// Failure when any error was reported on stderr
fn exit_code(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one query, printing items as JSON lines; false if any error was reported
async fn run(discovery: &Discovery, ctx: &QueryContext, command: &Command) -> Result<bool> {
    let stream = match command {
        Command::Get {
            item_type,
            scope,
            query,
        } => {
            let query: Vec<&str> = query.iter().map(String::as_str).collect();
            return match discovery.get(ctx, item_type, scope, &query).await {
                Ok(item) => {
                    print_item(&item)?;
                    Ok(true)
                },
                Err(err) => {
                    report(&err);
                    Ok(false)
                },
            };
        },
        Command::List { item_type, scope } => discovery.list_stream(ctx, item_type, scope).await,
        Command::Search {
            item_type,
            scope,
            query,
        } => {
            let query: Vec<&str> = query.iter().map(String::as_str).collect();
            discovery.search_stream(ctx, item_type, scope, &query).await
        },
        Command::Types => return Ok(true),
    };

    match stream {
        Ok(stream) => print_stream(stream).await,
        Err(err) => {
            report(&err);
            Ok(false)
        },
    }
}

async fn print_stream(mut stream: ItemStream) -> Result<bool> {
    let mut clean = true;
    while let Some(event) = stream.next().await {
        match event {
            Ok(item) => print_item(&item)?,
            Err(err) => {
                report(&err);
                clean = false;
            },
        }
    }
    Ok(clean)
}

fn print_item(item: &Item) -> Result<()> {
    let line = serde_json::to_string(item)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", line)?;
    Ok(())
}

fn report(err: &QueryError) {
    let message = match err {
        QueryError::Provider(e) => e.user_message(),
        other => other.to_string(),
    };
    eprintln!("{}: {}", err.code(), message);
}

fn print_types(registry: &Registry) -> Result<()> {
    let mut out = io::stdout().lock();
    for resource in registry.iter() {
        let def = &resource.def;
        writeln!(
            out,
            "{}\t{}\t{}\t{}{}",
            resource.item_type,
            def.category,
            def.scope,
            def.display_name,
            if def.supports_wildcard() { "\t(wildcard)" } else { "" }
        )?;
        for permission in &def.iam_permissions {
            writeln!(out, "    {}", permission)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_errors_fail_the_process() {
        assert_eq!(format!("{:?}", exit_code(true)), format!("{:?}", ExitCode::SUCCESS));
        assert_eq!(format!("{:?}", exit_code(false)), format!("{:?}", ExitCode::FAILURE));
    }

    #[test]
    fn test_types_command_parses() {
        let args = Args::try_parse_from(["gcp-discovery", "types"]).unwrap();
        assert!(matches!(args.command, Command::Types));
    }
}
