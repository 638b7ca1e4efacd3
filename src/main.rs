use std::path::{Path, PathBuf};

use clap::Parser;
use dash_mcp::{
    cli::{Cli, Command, SearchArgs},
    config::Config,
    error::{self, Error},
    mcp,
    registry::DocsetSource,
    search::{self, SearchCoordinator},
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt::writer::MakeWriterExt};

fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(directives) = std::env::var("DASH_MCP_LOG") {
        return EnvFilter::new(directives);
    }

    if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new(
                std::env::var("DASH_MCP_LOG_LEVEL")
                    .unwrap_or_else(|_| "info".to_string()),
            ),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    }
}

/// Logs go to stderr, which leaves stdout to the MCP transport, and
/// additionally to `DASH_MCP_LOG_FILE` when set.
fn init_tracing(verbose: u8, quiet: bool) -> Option<WorkerGuard> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, quiet))
        .without_time();

    let Some(path) = std::env::var_os("DASH_MCP_LOG_FILE").map(PathBuf::from)
    else {
        builder.with_writer(std::io::stderr).init();
        return None;
    };

    match file_appender(&path) {
        Ok(appender) => {
            let (file, guard) = tracing_appender::non_blocking(appender);
            builder
                .with_writer(std::io::stderr.and(file))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(e) => {
            builder.with_writer(std::io::stderr).init();
            tracing::warn!(path = %path.display(), error = %e, "cannot open log file, logging to stderr only");
            None
        }
    }
}

fn file_appender(path: &Path) -> error::Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config("log file path has no file name".into()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|e| Error::Config(format!("cannot open log file: {e}")))
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.quiet);

    let resolve_config =
        || Config::resolve(cli.docsets_path.as_deref(), cli.cache_dir.as_deref());

    match cli.command.unwrap_or(Command::Mcp) {
        Command::Mcp => {
            mcp::run_mcp(&resolve_config()?)?;
        }
        Command::Search(args) => {
            cmd_search(&resolve_config()?, &args)?;
        }
        Command::List(args) => {
            cmd_list(&resolve_config()?, args.json)?;
        }
        Command::Check => {
            cmd_check(&resolve_config()?)?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn cmd_search(config: &Config, args: &SearchArgs) -> error::Result<()> {
    let query = search::sanitize_query(&args.query)?;
    let coordinator = SearchCoordinator::open(config)?;
    let hits = coordinator.search(&args.request(query.clone()))?;

    if args.json {
        search::format_json(&hits, &query)?;
    } else {
        search::format_human(&hits);
    }
    Ok(())
}

fn cmd_list(config: &Config, json: bool) -> error::Result<()> {
    let coordinator = SearchCoordinator::open(config)?;
    let docsets = coordinator.registry().list_docsets();

    if json {
        println!("{}", serde_json::to_string_pretty(&docsets)?);
        return Ok(());
    }

    if docsets.is_empty() {
        println!("No docsets found in {}", coordinator.registry().root().display());
        return Ok(());
    }

    for d in &docsets {
        let label = d.display_name.as_deref().unwrap_or(&d.name);
        let mut flags = Vec::new();
        if d.has_content {
            flags.push("content");
        }
        if d.source == DocsetSource::UserContributed {
            flags.push("user contributed");
        }
        println!("{}\t{label}\t[{}]", d.name, flags.join(", "));
    }
    Ok(())
}

fn cmd_check(config: &Config) -> error::Result<()> {
    let coordinator = SearchCoordinator::open(config)?;
    let registry = coordinator.registry();
    let docsets = registry.list_docsets();

    println!("Docset root:  {}", registry.root().display());
    println!("Cache:        {}", coordinator.cache().dir().display());
    println!("Cache TTL:    {}s", coordinator.cache().ttl().as_secs());
    println!("Docsets:      {}", docsets.len());
    for d in docsets.iter().take(5) {
        println!("  - {}", d.name);
    }

    if docsets.is_empty() {
        return Err(Error::NotFound {
            kind: "docsets",
            name: registry.root().display().to_string(),
        });
    }
    Ok(())
}
