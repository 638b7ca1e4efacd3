use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};

/// Records older than this are treated as absent.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_DASH_DIR: &str = "Library/Application Support/Dash";

#[derive(Debug, Clone)]
pub struct Config {
    /// Configured docset root, as supplied. Normalized by the registry.
    pub docsets_root: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
}

impl Config {
    /// Resolve the configuration from, in order of priority:
    /// 1. Explicit paths (from --docsets-path / --cache-dir)
    /// 2. The DASH_DOCSETS_PATH / DASH_MCP_CACHE_DIR environment variables
    /// 3. `~/Library/Application Support/Dash` and the XDG cache directory
    ///    (~/.cache/dash-mcp/)
    pub fn resolve(
        docsets_root: Option<&Path>,
        cache_dir: Option<&Path>,
    ) -> Result<Self> {
        let docsets_root = if let Some(path) = docsets_root {
            path.to_path_buf()
        } else if let Some(val) = env_path("DASH_DOCSETS_PATH") {
            val
        } else {
            default_docsets_root()?
        };

        let cache_dir = if let Some(path) = cache_dir {
            path.to_path_buf()
        } else if let Some(val) = env_path("DASH_MCP_CACHE_DIR") {
            val
        } else {
            xdg::BaseDirectories::with_prefix("dash-mcp")
                .get_cache_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG cache home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&cache_dir)
            .map_err(|_| Error::DataDir(cache_dir.clone()))?;

        let cache_ttl = match std::env::var("DASH_MCP_CACHE_TTL") {
            Ok(val) => parse_ttl(&val)?,
            Err(_) => DEFAULT_CACHE_TTL,
        };

        Ok(Self {
            docsets_root,
            cache_dir,
            cache_ttl,
        })
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn default_docsets_root() -> Result<PathBuf> {
    let home = env_path("HOME").ok_or_else(|| {
        Error::Config("HOME is not set and no docset path was given".into())
    })?;
    Ok(home.join(DEFAULT_DASH_DIR))
}

fn parse_ttl(value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| {
            Error::Config(format!(
                "DASH_MCP_CACHE_TTL must be a number of seconds, got {value:?}"
            ))
        })
}
