use std::path::PathBuf;

use clap::builder::TypedValueParser;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::search::{DEFAULT_LIMIT, SearchRequest};

#[derive(Debug, Parser)]
#[command(
    name = "dash-mcp",
    version,
    about = "Search local Dash docsets, standalone or as an MCP server"
)]
pub struct Cli {
    /// Dash directory or its DocSets folder (default: DASH_DOCSETS_PATH,
    /// then ~/Library/Application Support/Dash)
    #[arg(long, global = true)]
    pub docsets_path: Option<PathBuf>,

    /// Override the cache directory (default: XDG cache home)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    // `None` runs the MCP server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the MCP server on stdio
    Mcp,
    /// Search the installed docsets
    Search(SearchArgs),
    /// List the installed docsets
    List(ListArgs),
    /// Check that docsets can be found and report what was discovered
    Check,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Search only within this docset
    #[arg(short, long)]
    pub docset: Option<String>,

    /// Number of results to return (1-100)
    #[arg(
        short = 'n',
        long,
        default_value_t = DEFAULT_LIMIT,
        value_parser = clap::value_parser!(u16).range(1..=100).map(usize::from)
    )]
    pub limit: usize,

    /// Include extracted page content
    #[arg(long)]
    pub content: bool,

    /// Rank by exact heuristics instead of fuzzy similarity
    #[arg(long)]
    pub exact: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn request(&self, query: String) -> SearchRequest {
        SearchRequest {
            query,
            docset: self.docset.clone(),
            limit: self.limit,
            include_content: self.content,
            use_fuzzy: !self.exact,
        }
    }
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "dash-mcp",
            &mut std::io::stdout(),
        );
    }
}
