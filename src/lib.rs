//! dash-mcp - search local Dash docsets and serve them over MCP.
//!
//! Docsets are discovered below a Dash directory, queried through their
//! SQLite indexes (both the flat `searchIndex` and the Core Data token
//! store layouts), ranked fuzzily or heuristically, and optionally
//! enriched with the text of the documentation page. Results are cached
//! in memory and on disk for an hour.
//!
//! # Quick start
//!
//! ```no_run
//! use dash_mcp::{Config, SearchCoordinator};
//! use dash_mcp::search::SearchRequest;
//!
//! let config = Config::resolve(None, None).unwrap();
//! let coordinator = SearchCoordinator::open(&config).unwrap();
//!
//! let request = SearchRequest {
//!     docset: Some("JavaScript".to_string()),
//!     limit: 10,
//!     ..SearchRequest::new("fetch")
//! };
//!
//! for hit in coordinator.search(&request).unwrap() {
//!     println!("{}:{} (score: {})", hit.docset, hit.name, hit.score);
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod mcp;
pub mod project;
pub mod ranking;
pub mod registry;
pub mod schema;
pub mod search;
pub mod similarity;
pub mod walker;

pub use cache::Cache;
pub use config::Config;
pub use error::{Error, Result};
pub use registry::{DocsetDescriptor, DocsetRegistry};
pub use search::{SearchCoordinator, SearchHit};
