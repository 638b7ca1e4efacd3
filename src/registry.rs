//! Docset discovery.
//!
//! A docset is a `<Name>.docset` bundle directory holding a SQLite index at
//! `Contents/Resources/docSet.dsidx` and, optionally, its documents under
//! `Contents/Resources/Documents`. Bundles are found anywhere below the
//! configured root; Dash itself keeps them in `DocSets/` and
//! `User Contributed/`, possibly inside further category folders.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{cache::Cache, error::Result, walker};

pub const DOCSET_SUFFIX: &str = ".docset";
pub const INDEX_DB: &str = "Contents/Resources/docSet.dsidx";
pub const DOCUMENTS_DIR: &str = "Contents/Resources/Documents";
pub const INFO_PLIST: &str = "Contents/Info.plist";

/// Cache key of the full catalog, fixed within one root's cache.
pub const CATALOG_KEY: &str = "available_docsets";

const DOCSETS_DIR: &str = "DocSets";
const USER_CONTRIBUTED_DIR: &str = "User Contributed";

static BUNDLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>CFBundleName</key>\s*<string>([^<]+)</string>")
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocsetSource {
    /// Installed from the main Dash feed.
    Primary,
    /// Found under a `User Contributed` folder.
    UserContributed,
}

/// One discovered docset bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsetDescriptor {
    pub name: String,
    pub db_path: PathBuf,
    pub docs_path: PathBuf,
    pub has_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Name of the folder the bundle sits in.
    pub category: String,
    pub source: DocsetSource,
}

pub struct DocsetRegistry {
    root: PathBuf,
    cache: Arc<Cache>,
}

impl DocsetRegistry {
    /// Open a registry whose cache lives in a subdirectory of `cache_dir`
    /// named after the normalized root, so roots sharing a cache directory
    /// never see each other's catalogs or search results.
    pub fn open(
        configured_root: &Path,
        cache_dir: &Path,
        ttl: Duration,
    ) -> Result<Self> {
        let root = resolve_root(configured_root);
        let scope = Cache::derive_key(&root.to_string_lossy());
        let cache = Arc::new(Cache::open(&cache_dir.join(scope), ttl)?);
        Ok(Self::new(&root, cache))
    }

    pub fn new(configured_root: &Path, cache: Arc<Cache>) -> Self {
        let root = resolve_root(configured_root);
        tracing::info!(root = %root.display(), "using docset directory");
        if !root.exists() {
            tracing::warn!(root = %root.display(), "docset directory does not exist");
        }
        Self { root, cache }
    }

    /// The normalized discovery root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Return the docset catalog, scanning the root on a cache miss.
    pub fn list_docsets(&self) -> Vec<DocsetDescriptor> {
        if let Some(cached) = self.cache.get(CATALOG_KEY) {
            return cached;
        }

        if !self.root.exists() {
            self.store(&[]);
            return Vec::new();
        }

        let bundles = match walker::discover_bundles(&self.root) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(root = %self.root.display(), error = %e, "docset scan failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut docsets = Vec::with_capacity(bundles.len());

        for bundle in bundles {
            let Some(docset) = describe_bundle(&self.root, &bundle) else {
                continue;
            };
            if !seen.insert(docset.name.to_lowercase()) {
                tracing::warn!(
                    name = %docset.name,
                    path = %bundle.display(),
                    "duplicate docset name, keeping the first one found"
                );
                continue;
            }
            docsets.push(docset);
        }

        tracing::info!(count = docsets.len(), "discovered docsets");
        self.store(&docsets);
        docsets
    }

    /// Case-insensitive lookup by docset name.
    pub fn find(&self, name: &str) -> Option<DocsetDescriptor> {
        self.list_docsets()
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Document root of `name`, when that docset ships documents.
    pub fn docs_root(&self, name: &str) -> Option<PathBuf> {
        self.find(name)
            .filter(|d| d.has_content)
            .map(|d| d.docs_path)
    }

    fn store(&self, docsets: &[DocsetDescriptor]) {
        if let Err(e) = self.cache.set(CATALOG_KEY, &docsets) {
            tracing::error!(error = %e, "failed to cache docset catalog");
        }
    }
}

impl std::fmt::Debug for DocsetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocsetRegistry")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Normalize the configured root to the Dash container directory.
///
/// Symlinks are followed first. A path that names the `DocSets` folder
/// itself is widened to its parent so `User Contributed` is scanned too;
/// any other path is taken as the container.
pub fn resolve_root(configured: &Path) -> PathBuf {
    let resolved = configured
        .canonicalize()
        .unwrap_or_else(|_| configured.to_path_buf());

    let names_docsets = resolved
        .file_name()
        .is_some_and(|n| n == DOCSETS_DIR);
    let contains_docsets = resolved.join(DOCSETS_DIR).is_dir();

    match resolved.parent() {
        Some(parent) if names_docsets && !contains_docsets => {
            parent.to_path_buf()
        }
        _ => resolved,
    }
}

fn describe_bundle(root: &Path, bundle: &Path) -> Option<DocsetDescriptor> {
    let dir_name = bundle.file_name()?.to_string_lossy().to_string();
    let name = dir_name
        .strip_suffix(DOCSET_SUFFIX)
        .unwrap_or(&dir_name)
        .to_string();

    let db_path = bundle.join(INDEX_DB);
    if !db_path.is_file() {
        tracing::debug!(bundle = %bundle.display(), "bundle has no index database, skipping");
        return None;
    }

    let docs_path = bundle.join(DOCUMENTS_DIR);
    let has_content = docs_path.is_dir();

    let category = bundle
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let relative = bundle.strip_prefix(root).unwrap_or(bundle);
    let source = if relative
        .components()
        .any(|c| c.as_os_str() == USER_CONTRIBUTED_DIR)
    {
        DocsetSource::UserContributed
    } else {
        DocsetSource::Primary
    };

    Some(DocsetDescriptor {
        name,
        db_path,
        docs_path,
        has_content,
        display_name: read_display_name(&bundle.join(INFO_PLIST)),
        category,
        source,
    })
}

fn read_display_name(plist: &Path) -> Option<String> {
    let content = std::fs::read_to_string(plist).ok()?;
    BUNDLE_NAME
        .captures(&content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
