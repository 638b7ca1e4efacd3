use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cache::Cache,
    config::Config,
    error::{Error, Result},
    extract,
    ranking::{RankMode, RankedEntry, RankingEngine},
    registry::{DocsetDescriptor, DocsetRegistry},
    schema::{self, RawEntry},
};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;
pub const MAX_QUERY_CHARS: usize = 500;

/// Characters removed from queries before they reach the index.
const UNSAFE_QUERY_CHARS: &[char] = &['<', '>', '"', '|', '&', ';', '$', '`', '\\'];

/// One documentation symbol matched in a docset index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub docset: String,
    pub anchor: Option<String>,
    pub content: Option<String>,
}

impl DocEntry {
    fn from_raw(raw: RawEntry, docset: &str) -> Self {
        Self {
            name: raw.name,
            kind: raw.kind,
            path: raw.path,
            docset: docset.to_string(),
            anchor: raw.anchor,
            content: None,
        }
    }
}

/// A ranked search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub docset: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set when the hit came from a docset matching the project context.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub project_relevance: bool,
}

impl From<RankedEntry> for SearchHit {
    fn from(RankedEntry { entry, score }: RankedEntry) -> Self {
        Self {
            docset: entry.docset,
            name: entry.name,
            kind: entry.kind,
            path: entry.path,
            score,
            anchor: entry.anchor,
            content: entry.content,
            project_relevance: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Restrict to one docset, matched case-insensitively.
    pub docset: Option<String>,
    pub limit: usize,
    pub include_content: bool,
    pub use_fuzzy: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            docset: None,
            limit: DEFAULT_LIMIT,
            include_content: false,
            use_fuzzy: true,
        }
    }

    fn cache_key(&self) -> String {
        Cache::derive_key(&format!(
            "{}_{:?}_{}_{}_{}",
            self.query,
            self.docset,
            self.limit,
            self.include_content,
            self.use_fuzzy
        ))
    }
}

/// Runs searches across the discovered docsets.
pub struct SearchCoordinator {
    cache: Arc<Cache>,
    registry: DocsetRegistry,
    ranking: RankingEngine,
}

impl SearchCoordinator {
    pub fn open(config: &Config) -> Result<Self> {
        let registry = DocsetRegistry::open(
            &config.docsets_root,
            &config.cache_dir,
            config.cache_ttl,
        )?;
        let cache = Arc::clone(registry.cache());
        Ok(Self::new(cache, registry, RankingEngine::default()))
    }

    pub fn new(
        cache: Arc<Cache>,
        registry: DocsetRegistry,
        ranking: RankingEngine,
    ) -> Self {
        Self {
            cache,
            registry,
            ranking,
        }
    }

    pub fn registry(&self) -> &DocsetRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Execute the search pipeline.
    ///
    /// 1. Serve from cache (content-free requests only)
    /// 2. Select docsets, optionally by name
    /// 3. Query each index for `limit * 2` rows
    /// 4. Rank fuzzily or heuristically
    /// 5. Limit, then attach content if requested
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidInput("Query cannot be empty".into()));
        }

        let cache_key = request.cache_key();
        if !request.include_content
            && let Some(cached) = self.cache.get(&cache_key)
        {
            tracing::debug!(query = %request.query, "search served from cache");
            return Ok(cached);
        }

        let mut docsets = self.registry.list_docsets();
        if let Some(ref name) = request.docset {
            docsets.retain(|d| d.name.eq_ignore_ascii_case(name));
            if docsets.is_empty() {
                return Ok(Vec::new());
            }
        }

        let row_cap = request.limit.saturating_mul(2);
        let mut entries = Vec::new();
        for docset in &docsets {
            entries.extend(query_one(docset, &request.query, row_cap));
        }

        if entries.is_empty() {
            self.store(&cache_key, &[]);
            return Ok(Vec::new());
        }

        let mut ranked = self.ranking.rank(
            &request.query,
            entries,
            RankMode::from_flag(request.use_fuzzy),
        );
        ranked.truncate(request.limit);

        if request.include_content {
            attach_content(&docsets, &mut ranked);
        }

        let hits: Vec<SearchHit> =
            ranked.into_iter().map(SearchHit::from).collect();

        if !request.include_content {
            self.store(&cache_key, &hits);
        }

        Ok(hits)
    }

    /// Extracted text of one document of a docset.
    pub fn get_doc_content(&self, docset: &str, path: &str) -> Result<String> {
        let docs_root =
            self.registry
                .docs_root(docset)
                .ok_or_else(|| Error::NotFound {
                    kind: "docset with content",
                    name: docset.to_string(),
                })?;

        extract::resolve_document(&docs_root, path)
            .and_then(|file| extract::extract_file(&file))
            .ok_or_else(|| Error::NotFound {
                kind: "supported document",
                name: path.to_string(),
            })
    }

    fn store(&self, key: &str, hits: &[SearchHit]) {
        if let Err(e) = self.cache.set(key, &hits) {
            tracing::error!(error = %e, "failed to cache search results");
        }
    }
}

impl std::fmt::Debug for SearchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCoordinator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn query_one(
    docset: &DocsetDescriptor,
    query: &str,
    row_cap: usize,
) -> Vec<DocEntry> {
    match schema::query_docset(&docset.db_path, query, row_cap) {
        Ok(rows) => rows
            .into_iter()
            .map(|raw| DocEntry::from_raw(raw, &docset.name))
            .collect(),
        Err(e) => {
            tracing::error!(docset = %docset.name, error = %e, "error searching docset");
            Vec::new()
        }
    }
}

fn attach_content(docsets: &[DocsetDescriptor], ranked: &mut [RankedEntry]) {
    for RankedEntry { entry, .. } in ranked.iter_mut() {
        let Some(docset) = docsets
            .iter()
            .find(|d| d.has_content && d.name == entry.docset)
        else {
            continue;
        };

        entry.content = extract::resolve_document(&docset.docs_path, &entry.path)
            .and_then(|file| extract::extract_file(&file))
            .filter(|text| !text.is_empty());
    }
}

pub fn format_human(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. [{:>3}] {}:{} ({}) {}",
            rank + 1,
            hit.score,
            hit.docset,
            hit.name,
            hit.kind,
            hit.path
        );
        if let Some(ref content) = hit.content {
            let preview: String = content.chars().take(200).collect();
            println!("     {preview}");
        }
    }
}

pub fn format_json(hits: &[SearchHit], query: &str) -> Result<()> {
    let output = serde_json::json!({
        "query": query,
        "result_count": hits.len(),
        "results": hits,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Validate and clean a caller-supplied query.
pub fn sanitize_query(query: &str) -> Result<String> {
    if query.trim().is_empty() {
        return Err(Error::InvalidInput("Query cannot be empty".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(Error::InvalidInput(format!(
            "Query too long (max {MAX_QUERY_CHARS} characters)"
        )));
    }

    let sanitized: String = query
        .chars()
        .filter(|c| !UNSAFE_QUERY_CHARS.contains(c))
        .collect();
    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return Err(Error::InvalidInput("Query cannot be empty".into()));
    }
    Ok(sanitized.to_string())
}

/// Coerce a caller-supplied limit to an integer in `1..=MAX_LIMIT`.
///
/// Numbers and numeric strings are truncated toward zero; anything else
/// is rejected.
pub fn coerce_limit(value: Option<&Value>) -> Result<usize> {
    let invalid = || Error::InvalidInput("limit must be an integer".into());

    let raw = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_LIMIT),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(invalid)?,
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };

    if !raw.is_finite() {
        return Err(invalid());
    }

    Ok(raw.trunc().clamp(1.0, MAX_LIMIT as f64) as usize)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::{path::Path, time::Duration};

    use super::*;
    use crate::schema::fixtures::{search_index_db, token_store_db};

    pub fn bundle(parent: &Path, name: &str) -> std::path::PathBuf {
        let resources = parent
            .join(format!("{name}.docset"))
            .join("Contents")
            .join("Resources");
        std::fs::create_dir_all(&resources).unwrap();
        resources
    }

    /// A Dash directory with "Alpha" (search index, with documents) and
    /// "Beta" (token store).
    pub fn dash_dir(root: &Path) {
        let docsets = root.join("DocSets");

        let alpha = bundle(&docsets, "Alpha");
        search_index_db(
            &alpha.join("docSet.dsidx"),
            true,
            &[
                ("fetchData", "Function", "api/fetch.html#fetchData"),
                ("parseJson", "Function", "api/parse.html"),
                ("Settings", "Class", "api/settings.html"),
            ],
        );
        let documents = alpha.join("Documents").join("api");
        std::fs::create_dir_all(&documents).unwrap();
        std::fs::write(
            documents.join("fetch.html"),
            "<html><body><h1>fetchData</h1><p>Loads remote data.</p></body></html>",
        )
        .unwrap();

        let beta = bundle(&docsets, "Beta");
        token_store_db(
            &beta.join("docSet.dsidx"),
            false,
            &[
                (Some("fetchQueue"), "Guide", "queue.html"),
                (Some("Config"), "Class", "config.html"),
            ],
        );
    }

    pub fn coordinator(root: &Path, cache_dir: &Path) -> SearchCoordinator {
        let cache =
            Arc::new(Cache::open(cache_dir, Duration::from_secs(3600)).unwrap());
        let registry = DocsetRegistry::new(root, Arc::clone(&cache));
        SearchCoordinator::new(cache, registry, RankingEngine::default())
    }
}
