//! Project-aware documentation lookups.
//!
//! A [`ProjectContext`] is read from the manifests at a project root and
//! biases searches towards the docsets that project actually uses.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    search::{SearchCoordinator, SearchHit, SearchRequest},
};

const MAX_CURRENT_FILES: usize = 50;
const PROJECT_BOOST: u32 = 20;
const RELEVANT_LIMIT: usize = 10;
const FALLBACK_LIMIT: usize = 15;
const MAX_RELEVANT: usize = 20;
const MAX_GUIDANCE: usize = 15;
const MIGRATION_LIMIT: usize = 10;
const MAX_MIGRATION: usize = 20;
const API_LIMIT: usize = 10;

/// Entry types kept by API reference lookups.
const API_TYPES: &[&str] = &["method", "function", "class", "interface", "property"];

/// Docsets that document a dependency, keyed by package name.
const DEPENDENCY_DOCSETS: &[(&str, &[&str])] = &[
    ("lodash", &["lodash"]),
    ("axios", &["axios"]),
    ("express", &["express", "nodejs"]),
    ("mongoose", &["mongoose"]),
    ("pandas", &["pandas"]),
    ("numpy", &["numpy"]),
    ("requests", &["python_requests"]),
    ("tensorflow", &["tensorflow"]),
    ("pytorch", &["pytorch"]),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectContext {
    pub language: Option<String>,
    pub framework: Option<String>,
    pub dependencies: Vec<String>,
    /// Project-relative paths of non-hidden files, sorted, at most 50.
    pub current_files: Vec<String>,
}

/// Inspect the manifests under `project_dir`.
///
/// `package.json` marks a JavaScript project; `requirements.txt` or
/// `pyproject.toml` a Python one. Unreadable manifests are logged and leave
/// the context partially filled.
pub fn analyze_project(project_dir: &Path) -> Result<ProjectContext> {
    if !project_dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Project path is not a directory: {}",
            project_dir.display()
        )));
    }

    let mut context = ProjectContext::default();

    let package_json = project_dir.join("package.json");
    let requirements = project_dir.join("requirements.txt");

    if package_json.exists() {
        match read_package_dependencies(&package_json) {
            Ok(deps) => {
                context.language = Some("javascript".into());
                context.framework = detect_js_framework(&deps);
                context.dependencies = deps;
            }
            Err(e) => {
                tracing::error!(path = %package_json.display(), error = %e, "error analyzing package.json");
            }
        }
    } else if requirements.exists() || project_dir.join("pyproject.toml").exists() {
        context.language = Some("python".into());
        if requirements.exists() {
            match std::fs::read_to_string(&requirements) {
                Ok(content) => context.dependencies = parse_requirements(&content),
                Err(e) => {
                    tracing::warn!(path = %requirements.display(), error = %e, "could not read requirements");
                }
            }
        }
        context.framework = detect_python_framework(&context.dependencies);
    }

    context.current_files = list_files(project_dir, MAX_CURRENT_FILES);
    Ok(context)
}

fn read_package_dependencies(path: &Path) -> Result<Vec<String>> {
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(manifest
        .get("dependencies")
        .and_then(|d| d.as_object())
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default())
}

fn detect_js_framework(deps: &[String]) -> Option<String> {
    let has = |name: &str| deps.iter().any(|d| d == name);
    let framework = if has("react") {
        "react"
    } else if has("vue") {
        "vue"
    } else if has("angular") {
        "angular"
    } else if has("next") || has("nextjs") {
        "nextjs"
    } else if has("express") {
        "express"
    } else {
        return None;
    };
    Some(framework.into())
}

fn detect_python_framework(deps: &[String]) -> Option<String> {
    ["django", "flask", "fastapi", "streamlit"]
        .into_iter()
        .find(|fw| deps.iter().any(|d| d.eq_ignore_ascii_case(fw)))
        .map(String::from)
}

/// Package names from a requirements file. Version specifiers, extras,
/// markers, comments and pip options are dropped.
fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
        .filter_map(|line| {
            let end = line
                .find(|c: char| "=<>~![;@ ".contains(c))
                .unwrap_or(line.len());
            let name = line[..end].trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

fn list_files(root: &Path, max: usize) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut entries: Vec<PathBuf> =
            entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        entries.sort();

        for path in entries.into_iter().rev() {
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            if hidden || path.is_symlink() {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(root) {
                files.push(rel.to_string_lossy().into_owned());
            }
        }
    }

    files.sort();
    files.truncate(max);
    files
}

/// Docset names relevant to a project, in priority order, without
/// duplicates.
pub fn relevant_docsets(context: &ProjectContext) -> Vec<String> {
    let mut names: Vec<&str> = Vec::new();
    let framework = context.framework.as_deref();

    match context.language.as_deref() {
        Some("javascript") => {
            names.extend(["javascript", "nodejs", "mdn"]);
            match framework {
                Some("react") => names.extend(["react", "react_native"]),
                Some("vue") => names.push("vue"),
                Some("angular") => names.push("angular"),
                Some("nextjs") => names.extend(["react", "nextjs"]),
                _ => {}
            }
        }
        Some("python") => {
            names.extend(["python", "python_3"]);
            match framework {
                Some("django") => names.push("django"),
                Some("flask") => names.push("flask"),
                Some("fastapi") => names.push("fastapi"),
                _ => {}
            }
        }
        _ => {}
    }

    for dep in &context.dependencies {
        let dep = dep.to_lowercase();
        if let Some((_, docsets)) =
            DEPENDENCY_DOCSETS.iter().find(|(name, _)| *name == dep)
        {
            names.extend(docsets.iter());
        }
    }

    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(*n))
        .map(String::from)
        .collect()
}

/// Search the project's docsets first, boosting their hits, and fall back
/// to a general search when none of them matched.
pub fn relevant_documentation(
    coordinator: &SearchCoordinator,
    query: &str,
    context: &ProjectContext,
    include_content: bool,
) -> Result<Vec<SearchHit>> {
    let mut results = Vec::new();

    for docset in relevant_docsets(context) {
        if coordinator.registry().find(&docset).is_none() {
            continue;
        }

        let request = SearchRequest {
            docset: Some(docset.clone()),
            limit: RELEVANT_LIMIT,
            include_content,
            use_fuzzy: true,
            ..SearchRequest::new(query)
        };
        match coordinator.search(&request) {
            Ok(hits) => results.extend(hits.into_iter().map(|mut hit| {
                hit.project_relevance = true;
                hit.score += PROJECT_BOOST;
                hit
            })),
            Err(e) => {
                tracing::error!(docset = %docset, error = %e, "error searching project docset");
            }
        }
    }

    if results.is_empty() {
        results = coordinator.search(&SearchRequest {
            limit: FALLBACK_LIMIT,
            include_content,
            use_fuzzy: true,
            ..SearchRequest::new(query)
        })?;
    }

    results.sort_by(|a, b| b.score.cmp(&a.score));
    results.truncate(MAX_RELEVANT);
    Ok(results)
}

fn guidance_queries(feature: &str, context: &ProjectContext) -> Vec<String> {
    match (context.framework.as_deref(), context.language.as_deref()) {
        (Some("react"), _) => vec![
            format!("react {feature} best practices"),
            format!("react {feature} patterns"),
            format!("react hooks {feature}"),
            format!("{feature} component patterns"),
        ],
        (Some("django"), _) => vec![
            format!("django {feature} best practices"),
            format!("django {feature} patterns"),
            format!("{feature} views models"),
        ],
        (_, Some("python")) => vec![
            format!("python {feature} best practices"),
            format!("python {feature} patterns"),
        ],
        _ => vec![format!("{feature} best practices")],
    }
}

/// Documentation on implementing `feature` in the project's stack.
pub fn implementation_guidance(
    coordinator: &SearchCoordinator,
    feature: &str,
    context: &ProjectContext,
) -> Result<Vec<SearchHit>> {
    let mut results = Vec::new();
    for query in guidance_queries(feature, context) {
        results.extend(relevant_documentation(coordinator, &query, context, true)?);
    }

    let mut unique = dedup_hits(results);
    unique.truncate(MAX_GUIDANCE);
    Ok(unique)
}

fn dedup_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(format!("{}:{}:{}", h.docset, h.name, h.path)))
        .collect()
}

fn migration_queries(technology: &str, from: &str, to: &str) -> [String; 5] {
    [
        format!("{technology} migrate {from} {to}"),
        format!("{technology} migration guide {to}"),
        format!("{technology} upgrade {to}"),
        format!("{technology} breaking changes {to}"),
        format!("{technology} changelog {to}"),
    ]
}

/// Documentation on moving `technology` from one version to another.
pub fn migration_guidance(
    coordinator: &SearchCoordinator,
    technology: &str,
    from_version: &str,
    to_version: &str,
) -> Result<Vec<SearchHit>> {
    let mut results = Vec::new();
    for query in migration_queries(technology, from_version, to_version) {
        results.extend(coordinator.search(&SearchRequest {
            limit: MIGRATION_LIMIT,
            include_content: true,
            use_fuzzy: true,
            ..SearchRequest::new(query)
        })?);
    }

    results.truncate(MAX_MIGRATION);
    Ok(results)
}

/// Reference entries for `api` within `technology`, preferring API-like
/// entry types when any matched.
pub fn api_reference(
    coordinator: &SearchCoordinator,
    api: &str,
    technology: &str,
    include_examples: bool,
) -> Result<Vec<SearchHit>> {
    let hits = coordinator.search(&SearchRequest {
        limit: API_LIMIT,
        include_content: include_examples,
        use_fuzzy: true,
        ..SearchRequest::new(format!("{technology} {api}"))
    })?;
    Ok(prefer_api_types(hits))
}

fn prefer_api_types(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let api_like: Vec<SearchHit> = hits
        .iter()
        .filter(|h| API_TYPES.contains(&h.kind.to_lowercase().as_str()))
        .cloned()
        .collect();

    if api_like.is_empty() { hits } else { api_like }
}
