use std::{path::Path, sync::Arc};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::Config,
    error::{self, Error},
    project::{self, ProjectContext},
    search::{self, SearchCoordinator, SearchHit, SearchRequest},
};

/// Files listed by `analyze_project_context`.
const CONTEXT_FILES_SHOWN: usize = 10;

const UNEXPECTED_ERROR: &str =
    "An unexpected error occurred. Please check server logs.";

#[derive(Clone)]
pub struct DashMcpServer {
    coordinator: Arc<SearchCoordinator>,
    tool_router: ToolRouter<Self>,
}

impl DashMcpServer {
    pub fn new(coordinator: SearchCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            tool_router: Self::tool_router(),
        }
    }

    /// Run a tool body on the blocking pool, turning caller errors into
    /// labeled error results and anything else into an opaque one.
    async fn reply<F>(&self, tool: &'static str, body: F) -> CallToolResult
    where
        F: FnOnce(&SearchCoordinator) -> error::Result<CallToolResult>
            + Send
            + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        let outcome =
            tokio::task::spawn_blocking(move || body(&coordinator)).await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_caller_error() => {
                tracing::debug!(tool, error = %e, "rejected tool call");
                error_result(format!("Error: {e}"))
            }
            Ok(Err(e)) => {
                tracing::error!(tool, error = %e, "unexpected error in tool");
                error_result(UNEXPECTED_ERROR.to_string())
            }
            Err(e) => {
                tracing::error!(tool, error = %e, "tool task failed");
                error_result(UNEXPECTED_ERROR.to_string())
            }
        }
    }
}

#[tool_router(router = tool_router)]
impl DashMcpServer {
    #[tool(
        name = "search_dash_docs",
        description = "Search local Dash docsets for API entries. Supports a docset filter, fuzzy or exact ranking, and optional page content."
    )]
    pub async fn search_dash_docs(
        &self,
        params: Parameters<SearchDocsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("search_dash_docs", move |coordinator| {
            let query = search::sanitize_query(&params.query)?;
            let limit = search::coerce_limit(params.limit.as_ref())?;

            if let Some(ref docset) = params.docset
                && coordinator.registry().find(docset).is_none()
            {
                return Err(Error::InvalidInput(format!(
                    "Unknown docset: {docset}"
                )));
            }

            let hits = coordinator.search(&SearchRequest {
                query,
                docset: params.docset,
                limit,
                include_content: params.include_content.unwrap_or(false),
                use_fuzzy: params.use_fuzzy.unwrap_or(true),
            })?;
            hits_result("documentation entries", &hits)
        })
        .await)
    }

    #[tool(
        name = "list_docsets",
        description = "List the Dash docsets installed on this machine."
    )]
    pub async fn list_docsets(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        Ok(self.reply("list_docsets", move |coordinator| {
            let docsets = coordinator.registry().list_docsets();
            let text = serde_json::to_string_pretty(&docsets)?;
            Ok(structured(
                text,
                json!({ "count": docsets.len(), "docsets": docsets }),
            ))
        })
        .await)
    }

    #[tool(
        name = "get_doc_content",
        description = "Read the text of one documentation page, by docset name and the entry path returned from a search."
    )]
    pub async fn get_doc_content(
        &self,
        params: Parameters<DocContentParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("get_doc_content", move |coordinator| {
            let content =
                coordinator.get_doc_content(&params.docset, &params.path)?;
            let payload = json!({
                "docset": params.docset,
                "path": params.path,
                "content": content,
            });
            Ok(structured(content, payload))
        })
        .await)
    }

    #[tool(
        name = "analyze_project_context",
        description = "Detect the language, framework and dependencies of a project directory."
    )]
    pub async fn analyze_project_context(
        &self,
        params: Parameters<ProjectParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("analyze_project_context", move |_| {
            let mut context = analyze(&params.project_path)?;
            context.current_files.truncate(CONTEXT_FILES_SHOWN);
            let text = serde_json::to_string_pretty(&context)?;
            Ok(structured(text, serde_json::to_value(&context)?))
        })
        .await)
    }

    #[tool(
        name = "get_project_relevant_docs",
        description = "Search documentation with results from the docsets a project uses ranked first."
    )]
    pub async fn get_project_relevant_docs(
        &self,
        params: Parameters<ProjectDocsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("get_project_relevant_docs", move |coordinator| {
            let query = search::sanitize_query(&params.query)?;
            let context = analyze(&params.project_path)?;
            let hits = project::relevant_documentation(
                coordinator,
                &query,
                &context,
                params.include_latest.unwrap_or(true),
            )?;
            hits_result("project-relevant entries", &hits)
        })
        .await)
    }

    #[tool(
        name = "get_implementation_guidance",
        description = "Find best-practice and pattern documentation for implementing a feature in a project's stack."
    )]
    pub async fn get_implementation_guidance(
        &self,
        params: Parameters<ImplementationParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("get_implementation_guidance", move |coordinator| {
            let feature = search::sanitize_query(&params.feature_description)?;
            let context = analyze(&params.project_path)?;
            let hits = project::implementation_guidance(
                coordinator,
                &feature,
                &context,
            )?;
            hits_result("guidance entries", &hits)
        })
        .await)
    }

    #[tool(
        name = "get_migration_docs",
        description = "Find migration, upgrade and changelog documentation between two versions of a technology."
    )]
    pub async fn get_migration_docs(
        &self,
        params: Parameters<MigrationParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("get_migration_docs", move |coordinator| {
            let technology = search::sanitize_query(&params.technology)?;
            let from = search::sanitize_query(&params.from_version)?;
            let to = search::sanitize_query(&params.to_version)?;
            let hits = project::migration_guidance(
                coordinator,
                &technology,
                &from,
                &to,
            )?;
            hits_result("migration entries", &hits)
        })
        .await)
    }

    #[tool(
        name = "get_latest_api_reference",
        description = "Look up reference entries for an API of a technology, preferring methods, functions, classes, interfaces and properties."
    )]
    pub async fn get_latest_api_reference(
        &self,
        params: Parameters<ApiReferenceParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        Ok(self.reply("get_latest_api_reference", move |coordinator| {
            let api = search::sanitize_query(&params.api_name)?;
            let technology = search::sanitize_query(&params.technology)?;
            let hits = project::api_reference(
                coordinator,
                &api,
                &technology,
                params.include_examples.unwrap_or(true),
            )?;
            hits_result("API reference entries", &hits)
        })
        .await)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DashMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("dash-mcp", env!("CARGO_PKG_VERSION"))
                    .with_title("Dash docsets MCP"),
            )
            .with_instructions(
                "Use search_dash_docs to find API entries in local Dash docsets, then get_doc_content to read a page. Use list_docsets to see what is installed; the project tools bias results towards a project's stack.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocsParams {
    /// Search query, at most 500 characters.
    pub query: String,
    /// Restrict to one docset (case-insensitive name).
    pub docset: Option<String>,
    /// Maximum number of results, 1 to 100 (default: 20).
    pub limit: Option<serde_json::Value>,
    /// Attach extracted page text to each result (default: false).
    pub include_content: Option<bool>,
    /// Rank by fuzzy similarity instead of exact heuristics (default: true).
    pub use_fuzzy: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocContentParams {
    /// Docset name, as reported by list_docsets.
    pub docset: String,
    /// Entry path relative to the docset's documents.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectParams {
    /// Path of the project root directory.
    pub project_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectDocsParams {
    pub query: String,
    /// Path of the project root directory.
    pub project_path: String,
    /// Attach extracted page text (default: true).
    pub include_latest: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImplementationParams {
    /// What is being implemented, e.g. "form validation".
    pub feature_description: String,
    /// Path of the project root directory.
    pub project_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MigrationParams {
    pub technology: String,
    pub from_version: String,
    pub to_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiReferenceParams {
    pub api_name: String,
    pub technology: String,
    /// Attach extracted page text (default: true).
    pub include_examples: Option<bool>,
}

fn analyze(project_path: &str) -> error::Result<ProjectContext> {
    project::analyze_project(Path::new(project_path))
}

fn structured(text: String, payload: serde_json::Value) -> CallToolResult {
    let mut result = CallToolResult::structured(payload);
    result.content = vec![Content::text(text)];
    result
}

fn hits_result(label: &str, hits: &[SearchHit]) -> error::Result<CallToolResult> {
    let text = format!(
        "Found {} {label}:\n{}",
        hits.len(),
        serde_json::to_string_pretty(hits)?
    );
    Ok(structured(
        text,
        json!({ "result_count": hits.len(), "results": hits }),
    ))
}

fn error_result(text: String) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text)])
}

pub fn run_mcp(config: &Config) -> error::Result<()> {
    let coordinator = SearchCoordinator::open(config)?;
    let server = DashMcpServer::new(coordinator);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start tokio runtime: {e}")))?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        tracing::info!("MCP server ready on stdio");
        running
            .waiting()
            .await
            .map_err(|e| Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{coordinator, dash_dir};

    fn server(tmp: &tempfile::TempDir) -> DashMcpServer {
        let root = tmp.path().join("Dash");
        dash_dir(&root);
        DashMcpServer::new(coordinator(&root, &tmp.path().join("cache")))
    }

    fn search_params(query: &str) -> SearchDocsParams {
        SearchDocsParams {
            query: query.to_string(),
            docset: None,
            limit: None,
            include_content: None,
            use_fuzzy: Some(false),
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn search_tool_returns_structured_results() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let params = SearchDocsParams {
            limit: Some(json!("5")),
            ..search_params("fetch")
        };
        let result = server.search_dash_docs(Parameters(params)).await.unwrap();

        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.clone().expect("structured");
        let results = structured
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].get("name").and_then(|v| v.as_str()),
            Some("fetchData")
        );
        assert_eq!(
            results[0].get("type").and_then(|v| v.as_str()),
            Some("Function")
        );
        assert!(text_of(&result).starts_with("Found 2 documentation entries:"));
    }

    #[tokio::test]
    async fn invalid_limit_is_a_labeled_error() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let params = SearchDocsParams {
            limit: Some(json!("bad")),
            ..search_params("fetch")
        };
        let result = server.search_dash_docs(Parameters(params)).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), "Error: limit must be an integer");
    }

    #[tokio::test]
    async fn empty_query_and_unknown_docset_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let empty = server
            .search_dash_docs(Parameters(search_params("  ")))
            .await
            .unwrap();
        assert_eq!(empty.is_error, Some(true));
        assert_eq!(text_of(&empty), "Error: Query cannot be empty");

        let params = SearchDocsParams {
            docset: Some("Gamma".into()),
            ..search_params("fetch")
        };
        let unknown = server.search_dash_docs(Parameters(params)).await.unwrap();
        assert_eq!(unknown.is_error, Some(true));
        assert_eq!(text_of(&unknown), "Error: Unknown docset: Gamma");
    }

    #[tokio::test]
    async fn list_docsets_reports_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let result = server.list_docsets().await.unwrap();

        let structured = result.structured_content.expect("structured");
        assert_eq!(structured.get("count"), Some(&json!(2)));
        let names: Vec<_> = structured["docsets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn doc_content_tool_reads_page() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let ok = server
            .get_doc_content(Parameters(DocContentParams {
                docset: "Alpha".into(),
                path: "api/fetch.html#fetchData".into(),
            }))
            .await
            .unwrap();
        assert_eq!(text_of(&ok), "fetchData Loads remote data.");

        let missing = server
            .get_doc_content(Parameters(DocContentParams {
                docset: "Beta".into(),
                path: "queue.html".into(),
            }))
            .await
            .unwrap();
        assert_eq!(missing.is_error, Some(true));
        assert!(text_of(&missing).starts_with("Error: docset with content not found"));
    }

    #[tokio::test]
    async fn analyze_project_context_tool() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);
        let project_dir = tmp.path().join("app");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("package.json"),
            r#"{"dependencies": {"vue": "3"}}"#,
        )
        .unwrap();

        let result = server
            .analyze_project_context(Parameters(ProjectParams {
                project_path: project_dir.to_string_lossy().into_owned(),
            }))
            .await
            .unwrap();

        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["language"], json!("javascript"));
        assert_eq!(structured["framework"], json!("vue"));
    }

    #[tokio::test]
    async fn internal_errors_are_opaque() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let result = server
            .reply("test", |_| Err(Error::Config("secret detail".into())))
            .await;

        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), UNEXPECTED_ERROR);
    }

    #[tokio::test]
    async fn panicking_tool_body_is_opaque() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let result = server
            .reply("test", |_| panic!("index corrupted"))
            .await;

        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), UNEXPECTED_ERROR);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_tool_calls_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let calls = (0..8).map(|_| {
            let server = server.clone();
            tokio::spawn(async move {
                server
                    .search_dash_docs(Parameters(search_params("fetch")))
                    .await
                    .unwrap()
            })
        });

        for call in calls.collect::<Vec<_>>() {
            let result = call.await.unwrap();
            assert_eq!(result.is_error, Some(false));
            assert!(text_of(&result).starts_with("Found 2 documentation entries:"));
        }
    }
}
