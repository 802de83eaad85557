use std::{path::PathBuf, sync::Arc};

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
use tracing::info;

use crate::{
    ask::{self, AnswerMode},
    data_dir::DataDir,
    embedding::Embedder,
    error::{self, Error},
    generation::Generator,
    ollama::OllamaClient,
    retrieval::{self, MAX_TOP_K},
    settings::Settings,
    vector_index::{DEFAULT_COLLECTION, SearchHit, VectorIndex},
};

struct ResearchState {
    index_root: PathBuf,
    default_top_k: usize,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
}

impl ResearchState {
    /// Tools never create collections.
    fn open(&self, name: &str) -> error::Result<VectorIndex> {
        VectorIndex::open_existing(&self.index_root, name, self.embedder.clone())
    }
}

#[derive(Clone)]
pub struct ResearchMcpServer {
    state: Arc<ResearchState>,
    tool_router: ToolRouter<Self>,
}

impl ResearchMcpServer {
    fn new(state: ResearchState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }

    fn top_k(&self, requested: Option<usize>) -> Result<usize, rmcp::ErrorData> {
        let top_k = requested.unwrap_or(self.state.default_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(rmcp::ErrorData::invalid_params(
                format!("topK must be between 1 and {MAX_TOP_K}"),
                None,
            ));
        }
        Ok(top_k)
    }

    /// Run blocking index and provider work off the async executor.
    async fn blocking<T, F>(&self, task: F) -> Result<T, rmcp::ErrorData>
    where
        T: Send + 'static,
        F: FnOnce(&ResearchState) -> error::Result<T> + Send + 'static,
    {
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || task(&state).map_err(tool_error))
            .await
            .map_err(|e| mcp_error("tool task failed", e))?
    }
}

#[tool_router(router = tool_router)]
impl ResearchMcpServer {
    /// Retrieve the passages most similar to a query.
    #[tool(
        name = "autoresearcher_search",
        description = "Find the passages of an indexed collection most similar to a query, with their source file and chunk number."
    )]
    pub async fn autoresearcher_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = self.top_k(params.top_k)?;
        let collection = params
            .collection
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let query = params.query.clone();
        let name = collection.clone();
        let hits = self
            .blocking(move |state| {
                let index = state.open(&name)?;
                retrieval::retrieve(&index, &query, top_k)
            })
            .await?;

        let items: Vec<PassageItem> = hits.into_iter().map(PassageItem::from).collect();
        let summary = format_search_summary(&items, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            collection,
            result_count: items.len(),
            results: items,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Answer a question from an indexed collection.
    #[tool(
        name = "autoresearcher_ask",
        description = "Answer a question using only an indexed collection. mode 'rag' makes one grounded call; mode 'agents' runs a searcher, critic and writer in sequence."
    )]
    pub async fn autoresearcher_ask(
        &self,
        params: Parameters<AskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = self.top_k(params.top_k)?;
        let mode = params.mode.unwrap_or_default();
        let collection = params
            .collection
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let question = params.question;
        let answer = self
            .blocking(move |state| {
                let index = state.open(&collection)?;
                ask::ask(&index, state.generator.as_ref(), &question, top_k, mode)
            })
            .await?;

        let structured = serde_json::to_value(&answer)
            .map_err(|e| mcp_error("failed to serialize answer", e))?;

        let mut result = CallToolResult::success(vec![Content::text(answer.text())]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ResearchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("autoresearcher", env!("CARGO_PKG_VERSION"))
                    .with_title("autoresearcher MCP"),
            )
            .with_instructions(
                "Use autoresearcher_search to see which passages match a question, and autoresearcher_ask to get an answer grounded in them.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Query text.
    pub query: String,
    /// Collection to search (default: "default").
    pub collection: Option<String>,
    /// Number of passages to return, 1 to 50.
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskParams {
    /// The question to answer.
    pub question: String,
    /// Collection to answer from (default: "default").
    pub collection: Option<String>,
    /// Number of passages to retrieve, 1 to 50.
    pub top_k: Option<usize>,
    /// "rag" (default) or "agents".
    pub mode: Option<AnswerMode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    collection: String,
    result_count: usize,
    results: Vec<PassageItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PassageItem {
    label: String,
    source: Option<String>,
    chunk_id: Option<i64>,
    score: f32,
    text: String,
}

impl From<SearchHit> for PassageItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            label: retrieval::passage_label(&hit),
            source: hit.metadata.source().map(str::to_string),
            chunk_id: hit.metadata.chunk_id(),
            score: hit.score,
            text: hit.text,
        }
    }
}

fn format_search_summary(results: &[PassageItem], query: &str) -> String {
    if results.is_empty() {
        return format!("No passages found for \"{query}\"");
    }

    let suffix = if results.len() == 1 { "" } else { "s" };
    let mut lines = Vec::with_capacity(results.len() + 1);
    lines.push(format!(
        "Found {} passage{suffix} for \"{query}\":",
        results.len()
    ));
    for item in results {
        lines.push(format!("{:.3} {}", item.score, item.label));
    }
    lines.join("\n")
}

/// Caller mistakes become invalid-params errors, everything else internal.
fn tool_error(error: Error) -> rmcp::ErrorData {
    match error {
        Error::Config(_) | Error::NotFound { .. } => {
            rmcp::ErrorData::invalid_params(error.to_string(), None)
        }
        other => mcp_error("tool failed", other),
    }
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(data_dir: &DataDir, settings: &Settings) -> error::Result<()> {
    let client = Arc::new(OllamaClient::from_settings(settings));
    let server = ResearchMcpServer::new(ResearchState {
        index_root: data_dir.index_root()?,
        default_top_k: settings.top_k,
        embedder: client.clone(),
        generator: client,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    info!(root = %data_dir.root().display(), "starting MCP server on stdio");
    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::Metadata,
        testing::{FakeEmbedder, ScriptedGenerator},
    };

    fn server(tmp: &tempfile::TempDir) -> ResearchMcpServer {
        let root = tmp.path().join("index");
        let embedder = Arc::new(FakeEmbedder::new(32));

        let mut index =
            VectorIndex::open(&root, "papers", embedder.clone()).unwrap();
        index
            .add_texts(
                vec![
                    "the detector runs on a Jetson Nano".into(),
                    "channel pruning halves the parameter count".into(),
                ],
                Some(vec![
                    Metadata::for_chunk("edge.txt", 0),
                    Metadata::for_chunk("edge.txt", 1),
                ]),
            )
            .unwrap();

        ResearchMcpServer::new(ResearchState {
            index_root: root,
            default_top_k: 5,
            embedder,
            generator: Arc::new(ScriptedGenerator::new()),
        })
    }

    #[tokio::test]
    async fn search_tool_returns_structured_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let result = server
            .autoresearcher_search(Parameters(SearchParams {
                query: "Jetson Nano".to_string(),
                collection: Some("papers".to_string()),
                top_k: Some(1),
            }))
            .await
            .unwrap();

        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["resultCount"], 1);
        let first = &structured["results"][0];
        assert_eq!(first["source"], "edge.txt");
        assert_eq!(first["chunkId"], 0);
        assert_eq!(first["label"], "[Source: edge.txt, Chunk: 0]");

        let summary = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(summary.starts_with("Found 1 passage for"));
    }

    #[tokio::test]
    async fn ask_tool_runs_agent_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let result = server
            .autoresearcher_ask(Parameters(AskParams {
                question: "what hardware is used?".to_string(),
                collection: Some("papers".to_string()),
                top_k: None,
                mode: Some(AnswerMode::Agents),
            }))
            .await
            .unwrap();

        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["mode"], "agents");
        assert_eq!(structured["final_answer"], "reply #3");
        assert_eq!(structured["sources"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn unknown_collection_is_invalid_params() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let err = server
            .autoresearcher_search(Parameters(SearchParams {
                query: "anything".to_string(),
                collection: Some("ghost".to_string()),
                top_k: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(!tmp.path().join("index").join("ghost").exists());
    }

    #[tokio::test]
    async fn top_k_out_of_range_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(&tmp);

        let err = server
            .autoresearcher_ask(Parameters(AskParams {
                question: "q".to_string(),
                collection: None,
                top_k: Some(0),
                mode: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }
}
