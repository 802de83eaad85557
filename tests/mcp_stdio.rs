use std::{path::PathBuf, sync::Arc, time::Duration};

use autoresearcher::{OllamaClient, VectorIndex, retrieval::NO_RELEVANT_INFORMATION};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

/// Create an empty collection so the tools never reach a provider.
fn setup_fixture(data_dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(OllamaClient::new(
        "http://127.0.0.1:9",
        "llama3",
        "all-minilm",
        Duration::from_secs(1),
    ));
    VectorIndex::open(&data_dir.join("index"), "papers", client)?;
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_search_and_ask_on_empty_collection() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = autoresearcher_bin()?;
    let transport = TokioChildProcess::new(tokio::process::Command::new(bin).configure(|cmd| {
        cmd.arg("mcp")
            .env("AUTORESEARCHER_DATA_DIR", tempdir.path())
            .env("AUTORESEARCHER_OLLAMA_URL", "http://127.0.0.1:9")
            .env("AUTORESEARCHER_LOG", "warn");
    }))?;

    let client = ().serve(transport).await?;

    let tools = client.peer().list_all_tools().await?;
    let names: Vec<_> = tools.iter().map(|t| t.name.to_string()).collect();
    assert!(names.contains(&"autoresearcher_search".to_string()));
    assert!(names.contains(&"autoresearcher_ask".to_string()));

    let search_args = json!({
        "query": "What hardware is used for testing?",
        "collection": "papers",
        "topK": 3
    });
    let result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("autoresearcher_search")
                .with_arguments(search_args.as_object().unwrap().clone()),
        )
        .await?;

    let structured = result.structured_content.expect("structured content");
    assert_eq!(structured.get("resultCount"), Some(&json!(0)));
    assert_eq!(
        structured
            .get("results")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(0)
    );

    let ask_args = json!({
        "question": "What hardware is used for testing?",
        "collection": "papers",
        "mode": "rag"
    });
    let result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("autoresearcher_ask")
                .with_arguments(ask_args.as_object().unwrap().clone()),
        )
        .await?;

    let structured = result.structured_content.expect("structured content");
    assert_eq!(structured.get("mode"), Some(&json!("rag")));
    assert_eq!(
        structured.get("answer").and_then(|v| v.as_str()),
        Some(NO_RELEVANT_INFORMATION)
    );

    client.cancel().await?;
    Ok(())
}

fn autoresearcher_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_autoresearcher") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("autoresearcher");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
