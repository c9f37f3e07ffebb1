//! JSON-lines request loop.
//!
//! One request per line on the input:
//!
//! ```json
//! {"id": 1, "tool": "read_text_file", "params": {"path": "README.md"}}
//! ```
//!
//! One response per line on the output, possibly out of order:
//!
//! ```json
//! {"id": 1, "success": true, "output": "..."}
//! {"id": 2, "success": false, "error": "not found: missing.txt"}
//! ```

use std::sync::Arc;

use anyhow::Result;
use fsgate_kernel::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// One tool invocation.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: serde_json::Value,
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Reply to a [`Request`], correlated by `id`.
#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub id: serde_json::Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(id: serde_json::Value, output: String) -> Self {
        Self {
            id,
            success: true,
            output: Some(output),
            error: None,
        }
    }

    fn err(id: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Run one request line through the registry.
pub async fn handle_line(registry: &ToolRegistry, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Response::err(serde_json::Value::Null, format!("Invalid request: {e}")),
    };

    let params = match &request.params {
        serde_json::Value::Null => "{}".to_string(),
        other => other.to_string(),
    };

    match registry.execute(&request.tool, &params).await {
        Ok(result) if result.success => Response::ok(request.id, result.stdout),
        Ok(result) => Response::err(request.id, result.stderr),
        Err(e) => {
            tracing::error!(tool = %request.tool, error = %e, "engine error");
            Response::err(request.id, "internal error")
        }
    }
}

/// Serve requests from `input` until EOF, writing responses to `output`.
///
/// Requests run concurrently; a single writer task serializes responses so
/// lines never interleave.
pub async fn serve<R, W>(registry: Arc<ToolRegistry>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Response>(64);

    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = input.lines();
    let mut handled = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;
        let registry = registry.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_line(&registry, &line).await;
            if tx.send(response).await.is_err() {
                tracing::warn!("response writer closed");
            }
        });
    }
    drop(tx);

    writer.await??;
    tracing::info!(requests = handled, "input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsgate_kernel::{register_file_tools, FsConfig, SandboxFs};
    use tempfile::TempDir;

    fn registry() -> (Arc<ToolRegistry>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = FsConfig {
            roots: vec![dir.path().to_string_lossy().into_owned()],
            ..FsConfig::default()
        };
        let fs = Arc::new(SandboxFs::from_config(&config, dir.path()).unwrap());
        let mut registry = ToolRegistry::new();
        register_file_tools(&mut registry, fs);
        (Arc::new(registry), dir)
    }

    #[tokio::test]
    async fn test_handle_line_success_and_failure() {
        let (registry, dir) = registry();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();

        let response = handle_line(
            &registry,
            r#"{"id": 7, "tool": "read_text_file", "params": {"path": "a.txt"}}"#,
        )
        .await;
        assert_eq!(response, Response::ok(serde_json::json!(7), "A".into()));

        let response = handle_line(
            &registry,
            r#"{"id": "x", "tool": "read_text_file", "params": {"path": "b.txt"}}"#,
        )
        .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("not found: b.txt"));
    }

    #[tokio::test]
    async fn test_handle_malformed_line() {
        let (registry, _dir) = registry();
        let response = handle_line(&registry, "not json").await;
        assert!(!response.success);
        assert_eq!(response.id, serde_json::Value::Null);
        assert!(response.error.unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_missing_params_defaults_to_empty_object() {
        let (registry, _dir) = registry();
        let response = handle_line(&registry, r#"{"id": 1, "tool": "cache_stats"}"#).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let (registry, dir) = registry();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();

        let input = concat!(
            r#"{"id": 1, "tool": "read_text_file", "params": {"path": "a.txt"}}"#,
            "\n\n",
            r#"{"id": 2, "tool": "nope"}"#,
            "\n",
        );
        let (client, server) = tokio::io::duplex(4096);
        serve(registry, input.as_bytes(), server).await.unwrap();

        let mut reader = tokio::io::BufReader::new(client).lines();
        let mut responses = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            responses.push(value);
        }
        responses.sort_by_key(|v| v["id"].as_u64());
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["output"], "A");
        assert_eq!(responses[1]["success"], false);
    }
}
