//! Newline-delimited JSON-RPC over stdin/stdout

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::McpServer;
use crate::error::rpc_codes;
use crate::protocol::{JsonRpcResponse, RequestId};
use crate::{Error, Result};

/// Serve on the process stdin/stdout until stdin closes
///
/// # Errors
///
/// Returns an error if stdin or stdout fail.
pub async fn serve(server: Arc<McpServer>) -> Result<()> {
    info!("Starting stdio server");
    serve_io(server, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("stdin closed, stdio server stopped");
    Ok(())
}

/// Serve over arbitrary streams and hand the writer back when input ends.
///
/// Each request runs as its own task, so a slow query does not hold up the
/// next line; responses are written in completion order.
///
/// # Errors
///
/// Returns an error if reading or writing fails.
pub async fn serve_io<R, W>(server: Arc<McpServer>, reader: R, writer: W) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_lines(reader, writer, move |line| {
        let server = Arc::clone(&server);
        async move { server.handle_text(&line).await }
    })
    .await
}

async fn serve_lines<R, W, H, F>(reader: R, writer: W, handler: H) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    H: Fn(String) -> F,
    F: Future<Output = Option<JsonRpcResponse>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<W, std::io::Error>(writer)
    });

    let mut lines = BufReader::new(reader).lines();
    let mut inflight = JoinSet::new();
    // Request ids of running tasks, so a failed task can still be answered
    let mut pending: HashMap<task::Id, RequestId> = HashMap::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }

                let request_id = request_id(&line);
                let tx = tx.clone();
                let response = handler(line);
                let handle = inflight.spawn(async move {
                    if let Some(response) = response.await {
                        send(&tx, &response).await;
                    }
                });
                if let Some(id) = request_id {
                    pending.insert(handle.id(), id);
                }
            }
            Some(joined) = inflight.join_next_with_id(), if !inflight.is_empty() => {
                reap(joined, &mut pending, &tx).await;
            }
        }
    }

    while let Some(joined) = inflight.join_next_with_id().await {
        reap(joined, &mut pending, &tx).await;
    }
    drop(tx);

    writer_task
        .await
        .map_err(|e| Error::Transport(format!("stdout writer task failed: {e}")))?
        .map_err(Error::Io)
}

fn request_id(line: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

async fn send(tx: &mpsc::Sender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(text) => {
            if tx.send(text).await.is_err() {
                debug!("Writer gone, dropping response");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize response"),
    }
}

async fn reap(
    joined: std::result::Result<(task::Id, ()), JoinError>,
    pending: &mut HashMap<task::Id, RequestId>,
    tx: &mpsc::Sender<String>,
) {
    match joined {
        Ok((id, ())) => {
            pending.remove(&id);
        }
        Err(e) => {
            warn!(error = %e, "Request task failed");
            if let Some(request) = pending.remove(&e.id()) {
                let response = JsonRpcResponse::error(
                    Some(request),
                    rpc_codes::INTERNAL_ERROR,
                    "Internal error: request handler failed",
                );
                send(tx, &response).await;
            }
        }
    }
}
