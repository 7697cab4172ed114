//! Line-delimited JSON-RPC over stdin/stdout
//!
//! Each request line is handled on its own task so a slow backend never
//! blocks the next request. A single writer task owns the output stream, so
//! responses are never interleaved. End of input drains in-flight requests
//! and returns.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::gateway::McpServer;
use crate::protocol::JsonRpcResponse;
use crate::{Error, Result};

/// Serve on the process's stdin and stdout until EOF or a shutdown signal
pub async fn serve_stdio(server: McpServer) -> Result<()> {
    info!("Serving MCP over stdio");
    tokio::select! {
        result = serve(server, tokio::io::stdin(), tokio::io::stdout()) => result,
        () = super::shutdown_signal() => Ok(()),
    }
}

/// Serve on arbitrary streams until the reader reaches EOF
pub async fn serve<R, W>(server: McpServer, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read from input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let server = server.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_line(&line).await {
                // Receiver only closes when the writer failed; nothing to do.
                let _ = tx.send(response);
            }
        });
    }

    debug!("Input closed, draining in-flight requests");
    drop(tx);
    writer_task
        .await
        .map_err(|e| Error::Internal(format!("stdio writer task failed: {e}")))?
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .map_err(|e| Error::Transport(format!("Failed to write response: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("Failed to flush: {e}")))?;
    }
    Ok(())
}
