//! JSON-lines transport for [`ProcessTool`]
//!
//! One request object per input line, one [`ToolResult`] per output line.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::{ProcessTool, ToolResult};

/// Serve requests from `reader` until it reaches EOF
pub async fn serve<R, W>(tool: &ProcessTool, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match serde_json::from_str(line) {
            Ok(params) => tool.execute_json(params).await,
            Err(err) => ToolResult::failure("unknown", format!("Invalid JSON: {err}")),
        };
        debug!(action = %result.details.action, success = result.details.success, "handled request");

        let mut out = serde_json::to_string(&result)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await.context("Failed to write response")?;
        writer.flush().await?;
        handled += 1;
    }

    info!(handled, "tool input closed");
    Ok(())
}
