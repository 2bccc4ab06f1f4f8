use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::DaemonError;

/// Upper bound on one JSONL line; larger lines are rejected.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Read one JSONL message. `Ok(None)` on clean EOF.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, DaemonError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(DaemonError::ProtocolError(format!(
                "message of {} bytes exceeds limit",
                line.len()
            )));
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    let msg = serde_json::from_str(line.trim_end())
        .map_err(|e| DaemonError::ProtocolError(format!("invalid message: {}", e)))?;
    Ok(Some(msg))
}

/// Write one JSONL message and flush.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
