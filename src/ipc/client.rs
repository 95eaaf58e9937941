//! IPC client for talking to a running host.

use crate::error::{Result, VoxError};
use crate::ipc::protocol::{Request, RequestKind, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;

async fn connect(socket_path: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|e| VoxError::IpcConnection {
            message: format!("Failed to connect to host at {}: {}", socket_path.display(), e),
        })
}

async fn write_request(writer: &mut OwnedWriteHalf, request: &Request) -> Result<()> {
    let mut request_json = request.to_json().map_err(|e| VoxError::IpcProtocol {
        message: format!("Failed to serialize request: {}", e),
    })?;
    request_json.push('\n');

    writer
        .write_all(request_json.as_bytes())
        .await
        .map_err(|e| VoxError::IpcConnection {
            message: format!("Failed to write request: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| VoxError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}

/// Send a request/response message and wait for the host's answer.
///
/// # Errors
/// Returns `VoxError::IpcProtocol` for fire-and-forget channels, which the
/// host never answers, and for malformed replies.
/// Returns `VoxError::IpcConnection` if the socket cannot be reached.
pub async fn invoke(socket_path: &Path, request: &Request) -> Result<Response> {
    if request.kind() == RequestKind::Send {
        return Err(VoxError::IpcProtocol {
            message: format!("{} is fire-and-forget; use send", request.channel()),
        });
    }

    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_request(&mut writer, request).await?;

    let mut response_line = String::new();
    let read = reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| VoxError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;
    if read == 0 {
        return Err(VoxError::IpcConnection {
            message: format!("Host closed the connection before answering {}", request.channel()),
        });
    }

    Response::from_json(response_line.trim()).map_err(|e| VoxError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}

/// Deliver a fire-and-forget message.
pub async fn send(socket_path: &Path, request: &Request) -> Result<()> {
    let stream = connect(socket_path).await?;
    let (_reader, mut writer) = stream.into_split();
    write_request(&mut writer, request).await?;
    writer
        .shutdown()
        .await
        .map_err(|e| VoxError::IpcConnection {
            message: format!("Failed to close connection: {}", e),
        })
}
