//! Async Unix socket server for the host bridge.
//!
//! Each connection carries newline-delimited JSON requests. `Invoke`
//! requests get exactly one response line; `Send` requests get none.

use crate::error::{Result, VoxError};
use crate::ipc::protocol::{Request, RequestKind, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Handler trait for processing bridge requests.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response. The response of a `Send`
    /// request is dropped by the server.
    async fn handle(&self, request: Request) -> Response;
}

/// State for managing server shutdown.
#[derive(Debug, Clone)]
pub struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    /// Make the accept loop return at its next poll.
    pub async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// IPC server for the host bridge via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    state: ServerState,
}

impl IpcServer {
    /// Create a new IPC server bound to the specified socket path.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            state: ServerState::new(),
        }
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Shared shutdown flag, for stopping the server from another task.
    pub fn state(&self) -> ServerState {
        self.state.clone()
    }

    /// Serve connections until `exit-app` arrives or shutdown is set, then
    /// remove the socket file.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: RequestHandler + 'static,
    {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| VoxError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| VoxError::IpcSocket {
            message: format!("Failed to bind to socket: {}", e),
        })?;
        log::info!("IPC host listening on {}", self.socket_path.display());

        let handler = Arc::new(handler);

        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept connection with timeout to check for shutdown
            let accept_result =
                tokio::time::timeout(tokio::time::Duration::from_millis(100), listener.accept())
                    .await;

            match accept_result {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler, state).await {
                            log::warn!("Error handling client: {}", e);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(VoxError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => {
                    // Timeout - check shutdown flag again
                    continue;
                }
            }
        }

        self.stop().await
    }

    /// Stop the IPC server and clean up the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| VoxError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Serve one connection until the peer closes it.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>, state: ServerState) -> Result<()>
where
    H: RequestHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| VoxError::IpcConnection {
                message: format!("Failed to read from client: {}", e),
            })?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match Request::from_json(line.trim()) {
            Ok(request) => {
                log::trace!("IPC request on {}", request.channel());
                let kind = request.kind();
                let exit = matches!(request, Request::ExitApp);
                let response = handler.handle(request).await;
                if exit {
                    state.set_shutdown().await;
                }
                match kind {
                    RequestKind::Invoke => response,
                    RequestKind::Send => continue,
                }
            }
            Err(e) => Response::error(format!("Failed to parse request: {}", e)),
        };

        let mut response_json = response.to_json().map_err(|e| VoxError::IpcProtocol {
            message: format!("Failed to serialize response: {}", e),
        })?;
        response_json.push('\n');

        writer
            .write_all(response_json.as_bytes())
            .await
            .map_err(|e| VoxError::IpcConnection {
                message: format!("Failed to write to client: {}", e),
            })?;

        writer
            .flush()
            .await
            .map_err(|e| VoxError::IpcConnection {
                message: format!("Failed to flush writer: {}", e),
            })?;
    }
}
