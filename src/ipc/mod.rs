//! Bridge between the sandboxed UI process and the host.

pub mod client;
pub mod handler;
pub mod protocol;
pub mod server;

pub use client::{invoke, send};
pub use handler::{HostHandler, LiveSourceFactory, default_live_source};
pub use protocol::{Request, RequestKind, Response, channels};
pub use server::{IpcServer, RequestHandler, ServerState};

use std::path::PathBuf;

/// Socket path based on XDG_RUNTIME_DIR, or `/tmp/voxdesk-<uid>.sock`.
pub fn default_socket_path() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(xdg_runtime) if !xdg_runtime.is_empty() => PathBuf::from(xdg_runtime).join("voxdesk.sock"),
        _ => PathBuf::from(format!("/tmp/voxdesk-{}.sock", crate::sys::current_uid())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path_returns_valid_path() {
        let path = default_socket_path();
        match std::env::var("XDG_RUNTIME_DIR") {
            Ok(dir) if !dir.is_empty() => {
                assert_eq!(path, PathBuf::from(dir).join("voxdesk.sock"));
            }
            _ => {
                let expected = format!("/tmp/voxdesk-{}.sock", crate::sys::current_uid());
                assert_eq!(path, PathBuf::from(expected));
            }
        }
    }
}
