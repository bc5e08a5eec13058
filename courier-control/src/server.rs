//! Control server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_common::Signal;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlError, MAX_FRAME_SIZE, Request, Response, Result};

/// Handler trait for processing control requests
///
/// The daemon implements this over its reconciliation engine
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// Control server for a running courier instance, one request per connection
pub struct ControlServer {
    socket_path: String,
    handler: Arc<dyn CommandHandler>,
    timeout: Duration,
}

impl ControlServer {
    /// Create a control server for `socket_path`
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path is empty
    pub fn new(socket_path: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.is_empty() {
            return Err(ControlError::InvalidSocketPath(
                "Socket path cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            socket_path,
            handler,
            timeout: Duration::from_secs(30),
        })
    }

    /// Run until a shutdown signal is received
    ///
    /// The socket file is removed again on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another live instance owns the socket
    /// - The socket cannot be bound
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            // Someone answering means a live daemon owns it
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Socket already in use by running instance: {}",
                        self.socket_path
                    ),
                )));
            }
            // Left behind by a process that died without cleaning up
            info!("Removing stale socket file: {}", self.socket_path);
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner only (rw-------)
        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
        }
        info!("Control server listening on: {}", self.socket_path);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            let timeout = self.timeout;
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, timeout).await {
                                    error!("Error handling control connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting control connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            info!("Control server shutting down");
                            break;
                        }
                        Err(e) => {
                            error!("Control server shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        // Best effort, the next start replaces a stale file anyway
        if socket_path.exists() {
            debug!("Removing socket file: {}", self.socket_path);
            let _ = tokio::fs::remove_file(socket_path).await;
        }

        Ok(())
    }

    /// Serve exactly one request on `stream`
    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn CommandHandler>,
        timeout: Duration,
    ) -> Result<()> {
        // A client that never finishes its frame must not pin the task
        let request = tokio::time::timeout(timeout, Self::read_request(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!("Received request: {request:?}");

        // Mismatched peers get an error payload rather than a dropped connection
        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            warn!(
                "Rejecting request with protocol version {} (expected {})",
                request.version,
                crate::PROTOCOL_VERSION
            );
            Response::error(
                ControlError::IncompatibleVersion {
                    peer: request.version,
                    local: crate::PROTOCOL_VERSION,
                }
                .to_string(),
            )
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(timeout, Self::write_response(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;

        Ok(())
    }

    /// Read one length-prefixed request frame
    async fn read_request(stream: &mut UnixStream) -> Result<Request> {
        // 4-byte big-endian length
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ControlError::ConnectionClosed
            } else {
                ControlError::Io(e)
            }
        })?;

        let request_len = u32::from_be_bytes(len_buf);
        // Refuse to allocate for an oversized frame
        if request_len > MAX_FRAME_SIZE {
            return Err(ControlError::FrameTooLarge(request_len));
        }

        let mut request_bytes = vec![0u8; request_len as usize];
        stream.read_exact(&mut request_bytes).await?;

        let (request, _): (Request, _) = bincode::serde::decode_from_slice(
            request_bytes.as_slice(),
            bincode::config::standard(),
        )?;
        Ok(request)
    }

    /// Write one length-prefixed response frame
    async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
        let response_bytes = bincode::serde::encode_to_vec(response, bincode::config::standard())?;
        let response_len = u32::try_from(response_bytes.len())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        stream.write_all(&response_len.to_be_bytes()).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;

        Ok(())
    }
}
