//! Unix-socket server for the plugin protocol
//!
//! One request per connection: read an HTTP/1.1 request, dispatch it,
//! write the JSON response and close.

use crate::driver::TmpsyncDriver;
use crate::error::{TmpsyncError, TmpsyncResult};
use crate::plugin::handler::{handle, PluginResponse};
use crate::plugin::protocol::CONTENT_TYPE;
use httparse::Status;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

/// Default plugin socket
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/tmpsync.sock";

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Minimal request captured from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Serves plugin requests for one driver
pub struct PluginServer {
    socket_path: PathBuf,
    driver: Arc<TmpsyncDriver>,
}

impl PluginServer {
    pub fn new(socket_path: PathBuf, driver: Arc<TmpsyncDriver>) -> Self {
        Self {
            socket_path,
            driver,
        }
    }

    /// Accept connections until SIGINT or SIGTERM
    pub async fn run(&self) -> TmpsyncResult<()> {
        let listener = self.bind().await?;
        info!("Listening on {}", self.socket_path.display());

        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| TmpsyncError::io("installing SIGTERM handler", e))?;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let driver = Arc::clone(&self.driver);
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, &driver).await {
                                warn!("Error handling client: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("Connection error: {}", e),
                },
                _ = tokio::signal::ctrl_c() => break,
                _ = terminate.recv() => break,
            }
        }

        info!("Shutting down");
        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            debug!("Could not remove socket {}: {}", self.socket_path.display(), e);
        }
        Ok(())
    }

    async fn bind(&self) -> TmpsyncResult<UnixListener> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TmpsyncError::io(format!("creating {}", parent.display()), e))?;
        }

        // Stale socket from a previous run
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await.map_err(|e| {
                TmpsyncError::io(format!("removing stale socket {}", self.socket_path.display()), e)
            })?;
        }

        UnixListener::bind(&self.socket_path).map_err(|e| {
            TmpsyncError::io(format!("binding {}", self.socket_path.display()), e)
        })
    }
}

async fn serve_connection(mut stream: UnixStream, driver: &TmpsyncDriver) -> TmpsyncResult<()> {
    let response = match read_request(&mut stream).await {
        Ok(request) => handle(driver, &request.method, &request.path, &request.body).await,
        Err(e) => {
            warn!("Rejected request: {}", e);
            PluginResponse {
                status: 400,
                body: serde_json::to_vec(&serde_json::json!({ "Err": e.to_string() }))?,
            }
        }
    };

    stream
        .write_all(&encode_response(&response))
        .await
        .map_err(|e| TmpsyncError::io("writing response", e))?;
    stream
        .shutdown()
        .await
        .map_err(|e| TmpsyncError::io("closing connection", e))
}

/// Read one request with a `Content-Length` body
pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> TmpsyncResult<HttpRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_len = loop {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TmpsyncError::io("reading request", e))?;
        if read == 0 {
            return Err(TmpsyncError::Protocol("connection closed before headers".into()));
        }
        buffer.extend_from_slice(&chunk[..read]);

        if let Some(pos) = find_header_end(&buffer) {
            break pos;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(TmpsyncError::Protocol("headers too large".into()));
        }
    };

    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&buffer[..header_len]) {
        Ok(Status::Complete(_)) => {}
        Ok(Status::Partial) => return Err(TmpsyncError::Protocol("partial request".into())),
        Err(e) => return Err(TmpsyncError::Protocol(e.to_string())),
    }

    let method = request.method.unwrap_or_default().to_string();
    let path = request
        .path
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0usize;
    for header in request.headers.iter() {
        if header.name.eq_ignore_ascii_case("content-length") {
            content_length = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| TmpsyncError::Protocol("invalid Content-Length".into()))?;
        }
    }
    if content_length > MAX_BODY_BYTES {
        return Err(TmpsyncError::Protocol("body too large".into()));
    }

    let mut body = buffer[header_len..].to_vec();
    body.truncate(content_length);
    while body.len() < content_length {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|e| TmpsyncError::io("reading request body", e))?;
        if read == 0 {
            return Err(TmpsyncError::Protocol("connection closed before body".into()));
        }
        let remaining = content_length - body.len();
        body.extend_from_slice(&chunk[..read.min(remaining)]);
    }

    Ok(HttpRequest { method, path, body })
}

/// Offset just past the `\r\n\r\n` header terminator
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

fn encode_response(response: &PluginResponse) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        CONTENT_TYPE,
        response.body.len()
    )
    .into_bytes();
    out.extend_from_slice(&response.body);
    out
}
