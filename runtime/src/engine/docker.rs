//! Docker Engine API adapter over the daemon's Unix socket.
//!
//! Each call opens its own HTTP/1.1 connection. Streaming responses (logs,
//! image export) keep the connection alive in a spawned task until the body
//! is consumed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use extender_core::error::{ExtendError, Result};
use extender_core::log::LogOptions;
use futures::TryStreamExt;
use http::{header, Method, Request, Response, StatusCode};
use hyper::body::HttpBody;
use hyper::Body;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio_util::io::{ReaderStream, StreamReader};

use super::{ContainerEngine, ContainerSpec, ExitWatch, LogStream};
use crate::image::ImageName;

/// Default daemon socket.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Engine API version requested on every call.
const API_VERSION: &str = "v1.41";

/// Docker Engine client bound to one daemon socket.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket: PathBuf,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitResponse {
    status_code: i64,
    #[serde(default)]
    error: Option<WaitError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitError {
    #[serde(default)]
    message: String,
}

impl DockerEngine {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Connect to the daemon named by `DOCKER_HOST`, or the default socket.
    ///
    /// Only `unix://` hosts are supported.
    pub fn from_env() -> Result<Self> {
        match std::env::var("DOCKER_HOST") {
            Ok(host) if !host.is_empty() => Self::from_host(&host),
            _ => Ok(Self::new(DEFAULT_DOCKER_SOCKET)),
        }
    }

    /// Parse a `unix://` host string or a bare socket path.
    pub fn from_host(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(Self::new(path));
        }
        if host.contains("://") {
            return Err(ExtendError::Input(format!(
                "Unsupported docker host '{}': only unix:// sockets are supported",
                host
            )));
        }
        Ok(Self::new(host))
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Stream `docker save` output for `reference` into `dest`.
    pub async fn export_image(&self, reference: &str, dest: &Path) -> Result<()> {
        const STEP: &str = "resolve";
        let path = format!("/images/{}/get", checked(STEP, reference)?);
        let response = self
            .send(STEP, Method::GET, &path, None, Body::empty())
            .await?;
        let mut response = expect_success(STEP, response).await?;

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            ExtendError::engine(STEP, format!("Failed to create {}: {}", dest.display(), e))
        })?;
        while let Some(chunk) = response.body_mut().data().await {
            let chunk = chunk.map_err(|e| ExtendError::engine(STEP, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ExtendError::engine(STEP, e))?;
        }
        file.flush().await.map_err(|e| ExtendError::engine(STEP, e))?;
        Ok(())
    }

    /// Load a `docker save` archive into the daemon.
    pub async fn load_image(&self, archive: &Path) -> Result<()> {
        const STEP: &str = "write";
        let file = tokio::fs::File::open(archive).await.map_err(|e| {
            ExtendError::engine(STEP, format!("Failed to open {}: {}", archive.display(), e))
        })?;
        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .send(
                STEP,
                Method::POST,
                "/images/load?quiet=1",
                Some("application/x-tar"),
                body,
            )
            .await?;
        let response = expect_success(STEP, response).await?;

        // Load failures after the headers are reported in the JSON message stream.
        let bytes = read_body(STEP, response).await?;
        for line in bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            if let Ok(message) = serde_json::from_slice::<serde_json::Value>(line) {
                if let Some(error) = message.get("error").and_then(|e| e.as_str()) {
                    return Err(ExtendError::engine(STEP, error));
                }
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        step: &'static str,
        method: Method,
        path_and_query: &str,
        content_type: Option<&str>,
        body: Body,
    ) -> Result<Response<Body>> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            ExtendError::engine(
                step,
                format!(
                    "Failed to connect to docker at {}: {}",
                    self.socket.display(),
                    e
                ),
            )
        })?;
        let (mut sender, conn) = hyper::client::conn::handshake(stream)
            .await
            .map_err(|e| ExtendError::engine(step, format!("HTTP handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Docker connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/{}{}", API_VERSION, path_and_query))
            .header(header::HOST, "localhost");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder
            .body(body)
            .map_err(|e| ExtendError::engine(step, format!("Failed to build request: {}", e)))?;

        tracing::trace!(step, uri = %request.uri(), "Docker request");
        sender
            .send_request(request)
            .await
            .map_err(|e| ExtendError::engine(step, format!("Request failed: {}", e)))
    }

    async fn send_json(
        &self,
        step: &'static str,
        method: Method,
        path_and_query: &str,
        payload: &serde_json::Value,
    ) -> Result<Response<Body>> {
        let body = Body::from(serde_json::to_vec(payload)?);
        self.send(step, method, path_and_query, Some("application/json"), body)
            .await
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        const STEP: &str = "create";
        let payload = serde_json::json!({
            "Image": spec.image,
            "User": spec.user,
            "Cmd": spec.cmd,
            "Tty": spec.tty,
        });
        let path = format!("/containers/create?name={}", checked(STEP, &spec.name)?);
        let response = self.send_json(STEP, Method::POST, &path, &payload).await?;
        let response = expect_success(STEP, response).await?;
        let created: IdResponse = serde_json::from_slice(&read_body(STEP, response).await?)?;
        Ok(created.id)
    }

    async fn copy_to_container(&self, id: &str, dest: &str, archive: Vec<u8>) -> Result<()> {
        const STEP: &str = "copy";
        let path = format!(
            "/containers/{}/archive?path={}",
            checked(STEP, id)?,
            checked(STEP, dest)?
        );
        let response = self
            .send(
                STEP,
                Method::PUT,
                &path,
                Some("application/x-tar"),
                Body::from(archive),
            )
            .await?;
        expect_success(STEP, response).await?;
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        const STEP: &str = "start";
        let path = format!("/containers/{}/start", checked(STEP, id)?);
        let response = self
            .send(STEP, Method::POST, &path, None, Body::empty())
            .await?;
        // 304: already started
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        expect_success(STEP, response).await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<ExitWatch> {
        const STEP: &str = "wait";
        let path = format!(
            "/containers/{}/wait?condition=not-running",
            checked(STEP, id)?
        );
        // The daemon answers with headers once the wait is registered and
        // sends the body when the container stops.
        let response = self
            .send(STEP, Method::POST, &path, None, Body::empty())
            .await?;
        let response = expect_success(STEP, response).await?;

        let (tx, watch) = ExitWatch::channel();
        tokio::spawn(async move {
            let result = match read_body(STEP, response).await {
                Ok(bytes) => match serde_json::from_slice::<WaitResponse>(&bytes) {
                    Ok(WaitResponse {
                        error: Some(WaitError { message }),
                        ..
                    }) if !message.is_empty() => Err(ExtendError::engine(STEP, message)),
                    Ok(wait) => Ok(wait.status_code),
                    Err(e) => Err(ExtendError::engine(
                        STEP,
                        format!("Malformed wait response: {}", e),
                    )),
                },
                Err(e) => Err(e),
            };
            let _ = tx.send(result);
        });
        Ok(watch)
    }

    async fn container_logs(&self, id: &str, opts: LogOptions) -> Result<LogStream> {
        const STEP: &str = "logs";
        let path = format!(
            "/containers/{}/logs?stdout={}&stderr={}&follow={}",
            checked(STEP, id)?,
            opts.stdout as u8,
            opts.stderr as u8,
            opts.follow as u8
        );
        let response = self
            .send(STEP, Method::GET, &path, None, Body::empty())
            .await?;
        let response = expect_success(STEP, response).await?;
        let body = TryStreamExt::map_err(response.into_body(), |e: hyper::Error| {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        });
        Ok(Box::new(StreamReader::new(body)))
    }

    async fn commit_container(&self, id: &str, reference: &str) -> Result<String> {
        const STEP: &str = "commit";
        let name = ImageName::parse(reference)?;
        let path = format!(
            "/commit?container={}&repo={}&tag={}",
            checked(STEP, id)?,
            checked(STEP, &name.repository)?,
            checked(STEP, name.tag_or_default())?
        );
        let response = self
            .send_json(STEP, Method::POST, &path, &serde_json::json!({}))
            .await?;
        let response = expect_success(STEP, response).await?;
        let committed: IdResponse = serde_json::from_slice(&read_body(STEP, response).await?)?;
        Ok(committed.id)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        const STEP: &str = "remove";
        let path = format!("/containers/{}?force={}", checked(STEP, id)?, force);
        let response = self
            .send(STEP, Method::DELETE, &path, None, Body::empty())
            .await?;
        expect_success(STEP, response).await?;
        Ok(())
    }

    async fn remove_image(&self, reference: &str, force: bool) -> Result<()> {
        const STEP: &str = "remove-image";
        let path = format!("/images/{}?force={}", checked(STEP, reference)?, force);
        let response = self
            .send(STEP, Method::DELETE, &path, None, Body::empty())
            .await?;
        expect_success(STEP, response).await?;
        Ok(())
    }
}

/// Reject values that would need escaping inside a request path or query.
fn checked<'a>(step: &'static str, value: &'a str) -> Result<&'a str> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | ':' | '@'));
    if valid {
        Ok(value)
    } else {
        Err(ExtendError::Input(format!(
            "Invalid value '{}' for {} request",
            value, step
        )))
    }
}

/// Pass a 2xx response through; turn anything else into an engine error.
async fn expect_success(step: &'static str, response: Response<Body>) -> Result<Response<Body>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let bytes = read_body(step, response).await.unwrap_or_default();
    let message = serde_json::from_slice::<ErrorBody>(&bytes)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
    Err(ExtendError::engine(
        step,
        format!("{} ({})", message, status.as_u16()),
    ))
}

async fn read_body(step: &'static str, response: Response<Body>) -> Result<Vec<u8>> {
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| ExtendError::engine(step, format!("Failed to read response: {}", e)))?;
    Ok(bytes.to_vec())
}
