//! Container engine capability used by the extender.
//!
//! The extender only needs a handful of engine calls. [`ContainerEngine`]
//! names exactly those, so test doubles implement the whole surface instead
//! of overriding part of a full client.

pub mod docker;

use async_trait::async_trait;
use extender_core::error::{ExtendError, Result};
use extender_core::log::LogOptions;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

pub use docker::DockerEngine;

/// Live log stream of a running container.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Parameters for creating the scratch container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image to create the container from
    pub image: String,
    /// User the command runs as
    pub user: String,
    /// Command and arguments
    pub cmd: Vec<String>,
    /// Container name
    pub name: String,
    /// Allocate a TTY, so logs arrive as one raw stream instead of frames
    pub tty: bool,
}

/// Pending notification of a container's terminal status.
///
/// Registered before the container's logs are requested so the exit is
/// never missed; resolved once the container stops running.
#[derive(Debug)]
pub struct ExitWatch {
    rx: oneshot::Receiver<Result<i64>>,
}

impl ExitWatch {
    /// Create a watch plus the sender the engine resolves it with.
    pub fn channel() -> (oneshot::Sender<Result<i64>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A watch that is already resolved.
    pub fn ready(result: Result<i64>) -> Self {
        let (tx, watch) = Self::channel();
        let _ = tx.send(result);
        watch
    }

    /// Wait for the exit status code.
    pub async fn wait(self) -> Result<i64> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(ExtendError::engine("wait", "exit notification dropped")))
    }
}

/// The container engine calls the extension pipeline depends on.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create a container and return its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Extract a tar archive into the container at `dest`.
    async fn copy_to_container(&self, id: &str, dest: &str, archive: Vec<u8>) -> Result<()>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Register interest in the container leaving the running state.
    async fn wait_container(&self, id: &str) -> Result<ExitWatch>;

    async fn container_logs(&self, id: &str, opts: LogOptions) -> Result<LogStream>;

    /// Commit the container filesystem to `reference`, returning the image ID.
    async fn commit_container(&self, id: &str, reference: &str) -> Result<String>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    async fn remove_image(&self, reference: &str, force: bool) -> Result<()>;
}
