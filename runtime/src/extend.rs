//! Image extension orchestrator.
//!
//! Runs an extension binary inside a throwaway container created from the
//! base image, commits the result to a donor image and grafts the donor's
//! new top layer onto the base:
//!
//! ```text
//! create → stage → start → wait + relay logs → commit → graft
//!                                                  ↓
//!               cleanup (container, donor) on every exit path
//! ```

use std::future::Future;
use std::sync::Arc;

use extender_core::config::ExtendConfig;
use extender_core::error::{ExtendError, Result};
use extender_core::event::{EventEmitter, EventKind};
use extender_core::log::LogOptions;
use tokio_util::sync::CancellationToken;

use crate::engine::{ContainerEngine, ContainerSpec};
use crate::image::ImageStore;
use crate::namer::random_name;
use crate::relay::{relay_for, LogSinks};
use crate::shift::LayerShifter;

/// One extension run.
#[derive(Debug, Clone)]
pub struct ExtensionRequest {
    /// Extension kind (e.g., "build" or "run")
    pub kind: String,
    /// Tar archive staged into the kind directory
    pub payload: Vec<u8>,
    /// Image to extend
    pub base_image: String,
}

impl ExtensionRequest {
    pub fn new(kind: impl Into<String>, base_image: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            base_image: base_image.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.kind.is_empty() || self.kind.contains('/') || self.kind == ".." {
            return Err(ExtendError::Input(format!(
                "Invalid extension kind '{}'",
                self.kind
            )));
        }
        if self.base_image.trim().is_empty() {
            return Err(ExtendError::Input("Base image name is empty".to_string()));
        }
        if self.payload.is_empty() {
            return Err(ExtendError::Input("Missing extension payload".to_string()));
        }
        Ok(())
    }
}

/// Extends images by running their extension binary and keeping the layer
/// it produces.
pub struct ImageExtender {
    engine: Arc<dyn ContainerEngine>,
    shifter: LayerShifter,
    config: ExtendConfig,
    event_emitter: EventEmitter,
}

impl ImageExtender {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        store: Arc<dyn ImageStore>,
        config: ExtendConfig,
        event_emitter: EventEmitter,
    ) -> Self {
        let shifter = LayerShifter::new(store, config.extended_suffix.clone());
        Self {
            engine,
            shifter,
            config,
            event_emitter,
        }
    }

    pub fn config(&self) -> &ExtendConfig {
        &self.config
    }

    pub fn event_emitter(&self) -> &EventEmitter {
        &self.event_emitter
    }

    /// Extend `request.base_image` and return the extended image's name.
    ///
    /// Container output is relayed into `sinks` as it is produced, so on
    /// failure the sinks hold everything the extension printed. The scratch
    /// container and donor image are removed before returning, including
    /// when `cancel` fires.
    pub async fn extend(
        &self,
        cancel: &CancellationToken,
        request: &ExtensionRequest,
        sinks: &mut LogSinks,
    ) -> Result<String> {
        request.validate()?;
        tracing::info!(
            kind = %request.kind,
            base = %request.base_image,
            "Extending image"
        );

        let result = self.run(cancel, request, sinks).await;
        match &result {
            Ok(image) => tracing::info!(image = %image, "Extended image written"),
            Err(e) => {
                tracing::error!(step = e.step().unwrap_or("-"), error = %e, "Image extension failed");
                self.event_emitter.emit(EventKind::Failed, e.to_string());
            }
        }
        result
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        request: &ExtensionRequest,
        sinks: &mut LogSinks,
    ) -> Result<String> {
        let kind = request.kind.as_str();
        let spec = ContainerSpec {
            image: request.base_image.clone(),
            user: self.config.container_user.clone(),
            cmd: vec![
                self.config.extend_binary(kind).to_string_lossy().to_string(),
                self.config.extend_config_path(kind).to_string_lossy().to_string(),
            ],
            name: random_name(
                &self.config.container_template(kind),
                self.config.name_length,
            ),
            tty: self.config.relay.is_interactive(),
        };

        let id = guarded(cancel, "create", self.engine.create_container(&spec)).await?;
        tracing::debug!(container = %id, name = %spec.name, "Created extension container");
        self.event_emitter.emit(EventKind::Created, id.clone());

        let mut donor = None;
        let result = self
            .run_in_container(cancel, &id, request, sinks, &mut donor)
            .await;
        self.cleanup(&id, donor.as_deref()).await;
        result
    }

    /// Everything between create and cleanup. `donor` is set once the
    /// donor image exists so cleanup can remove it.
    async fn run_in_container(
        &self,
        cancel: &CancellationToken,
        id: &str,
        request: &ExtensionRequest,
        sinks: &mut LogSinks,
        donor: &mut Option<String>,
    ) -> Result<String> {
        let kind = request.kind.as_str();

        let dest = self.config.kind_dir(kind).to_string_lossy().to_string();
        guarded(
            cancel,
            "copy",
            self.engine
                .copy_to_container(id, &dest, request.payload.clone()),
        )
        .await?;
        self.event_emitter.emit(EventKind::Staged, dest);

        guarded(cancel, "start", self.engine.start_container(id)).await?;
        self.event_emitter.emit(EventKind::Started, id.to_string());

        let code = self.await_exit(cancel, id, sinks).await?;
        self.event_emitter.emit(EventKind::Exited, code.to_string());
        if code != 0 {
            return Err(ExtendError::ExitStatus { code });
        }

        let donor_name = random_name(
            &self.config.commit_template(kind),
            self.config.name_length,
        );
        let image_id = guarded(
            cancel,
            "commit",
            self.engine.commit_container(id, &donor_name),
        )
        .await?;
        tracing::debug!(donor = %donor_name, image_id = %image_id, "Committed donor image");
        *donor = Some(donor_name.clone());
        self.event_emitter.emit(EventKind::Committed, donor_name.clone());

        let extended = guarded(
            cancel,
            "graft",
            self.shifter
                .shift_references(&donor_name, &request.base_image),
        )
        .await?;
        self.event_emitter.emit(EventKind::Grafted, extended.clone());
        Ok(extended)
    }

    /// Wait for the container to stop while relaying its logs.
    ///
    /// The exit watch is registered before the log stream is opened. Once the
    /// exit arrives the relay is still drained to the end, so every line the
    /// container wrote reaches the sinks before this returns.
    async fn await_exit(
        &self,
        cancel: &CancellationToken,
        id: &str,
        sinks: &mut LogSinks,
    ) -> Result<i64> {
        let watch = guarded(cancel, "wait", self.engine.wait_container(id)).await?;
        let mut logs = guarded(
            cancel,
            "logs",
            self.engine.container_logs(id, LogOptions::default()),
        )
        .await?;

        let relay = relay_for(self.config.relay);
        let mut copy = relay.relay(&mut *logs, sinks);
        let wait = watch.wait();
        tokio::pin!(wait);

        let mut relayed = None;
        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExtendError::Cancelled { step: "wait" }),
                exit = &mut wait => break exit,
                done = &mut copy, if relayed.is_none() => relayed = Some(done),
            }
        };
        let code = exit.map_err(|e| at_step("wait", e))?;

        let relayed = match relayed {
            Some(done) => done,
            None => tokio::select! {
                _ = cancel.cancelled() => return Err(ExtendError::Cancelled { step: "logs" }),
                done = &mut copy => done,
            },
        };
        match relayed {
            Ok(bytes) => {
                tracing::debug!(container = %id, code, bytes, "Extension container exited");
                Ok(code)
            }
            // The exit status is the more useful report when both fail.
            Err(e) if code != 0 => {
                tracing::warn!(container = %id, error = %e, "Log relay failed");
                Ok(code)
            }
            Err(e) => Err(ExtendError::Relay(e.to_string())),
        }
    }

    /// Best-effort removal of the scratch container and donor image.
    ///
    /// Not cancellable; failures are logged and dropped.
    async fn cleanup(&self, id: &str, donor: Option<&str>) {
        if let Err(e) = self.engine.remove_container(id, true).await {
            tracing::warn!(container = %id, error = %e, "Failed to remove extension container");
        }
        if let Some(donor) = donor {
            if let Err(e) = self.engine.remove_image(donor, true).await {
                tracing::warn!(image = %donor, error = %e, "Failed to remove donor image");
            }
        }
        self.event_emitter.emit(EventKind::Cleaned, id.to_string());
    }
}

/// Run one engine call unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    step: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtendError::Cancelled { step }),
        result = call => result.map_err(|e| at_step(step, e)),
    }
}

/// Attribute errors that carry no step to `step`.
fn at_step(step: &'static str, err: ExtendError) -> ExtendError {
    match err {
        ExtendError::Io(e) => ExtendError::engine(step, e),
        ExtendError::Serialization(message) => ExtendError::engine(step, message),
        other => other,
    }
}
