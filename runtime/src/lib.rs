//! Image Extender Runtime
//!
//! Runs an image's extension binary in a scratch container and grafts the
//! layer it produces onto the base image.
//!
//! - [`ImageExtender`]: the create → stage → start → wait → commit → graft
//!   pipeline with guaranteed cleanup
//! - [`LayerShifter`]: moves a donor image's top layer onto a base image
//! - [`LogRelay`]: relays container output (raw or demultiplexed)
//! - [`ContainerEngine`] / [`ImageStore`]: the engine capabilities the
//!   pipeline depends on, with Docker daemon implementations

pub mod engine;
pub mod extend;
pub mod image;
pub mod namer;
pub mod payload;
pub mod relay;
pub mod shift;

// Re-exports
pub use engine::{ContainerEngine, ContainerSpec, DockerEngine, ExitWatch, LogStream};
pub use extend::{ExtensionRequest, ImageExtender};
pub use image::{extended_tag, DaemonImageStore, Image, ImageName, ImageStore, Layer};
pub use namer::random_name;
pub use payload::{build_payload, payload_from_file, ExtendToml};
pub use relay::{relay_for, DemuxRelay, LogRelay, LogSink, LogSinks, MergedRelay};
pub use shift::{graft, LayerShifter};
pub use tokio_util::sync::CancellationToken;
