//! sluice-core — chunk type, transforms, events, configuration and errors.
//! The pipeline crate and the CLI both depend on this one.

pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod transform;

pub use chunk::{Chunk, MAX_CHUNK_SIZE};
pub use error::PipelineError;
pub use transform::{FnTransform, Identity, Lowercase, ReverseHoldLast, Transform, Uppercase};
