//! stu-export library
//!
//! Scene-to-container export pipeline for the STU format: walks a parsed,
//! in-memory scene graph and serializes it into the chunked `.stu` container
//! consumed by the rendering engine. Format parsing lives in the thin
//! [`providers`] glue; everything downstream of the normalized scene model
//! is format-agnostic.

pub mod animation;
pub mod bones;
pub mod flatten;
pub mod material;
pub mod providers;

// Re-export the pipeline entry points
pub use flatten::{export_scene, ExportOptions};

// Re-export the working-set types
pub use bones::{BoneAccumulator, BoneTable, MAX_BONES};
