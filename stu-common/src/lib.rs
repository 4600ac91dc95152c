//! Shared types and container format for the STU asset pipeline
//!
//! This crate provides everything shared between the export pipeline
//! (`stu-export`) and any tool that needs to read or write `.stu` files:
//!
//! - [`formats`] - STU container writer (file/chunk headers, bulk and
//!   append modes) and the five fixed-size vertex record layouts
//! - [`bounds`] - bounding-box accumulation for vertex streams
//! - [`scene`] - normalized scene model produced by the import glue

pub mod bounds;
pub mod formats;
pub mod scene;

// Re-export commonly used container items
pub use formats::container::{
    append_chunk, hash_name, ChunkAppender, ChunkSink, ContainerBuilder, ContainerError,
    StuChunkHeader, StuFileHeader, CHUNK_LEADER, CHUNK_NAME_LEN, MAX_TEXT_LEN, STU_MAGIC,
    STU_VERSION,
};

// Re-export vertex layout items
pub use formats::vertex::{
    encode_vertices, pack_bone_ids, pack_tangent, select_layout, VertexError, VertexInfluences,
    VertexLayout,
};

pub use bounds::BoundingBox;
