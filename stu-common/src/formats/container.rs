//! STU container format (.stu)
//!
//! Append-only chunked binary container consumed by the runtime scene
//! loader. Chunks form an ordered stream, not a keyed map; names are not
//! required to be unique.
//!
//! # Layout
//! ```text
//! 0x00: magic   "STU" (3 bytes)
//! 0x03: version "0.1" (3 bytes)
//! 0x06: payload size u32 big-endian (file size minus this header)
//! 0x0A: chunks
//! ```
//!
//! Each chunk:
//! ```text
//! 0x00: leader "$$" (2 bytes)
//! 0x02: name (19 bytes, null padded, truncated if longer)
//! 0x15: reserved zero byte
//! 0x16: data size u32 big-endian
//! 0x1A: name hash u32 little-endian (djb2 of the stored name)
//! 0x1E: data
//! ```
//!
//! Two write modes exist and must not be mixed on one output file:
//! [`ContainerBuilder`] buffers chunks in memory and writes the file in one
//! pass; [`append_chunk`] re-opens and extends the file per chunk, which
//! bounds peak memory for very large scenes. A file is valid after every
//! successful append; there is no closing record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use thiserror::Error;

/// Container magic bytes.
pub const STU_MAGIC: &[u8; 3] = b"STU";
/// The single container version this crate reads and writes.
pub const STU_VERSION: &[u8; 3] = b"0.1";
/// Marker opening every chunk header.
pub const CHUNK_LEADER: &[u8; 2] = b"$$";
/// Stored chunk name width; longer names are truncated.
pub const CHUNK_NAME_LEN: usize = 19;
/// Maximum byte length of a string stored inside a chunk payload.
pub const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("file header truncated")]
    TruncatedHeader,
    #[error("file magic bytes do not match")]
    BadMagic,
    #[error("file version {found:?} is not supported")]
    UnsupportedVersion { found: [u8; 3] },
    #[error("file size info does not match (header says {header} payload bytes, file has {actual})")]
    SizeMismatch { header: u32, actual: u64 },
    #[error("chunk leader bytes do not match")]
    BadChunkLeader,
    #[error("refusing to write an empty chunk")]
    EmptyChunk,
    #[error("nothing to write")]
    EmptyContainer,
}

fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in bytes {
        hash = hash
            .wrapping_mul(33)
            .wrapping_add(hash)
            .wrapping_add(u32::from(byte));
    }
    hash
}

/// djb2-style hash used for chunk names and bone names. The loader uses it
/// for fast lookups; both sides must agree on the exact recurrence.
pub fn hash_name(name: &str) -> u32 {
    hash_bytes(name.as_bytes())
}

/// STU file header (10 bytes)
#[derive(Debug, Clone, Copy)]
pub struct StuFileHeader {
    /// Total size of all chunk headers and chunk data, excluding this header.
    pub payload_size: u32,
}

impl StuFileHeader {
    pub const SIZE: usize = 10;

    pub fn new(payload_size: u32) -> Self {
        Self { payload_size }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..3].copy_from_slice(STU_MAGIC);
        bytes[3..6].copy_from_slice(STU_VERSION);
        bytes[6..10].copy_from_slice(&self.payload_size.to_be_bytes());
        bytes
    }

    /// Parse and validate a file header. Magic and version must match
    /// exactly; a newer (or older) version is a fatal read error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < Self::SIZE {
            return Err(ContainerError::TruncatedHeader);
        }
        if &bytes[0..3] != STU_MAGIC {
            return Err(ContainerError::BadMagic);
        }
        if &bytes[3..6] != STU_VERSION {
            return Err(ContainerError::UnsupportedVersion {
                found: [bytes[3], bytes[4], bytes[5]],
            });
        }
        let payload_size = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        Ok(Self { payload_size })
    }
}

/// STU chunk header (30 bytes)
#[derive(Debug, Clone, Copy)]
pub struct StuChunkHeader {
    /// Null-padded chunk name as stored on disk.
    pub name: [u8; CHUNK_NAME_LEN],
    /// Size of the chunk data following this header.
    pub data_size: u32,
    /// [`hash_name`] of the stored (possibly truncated) name.
    pub name_hash: u32,
}

impl StuChunkHeader {
    pub const SIZE: usize = 30;

    pub fn new(name: &str, data_size: u32) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(CHUNK_NAME_LEN);
        let mut stored = [0u8; CHUNK_NAME_LEN];
        stored[..len].copy_from_slice(&bytes[..len]);
        Self {
            name: stored,
            data_size,
            name_hash: hash_bytes(&stored[..len]),
        }
    }

    /// The stored name up to the first null byte.
    pub fn name_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CHUNK_NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or_default()
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(CHUNK_LEADER);
        bytes[2..21].copy_from_slice(&self.name);
        // byte 21 stays zero (reserved)
        bytes[22..26].copy_from_slice(&self.data_size.to_be_bytes());
        bytes[26..30].copy_from_slice(&self.name_hash.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < Self::SIZE {
            return Err(ContainerError::TruncatedHeader);
        }
        if &bytes[0..2] != CHUNK_LEADER {
            return Err(ContainerError::BadChunkLeader);
        }
        let mut name = [0u8; CHUNK_NAME_LEN];
        name.copy_from_slice(&bytes[2..21]);
        Ok(Self {
            name,
            data_size: u32::from_be_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]),
            name_hash: u32::from_le_bytes([bytes[26], bytes[27], bytes[28], bytes[29]]),
        })
    }
}

/// Destination for finished chunks. The flattener writes through this seam
/// so one export run can target either write mode.
pub trait ChunkSink {
    fn write_chunk(&mut self, name: &str, data: &[u8]) -> Result<(), ContainerError>;
}

/// Bulk writer: chunks accumulate in memory until [`flush`](Self::flush)
/// writes the whole container in insertion order.
#[derive(Default)]
pub struct ContainerBuilder {
    chunks: Vec<(StuChunkHeader, Vec<u8>)>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn flush(&self, path: &Path) -> Result<(), ContainerError> {
        if self.chunks.is_empty() {
            return Err(ContainerError::EmptyContainer);
        }
        let payload: usize = self
            .chunks
            .iter()
            .map(|(_, data)| StuChunkHeader::SIZE + data.len())
            .sum();

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&StuFileHeader::new(payload as u32).to_bytes())?;
        for (header, data) in &self.chunks {
            writer.write_all(&header.to_bytes())?;
            writer.write_all(data)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ChunkSink for ContainerBuilder {
    fn write_chunk(&mut self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        if data.is_empty() {
            return Err(ContainerError::EmptyChunk);
        }
        self.chunks
            .push((StuChunkHeader::new(name, data.len() as u32), data.to_vec()));
        Ok(())
    }
}

/// Incremental writer: every chunk re-opens and extends the file at `path`
/// via [`append_chunk`].
pub struct ChunkAppender {
    path: PathBuf,
}

impl ChunkAppender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChunkSink for ChunkAppender {
    fn write_chunk(&mut self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        append_chunk(&self.path, name, data)
    }
}

/// Append one chunk to the container at `path`, creating the file if it
/// does not exist.
///
/// Runs as a read-modify-write transaction: the existing header is read and
/// validated (magic, version, and that the recorded payload size matches
/// the real file size), the new chunk goes at the end of the file, and the
/// header's payload size is rewritten in place. Validation failures leave
/// the file untouched.
pub fn append_chunk(path: &Path, name: &str, data: &[u8]) -> Result<(), ContainerError> {
    if data.is_empty() {
        return Err(ContainerError::EmptyChunk);
    }

    let (payload_size, end_offset) = match File::open(path) {
        Ok(mut file) => {
            let mut raw = [0u8; StuFileHeader::SIZE];
            file.read_exact(&mut raw)
                .map_err(|_| ContainerError::TruncatedHeader)?;
            let header = StuFileHeader::from_bytes(&raw)?;
            let real_size = file.metadata()?.len();
            let actual = real_size - StuFileHeader::SIZE as u64;
            if u64::from(header.payload_size) != actual {
                return Err(ContainerError::SizeMismatch {
                    header: header.payload_size,
                    actual,
                });
            }
            (header.payload_size, real_size)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => (0, StuFileHeader::SIZE as u64),
        Err(err) => return Err(err.into()),
    };

    let chunk = StuChunkHeader::new(name, data.len() as u32);
    let new_payload = payload_size + (StuChunkHeader::SIZE + data.len()) as u32;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.write_all(&StuFileHeader::new(new_payload).to_bytes())?;
    file.seek(SeekFrom::Start(end_offset))?;
    file.write_all(&chunk.to_bytes())?;
    file.write_all(data)?;
    Ok(())
}

// ============================================================================
// Payload encoding helpers
// ============================================================================

/// Append a string to a chunk payload: raw bytes capped at [`MAX_TEXT_LEN`],
/// then one null terminator.
pub fn write_text(buf: &mut Vec<u8>, text: &str) {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_TEXT_LEN {
        tracing::warn!(
            len = bytes.len(),
            text,
            "string exceeds {MAX_TEXT_LEN} bytes and will be truncated"
        );
    }
    let len = bytes.len().min(MAX_TEXT_LEN);
    buf.extend_from_slice(&bytes[..len]);
    buf.push(0);
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_f64(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn put_vec3(buf: &mut Vec<u8>, value: Vec3) {
    put_f32(buf, value.x);
    put_f32(buf, value.y);
    put_f32(buf, value.z);
}

/// Append a matrix as 16 little-endian f32 in column-major order.
pub fn put_mat4(buf: &mut Vec<u8>, value: &Mat4) {
    for component in value.to_cols_array() {
        put_f32(buf, component);
    }
}
