//! Chunk — the unit of transfer between pipeline stages.

use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// Upper bound on a single chunk's payload.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024; // 1 MB

/// Default read size for file and stdin sources.
pub const DEFAULT_READ_SIZE: usize = 64 * 1024; // 64 KB

/// An immutable run of bytes. Carries no metadata beyond its
/// position in the stream.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Chunk(Bytes);

impl Chunk {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Split a buffer into chunks of at most `size` bytes.
    pub fn split(data: impl Into<Bytes>, size: usize) -> Vec<Chunk> {
        let data = data.into();
        let size = size.clamp(1, MAX_CHUNK_SIZE);
        let mut chunks = Vec::with_capacity(data.len().div_ceil(size));
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + size).min(data.len());
            chunks.push(Chunk(data.slice(offset..end)));
            offset = end;
        }
        chunks
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for Chunk {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({} bytes)", self.0.len())
    }
}
