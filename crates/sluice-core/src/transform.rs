//! Per-chunk transforms.
//!
//! A transform sees one chunk at a time, in stream order, and returns
//! zero or one output chunk. Transforms that decode text carry an
//! incomplete trailing UTF-8 sequence over to the next chunk and emit
//! whatever is left from `flush` at end of stream.

use crate::chunk::Chunk;
use crate::error::PipelineError;

pub trait Transform: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Transform one chunk. `Ok(None)` filters it out.
    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError>;

    /// Emit any partial state held back at end of stream.
    fn flush(&mut self) -> Result<Option<Chunk>, PipelineError> {
        Ok(None)
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        (**self).transform(chunk)
    }

    fn flush(&mut self) -> Result<Option<Chunk>, PipelineError> {
        (**self).flush()
    }
}

// ── UTF-8 boundary carry ──────────────────────────────────────────────────────

/// Holds back an incomplete multi-byte sequence at the end of a chunk.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Prepend pending bytes to `chunk` and return everything up to the
    /// last complete character. The incomplete tail is kept for later.
    fn complete(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);
        let split = incomplete_tail_start(&buf);
        self.pending = buf.split_off(split);
        buf
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

/// Index where a truncated multi-byte sequence begins, or `buf.len()`
/// when the buffer ends on a character boundary.
fn incomplete_tail_start(buf: &[u8]) -> usize {
    let len = buf.len();
    for back in 1..=len.min(3) {
        let i = len - back;
        let b = buf[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let needed = match b {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return len,
        };
        return if back < needed { i } else { len };
    }
    len
}

/// Split bytes into units: one per Unicode scalar value, and one per
/// byte that is not valid UTF-8.
fn units(bytes: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::with_capacity(bytes.len());
    for piece in bytes.utf8_chunks() {
        let valid = piece.valid();
        let mut start = 0;
        for (idx, ch) in valid.char_indices() {
            debug_assert_eq!(idx, start);
            let end = idx + ch.len_utf8();
            out.push(&valid.as_bytes()[start..end]);
            start = end;
        }
        for i in 0..piece.invalid().len() {
            out.push(&piece.invalid()[i..i + 1]);
        }
    }
    out
}

/// Apply a case mapping to the valid text, passing invalid bytes through.
fn map_case(bytes: &[u8], map: fn(&str) -> String) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for piece in bytes.utf8_chunks() {
        out.extend_from_slice(map(piece.valid()).as_bytes());
        out.extend_from_slice(piece.invalid());
    }
    out
}

/// Reverse every unit except the last, which stays in place.
///
/// `"abcde"` becomes `"dcbae"`.
pub fn reverse_hold_last(bytes: &[u8]) -> Vec<u8> {
    let mut units = units(bytes);
    let Some(last) = units.pop() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(bytes.len());
    for unit in units.iter().rev() {
        out.extend_from_slice(unit);
    }
    out.extend_from_slice(last);
    out
}

// ── Built-in transforms ───────────────────────────────────────────────────────

/// Pass-through.
#[derive(Debug, Default)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        Ok(Some(chunk))
    }
}

/// Unicode upper-casing of UTF-8 text.
#[derive(Debug, Default)]
pub struct Uppercase {
    carry: Utf8Carry,
}

impl Transform for Uppercase {
    fn name(&self) -> &str {
        "upper"
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        let ready = self.carry.complete(&chunk);
        if ready.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chunk::from(map_case(&ready, str::to_uppercase))))
    }

    fn flush(&mut self) -> Result<Option<Chunk>, PipelineError> {
        let rest = self.carry.take();
        Ok((!rest.is_empty()).then(|| Chunk::from(rest)))
    }
}

/// Unicode lower-casing of UTF-8 text.
#[derive(Debug, Default)]
pub struct Lowercase {
    carry: Utf8Carry,
}

impl Transform for Lowercase {
    fn name(&self) -> &str {
        "lower"
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        let ready = self.carry.complete(&chunk);
        if ready.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chunk::from(map_case(&ready, str::to_lowercase))))
    }

    fn flush(&mut self) -> Result<Option<Chunk>, PipelineError> {
        let rest = self.carry.take();
        Ok((!rest.is_empty()).then(|| Chunk::from(rest)))
    }
}

/// Reverses each chunk's characters, keeping the final character last.
/// Operates per chunk, not over the whole stream.
#[derive(Debug, Default)]
pub struct ReverseHoldLast {
    carry: Utf8Carry,
}

impl Transform for ReverseHoldLast {
    fn name(&self) -> &str {
        "reverse"
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        let ready = self.carry.complete(&chunk);
        if ready.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chunk::from(reverse_hold_last(&ready))))
    }

    fn flush(&mut self) -> Result<Option<Chunk>, PipelineError> {
        let rest = self.carry.take();
        if rest.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chunk::from(reverse_hold_last(&rest))))
    }
}

/// Closure-backed transform.
pub struct FnTransform<F> {
    name: String,
    f: F,
}

impl<F> FnTransform<F>
where
    F: FnMut(Chunk) -> Result<Option<Chunk>, PipelineError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: FnMut(Chunk) -> Result<Option<Chunk>, PipelineError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&mut self, chunk: Chunk) -> Result<Option<Chunk>, PipelineError> {
        (self.f)(chunk)
    }
}

/// Build a transform from its CLI name.
pub fn by_name(name: &str) -> Option<Box<dyn Transform>> {
    match name {
        "upper" | "uppercase" => Some(Box::new(Uppercase::default())),
        "lower" | "lowercase" => Some(Box::new(Lowercase::default())),
        "reverse" => Some(Box::new(ReverseHoldLast::default())),
        "identity" | "cat" => Some(Box::new(Identity)),
        _ => None,
    }
}
