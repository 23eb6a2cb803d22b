//! Length-prefixed chunk container
//!
//! Every DRM file is a flat sequence of chunks. Each chunk starts with a
//! 4-byte little-endian type tag.
//!
//! # Layout
//! ```text
//! Binary chunk: tag i32 (= 1) | length i32 | payload (length bytes)
//! String chunk: tag i32 (= 2) | length 7-bit varint | UTF-8 bytes
//! ```
//!
//! Binary chunks are numbered in the order they are written. That position is
//! the buffer id the JSON metadata uses to refer back to them, so a reader must
//! see chunks in exactly the order the writer produced them.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Errors raised while reading or writing chunks
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("invalid chunk type tag {0}")]
    InvalidChunkType(i32),

    #[error("invalid chunk length {0}")]
    InvalidLength(i64),

    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: Vec<u8>, actual: Vec<u8> },

    #[error("string chunk is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, ChunkError>;

/// Chunk type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ChunkType {
    Binary = 1,
    String = 2,
}

impl ChunkType {
    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            1 => Ok(Self::Binary),
            2 => Ok(Self::String),
            other => Err(ChunkError::InvalidChunkType(other)),
        }
    }

    pub fn tag(self) -> i32 {
        self as i32
    }
}

/// A decoded chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Binary(Vec<u8>),
    String(String),
}

impl Chunk {
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Chunk::Binary(_) => ChunkType::Binary,
            Chunk::String(_) => ChunkType::String,
        }
    }
}

/// Writes chunks and hands out positional buffer ids
pub struct ChunkWriter<W: Write> {
    inner: W,
    binary_count: usize,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            binary_count: 0,
        }
    }

    /// Write a 3-byte signature. Does not count as a chunk.
    pub fn write_magic(&mut self, magic: &[u8; 3]) -> Result<()> {
        self.inner.write_all(magic)?;
        Ok(())
    }

    /// Write a binary chunk and return its buffer id
    pub fn write_binary(&mut self, payload: &[u8]) -> Result<usize> {
        let length = i32::try_from(payload.len())
            .map_err(|_| ChunkError::InvalidLength(payload.len() as i64))?;
        self.inner.write_all(&ChunkType::Binary.tag().to_le_bytes())?;
        self.inner.write_all(&length.to_le_bytes())?;
        self.inner.write_all(payload)?;

        let id = self.binary_count;
        self.binary_count += 1;
        Ok(id)
    }

    /// Write a string chunk (7-bit length prefix + UTF-8)
    pub fn write_string(&mut self, text: &str) -> Result<()> {
        self.inner.write_all(&ChunkType::String.tag().to_le_bytes())?;
        write_7bit_length(&mut self.inner, text.len())?;
        self.inner.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Number of binary chunks written so far (= next buffer id)
    pub fn binary_count(&self) -> usize {
        self.binary_count
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads chunks in file order
pub struct ChunkReader<R: Read> {
    inner: R,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read and verify a 3-byte signature
    pub fn read_magic(&mut self, expected: &[u8; 3]) -> Result<()> {
        let mut actual = [0u8; 3];
        let read = read_up_to(&mut self.inner, &mut actual)?;
        if read < actual.len() || &actual != expected {
            return Err(ChunkError::InvalidMagic {
                expected: expected.to_vec(),
                actual: actual[..read].to_vec(),
            });
        }
        Ok(())
    }

    /// Read the next chunk. Returns `None` at a clean end of input.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let mut tag = [0u8; 4];
        match read_up_to(&mut self.inner, &mut tag)? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(ChunkError::UnexpectedEof("chunk tag")),
        }

        match ChunkType::from_tag(i32::from_le_bytes(tag))? {
            ChunkType::Binary => {
                let mut length = [0u8; 4];
                if read_up_to(&mut self.inner, &mut length)? != 4 {
                    return Err(ChunkError::UnexpectedEof("chunk length"));
                }
                let length = i32::from_le_bytes(length);
                if length < 0 {
                    return Err(ChunkError::InvalidLength(length as i64));
                }
                let payload = self.read_payload(length as usize, "binary chunk payload")?;
                Ok(Some(Chunk::Binary(payload)))
            }
            ChunkType::String => {
                let length = read_7bit_length(&mut self.inner)?;
                let payload = self.read_payload(length, "string chunk payload")?;
                let text = String::from_utf8(payload).map_err(|_| ChunkError::InvalidUtf8)?;
                Ok(Some(Chunk::String(text)))
            }
        }
    }

    /// Buffers grow with the bytes actually read, so a bogus length prefix
    /// cannot force a large allocation
    fn read_payload(&mut self, length: usize, what: &'static str) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        (&mut self.inner)
            .take(length as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != length {
            return Err(ChunkError::UnexpectedEof(what));
        }
        Ok(payload)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Fill `buf` as far as the reader allows, returning how many bytes were read
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn write_7bit_length<W: Write>(writer: &mut W, length: usize) -> Result<()> {
    let mut value = u32::try_from(length).map_err(|_| ChunkError::InvalidLength(length as i64))?;
    while value >= 0x80 {
        writer.write_all(&[(value as u8) | 0x80])?;
        value >>= 7;
    }
    writer.write_all(&[value as u8])?;
    Ok(())
}

fn read_7bit_length<R: Read>(reader: &mut R) -> Result<usize> {
    let mut value: u32 = 0;
    // At most 5 bytes for a 32-bit value
    for shift in (0..35).step_by(7) {
        let mut byte = [0u8; 1];
        if read_up_to(reader, &mut byte)? != 1 {
            return Err(ChunkError::UnexpectedEof("string length"));
        }
        value |= u32::from(byte[0] & 0x7F) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value as usize);
        }
    }
    Err(ChunkError::InvalidLength(i64::from(value)))
}
