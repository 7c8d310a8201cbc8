//! Root source that re-chunks raw input.

use crate::codec::{DEFAULT_CHUNK_SIZE, ReadChunks, payload_bytes};
use crate::error::ExtractorError;
use crate::node::{self, Chunks, Extractor, Payload};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Emits its input as [bytes::Bytes] chunks of at most `chunk_size` bytes.
///
/// Accepts `Bytes`, `Vec<u8>`, `String`, `&'static str`, or a `PathBuf` whose
/// file is read lazily.
#[derive(Debug, Clone, Copy)]
pub struct ByteStream {
  chunk_size: usize,
}

impl ByteStream {
  pub fn new(chunk_size: usize) -> Self {
    Self {
      chunk_size: chunk_size.max(1),
    }
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }
}

impl Default for ByteStream {
  fn default() -> Self {
    Self::new(DEFAULT_CHUNK_SIZE)
  }
}

impl Extractor for ByteStream {
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    if let Some(path) = data.downcast_ref::<PathBuf>() {
      let file = File::open(path)?;
      return Ok(Box::new(ReadChunks::new(
        Box::new(BufReader::new(file)),
        self.chunk_size,
      )));
    }
    let bytes = payload_bytes(&data).ok_or(ExtractorError::unexpected("bytes, string or path"))?;
    let size = self.chunk_size;
    let len = bytes.len();
    Ok(Box::new((0..len).step_by(size).map(move |start| {
      Ok(node::payload(bytes.slice(start..(start + size).min(len))))
    })))
  }
}
