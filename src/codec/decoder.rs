//! Decoders from stored bytes back to feature values.

use super::DEFAULT_CHUNK_SIZE;
use crate::error::{CodecError, ExtractorError};
use crate::node::{self, Chunks, Payload};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::io::Read;
use std::marker::PhantomData;

/// Byte source handed to a decoder.
pub type Source = Box<dyn Read + Send>;

/// Turns stored bytes into a materialized value or a lazy chunk stream.
pub trait Decoder: Send + Sync {
  /// Reads the whole source into one value.
  fn decode(&self, source: Source) -> Result<Payload, CodecError>;

  /// Replays the source as chunks, as if it were fresh extractor output.
  fn stream(&self, source: Source) -> Result<Chunks, CodecError> {
    Ok(node::once(self.decode(source)?))
  }
}

/// Reads a source lazily in fixed-size [Bytes] chunks.
pub struct ReadChunks {
  source: Source,
  chunk_size: usize,
  done: bool,
}

impl ReadChunks {
  pub fn new(source: Source, chunk_size: usize) -> Self {
    Self {
      source,
      chunk_size: chunk_size.max(1),
      done: false,
    }
  }
}

impl Iterator for ReadChunks {
  type Item = Result<Payload, ExtractorError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    let mut buf = Vec::with_capacity(self.chunk_size);
    match self
      .source
      .by_ref()
      .take(self.chunk_size as u64)
      .read_to_end(&mut buf)
    {
      Ok(0) => {
        self.done = true;
        None
      }
      Ok(_) => Some(Ok(node::payload(Bytes::from(buf)))),
      Err(e) => {
        self.done = true;
        Some(Err(e.into()))
      }
    }
  }
}

/// Raw bytes. Streams in `chunk_size` pieces.
#[derive(Debug, Clone, Copy)]
pub struct RawDecoder {
  chunk_size: usize,
}

impl RawDecoder {
  pub fn new(chunk_size: usize) -> Self {
    Self { chunk_size }
  }
}

impl Default for RawDecoder {
  fn default() -> Self {
    Self::new(DEFAULT_CHUNK_SIZE)
  }
}

impl Decoder for RawDecoder {
  fn decode(&self, mut source: Source) -> Result<Payload, CodecError> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    Ok(node::payload(Bytes::from(buf)))
  }

  fn stream(&self, source: Source) -> Result<Chunks, CodecError> {
    Ok(Box::new(ReadChunks::new(source, self.chunk_size)))
  }
}

/// Whole contents as a `String`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDecoder;

impl Decoder for TextDecoder {
  fn decode(&self, mut source: Source) -> Result<Payload, CodecError> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    Ok(node::payload(String::from_utf8(buf)?))
  }
}

/// JSON document deserialized into `T`.
pub struct JsonDecoder<T> {
  _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDecoder<T> {
  fn default() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

impl<T> JsonDecoder<T> {
  pub fn new() -> Self {
    Self::default()
  }
}

impl<T: DeserializeOwned + Any + Send + Sync> Decoder for JsonDecoder<T> {
  fn decode(&self, source: Source) -> Result<Payload, CodecError> {
    let value: T = serde_json::from_reader(source)?;
    Ok(node::payload(value))
  }
}
