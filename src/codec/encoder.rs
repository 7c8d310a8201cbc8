//! Streaming encoders from domain chunks to byte chunks.

use super::{APPLICATION_JSON, OCTET_STREAM, TEXT_PLAIN, payload_bytes};
use crate::error::CodecError;
use crate::node::Payload;
use bytes::Bytes;
use serde::Serialize;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts a feature's output chunks into bytes.
pub trait Encoder: Send {
  /// MIME type recorded alongside the stored bytes.
  fn content_type(&self) -> &str;

  /// Encodes one chunk. May buffer and return nothing.
  fn encode(&mut self, chunk: &Payload) -> Result<Vec<Bytes>, CodecError>;

  /// Flushes buffered output once the upstream feature has finished.
  fn finish(&mut self) -> Result<Vec<Bytes>, CodecError> {
    Ok(Vec::new())
  }
}

/// Builds a fresh encoder per compiled graph.
pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn Encoder> + Send + Sync>;

/// Passes byte-like chunks through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityEncoder;

impl Encoder for IdentityEncoder {
  fn content_type(&self) -> &str {
    OCTET_STREAM
  }

  fn encode(&mut self, chunk: &Payload) -> Result<Vec<Bytes>, CodecError> {
    payload_bytes(chunk)
      .map(|b| vec![b])
      .ok_or(CodecError::UnsupportedChunk {
        expected: "bytes or string",
      })
  }
}

/// UTF-8 text chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
  fn content_type(&self) -> &str {
    TEXT_PLAIN
  }

  fn encode(&mut self, chunk: &Payload) -> Result<Vec<Bytes>, CodecError> {
    if let Some(text) = chunk.downcast_ref::<String>() {
      return Ok(vec![Bytes::copy_from_slice(text.as_bytes())]);
    }
    if let Some(text) = chunk.downcast_ref::<&'static str>() {
      return Ok(vec![Bytes::from_static(text.as_bytes())]);
    }
    match chunk.downcast_ref::<Bytes>() {
      Some(raw) => {
        std::str::from_utf8(raw).map_err(|_| CodecError::UnsupportedChunk { expected: "utf-8 text" })?;
        Ok(vec![raw.clone()])
      }
      None => Err(CodecError::UnsupportedChunk { expected: "text" }),
    }
  }
}

/// Serializes the latest `T` seen as one JSON document when the stream ends.
pub struct JsonEncoder<T> {
  latest: Option<Payload>,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonEncoder<T> {
  fn default() -> Self {
    Self {
      latest: None,
      _marker: PhantomData,
    }
  }
}

impl<T> JsonEncoder<T> {
  pub fn new() -> Self {
    Self::default()
  }
}

impl<T: Serialize + Any> Encoder for JsonEncoder<T> {
  fn content_type(&self) -> &str {
    APPLICATION_JSON
  }

  fn encode(&mut self, chunk: &Payload) -> Result<Vec<Bytes>, CodecError> {
    if !chunk.is::<T>() {
      return Err(CodecError::UnsupportedChunk {
        expected: std::any::type_name::<T>(),
      });
    }
    self.latest = Some(chunk.clone());
    Ok(Vec::new())
  }

  fn finish(&mut self) -> Result<Vec<Bytes>, CodecError> {
    let Some(latest) = self.latest.take() else {
      return Ok(Vec::new());
    };
    let value = latest
      .downcast_ref::<T>()
      .ok_or(CodecError::UnsupportedChunk {
        expected: std::any::type_name::<T>(),
      })?;
    Ok(vec![Bytes::from(serde_json::to_vec(value)?)])
  }
}
