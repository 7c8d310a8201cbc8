//! Typed n-dimensional arrays.
//!
//! Stored layout: a little-endian `u32` header length, a JSON header
//! `{"dtype": "<f4", "shape": [..]}` holding the element type and every axis
//! but the first, then the elements in row-major little-endian order. Chunks
//! are appended along the first axis, so the encoder streams and the decoder
//! recovers the first axis from the byte count.

use super::OCTET_STREAM;
use super::decoder::{Decoder, Source};
use super::encoder::Encoder;
use crate::error::CodecError;
use crate::node::{self, Payload};
use bytes::Bytes;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::marker::PhantomData;

/// A fixed-size element type with a numpy-style dtype tag.
pub trait Element: Copy + Send + Sync + 'static {
  const DTYPE: &'static str;
  const SIZE: usize;

  fn write_le(&self, out: &mut Vec<u8>);

  /// `bytes` is exactly `SIZE` long.
  fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! element {
  ($($ty:ty => $dtype:literal),* $(,)?) => {
    $(
      impl Element for $ty {
        const DTYPE: &'static str = $dtype;
        const SIZE: usize = std::mem::size_of::<$ty>();

        fn write_le(&self, out: &mut Vec<u8>) {
          out.extend_from_slice(&self.to_le_bytes());
        }

        fn read_le(bytes: &[u8]) -> Self {
          let mut raw = [0u8; std::mem::size_of::<$ty>()];
          raw.copy_from_slice(bytes);
          <$ty>::from_le_bytes(raw)
        }
      }
    )*
  };
}

element! {
  u8 => "|u1",
  i8 => "|i1",
  u16 => "<u2",
  i16 => "<i2",
  u32 => "<u4",
  i32 => "<i4",
  u64 => "<u8",
  i64 => "<i8",
  f32 => "<f4",
  f64 => "<f8",
}

#[derive(Debug, Serialize, Deserialize)]
struct ArrayHeader {
  dtype: String,
  shape: Vec<usize>,
}

fn view<T: Element>(chunk: &Payload) -> Option<ArrayViewD<'_, T>> {
  if let Some(a) = chunk.downcast_ref::<ArrayD<T>>() {
    return Some(a.view());
  }
  if let Some(a) = chunk.downcast_ref::<Array1<T>>() {
    return Some(a.view().into_dyn());
  }
  chunk
    .downcast_ref::<Array2<T>>()
    .map(|a| a.view().into_dyn())
}

/// Streams `ArrayD<T>` (or `Array1<T>` / `Array2<T>`) chunks along their
/// first axis. Every chunk must share the trailing shape of the first.
pub struct ArrayEncoder<T> {
  trailing: Option<Vec<usize>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ArrayEncoder<T> {
  fn default() -> Self {
    Self {
      trailing: None,
      _marker: PhantomData,
    }
  }
}

impl<T> ArrayEncoder<T> {
  pub fn new() -> Self {
    Self::default()
  }
}

impl<T: Element> Encoder for ArrayEncoder<T> {
  fn content_type(&self) -> &str {
    OCTET_STREAM
  }

  fn encode(&mut self, chunk: &Payload) -> Result<Vec<Bytes>, CodecError> {
    let array = view::<T>(chunk).ok_or(CodecError::UnsupportedChunk {
      expected: std::any::type_name::<ArrayD<T>>(),
    })?;
    let Some((_, trailing)) = array.shape().split_first() else {
      return Err(CodecError::MalformedArray(
        "zero-dimensional arrays cannot be streamed".to_string(),
      ));
    };

    let mut out = Vec::with_capacity(2);
    match &self.trailing {
      Some(expected) if expected.as_slice() != trailing => {
        return Err(CodecError::MalformedArray(format!(
          "chunk has trailing shape {trailing:?}, stream started with {expected:?}"
        )));
      }
      Some(_) => {}
      None => {
        let header = serde_json::to_vec(&ArrayHeader {
          dtype: T::DTYPE.to_string(),
          shape: trailing.to_vec(),
        })?;
        let len = u32::try_from(header.len())
          .map_err(|_| CodecError::MalformedArray("header too large".to_string()))?;
        let mut prefix = Vec::with_capacity(4 + header.len());
        prefix.extend_from_slice(&len.to_le_bytes());
        prefix.extend_from_slice(&header);
        out.push(Bytes::from(prefix));
        self.trailing = Some(trailing.to_vec());
      }
    }

    let mut body = Vec::with_capacity(array.len() * T::SIZE);
    for element in array.iter() {
      element.write_le(&mut body);
    }
    if !body.is_empty() {
      out.push(Bytes::from(body));
    }
    Ok(out)
  }
}

/// Reads the whole stored array back as `ArrayD<T>`.
///
/// When the trailing axes hold no elements the first axis cannot be
/// recovered and decodes as empty.
pub struct ArrayDecoder<T> {
  _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ArrayDecoder<T> {
  fn default() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

impl<T> ArrayDecoder<T> {
  pub fn new() -> Self {
    Self::default()
  }
}

impl<T: Element> Decoder for ArrayDecoder<T> {
  fn decode(&self, mut source: Source) -> Result<Payload, CodecError> {
    let mut len = [0u8; 4];
    source.read_exact(&mut len)?;
    let mut header = vec![0u8; u32::from_le_bytes(len) as usize];
    source.read_exact(&mut header)?;
    let header: ArrayHeader = serde_json::from_slice(&header)?;
    if header.dtype != T::DTYPE {
      return Err(CodecError::DtypeMismatch {
        expected: T::DTYPE,
        found: header.dtype,
      });
    }

    let mut body = Vec::new();
    source.read_to_end(&mut body)?;
    let row = header.shape.iter().product::<usize>() * T::SIZE;
    if row == 0 && !body.is_empty() {
      return Err(CodecError::MalformedArray(
        "elements present for an empty row shape".to_string(),
      ));
    }
    let rows = if row == 0 { 0 } else { body.len() / row };
    if rows * row != body.len() {
      return Err(CodecError::MalformedArray(format!(
        "{} bytes is not a whole number of {row}-byte rows",
        body.len()
      )));
    }

    let elements: Vec<T> = body.chunks_exact(T::SIZE).map(T::read_le).collect();
    let mut shape = Vec::with_capacity(header.shape.len() + 1);
    shape.push(rows);
    shape.extend_from_slice(&header.shape);
    let array = ArrayD::from_shape_vec(IxDyn(&shape), elements)?;
    Ok(node::payload(array))
  }
}
