//! Encoders turn a feature's domain chunks into bytes for storage; decoders
//! turn stored bytes back into a value or a replayable chunk stream.

use crate::node::Payload;
use bytes::Bytes;

mod array;
#[cfg(test)]
mod array_test;
mod decoder;
mod encoder;

pub use array::{ArrayDecoder, ArrayEncoder, Element};
pub use decoder::{Decoder, JsonDecoder, RawDecoder, ReadChunks, Source, TextDecoder};
pub use encoder::{Encoder, EncoderFactory, IdentityEncoder, JsonEncoder, TextEncoder};

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

/// Chunk size used when replaying stored bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Views a byte-like payload (`Bytes`, `Vec<u8>`, `String`, `&'static str`) as [Bytes].
pub fn payload_bytes(data: &Payload) -> Option<Bytes> {
  if let Some(b) = data.downcast_ref::<Bytes>() {
    return Some(b.clone());
  }
  if let Some(v) = data.downcast_ref::<Vec<u8>>() {
    return Some(Bytes::copy_from_slice(v));
  }
  if let Some(s) = data.downcast_ref::<String>() {
    return Some(Bytes::copy_from_slice(s.as_bytes()));
  }
  data
    .downcast_ref::<&'static str>()
    .map(|s| Bytes::from_static(s.as_bytes()))
}
