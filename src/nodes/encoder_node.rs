use crate::codec::Encoder;
use crate::error::ExtractorError;
use crate::node::{self, Chunks, Extractor, Payload};

/// Runs a feature's encoder over its output, emitting [bytes::Bytes].
pub struct EncoderNode {
  encoder: Box<dyn Encoder>,
}

impl EncoderNode {
  pub fn new(encoder: Box<dyn Encoder>) -> Self {
    Self { encoder }
  }

  pub fn content_type(&self) -> &str {
    self.encoder.content_type()
  }
}

impl Extractor for EncoderNode {
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let encoded = self.encoder.encode(&data)?;
    Ok(node::from_vec(encoded.into_iter().map(node::payload).collect()))
  }

  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    let tail = self.encoder.finish()?;
    Ok(node::from_vec(tail.into_iter().map(node::payload).collect()))
  }
}
