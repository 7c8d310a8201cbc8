use crate::codec::Decoder;
use crate::error::ExtractorError;
use crate::node::{self, Chunks, Extractor, Payload};
use crate::storage::StoredStream;
use std::sync::Arc;

/// Root that replays a stored feature through its decoder.
///
/// Fed a [StoredStream]; emits the decoder's chunks as if they were the
/// feature's fresh output.
pub struct DecoderSource {
  decoder: Arc<dyn Decoder>,
}

impl DecoderSource {
  pub fn new(decoder: Arc<dyn Decoder>) -> Self {
    Self { decoder }
  }
}

impl Extractor for DecoderSource {
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let stored = node::downcast::<StoredStream>(&data, "StoredStream")?;
    let reader = stored
      .take()
      .ok_or_else(|| ExtractorError::Failed("stored stream already consumed".to_string()))?;
    Ok(self.decoder.stream(reader)?)
  }
}
