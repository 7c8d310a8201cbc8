use crate::codec::payload_bytes;
use crate::error::ExtractorError;
use crate::node::{self, Chunks, Extractor, Payload};
use std::sync::{Arc, Mutex};

/// In-memory sink for recomputed features.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
  buffer: Arc<Mutex<Vec<u8>>>,
}

impl CaptureSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Handle to the captured bytes, shared with the sink.
  pub fn buffer(&self) -> Arc<Mutex<Vec<u8>>> {
    Arc::clone(&self.buffer)
  }
}

impl Extractor for CaptureSink {
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let bytes = payload_bytes(&data).ok_or(ExtractorError::unexpected("encoded bytes"))?;
    self
      .buffer
      .lock()
      .map_err(|_| ExtractorError::Failed("capture buffer poisoned".to_string()))?
      .extend_from_slice(&bytes);
    Ok(node::empty())
  }
}
