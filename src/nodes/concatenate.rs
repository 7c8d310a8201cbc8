use crate::codec::payload_bytes;
use crate::error::{ExtractorError, NotEnoughData};
use crate::node::{self, Aggregator, Cache, Chunks, Extractor, Payload};
use bytes::BytesMut;

/// Joins the byte streams of every upstream, in `needs` order.
///
/// Input from each upstream is buffered separately, so interleaved delivery
/// still produces each source contiguously. Emits once, when finalized.
#[derive(Debug, Default)]
pub struct Concatenate {
  buffers: Vec<Vec<Payload>>,
  emitted: bool,
}

impl Concatenate {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn aggregator() -> Aggregator<Self> {
    Aggregator(Self::new())
  }
}

impl Extractor for Concatenate {
  fn enqueue(&mut self, _cache: &mut Cache, data: Payload, input: usize) {
    if self.buffers.len() <= input {
      self.buffers.resize_with(input + 1, Vec::new);
    }
    self.buffers[input].push(data);
  }

  fn dequeue(&mut self, _cache: &mut Cache, _finalized: bool) -> Result<Payload, NotEnoughData> {
    if self.emitted {
      return Err(NotEnoughData);
    }
    self.emitted = true;
    Ok(node::payload(std::mem::take(&mut self.buffers)))
  }

  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let buffers = node::downcast::<Vec<Vec<Payload>>>(&data, "buffered inputs")?;
    let mut out = BytesMut::new();
    for chunk in buffers.iter().flatten() {
      let bytes = payload_bytes(chunk).ok_or(ExtractorError::unexpected("bytes or string"))?;
      out.extend_from_slice(&bytes);
    }
    Ok(node::once(node::payload(out.freeze())))
  }
}
