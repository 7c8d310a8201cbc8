use crate::error::{ExtractorError, NotEnoughData};
use crate::node::{self, Aggregator, Cache, Chunks, Extractor, Payload};
use std::collections::BTreeMap;

/// Lowercased word frequencies over the whole input.
///
/// Accepts `Vec<String>` batches (as emitted by [super::Tokenizer]) or single
/// `String` words. Emits one `BTreeMap<String, usize>` once every upstream is
/// finalized; use [WordCount::aggregator] to get the blocking node.
#[derive(Debug, Default)]
pub struct WordCount {
  batches: Vec<Payload>,
  emitted: bool,
}

impl WordCount {
  pub fn new() -> Self {
    Self::default()
  }

  /// The blocking form used in graphs.
  pub fn aggregator() -> Aggregator<Self> {
    Aggregator(Self::new())
  }
}

impl Extractor for WordCount {
  fn enqueue(&mut self, _cache: &mut Cache, data: Payload, _input: usize) {
    self.batches.push(data);
  }

  fn dequeue(&mut self, _cache: &mut Cache, _finalized: bool) -> Result<Payload, NotEnoughData> {
    if self.emitted {
      return Err(NotEnoughData);
    }
    self.emitted = true;
    Ok(node::payload(std::mem::take(&mut self.batches)))
  }

  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let batches = node::downcast::<Vec<Payload>>(&data, "word batches")?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for batch in batches {
      if let Some(words) = batch.downcast_ref::<Vec<String>>() {
        for w in words {
          *counts.entry(w.to_lowercase()).or_default() += 1;
        }
      } else if let Some(w) = batch.downcast_ref::<String>() {
        *counts.entry(w.to_lowercase()).or_default() += 1;
      } else {
        return Err(ExtractorError::unexpected("Vec<String> or String"));
      }
    }
    Ok(node::once(node::payload(counts)))
  }
}
