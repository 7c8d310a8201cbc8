use crate::codec::payload_bytes;
use crate::error::{CodecError, ExtractorError};
use crate::node::{self, Chunks, Extractor, Payload};

/// Splits a byte stream into whitespace-separated words.
///
/// Emits one `Vec<String>` per chunk that completes at least one word. A word
/// cut by a chunk boundary is carried over, and flushed at the end.
#[derive(Debug, Default)]
pub struct Tokenizer {
  residual: Vec<u8>,
}

impl Tokenizer {
  pub fn new() -> Self {
    Self::default()
  }
}

fn word(bytes: &[u8]) -> Result<String, ExtractorError> {
  String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::from(e).into())
}

impl Extractor for Tokenizer {
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let bytes = payload_bytes(&data).ok_or(ExtractorError::unexpected("bytes or string"))?;
    self.residual.extend_from_slice(&bytes);
    let Some(last_space) = self.residual.iter().rposition(u8::is_ascii_whitespace) else {
      return Ok(node::empty());
    };
    let rest = self.residual.split_off(last_space + 1);
    let complete = std::mem::replace(&mut self.residual, rest);
    let words = complete
      .split(u8::is_ascii_whitespace)
      .filter(|w| !w.is_empty())
      .map(word)
      .collect::<Result<Vec<_>, _>>()?;
    if words.is_empty() {
      return Ok(node::empty());
    }
    Ok(node::once(node::payload(words)))
  }

  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    if self.residual.is_empty() {
      return Ok(node::empty());
    }
    let tail = word(&std::mem::take(&mut self.residual))?;
    Ok(node::once(node::payload(vec![tail])))
  }
}
