//! # Streaming computation units
//!
//! An [Extractor] is the per-node algorithm: it merges incoming chunks into a
//! cache (`enqueue`), decides whether enough input is buffered to run
//! (`dequeue`), and turns one dequeued value into a lazy sequence of output
//! chunks (`transform`). The [crate::graph::Graph] owns the node bookkeeping
//! (needs, listeners, finalization) and pushes every produced chunk to the
//! listeners synchronously, depth-first.
//!
//! Data flows as [Payload] (`Arc<dyn Any + Send + Sync>`); extractors downcast
//! to the types they expect.
//!
//! ## Example
//!
//! ```rust
//! use featureflow::node::{self, Chunks, Extractor, Payload};
//! use featureflow::error::ExtractorError;
//!
//! struct Upper;
//!
//! impl Extractor for Upper {
//!   fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
//!     let text = node::downcast::<String>(&data, "String")?;
//!     Ok(node::once(node::payload(text.to_uppercase())))
//!   }
//! }
//! ```

use crate::error::{ExtractorError, NotEnoughData};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A unit of data flowing along a graph edge.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Lazy, finite, non-restartable sequence of output chunks.
pub type Chunks = Box<dyn Iterator<Item = Result<Payload, ExtractorError>> + Send>;

/// Stable index of a node inside one graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Wraps a value as a [Payload].
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
  Arc::new(value)
}

/// Downcasts a payload, naming the expected type on mismatch.
pub fn downcast<'a, T: Any>(
  data: &'a Payload,
  expected: &'static str,
) -> Result<&'a T, ExtractorError> {
  data
    .downcast_ref::<T>()
    .ok_or(ExtractorError::unexpected(expected))
}

/// No output.
pub fn empty() -> Chunks {
  Box::new(std::iter::empty())
}

/// Exactly one output chunk.
pub fn once(chunk: Payload) -> Chunks {
  Box::new(std::iter::once(Ok(chunk)))
}

/// Output chunks computed up front.
pub fn from_vec(chunks: Vec<Payload>) -> Chunks {
  Box::new(chunks.into_iter().map(Ok))
}

/// Default single-slot cache owned by every node.
///
/// Holds at most one unit of pending data; a second enqueue before a dequeue
/// replaces the first.
#[derive(Default)]
pub struct Cache {
  pending: Option<Payload>,
}

impl Cache {
  pub fn replace(&mut self, data: Payload) {
    self.pending = Some(data);
  }

  pub fn take(&mut self) -> Result<Payload, NotEnoughData> {
    self.pending.take().ok_or(NotEnoughData)
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_none()
  }
}

/// The per-node streaming algorithm.
///
/// Only `transform` is required. The caching hooks default to the single-slot
/// replace policy; multi-input and accumulating extractors override `enqueue`
/// and `dequeue` and keep their own state keyed by `input`, the position of
/// the sending upstream in the node's `needs` (0 for values fed to a root).
pub trait Extractor: Send {
  /// Merges `data` from upstream `input` into pending state.
  fn enqueue(&mut self, cache: &mut Cache, data: Payload, input: usize) {
    let _ = input;
    cache.replace(data);
  }

  /// Takes the next value to transform, or signals [NotEnoughData].
  ///
  /// `finalized` is true once every upstream has sent data and signalled
  /// completion.
  fn dequeue(&mut self, cache: &mut Cache, finalized: bool) -> Result<Payload, NotEnoughData> {
    let _ = finalized;
    cache.take()
  }

  /// Turns one dequeued value into output chunks.
  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError>;

  /// Tail output flushed once the node finalizes.
  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    Ok(empty())
  }

  /// Opens external resources at the start of a graph run.
  fn acquire(&mut self) -> Result<(), ExtractorError> {
    Ok(())
  }

  /// Releases external resources. Called on every exit path of a run.
  fn release(&mut self) -> Result<(), ExtractorError> {
    Ok(())
  }
}

impl<E: Extractor + ?Sized> Extractor for Box<E> {
  fn enqueue(&mut self, cache: &mut Cache, data: Payload, input: usize) {
    (**self).enqueue(cache, data, input)
  }

  fn dequeue(&mut self, cache: &mut Cache, finalized: bool) -> Result<Payload, NotEnoughData> {
    (**self).dequeue(cache, finalized)
  }

  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    (**self).transform(data)
  }

  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    (**self).last_chunk()
  }

  fn acquire(&mut self) -> Result<(), ExtractorError> {
    (**self).acquire()
  }

  fn release(&mut self) -> Result<(), ExtractorError> {
    (**self).release()
  }
}

/// Blocks an extractor until all of its input has been received.
///
/// `dequeue` reports [NotEnoughData] until the node is finalized, which models
/// reducers that need the whole input (word counts, concatenation).
pub struct Aggregator<E>(pub E);

impl<E> Aggregator<E> {
  pub fn inner(&self) -> &E {
    &self.0
  }
}

impl<E: Extractor> Extractor for Aggregator<E> {
  fn enqueue(&mut self, cache: &mut Cache, data: Payload, input: usize) {
    self.0.enqueue(cache, data, input)
  }

  fn dequeue(&mut self, cache: &mut Cache, finalized: bool) -> Result<Payload, NotEnoughData> {
    if !finalized {
      return Err(NotEnoughData);
    }
    self.0.dequeue(cache, finalized)
  }

  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    self.0.transform(data)
  }

  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    self.0.last_chunk()
  }

  fn acquire(&mut self) -> Result<(), ExtractorError> {
    self.0.acquire()
  }

  fn release(&mut self) -> Result<(), ExtractorError> {
    self.0.release()
  }
}

/// Factory producing a fresh extractor for every compiled graph.
pub type ExtractorFactory = Arc<dyn Fn() -> Box<dyn Extractor> + Send + Sync>;
