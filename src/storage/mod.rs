//! Storage collaborators: where encoded features live, how their keys are
//! built, and how entity ids are minted.

use crate::codec::Source;
use crate::error::StorageError;
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

mod filesystem;
#[cfg(test)]
mod filesystem_test;
mod id_provider;
#[cfg(test)]
mod id_provider_test;
mod key_builder;
mod memory;

pub use filesystem::FileSystemDatabase;
pub use id_provider::{IdProvider, UserSpecifiedIdProvider, UuidProvider};
pub use key_builder::{KeyBuilder, StringDelimitedKeyBuilder};
pub use memory::InMemoryDatabase;

/// A pending write. Nothing is visible to readers until [WriteStream::commit].
pub trait WriteStream: Write + Send {
  fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Key/value byte storage for encoded features.
pub trait Database: Send + Sync {
  /// Opens a buffered writer for `key`. Dropping it without committing discards the data.
  fn write_stream(&self, key: &str, content_type: &str)
  -> Result<Box<dyn WriteStream>, StorageError>;

  /// Opens a reader for `key`, or [StorageError::NotFound].
  fn read_stream(&self, key: &str) -> Result<Source, StorageError>;

  fn contains(&self, key: &str) -> Result<bool, StorageError>;

  /// Every committed key, sorted.
  fn keys(&self) -> Result<Vec<String>, StorageError>;

  /// Distinct entity ids, in key order.
  fn iter_ids(
    &self,
    key_builder: Arc<dyn KeyBuilder>,
  ) -> Result<Box<dyn Iterator<Item = String> + Send>, StorageError> {
    let mut seen = HashSet::new();
    let ids = self
      .keys()?
      .into_iter()
      .filter_map(move |key| key_builder.decompose(&key).ok().map(|(id, _)| id))
      .filter(move |id| seen.insert(id.clone()));
    Ok(Box::new(ids))
  }
}

/// Root input that hands a stored feature's reader to a decoding source node.
///
/// The reader can be taken once.
pub struct StoredStream {
  reader: Mutex<Option<Source>>,
}

impl StoredStream {
  pub fn new(reader: Source) -> Self {
    Self {
      reader: Mutex::new(Some(reader)),
    }
  }

  pub fn take(&self) -> Option<Source> {
    self.reader.lock().ok().and_then(|mut r| r.take())
  }
}

impl fmt::Debug for StoredStream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StoredStream").finish_non_exhaustive()
  }
}
