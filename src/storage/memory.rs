use super::{Database, WriteStream};
use crate::codec::Source;
use crate::error::StorageError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, RwLock};
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
  content_type: String,
  data: Bytes,
}

type Store = Arc<RwLock<BTreeMap<String, Entry>>>;

/// Process-local database. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
  store: Store,
}

impl InMemoryDatabase {
  pub fn new() -> Self {
    Self::default()
  }

  /// Content type recorded for `key` when it was written.
  pub fn content_type(&self, key: &str) -> Result<Option<String>, StorageError> {
    let store = self.store.read().map_err(|_| StorageError::Poisoned)?;
    Ok(store.get(key).map(|e| e.content_type.clone()))
  }

  pub fn len(&self) -> usize {
    self.store.read().map(|s| s.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Database for InMemoryDatabase {
  fn write_stream(
    &self,
    key: &str,
    content_type: &str,
  ) -> Result<Box<dyn WriteStream>, StorageError> {
    Ok(Box::new(MemoryWriter {
      key: key.to_string(),
      content_type: content_type.to_string(),
      buf: Vec::new(),
      store: Arc::clone(&self.store),
    }))
  }

  fn read_stream(&self, key: &str) -> Result<Source, StorageError> {
    let store = self.store.read().map_err(|_| StorageError::Poisoned)?;
    let entry = store
      .get(key)
      .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
    Ok(Box::new(Cursor::new(entry.data.clone())))
  }

  fn contains(&self, key: &str) -> Result<bool, StorageError> {
    let store = self.store.read().map_err(|_| StorageError::Poisoned)?;
    Ok(store.contains_key(key))
  }

  fn keys(&self) -> Result<Vec<String>, StorageError> {
    let store = self.store.read().map_err(|_| StorageError::Poisoned)?;
    Ok(store.keys().cloned().collect())
  }
}

struct MemoryWriter {
  key: String,
  content_type: String,
  buf: Vec<u8>,
  store: Store,
}

impl Write for MemoryWriter {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.buf.extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

impl WriteStream for MemoryWriter {
  fn commit(self: Box<Self>) -> Result<(), StorageError> {
    let MemoryWriter {
      key,
      content_type,
      buf,
      store,
    } = *self;
    trace!(key = %key, bytes = buf.len(), "commit");
    let mut store = store.write().map_err(|_| StorageError::Poisoned)?;
    store.insert(
      key,
      Entry {
        content_type,
        data: Bytes::from(buf),
      },
    );
    Ok(())
  }
}
