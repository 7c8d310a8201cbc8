//! Where a schema keeps its entities.

use crate::event_log::EventLog;
use crate::storage::{
  Database, IdProvider, InMemoryDatabase, KeyBuilder, StringDelimitedKeyBuilder, UuidProvider,
};
use std::fmt;
use std::sync::Arc;

/// Storage collaborators shared by every feature of a schema.
#[derive(Clone)]
pub struct Persistence {
  pub id_provider: Arc<dyn IdProvider>,
  pub key_builder: Arc<dyn KeyBuilder>,
  pub database: Arc<dyn Database>,
  /// When set, every committed feature is announced here.
  pub event_log: Option<Arc<EventLog>>,
}

impl Persistence {
  /// Uuid ids and `:`-delimited keys over `database`.
  pub fn new(database: impl Database + 'static) -> Self {
    Self {
      id_provider: Arc::new(UuidProvider),
      key_builder: Arc::new(StringDelimitedKeyBuilder::default()),
      database: Arc::new(database),
      event_log: None,
    }
  }

  pub fn in_memory() -> Self {
    Self::new(InMemoryDatabase::new())
  }

  pub fn with_id_provider(mut self, provider: impl IdProvider + 'static) -> Self {
    self.id_provider = Arc::new(provider);
    self
  }

  pub fn with_key_builder(mut self, key_builder: impl KeyBuilder + 'static) -> Self {
    self.key_builder = Arc::new(key_builder);
    self
  }

  pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
    self.event_log = Some(event_log);
    self
  }

  /// Storage key for `feature` of entity `id`.
  pub fn key(&self, id: &str, feature: &str) -> String {
    self.key_builder.build(id, feature)
  }
}

impl fmt::Debug for Persistence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Persistence")
      .field("event_log", &self.event_log.is_some())
      .finish_non_exhaustive()
  }
}
