//! Persistence sink for stored features.

use crate::codec::payload_bytes;
use crate::error::ExtractorError;
use crate::event_log::EventLog;
use crate::node::{self, Chunks, Extractor, Payload};
use crate::storage::{Database, WriteStream};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes encoded bytes for one `(entity, feature)` pair.
///
/// The write stream is opened on acquire. It is committed on release only if
/// the upstream finished; an aborted run leaves storage untouched. After a
/// commit, `{"_id", "name", "content_type"}` is appended to the event log when
/// one is configured.
pub struct DataWriter {
  database: Arc<dyn Database>,
  event_log: Option<Arc<EventLog>>,
  key: String,
  id: String,
  feature: String,
  content_type: String,
  stream: Option<Box<dyn WriteStream>>,
  finished: bool,
}

impl DataWriter {
  pub fn new(
    database: Arc<dyn Database>,
    key: impl Into<String>,
    id: impl Into<String>,
    feature: impl Into<String>,
    content_type: impl Into<String>,
  ) -> Self {
    Self {
      database,
      event_log: None,
      key: key.into(),
      id: id.into(),
      feature: feature.into(),
      content_type: content_type.into(),
      stream: None,
      finished: false,
    }
  }

  pub fn with_event_log(mut self, event_log: Option<Arc<EventLog>>) -> Self {
    self.event_log = event_log;
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Extractor for DataWriter {
  fn acquire(&mut self) -> Result<(), ExtractorError> {
    self.finished = false;
    self.stream = Some(self.database.write_stream(&self.key, &self.content_type)?);
    Ok(())
  }

  fn transform(&mut self, data: Payload) -> Result<Chunks, ExtractorError> {
    let bytes = payload_bytes(&data).ok_or(ExtractorError::unexpected("encoded bytes"))?;
    let stream = self
      .stream
      .as_mut()
      .ok_or_else(|| ExtractorError::Failed(format!("writer for '{}' is not open", self.key)))?;
    stream.write_all(&bytes)?;
    Ok(node::empty())
  }

  fn last_chunk(&mut self) -> Result<Chunks, ExtractorError> {
    self.finished = true;
    Ok(node::empty())
  }

  fn release(&mut self) -> Result<(), ExtractorError> {
    let Some(stream) = self.stream.take() else {
      return Ok(());
    };
    if !self.finished {
      warn!(key = %self.key, "discarding unfinished write");
      return Ok(());
    }
    stream.commit()?;
    debug!(key = %self.key, content_type = %self.content_type, "stored");
    if let Some(log) = &self.event_log {
      log.append(serde_json::json!({
        "_id": self.id,
        "name": self.feature,
        "content_type": self.content_type,
      }))?;
    }
    Ok(())
  }
}
