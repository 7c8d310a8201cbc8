//! Append-only event log with replay-then-tail subscriptions.
//!
//! Ids are a fixed-width hex microsecond timestamp followed by 16 random hex
//! characters, so lexical order is append order. [EventLog::subscribe] first
//! replays every stored entry newer than the caller's cursor, then yields
//! entries published on the [Channel] after that scan. Delivery is
//! at-least-once; live entries at or below the replay cursor are skipped.

use crate::error::EventLogError;
use async_stream::stream;
use chrono::Utc;
use futures::{Stream, StreamExt};
use redis::streams::StreamReadReply;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// File holding persisted entries inside a log directory.
pub const EVENTS_FILENAME: &str = "events.jsonl";

/// One log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub id: String,
  pub data: serde_json::Value,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, EventLogError>> + Send>>;

/// Fan-out of newly appended events.
pub trait Channel: Send + Sync {
  fn publish(&self, event: &Event) -> Result<(), EventLogError>;

  /// Events published after this call returns.
  fn subscribe(&self) -> EventStream;
}

/// Process-local channel backed by a tokio broadcast.
#[derive(Debug, Clone)]
pub struct InMemoryChannel {
  sender: broadcast::Sender<Event>,
}

impl InMemoryChannel {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self { sender }
  }
}

impl Default for InMemoryChannel {
  fn default() -> Self {
    Self::new(1024)
  }
}

impl Channel for InMemoryChannel {
  fn publish(&self, event: &Event) -> Result<(), EventLogError> {
    // No receivers is not an error.
    let _ = self.sender.send(event.clone());
    Ok(())
  }

  fn subscribe(&self) -> EventStream {
    let mut rx = self.sender.subscribe();
    Box::pin(stream! {
      loop {
        match rx.recv().await {
          Ok(event) => yield Ok(event),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "subscriber lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}

/// Channel over a Redis stream (`XADD` / `XREAD BLOCK`).
///
/// Each entry carries the serialized [Event] in its `event` field.
#[derive(Debug, Clone)]
pub struct RedisChannel {
  client: redis::Client,
  stream: String,
  block_ms: u64,
}

impl RedisChannel {
  /// Does not connect until first use.
  pub fn open(url: &str, stream: impl Into<String>) -> Result<Self, EventLogError> {
    Ok(Self {
      client: redis::Client::open(url)?,
      stream: stream.into(),
      block_ms: 1000,
    })
  }

  pub fn with_block_ms(mut self, block_ms: u64) -> Self {
    self.block_ms = block_ms;
    self
  }

  /// Server clock as `(seconds, microseconds)`, from `TIME`.
  fn server_time(&self) -> Result<(u64, u64), EventLogError> {
    let mut conn = self.client.get_connection()?;
    Ok(redis::cmd("TIME").query(&mut conn)?)
  }
}

/// Exclusive `XREAD` cursor for a subscription starting at the given server
/// time. Steps back one millisecond so entries stamped in the current one are
/// delivered; duplicates are dropped by the log's cursor.
pub(crate) fn start_cursor(secs: u64, micros: u64) -> String {
  let millis = secs * 1000 + micros / 1000;
  format!("{}-0", millis.saturating_sub(1))
}

impl Channel for RedisChannel {
  fn publish(&self, event: &Event) -> Result<(), EventLogError> {
    let mut conn = self.client.get_connection()?;
    let body = serde_json::to_string(event)?;
    let _: String = redis::cmd("XADD")
      .arg(&self.stream)
      .arg("*")
      .arg("event")
      .arg(body)
      .query(&mut conn)?;
    Ok(())
  }

  fn subscribe(&self) -> EventStream {
    let client = self.client.clone();
    let stream_name = self.stream.clone();
    let block_ms = self.block_ms;
    // Taken now, from the server clock, so nothing published between this
    // call and the first read is missed.
    let start = self.server_time();
    Box::pin(stream! {
      let mut cursor = match start {
        Ok((secs, micros)) => start_cursor(secs, micros),
        Err(e) => {
          yield Err(e);
          return;
        }
      };
      let mut conn = match client.get_connection_manager().await {
        Ok(conn) => conn,
        Err(e) => {
          yield Err(EventLogError::from(e));
          return;
        }
      };
      loop {
        let reply: redis::RedisResult<Option<StreamReadReply>> = redis::cmd("XREAD")
          .arg("BLOCK")
          .arg(block_ms)
          .arg("STREAMS")
          .arg(&stream_name)
          .arg(&cursor)
          .query_async(&mut conn)
          .await;
        match reply {
          Ok(Some(reply)) => {
            for key in reply.keys {
              for entry in key.ids {
                cursor = entry.id.clone();
                let Some(body) = entry.get::<String>("event") else {
                  warn!(id = %entry.id, "redis entry without event field");
                  continue;
                };
                yield serde_json::from_str::<Event>(&body).map_err(EventLogError::from);
              }
            }
          }
          Ok(None) => continue,
          Err(e) => {
            yield Err(EventLogError::from(e));
            return;
          }
        }
      }
    })
  }
}

struct Inner {
  entries: BTreeMap<String, serde_json::Value>,
  last_micros: u64,
}

/// Append-only, id-ordered log of JSON payloads.
pub struct EventLog {
  inner: Mutex<Inner>,
  channel: Arc<dyn Channel>,
  path: Option<PathBuf>,
}

impl EventLog {
  pub fn new(channel: Arc<dyn Channel>) -> Self {
    Self {
      inner: Mutex::new(Inner {
        entries: BTreeMap::new(),
        last_micros: 0,
      }),
      channel,
      path: None,
    }
  }

  /// Memory-only log with a broadcast channel.
  pub fn in_memory() -> Self {
    Self::new(Arc::new(InMemoryChannel::default()))
  }

  /// Log persisted as JSON lines under `dir`, reloading existing entries.
  #[instrument(level = "trace", skip(dir, channel))]
  pub fn open(dir: impl AsRef<Path>, channel: Arc<dyn Channel>) -> Result<Self, EventLogError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(EVENTS_FILENAME);
    let mut log = Self::new(channel);
    if path.exists() {
      let inner = log.inner.get_mut().map_err(|_| EventLogError::Poisoned)?;
      for line in BufReader::new(File::open(&path)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
          continue;
        }
        let event: Event = serde_json::from_str(&line)?;
        inner.last_micros = inner.last_micros.max(micros_of(&event.id));
        inner.entries.insert(event.id, event.data);
      }
      debug!(path = %path.display(), entries = inner.entries.len(), "event log loaded");
    }
    log.path = Some(path);
    Ok(log)
  }

  /// Stores `data` under a new, strictly increasing id and publishes it.
  pub fn append(&self, data: serde_json::Value) -> Result<String, EventLogError> {
    let event = {
      let mut inner = self.inner.lock().map_err(|_| EventLogError::Poisoned)?;
      let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
      let micros = now.max(inner.last_micros + 1);
      inner.last_micros = micros;
      let id = format!("{micros:016x}{:016x}", rand::random::<u64>());
      let event = Event { id, data };
      if let Some(path) = &self.path {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(&event)?)?;
      }
      inner.entries.insert(event.id.clone(), event.data.clone());
      event
    };
    self.channel.publish(&event)?;
    Ok(event.id)
  }

  pub fn len(&self) -> usize {
    self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, id: &str) -> Option<serde_json::Value> {
    self.inner.lock().ok()?.entries.get(id).cloned()
  }

  /// Stored entries newer than `last_id` (all when `None`), in id order.
  pub fn since(&self, last_id: Option<&str>) -> Result<Vec<Event>, EventLogError> {
    let lower = match last_id {
      Some(id) => Bound::Excluded(id.to_string()),
      None => Bound::Unbounded,
    };
    let inner = self.inner.lock().map_err(|_| EventLogError::Poisoned)?;
    Ok(
      inner
        .entries
        .range((lower, Bound::Unbounded))
        .map(|(id, data)| Event {
          id: id.clone(),
          data: data.clone(),
        })
        .collect(),
    )
  }

  /// Replays entries newer than `last_id` (all when `None`), then tails live appends.
  pub fn subscribe(&self, last_id: Option<&str>) -> EventStream {
    // Subscribe before the scan so nothing appended in between is lost.
    let mut live = self.channel.subscribe();
    let backlog = self.since(last_id);
    let mut cursor = last_id.unwrap_or_default().to_string();
    Box::pin(stream! {
      let backlog = match backlog {
        Ok(backlog) => backlog,
        Err(e) => {
          yield Err(e);
          return;
        }
      };
      for event in backlog {
        cursor = event.id.clone();
        yield Ok(event);
      }
      while let Some(item) = live.next().await {
        match item {
          Ok(event) if event.id <= cursor => continue,
          Ok(event) => {
            cursor = event.id.clone();
            yield Ok(event);
          }
          Err(e) => yield Err(e),
        }
      }
    })
  }
}

fn micros_of(id: &str) -> u64 {
  id.get(..16)
    .and_then(|hex| u64::from_str_radix(hex, 16).ok())
    .unwrap_or(0)
}
