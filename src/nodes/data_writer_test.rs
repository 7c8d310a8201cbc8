//! Tests for `DataWriter`.

use super::DataWriter;
use crate::event_log::EventLog;
use crate::node::{Extractor, payload};
use crate::storage::{Database, InMemoryDatabase};
use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;

fn writer(db: &InMemoryDatabase) -> DataWriter {
  DataWriter::new(Arc::new(db.clone()), "e1:count", "e1", "count", "application/json")
}

#[test]
fn commits_on_release_after_finishing() {
  let db = InMemoryDatabase::new();
  let mut w = writer(&db);
  assert_eq!(w.key(), "e1:count");
  w.acquire().unwrap();
  assert_eq!(w.transform(payload(Bytes::from_static(b"{\"a\":"))).unwrap().count(), 0);
  w.transform(payload(Bytes::from_static(b"1}"))).unwrap();
  w.last_chunk().unwrap();
  assert!(!db.contains("e1:count").unwrap());
  w.release().unwrap();

  let mut out = String::new();
  db.read_stream("e1:count").unwrap().read_to_string(&mut out).unwrap();
  assert_eq!(out, "{\"a\":1}");
  assert_eq!(
    db.content_type("e1:count").unwrap().as_deref(),
    Some("application/json")
  );
}

#[test]
fn unfinished_write_is_discarded() {
  let db = InMemoryDatabase::new();
  let mut w = writer(&db);
  w.acquire().unwrap();
  w.transform(payload(Bytes::from_static(b"partial"))).unwrap();
  w.release().unwrap();
  assert!(db.is_empty());
}

#[test]
fn release_without_acquire_is_a_no_op() {
  let db = InMemoryDatabase::new();
  let mut w = writer(&db);
  w.release().unwrap();
  assert!(w.transform(payload(Bytes::new())).is_err());
}

#[test]
fn commit_appends_event() {
  let db = InMemoryDatabase::new();
  let log = Arc::new(EventLog::in_memory());
  let mut w = writer(&db).with_event_log(Some(Arc::clone(&log)));
  w.acquire().unwrap();
  w.last_chunk().unwrap();
  w.release().unwrap();
  assert_eq!(log.len(), 1);
}
