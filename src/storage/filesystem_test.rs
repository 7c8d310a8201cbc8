//! Tests for `FileSystemDatabase`.

use super::{Database, FileSystemDatabase, StringDelimitedKeyBuilder};
use crate::error::StorageError;
use std::io::{Read, Write};
use std::sync::Arc;

#[test]
fn commit_makes_file_visible() {
  let dir = tempfile::tempdir().unwrap();
  let db = FileSystemDatabase::open(dir.path().join("db")).unwrap();
  let mut w = db.write_stream("e1:stream", "application/octet-stream").unwrap();
  w.write_all(b"mary had").unwrap();
  assert!(!db.contains("e1:stream").unwrap());
  assert!(db.keys().unwrap().is_empty());
  w.commit().unwrap();

  assert!(db.contains("e1:stream").unwrap());
  let mut out = String::new();
  db.read_stream("e1:stream")
    .unwrap()
    .read_to_string(&mut out)
    .unwrap();
  assert_eq!(out, "mary had");
}

#[test]
fn abandoned_write_leaves_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let db = FileSystemDatabase::open(dir.path()).unwrap();
  {
    let mut w = db.write_stream("e1:stream", "x").unwrap();
    w.write_all(b"partial").unwrap();
  }
  assert!(db.keys().unwrap().is_empty());
  assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_file_is_not_found() {
  let dir = tempfile::tempdir().unwrap();
  let db = FileSystemDatabase::open(dir.path()).unwrap();
  assert!(matches!(
    db.read_stream("x:y"),
    Err(StorageError::NotFound(_))
  ));
}

#[test]
fn path_like_keys_are_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let db = FileSystemDatabase::open(dir.path()).unwrap();
  assert!(matches!(
    db.write_stream("../escape", "x"),
    Err(StorageError::MalformedKey(_))
  ));
  assert!(db.contains("a/b").is_err());
}

#[test]
fn reopen_sees_previous_writes() {
  let dir = tempfile::tempdir().unwrap();
  {
    let db = FileSystemDatabase::open(dir.path()).unwrap();
    for key in ["b:count", "a:stream", "a:count"] {
      db.write_stream(key, "x").unwrap().commit().unwrap();
    }
  }
  let db = FileSystemDatabase::open(dir.path()).unwrap();
  assert_eq!(db.keys().unwrap(), vec!["a:count", "a:stream", "b:count"]);
  let ids: Vec<String> = db
    .iter_ids(Arc::new(StringDelimitedKeyBuilder::default()))
    .unwrap()
    .collect();
  assert_eq!(ids, vec!["a", "b"]);
}
