//! Runs the featureflow binary against a temporary data directory.

use std::path::Path;
use std::process::Command;

/// Runs the CLI with `--db <dir>`. Returns (stdout, stderr, success).
fn run(dir: &Path, args: &[&str]) -> (String, String, bool) {
  let out = Command::new(env!("CARGO_BIN_EXE_featureflow"))
    .arg("--db")
    .arg(dir)
    .args(args)
    .env_remove("FEATUREFLOW_DB")
    .env_remove("FEATUREFLOW_CHUNK_SIZE")
    .env_remove("FEATUREFLOW_REDIS")
    .output()
    .unwrap();
  (
    String::from_utf8_lossy(&out.stdout).into_owned(),
    String::from_utf8_lossy(&out.stderr).into_owned(),
    out.status.success(),
  )
}

#[test]
fn ingest_then_read_count() {
  let dir = tempfile::tempdir().unwrap();
  let (stdout, stderr, ok) = run(
    dir.path(),
    &["--chunk-size", "3", "ingest", "humpty dumpty sat on a wall humpty"],
  );
  assert!(ok, "ingest failed: {stderr}");
  let id = stdout.trim().to_string();
  assert_eq!(id.len(), 32);

  let (stdout, stderr, ok) = run(dir.path(), &["read", &id, "count"]);
  assert!(ok, "read failed: {stderr}");
  let counts: serde_json::Value = serde_json::from_str(&stdout).unwrap();
  assert_eq!(counts["humpty"], 2);
  assert_eq!(counts["wall"], 1);

  let (stdout, _, ok) = run(dir.path(), &["read", &id, "stream"]);
  assert!(ok);
  assert_eq!(stdout.trim_end(), "humpty dumpty sat on a wall humpty");
}

#[test]
fn user_id_listing_and_events() {
  let dir = tempfile::tempdir().unwrap();
  for (id, text) in [("doc-2", "b"), ("doc-1", "a")] {
    let (stdout, stderr, ok) = run(dir.path(), &["ingest", "--id", id, text]);
    assert!(ok, "ingest failed: {stderr}");
    assert_eq!(stdout.trim(), id);
  }
  let (stdout, _, ok) = run(dir.path(), &["ids"]);
  assert!(ok);
  assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["doc-1", "doc-2"]);

  let (stdout, _, ok) = run(dir.path(), &["events"]);
  assert!(ok);
  assert_eq!(stdout.lines().count(), 4);
  let first = stdout.lines().next().unwrap().split(' ').next().unwrap().to_string();
  let (stdout, _, ok) = run(dir.path(), &["events", "--after", &first]);
  assert!(ok);
  assert_eq!(stdout.lines().count(), 3);
}

#[test]
fn ingest_from_file() {
  let dir = tempfile::tempdir().unwrap();
  let doc = dir.path().join("doc.txt");
  std::fs::write(&doc, "one two two").unwrap();
  let (stdout, stderr, ok) = run(
    &dir.path().join("data"),
    &["ingest", "--file", doc.to_str().unwrap()],
  );
  assert!(ok, "ingest failed: {stderr}");
  let (stdout, _, ok) = run(&dir.path().join("data"), &["read", stdout.trim(), "count"]);
  assert!(ok);
  assert!(stdout.contains("\"two\": 2"));
}

#[test]
fn unknown_entity_fails() {
  let dir = tempfile::tempdir().unwrap();
  let (_, stderr, ok) = run(dir.path(), &["read", "missing", "count"]);
  assert!(!ok);
  assert!(stderr.contains("Error"));
}
