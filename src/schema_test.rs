//! Tests for schema validation, ingestion and entity reads.

use crate::error::{FlowError, SchemaError};
use crate::event_log::EventLog;
use crate::feature::Feature;
use crate::graph::Inputs;
use crate::nodes::{ByteStream, Concatenate, Tokenizer, WordCount};
use crate::persistence::Persistence;
use crate::schema::SchemaBuilder;
use crate::storage::{StringDelimitedKeyBuilder, UserSpecifiedIdProvider};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

type Counts = BTreeMap<String, usize>;

fn text_schema(persistence: Persistence) -> crate::schema::Schema {
  SchemaBuilder::new("document", persistence)
    .feature("stream", Feature::new(|| ByteStream::new(3)).store(true))
    .feature("words", Feature::new(Tokenizer::new).needs(["stream"]))
    .feature(
      "count",
      Feature::new(WordCount::aggregator)
        .needs(["words"])
        .store(true)
        .json::<Counts>(),
    )
    .build()
    .unwrap()
}

#[test]
fn empty_schema_is_rejected() {
  let err = SchemaBuilder::new("empty", Persistence::in_memory())
    .build()
    .err()
    .unwrap();
  assert_eq!(err, SchemaError::Empty("empty".to_string()));
}

#[test]
fn duplicate_unknown_and_cyclic_declarations_are_rejected() {
  let dup = SchemaBuilder::new("s", Persistence::in_memory())
    .feature("a", Feature::new(ByteStream::default))
    .feature("a", Feature::new(ByteStream::default))
    .build()
    .err()
    .unwrap();
  assert_eq!(dup, SchemaError::DuplicateFeature("a".to_string()));

  let unknown = SchemaBuilder::new("s", Persistence::in_memory())
    .feature("a", Feature::new(Tokenizer::new).needs(["ghost"]))
    .build()
    .err()
    .unwrap();
  assert_eq!(
    unknown,
    SchemaError::UnknownDependency {
      feature: "a".to_string(),
      needs: "ghost".to_string()
    }
  );

  let cycle = SchemaBuilder::new("s", Persistence::in_memory())
    .feature("root", Feature::new(ByteStream::default))
    .feature("a", Feature::new(Tokenizer::new).needs(["root", "b"]))
    .feature("b", Feature::new(Tokenizer::new).needs(["a"]))
    .build()
    .err()
    .unwrap();
  assert!(matches!(cycle, SchemaError::Cycle(_)));
}

#[test]
fn feature_keys_holding_the_key_separator_are_rejected() {
  let err = SchemaBuilder::new("s", Persistence::in_memory())
    .feature("raw:stream", Feature::new(ByteStream::default).store(true))
    .build()
    .err()
    .unwrap();
  assert!(matches!(
    err,
    SchemaError::InvalidFeatureKey { ref feature, .. } if feature == "raw:stream"
  ));

  let persistence =
    Persistence::in_memory().with_key_builder(StringDelimitedKeyBuilder::new("/"));
  let schema = SchemaBuilder::new("s", persistence)
    .feature("raw:stream", Feature::new(ByteStream::default).store(true))
    .build()
    .unwrap();
  let id = schema.ingest("abc").unwrap();
  let ids: Vec<String> = schema
    .entities()
    .unwrap()
    .map(|e| e.id().to_string())
    .collect();
  assert_eq!(ids, vec![id]);
}

#[test]
fn ingest_requires_exactly_one_root() {
  let schema = SchemaBuilder::new("two", Persistence::in_memory())
    .feature("s1", Feature::new(ByteStream::default).store(true))
    .feature("s2", Feature::new(ByteStream::default).store(true))
    .feature(
      "cat",
      Feature::new(Concatenate::aggregator)
        .needs(["s1", "s2"])
        .store(true),
    )
    .build()
    .unwrap();
  assert_eq!(schema.roots(), vec!["s1", "s2"]);
  let err = schema.ingest("x").unwrap_err();
  assert!(matches!(
    err,
    FlowError::Schema(SchemaError::MultipleRoots { ref roots, .. }) if roots.len() == 2
  ));
}

#[test]
fn stored_features_read_back_and_memoize() {
  let schema = text_schema(Persistence::in_memory());
  let id = schema
    .ingest("humpty dumpty sat on a wall humpty dumpty had a great fall")
    .unwrap();
  let mut entity = schema.entity(id.clone());
  assert_eq!(entity.id(), id);
  assert!(entity.is_stored("count").unwrap());
  assert!(!entity.is_stored("words").unwrap());

  let first = entity.get::<Counts>("count").unwrap();
  let second = entity.get::<Counts>("count").unwrap();
  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(first["humpty"], 2);

  let stream = entity.get::<Bytes>("stream").unwrap();
  assert!(stream.starts_with(b"humpty dumpty"));
}

#[test]
fn unstored_feature_is_recomputed_from_storage() {
  let schema = SchemaBuilder::new("document", Persistence::in_memory())
    .feature("stream", Feature::new(|| ByteStream::new(3)).store(true))
    .feature("words", Feature::new(Tokenizer::new).needs(["stream"]))
    .feature(
      "count",
      Feature::new(WordCount::aggregator)
        .needs(["words"])
        .json::<Counts>(),
    )
    .build()
    .unwrap();
  let id = schema.ingest("a b A").unwrap();
  let mut entity = schema.entity(id);
  assert!(!entity.is_stored("count").unwrap());
  let counts = entity.get::<Counts>("count").unwrap();
  assert_eq!(counts.get("a"), Some(&2));
  assert_eq!(counts.get("b"), Some(&1));
}

#[test]
fn unstored_root_is_unavailable() {
  let schema = SchemaBuilder::new("document", Persistence::in_memory())
    .feature("stream", Feature::new(|| ByteStream::new(3)))
    .feature("words", Feature::new(Tokenizer::new).needs(["stream"]))
    .feature(
      "count",
      Feature::new(WordCount::aggregator)
        .needs(["words"])
        .store(true)
        .json::<Counts>(),
    )
    .build()
    .unwrap();
  let id = schema.ingest("x").unwrap();
  let mut entity = schema.entity(id);
  assert!(entity.get_any("stream").unwrap_err().is_unavailable());
  assert!(entity.get_any("words").unwrap_err().is_unavailable());
  assert!(entity.get_any("count").is_ok());
}

#[test]
fn wrong_type_and_unknown_feature() {
  let schema = text_schema(Persistence::in_memory());
  let id = schema.ingest("a").unwrap();
  let mut entity = schema.entity(id);
  assert!(matches!(
    entity.get::<String>("count"),
    Err(FlowError::TypeMismatch { .. })
  ));
  assert!(matches!(
    entity.get_any("nope"),
    Err(FlowError::UnknownFeature(_))
  ));
}

#[test]
fn user_specified_ids_and_entity_iteration() {
  let persistence = Persistence::in_memory().with_id_provider(UserSpecifiedIdProvider::new("name"));
  let schema = text_schema(persistence);
  for (name, text) in [("doc-b", "b b"), ("doc-a", "a")] {
    let id = schema
      .process(Inputs::new().with("stream", text).with("name", name))
      .unwrap();
    assert_eq!(id, name);
  }
  let ids: Vec<String> = schema
    .entities()
    .unwrap()
    .map(|e| e.id().to_string())
    .collect();
  assert_eq!(ids, vec!["doc-a", "doc-b"]);
}

#[test]
fn commits_are_announced_on_the_event_log() {
  let log = Arc::new(EventLog::in_memory());
  let schema = text_schema(Persistence::in_memory().with_event_log(Arc::clone(&log)));
  schema.ingest("one two").unwrap();
  assert_eq!(log.len(), 2);
}
