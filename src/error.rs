//! Error types for featureflow.
//!
//! Each concern gets its own enum; [FlowError] is what schema-level calls
//! (`process`, `ingest`, `Entity::get`) return.

use thiserror::Error;

/// Control signal raised by [crate::node::Extractor::dequeue] when a node does
/// not yet hold enough input to run its transform.
///
/// The graph driver consumes it and retries on the next enqueue; it never
/// escapes a public `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotEnoughData;

/// Failure inside a single extractor (transform, tail or resource hooks).
#[derive(Error, Debug)]
pub enum ExtractorError {
  #[error("unexpected payload: expected {expected}")]
  UnexpectedPayload { expected: &'static str },

  #[error("codec error: {0}")]
  Codec(#[from] CodecError),

  #[error("storage error: {0}")]
  Storage(#[from] StorageError),

  #[error("event log error: {0}")]
  EventLog(#[from] EventLogError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Failed(String),
}

impl ExtractorError {
  pub fn unexpected(expected: &'static str) -> Self {
    Self::UnexpectedPayload { expected }
  }
}

/// Encoding or decoding failure.
#[derive(Error, Debug)]
pub enum CodecError {
  #[error("cannot encode chunk: expected {expected}")]
  UnsupportedChunk { expected: &'static str },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid utf-8: {0}")]
  Utf8(#[from] std::string::FromUtf8Error),

  #[error("stored array has dtype {found}, expected {expected}")]
  DtypeMismatch {
    expected: &'static str,
    found: String,
  },

  #[error("malformed array: {0}")]
  MalformedArray(String),

  #[error("array shape error: {0}")]
  Shape(#[from] ndarray::ShapeError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Storage backend failure.
#[derive(Error, Debug)]
pub enum StorageError {
  #[error("key not found: {0}")]
  NotFound(String),

  #[error("malformed key: {0}")]
  MalformedKey(String),

  #[error("storage lock poisoned")]
  Poisoned,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Failure to mint an entity id.
#[derive(Error, Debug)]
pub enum IdError {
  #[error("input '{0}' required for the entity id was not supplied")]
  MissingField(String),

  #[error("input '{0}' cannot be used as an entity id (expected a string)")]
  UnsupportedValue(String),
}

/// Failure while building or driving a [crate::graph::Graph].
#[derive(Error, Debug)]
pub enum GraphError {
  #[error("the keys {provided:?} were provided, but the keys for the root extractors were {required:?}")]
  MissingRootInputs {
    required: Vec<String>,
    provided: Vec<String>,
  },

  #[error("node '{0}' already exists")]
  DuplicateNode(String),

  #[error("node {0} does not belong to this graph")]
  UnknownNode(String),

  #[error("node '{node}' failed: {source}")]
  Extractor {
    node: String,
    #[source]
    source: ExtractorError,
  },
}

impl GraphError {
  pub(crate) fn extractor(node: &str, source: ExtractorError) -> Self {
    Self::Extractor {
      node: node.to_string(),
      source,
    }
  }
}

/// A schema that cannot be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
  #[error("schema '{0}' declares no features")]
  Empty(String),

  #[error("schema '{0}' has no root feature")]
  NoRoot(String),

  #[error("schema '{schema}' has multiple root features {roots:?} where one was expected")]
  MultipleRoots { schema: String, roots: Vec<String> },

  #[error("feature '{0}' is declared twice")]
  DuplicateFeature(String),

  #[error("feature '{feature}' needs unknown feature '{needs}'")]
  UnknownDependency { feature: String, needs: String },

  #[error("feature '{0}' depends on itself")]
  Cycle(String),

  #[error("feature '{feature}' cannot be used as a storage key: {reason}")]
  InvalidFeatureKey { feature: String, reason: String },
}

/// Event log failure.
#[derive(Error, Debug)]
pub enum EventLogError {
  #[error("event log lock poisoned")]
  Poisoned,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),
}

/// Error returned by schema-level operations.
#[derive(Error, Debug)]
pub enum FlowError {
  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Id(#[from] IdError),

  #[error("feature '{feature}' is unavailable: {reason}")]
  FeatureUnavailable { feature: String, reason: String },

  #[error("unknown feature '{0}'")]
  UnknownFeature(String),

  #[error("feature '{feature}' decoded to a different type than requested")]
  TypeMismatch { feature: String },
}

impl FlowError {
  pub(crate) fn unavailable(feature: &str, reason: impl Into<String>) -> Self {
    Self::FeatureUnavailable {
      feature: feature.to_string(),
      reason: reason.into(),
    }
  }

  /// True when the error means "not yet derivable" rather than a failure.
  pub fn is_unavailable(&self) -> bool {
    matches!(self, Self::FeatureUnavailable { .. })
  }
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
