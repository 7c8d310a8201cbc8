//! # featureflow
//!
//! Declarative, incremental feature extraction. A schema names interdependent
//! features once; each entity ingested through it is compiled into a
//! streaming graph that runs as input chunks arrive and persists the stored
//! features.
//!
//! ## Architecture
//!
//! - [node]: the `Extractor` trait, the per-node streaming algorithm.
//! - [graph]: arena graph driving extractors with round-robin roots,
//!   backpressure and finalization.
//! - [feature] / [compiler]: declarations and their compilation into full
//!   or partial (recompute-from-storage) graphs.
//! - [schema]: `process` new entities, read features back through `Entity`.
//! - [codec], [storage], [event_log]: external collaborators.
//!
//! ```rust
//! use featureflow::nodes::{ByteStream, Tokenizer, WordCount};
//! use featureflow::{Feature, Persistence, SchemaBuilder};
//! use std::collections::BTreeMap;
//!
//! let schema = SchemaBuilder::new("document", Persistence::in_memory())
//!   .feature("stream", Feature::new(|| ByteStream::new(3)).store(true))
//!   .feature("words", Feature::new(Tokenizer::new).needs(["stream"]))
//!   .feature(
//!     "count",
//!     Feature::new(WordCount::aggregator)
//!       .needs(["words"])
//!       .store(true)
//!       .json::<BTreeMap<String, usize>>(),
//!   )
//!   .build()
//!   .unwrap();
//!
//! let id = schema.ingest("the cat and the hat").unwrap();
//! let count = schema
//!   .entity(id)
//!   .get::<BTreeMap<String, usize>>("count")
//!   .unwrap();
//! assert_eq!(count["the"], 2);
//! ```

pub mod codec;
pub mod compiler;
pub mod error;
pub mod event_log;
#[cfg(test)]
mod event_log_test;
pub mod feature;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod persistence;
pub mod schema;
#[cfg(test)]
mod schema_test;
pub mod storage;

pub use error::{FlowError, GraphError, Result, SchemaError};
pub use event_log::EventLog;
pub use feature::Feature;
pub use graph::{Graph, Inputs};
pub use node::{Aggregator, Extractor, NodeId, Payload};
pub use persistence::Persistence;
pub use schema::{Entity, Schema, SchemaBuilder};
