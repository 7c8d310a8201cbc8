//! Compiles feature declarations into per-entity graphs.
//!
//! The full build wires every feature, appending an encoder and a storage
//! sink after each stored one. The partial build recomputes a single feature
//! and stops at the nearest persisted ancestor on every path, replaying that
//! ancestor from storage instead of recomputing it.

use crate::error::{FlowError, GraphError};
use crate::feature::Feature;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::nodes::{CaptureSink, DataWriter, DecoderSource, EncoderNode};
use crate::persistence::Persistence;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Graph key of the encoder appended after `feature`.
pub fn encoder_key(feature: &str) -> String {
  format!("{feature}/encoder")
}

/// Graph key of the storage sink appended after `feature`'s encoder.
pub fn writer_key(feature: &str) -> String {
  format!("{feature}/writer")
}

/// Graph key of the in-memory sink of a partial graph.
pub fn capture_key(feature: &str) -> String {
  format!("{feature}/capture")
}

/// A recomputation graph for one feature.
pub struct PartialGraph {
  pub graph: Graph,
  /// Encoded output of the target, filled while the graph runs.
  pub capture: Arc<Mutex<Vec<u8>>>,
  /// Persisted ancestors replayed from storage; these are the graph's roots.
  pub sources: Vec<String>,
}

struct Build<'a> {
  features: &'a BTreeMap<String, Feature>,
  persistence: &'a Persistence,
  id: &'a str,
  graph: Graph,
  memo: HashMap<String, NodeId>,
}

impl<'a> Build<'a> {
  fn new(
    name: String,
    features: &'a BTreeMap<String, Feature>,
    persistence: &'a Persistence,
    id: &'a str,
  ) -> Self {
    Self {
      features,
      persistence,
      id,
      graph: Graph::new(name),
      memo: HashMap::new(),
    }
  }

  fn feature(&self, key: &str) -> Result<&'a Feature, FlowError> {
    self
      .features
      .get(key)
      .ok_or_else(|| FlowError::UnknownFeature(key.to_string()))
  }

  /// Full build of `feature` and its dependency closure. Returns the
  /// feature's own extractor node, not its sink.
  fn build_extractor(&mut self, feature: &'a Feature) -> Result<NodeId, FlowError> {
    if let Some(id) = self.memo.get(feature.key()) {
      return Ok(*id);
    }
    let mut needs = Vec::with_capacity(feature.dependencies().len());
    for key in feature.dependencies() {
      let upstream = self.feature(key)?;
      needs.push(self.build_extractor(upstream)?);
    }
    let node = self
      .graph
      .add_node(feature.key(), feature.build_extractor(), &needs)?;
    self.memo.insert(feature.key().to_string(), node);

    if feature.stores() {
      self.append_writer(feature, node)?;
    }
    Ok(node)
  }

  fn append_writer(&mut self, feature: &Feature, node: NodeId) -> Result<(), GraphError> {
    let encoder = self.graph.add_node(
      encoder_key(feature.key()),
      Box::new(EncoderNode::new(feature.build_encoder())),
      &[node],
    )?;
    let writer = DataWriter::new(
      Arc::clone(&self.persistence.database),
      self.persistence.key(self.id, feature.key()),
      self.id,
      feature.key(),
      feature.content_type(),
    )
    .with_event_log(self.persistence.event_log.clone());
    self
      .graph
      .add_node(writer_key(feature.key()), Box::new(writer), &[encoder])?;
    Ok(())
  }

  /// Partial build: persisted ancestors become decoding roots.
  fn partial_extractor(
    &mut self,
    feature: &'a Feature,
    target: bool,
    sources: &mut Vec<String>,
  ) -> Result<NodeId, FlowError> {
    if let Some(id) = self.memo.get(feature.key()) {
      return Ok(*id);
    }
    let node = if !target && feature.is_stored(self.id, self.persistence)? {
      debug!(feature = %feature.key(), entity = %self.id, "replaying stored ancestor");
      sources.push(feature.key().to_string());
      self.graph.add_node(
        feature.key(),
        Box::new(DecoderSource::new(Arc::clone(feature.decoder_ref()))),
        &[],
      )?
    } else {
      if feature.is_root() {
        return Err(FlowError::unavailable(
          feature.key(),
          format!("root '{}' is not stored for entity {}", feature.key(), self.id),
        ));
      }
      let mut needs = Vec::with_capacity(feature.dependencies().len());
      for key in feature.dependencies() {
        let upstream = self.feature(key)?;
        needs.push(self.partial_extractor(upstream, false, sources)?);
      }
      self
        .graph
        .add_node(feature.key(), feature.build_extractor(), &needs)?
    };
    self.memo.insert(feature.key().to_string(), node);
    Ok(node)
  }
}

/// Compiles every feature for entity `id` into one graph.
#[instrument(level = "trace", skip(features, persistence))]
pub fn build_graph(
  schema: &str,
  features: &BTreeMap<String, Feature>,
  persistence: &Persistence,
  id: &str,
) -> Result<Graph, FlowError> {
  let mut build = Build::new(format!("{schema}:{id}"), features, persistence, id);
  for feature in features.values() {
    build.build_extractor(feature)?;
  }
  info!(
    schema = %schema,
    entity = %id,
    nodes = build.graph.len(),
    roots = build.graph.roots().len(),
    "compiled full graph"
  );
  Ok(build.graph)
}

/// Compiles the minimal graph that recomputes `target` for entity `id`.
///
/// # Errors
///
/// [FlowError::FeatureUnavailable] when some path reaches a root with no
/// stored value, since a read has no caller inputs to feed it.
#[instrument(level = "trace", skip(features, persistence))]
pub fn partial(
  schema: &str,
  features: &BTreeMap<String, Feature>,
  persistence: &Persistence,
  id: &str,
  target: &str,
) -> Result<PartialGraph, FlowError> {
  let mut build = Build::new(format!("{schema}:{id}:{target}"), features, persistence, id);
  let feature = build.feature(target)?;
  let mut sources = Vec::new();
  let node = build.partial_extractor(feature, true, &mut sources)?;

  let encoder = build.graph.add_node(
    encoder_key(target),
    Box::new(EncoderNode::new(feature.build_encoder())),
    &[node],
  )?;
  let sink = CaptureSink::new();
  let capture = sink.buffer();
  build
    .graph
    .add_node(capture_key(target), Box::new(sink), &[encoder])?;

  info!(
    schema = %schema,
    entity = %id,
    feature = %target,
    nodes = build.graph.len(),
    sources = sources.len(),
    "compiled partial graph"
  );
  Ok(PartialGraph {
    graph: build.graph,
    capture,
    sources,
  })
}
