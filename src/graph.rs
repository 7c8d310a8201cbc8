//! # Graph - cooperative streaming driver
//!
//! A [Graph] owns every node compiled for one entity run. Nodes live in an
//! arena and refer to each other by [NodeId]; `needs` is fixed when a node is
//! added and `listeners` only grows while the graph is being built.
//!
//! ## Execution model
//!
//! Single-threaded and push-based:
//!
//! 1. Every root gets a driver holding its caller-supplied input.
//! 2. Drivers are advanced round-robin, one output chunk per step, so nodes
//!    with several roots upstream receive balanced input.
//! 3. Each chunk is pushed synchronously and depth-first to every listener.
//!    A listener that cannot run yet (`NotEnoughData`) simply returns; it is
//!    retried on its next enqueue.
//! 4. When a root runs dry, or a node has seen data and completion from every
//!    upstream, its tail (`last_chunk`) is flushed, listeners are told it is
//!    finalized, and a terminal sentinel is pushed exactly once.
//!
//! Every node is acquired before the run and released on every exit path.

use crate::error::{ExtractorError, GraphError, NotEnoughData};
use crate::feature::Feature;
use crate::node::{Cache, Chunks, Extractor, NodeId, Payload};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Named values fed to the roots of a graph.
#[derive(Default, Clone)]
pub struct Inputs {
  values: HashMap<String, Payload>,
}

impl Inputs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds an input value for root `key`.
  pub fn with(mut self, key: impl Into<String>, value: impl Any + Send + Sync) -> Self {
    self.values.insert(key.into(), Arc::new(value));
    self
  }

  /// Adds an already-wrapped payload for root `key`.
  pub fn insert(&mut self, key: impl Into<String>, value: Payload) {
    self.values.insert(key.into(), value);
  }

  pub fn get(&self, key: &str) -> Option<&Payload> {
    self.values.get(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.values.contains_key(key)
  }

  pub fn remove(&mut self, key: &str) -> Option<Payload> {
    self.values.remove(key)
  }

  /// Input keys, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.values.keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

struct Node {
  key: String,
  extractor: Box<dyn Extractor>,
  cache: Cache,
  needs: Vec<NodeId>,
  dependency_count: usize,
  listeners: Vec<NodeId>,
  finalized_dependencies: HashSet<NodeId>,
  enqueued_dependencies: HashSet<NodeId>,
  pruned: bool,
  completed: bool,
  acquired: bool,
}

impl Node {
  /// True once every upstream has sent at least one batch and signalled completion.
  fn is_finalized(&self) -> bool {
    self.finalized_dependencies.len() >= self.dependency_count
      && self.enqueued_dependencies.len() >= self.dependency_count
  }

  fn fail(&self, source: ExtractorError) -> GraphError {
    GraphError::extractor(&self.key, source)
  }
}

enum DriverState {
  Pending(Payload),
  Streaming(Chunks),
  Exhausted,
}

/// Steps one root through its input, one output chunk at a time.
struct RootDriver {
  node: NodeId,
  state: DriverState,
}

/// A compiled, single-use dataflow graph.
pub struct Graph {
  name: String,
  nodes: Vec<Node>,
  keys: BTreeMap<String, NodeId>,
}

impl Graph {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      nodes: Vec::new(),
      keys: BTreeMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Number of nodes, pruned ones included.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Adds a node wired to `needs`, registering it as a listener of each.
  ///
  /// # Errors
  ///
  /// [GraphError::DuplicateNode] if `key` is taken, [GraphError::UnknownNode]
  /// if an upstream id does not belong to this graph.
  pub fn add_node(
    &mut self,
    key: impl Into<String>,
    extractor: Box<dyn Extractor>,
    needs: &[NodeId],
  ) -> Result<NodeId, GraphError> {
    let key = key.into();
    if self.keys.contains_key(&key) {
      return Err(GraphError::DuplicateNode(key));
    }
    if let Some(unknown) = needs.iter().find(|n| n.0 >= self.nodes.len()) {
      return Err(GraphError::UnknownNode(unknown.to_string()));
    }

    let id = NodeId(self.nodes.len());
    for upstream in needs {
      self.nodes[upstream.0].listeners.push(id);
    }
    let dependency_count = needs.iter().collect::<HashSet<_>>().len();
    self.nodes.push(Node {
      key: key.clone(),
      extractor,
      cache: Cache::default(),
      needs: needs.to_vec(),
      dependency_count,
      listeners: Vec::new(),
      finalized_dependencies: HashSet::new(),
      enqueued_dependencies: HashSet::new(),
      pruned: false,
      completed: false,
      acquired: false,
    });
    self.keys.insert(key, id);
    Ok(id)
  }

  pub fn node_id(&self, key: &str) -> Option<NodeId> {
    self.keys.get(key).copied()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.keys.contains_key(key)
  }

  fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
    self
      .nodes
      .get(id.0)
      .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
  }

  /// # Errors
  ///
  /// [GraphError::UnknownNode] for an id minted by another graph; the same
  /// holds for every accessor below.
  pub fn key(&self, id: NodeId) -> Result<&str, GraphError> {
    Ok(&self.node(id)?.key)
  }

  pub fn needs(&self, id: NodeId) -> Result<&[NodeId], GraphError> {
    Ok(&self.node(id)?.needs)
  }

  pub fn listeners(&self, id: NodeId) -> Result<&[NodeId], GraphError> {
    Ok(&self.node(id)?.listeners)
  }

  pub fn is_root(&self, id: NodeId) -> Result<bool, GraphError> {
    Ok(self.node(id)?.needs.is_empty())
  }

  pub fn is_leaf(&self, id: NodeId) -> Result<bool, GraphError> {
    Ok(self.node(id)?.listeners.is_empty())
  }

  pub fn is_pruned(&self, id: NodeId) -> Result<bool, GraphError> {
    Ok(self.node(id)?.pruned)
  }

  /// Nodes with no upstream, keyed by name. Pruned roots are included: they
  /// are never driven, but their input is still required.
  pub fn roots(&self) -> BTreeMap<&str, NodeId> {
    self.select(|node| node.needs.is_empty())
  }

  /// Nodes with no listeners, keyed by name.
  pub fn leaves(&self) -> BTreeMap<&str, NodeId> {
    self.select(|node| node.listeners.is_empty())
  }

  fn select(&self, predicate: impl Fn(&Node) -> bool) -> BTreeMap<&str, NodeId> {
    self
      .keys
      .iter()
      .filter(|(_, id)| predicate(&self.nodes[id.0]))
      .map(|(key, id)| (key.as_str(), *id))
      .collect()
  }

  /// Unlinks a node from the listener lists of its upstream nodes.
  pub fn disconnect(&mut self, id: NodeId) -> Result<(), GraphError> {
    let needs = self.node(id)?.needs.clone();
    for upstream in needs {
      self.nodes[upstream.0].listeners.retain(|l| *l != id);
    }
    Ok(())
  }

  /// Prunes unstored features whose nodes feed nothing.
  ///
  /// Repeats until no node changes, so whole unconsumed branches go. Pruned
  /// nodes stay in the graph but are never acquired or run. Returns the
  /// pruned keys in pruning order.
  #[instrument(level = "trace", skip(self, features), fields(graph = %self.name))]
  pub fn remove_dead_nodes<'a>(
    &mut self,
    features: impl IntoIterator<Item = &'a Feature>,
  ) -> Vec<String> {
    let candidates: Vec<(String, bool)> = features
      .into_iter()
      .map(|f| (f.key().to_string(), f.stores()))
      .collect();
    let mut pruned = Vec::new();
    loop {
      let mut changed = false;
      for (key, stores) in &candidates {
        let Some(id) = self.node_id(key) else {
          continue;
        };
        let node = &self.nodes[id.0];
        if *stores || node.pruned || !node.listeners.is_empty() {
          continue;
        }
        for upstream in node.needs.clone() {
          self.nodes[upstream.0].listeners.retain(|l| *l != id);
        }
        self.nodes[id.0].pruned = true;
        debug!(feature = %key, "pruned dead node");
        pruned.push(key.clone());
        changed = true;
      }
      if !changed {
        return pruned;
      }
    }
  }

  /// Drives the graph to completion with `inputs` for its roots.
  ///
  /// # Errors
  ///
  /// [GraphError::MissingRootInputs] before anything runs if a root has no
  /// input; otherwise the first extractor failure. Resources are released on
  /// every path.
  #[instrument(level = "trace", skip(self, inputs), fields(graph = %self.name))]
  pub fn process(&mut self, mut inputs: Inputs) -> Result<(), GraphError> {
    let roots: Vec<(String, NodeId)> = self
      .roots()
      .into_iter()
      .map(|(key, id)| (key.to_string(), id))
      .collect();
    if roots.iter().any(|(key, _)| !inputs.contains(key)) {
      return Err(GraphError::MissingRootInputs {
        required: roots.into_iter().map(|(key, _)| key).collect(),
        provided: inputs.keys(),
      });
    }

    let mut drivers: Vec<RootDriver> = roots
      .into_iter()
      .filter(|(_, node)| !self.nodes[node.0].pruned)
      .filter_map(|(key, node)| {
        inputs.remove(&key).map(|data| RootDriver {
          node,
          state: DriverState::Pending(data),
        })
      })
      .collect();

    let mut scope = RunScope::acquire(self)?;
    scope.graph.drive(&mut drivers)?;
    scope.finish()
  }

  /// Advances every root driver in turn until all are exhausted.
  fn drive(&mut self, drivers: &mut [RootDriver]) -> Result<(), GraphError> {
    let mut rounds = 0usize;
    loop {
      let mut advanced = false;
      for driver in drivers.iter_mut() {
        advanced |= self.step(driver)?;
      }
      if !advanced {
        trace!(graph = %self.name, rounds, "all roots exhausted");
        return Ok(());
      }
      rounds += 1;
    }
  }

  fn step(&mut self, driver: &mut RootDriver) -> Result<bool, GraphError> {
    let id = driver.node;
    match std::mem::replace(&mut driver.state, DriverState::Exhausted) {
      DriverState::Pending(data) => {
        let node = &mut self.nodes[id.0];
        node.extractor.enqueue(&mut node.cache, data, 0);
        match self.dequeue_and_transform(id)? {
          Some(chunks) => driver.state = DriverState::Streaming(chunks),
          None => self.complete(id)?,
        }
        Ok(true)
      }
      DriverState::Streaming(mut chunks) => {
        match chunks.next() {
          Some(chunk) => {
            let chunk = chunk.map_err(|e| self.nodes[id.0].fail(e))?;
            self.push(id, Some(&chunk))?;
            driver.state = DriverState::Streaming(chunks);
          }
          None => self.complete(id)?,
        }
        Ok(true)
      }
      DriverState::Exhausted => Ok(false),
    }
  }

  fn dequeue_and_transform(&mut self, id: NodeId) -> Result<Option<Chunks>, GraphError> {
    let node = &mut self.nodes[id.0];
    let finalized = node.is_finalized();
    match node.extractor.dequeue(&mut node.cache, finalized) {
      Ok(data) => node.extractor.transform(data).map(Some).map_err(|e| node.fail(e)),
      Err(NotEnoughData) => {
        trace!(node = %node.key, "not enough data");
        Ok(None)
      }
    }
  }

  /// Handles one delivery from `source`: a data chunk, or the terminal sentinel.
  fn process_node(
    &mut self,
    id: NodeId,
    data: Option<&Payload>,
    source: NodeId,
  ) -> Result<(), GraphError> {
    let node = &mut self.nodes[id.0];
    if node.pruned || node.completed {
      return Ok(());
    }
    if let Some(data) = data {
      let input = node.needs.iter().position(|n| *n == source).unwrap_or(0);
      node.enqueued_dependencies.insert(source);
      node.extractor.enqueue(&mut node.cache, data.clone(), input);
    }

    if let Some(chunks) = self.dequeue_and_transform(id)? {
      for chunk in chunks {
        let chunk = chunk.map_err(|e| self.nodes[id.0].fail(e))?;
        self.push(id, Some(&chunk))?;
      }
    }

    if self.nodes[id.0].is_finalized() {
      self.complete(id)?;
    }
    Ok(())
  }

  /// Delivers `chunk` (or the sentinel, when `None`) to every listener of `id`.
  fn push(&mut self, id: NodeId, chunk: Option<&Payload>) -> Result<(), GraphError> {
    for i in 0..self.nodes[id.0].listeners.len() {
      let listener = self.nodes[id.0].listeners[i];
      self.process_node(listener, chunk, id)?;
    }
    Ok(())
  }

  /// Flushes the tail, finalizes listeners and sends the sentinel. Runs once per node.
  fn complete(&mut self, id: NodeId) -> Result<(), GraphError> {
    let node = &mut self.nodes[id.0];
    if node.completed {
      return Ok(());
    }
    node.completed = true;
    let tail = node.extractor.last_chunk().map_err(|e| node.fail(e))?;
    for chunk in tail {
      let chunk = chunk.map_err(|e| self.nodes[id.0].fail(e))?;
      self.push(id, Some(&chunk))?;
    }

    let listeners = self.nodes[id.0].listeners.clone();
    for listener in &listeners {
      self.nodes[listener.0].finalized_dependencies.insert(id);
    }
    trace!(node = %self.nodes[id.0].key, "finalized");
    self.push(id, None)
  }

  fn release_all(&mut self) -> Result<(), GraphError> {
    let mut first_error = None;
    for node in self.nodes.iter_mut().filter(|n| n.acquired) {
      node.acquired = false;
      if let Err(e) = node.extractor.release() {
        warn!(node = %node.key, error = %e, "release failed");
        first_error.get_or_insert(GraphError::extractor(&node.key, e));
      }
    }
    first_error.map_or(Ok(()), Err)
  }
}

/// Holds every live node acquired for one run; releases them when dropped.
struct RunScope<'g> {
  graph: &'g mut Graph,
  released: bool,
}

impl<'g> RunScope<'g> {
  fn acquire(graph: &'g mut Graph) -> Result<Self, GraphError> {
    let mut scope = RunScope {
      graph,
      released: false,
    };
    for node in scope.graph.nodes.iter_mut().filter(|n| !n.pruned) {
      node.extractor.acquire().map_err(|e| node.fail(e))?;
      node.acquired = true;
    }
    Ok(scope)
  }

  fn finish(mut self) -> Result<(), GraphError> {
    self.released = true;
    self.graph.release_all()
  }
}

impl Drop for RunScope<'_> {
  fn drop(&mut self) {
    if !self.released {
      let _ = self.graph.release_all();
    }
  }
}
