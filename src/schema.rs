//! # Schemas and entities
//!
//! A [Schema] is a named, validated set of features describing one entity
//! type. [Schema::process] ingests a new entity: it mints an id, compiles the
//! full graph, prunes unconsumed branches and drives it with the caller's
//! root inputs. [Entity::get] reads one feature back, decoding it from
//! storage when persisted and otherwise recomputing it from the nearest
//! persisted ancestors.

use crate::compiler;
use crate::error::{FlowError, Result, SchemaError, StorageError};
use crate::feature::Feature;
use crate::graph::Inputs;
use crate::node::Payload;
use crate::persistence::Persistence;
use crate::storage::StoredStream;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Collects feature declarations for a [Schema].
pub struct SchemaBuilder {
  name: String,
  persistence: Persistence,
  features: Vec<(String, Feature)>,
}

impl SchemaBuilder {
  pub fn new(name: impl Into<String>, persistence: Persistence) -> Self {
    Self {
      name: name.into(),
      persistence,
      features: Vec::new(),
    }
  }

  /// Declares `feature` under `key`.
  pub fn feature(mut self, key: impl Into<String>, feature: Feature) -> Self {
    let key = key.into();
    self.features.push((key.clone(), feature.with_key(key)));
    self
  }

  /// Validates the declarations.
  ///
  /// # Errors
  ///
  /// [SchemaError::Empty], [SchemaError::DuplicateFeature],
  /// [SchemaError::InvalidFeatureKey] (the key builder could not decompose
  /// its keys), [SchemaError::UnknownDependency] or [SchemaError::Cycle].
  pub fn build(self) -> std::result::Result<Schema, SchemaError> {
    if self.features.is_empty() {
      return Err(SchemaError::Empty(self.name));
    }
    let mut features = BTreeMap::new();
    for (key, feature) in self.features {
      if features.contains_key(&key) {
        return Err(SchemaError::DuplicateFeature(key));
      }
      if let Err(e) = self.persistence.key_builder.validate_feature_key(&key) {
        return Err(SchemaError::InvalidFeatureKey {
          feature: key,
          reason: e.to_string(),
        });
      }
      features.insert(key, feature);
    }
    for feature in features.values() {
      if let Some(missing) = feature
        .dependencies()
        .iter()
        .find(|dep| !features.contains_key(dep.as_str()))
      {
        return Err(SchemaError::UnknownDependency {
          feature: feature.key().to_string(),
          needs: missing.clone(),
        });
      }
    }
    check_acyclic(&features)?;
    debug!(schema = %self.name, features = features.len(), "schema built");
    Ok(Schema {
      name: self.name,
      persistence: self.persistence,
      features,
    })
  }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
  Visiting,
  Done,
}

fn check_acyclic(features: &BTreeMap<String, Feature>) -> std::result::Result<(), SchemaError> {
  fn visit<'a>(
    key: &'a str,
    features: &'a BTreeMap<String, Feature>,
    marks: &mut HashMap<&'a str, Mark>,
  ) -> std::result::Result<(), SchemaError> {
    match marks.get(key) {
      Some(Mark::Done) => return Ok(()),
      Some(Mark::Visiting) => return Err(SchemaError::Cycle(key.to_string())),
      None => {}
    }
    marks.insert(key, Mark::Visiting);
    if let Some(feature) = features.get(key) {
      for dep in feature.dependencies() {
        visit(dep, features, marks)?;
      }
    }
    marks.insert(key, Mark::Done);
    Ok(())
  }

  let mut marks = HashMap::new();
  for key in features.keys() {
    visit(key, features, &mut marks)?;
  }
  Ok(())
}

/// A validated, immutable set of features.
pub struct Schema {
  name: String,
  persistence: Persistence,
  features: BTreeMap<String, Feature>,
}

impl Schema {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn persistence(&self) -> &Persistence {
    &self.persistence
  }

  pub fn features(&self) -> &BTreeMap<String, Feature> {
    &self.features
  }

  pub fn feature(&self, key: &str) -> Option<&Feature> {
    self.features.get(key)
  }

  /// Keys of features with no dependencies, sorted.
  pub fn roots(&self) -> Vec<&str> {
    self
      .features
      .values()
      .filter(|f| f.is_root())
      .map(Feature::key)
      .collect()
  }

  /// Ingests a new entity and returns its id.
  ///
  /// `inputs` must hold a value for every root feature; extra keys (such as
  /// an id field) are ignored by the graph.
  #[instrument(level = "trace", skip(self, inputs), fields(schema = %self.name))]
  pub fn process(&self, inputs: Inputs) -> Result<String> {
    let id = self.persistence.id_provider.new_id(&inputs)?;
    let mut graph = compiler::build_graph(&self.name, &self.features, &self.persistence, &id)?;
    let pruned = graph.remove_dead_nodes(self.features.values());
    graph.process(inputs)?;
    info!(schema = %self.name, entity = %id, pruned = pruned.len(), "entity processed");
    Ok(id)
  }

  /// Ingests `value` as the input of the schema's only root.
  ///
  /// # Errors
  ///
  /// [SchemaError::NoRoot] or [SchemaError::MultipleRoots] unless exactly one
  /// feature has no dependencies.
  pub fn ingest(&self, value: impl Any + Send + Sync) -> Result<String> {
    let roots = self.roots();
    match roots.as_slice() {
      [root] => self.process(Inputs::new().with(*root, value)),
      [] => Err(SchemaError::NoRoot(self.name.clone()).into()),
      _ => Err(
        SchemaError::MultipleRoots {
          schema: self.name.clone(),
          roots: roots.iter().map(|r| r.to_string()).collect(),
        }
        .into(),
      ),
    }
  }

  /// Handle for reading the features of entity `id`.
  pub fn entity(&self, id: impl Into<String>) -> Entity<'_> {
    Entity {
      schema: self,
      id: id.into(),
      memo: HashMap::new(),
    }
  }

  /// Every entity with at least one stored feature.
  pub fn entities(&self) -> Result<impl Iterator<Item = Entity<'_>> + '_> {
    let ids = self
      .persistence
      .database
      .iter_ids(Arc::clone(&self.persistence.key_builder))?;
    Ok(ids.map(move |id| self.entity(id)))
  }
}

/// One entity of a schema. Reads are memoised per handle.
pub struct Entity<'s> {
  schema: &'s Schema,
  id: String,
  memo: HashMap<String, Payload>,
}

impl Entity<'_> {
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Whether `key` has a persisted value for this entity.
  pub fn is_stored(&self, key: &str) -> Result<bool> {
    let feature = self.lookup(key)?;
    Ok(feature.is_stored(&self.id, &self.schema.persistence)?)
  }

  /// Reads feature `key` as `T`.
  ///
  /// # Errors
  ///
  /// [FlowError::TypeMismatch] if the decoded value is not a `T`, plus
  /// everything [Entity::get_any] returns.
  pub fn get<T: Any + Send + Sync>(&mut self, key: &str) -> Result<Arc<T>> {
    self
      .get_any(key)?
      .downcast::<T>()
      .map_err(|_| FlowError::TypeMismatch {
        feature: key.to_string(),
      })
  }

  /// Reads feature `key` as its decoded payload.
  ///
  /// # Errors
  ///
  /// [FlowError::FeatureUnavailable] when the feature is neither stored nor
  /// derivable from stored ancestors; storage, codec and graph failures
  /// otherwise.
  #[instrument(level = "trace", skip(self), fields(entity = %self.id))]
  pub fn get_any(&mut self, key: &str) -> Result<Payload> {
    if let Some(value) = self.memo.get(key) {
      return Ok(Arc::clone(value));
    }
    let value = self.read(key)?;
    self.memo.insert(key.to_string(), Arc::clone(&value));
    Ok(value)
  }

  fn lookup(&self, key: &str) -> Result<&'_ Feature> {
    self
      .schema
      .features
      .get(key)
      .ok_or_else(|| FlowError::UnknownFeature(key.to_string()))
  }

  fn read(&self, key: &str) -> Result<Payload> {
    let schema = self.schema;
    let persistence = &schema.persistence;
    let feature = self.lookup(key)?;

    if feature.stores() && feature.is_stored(&self.id, persistence)? {
      let source = persistence
        .database
        .read_stream(&persistence.key(&self.id, key))?;
      return Ok(feature.decoder_ref().decode(source)?);
    }
    if !feature.can_compute(&schema.features) {
      return Err(FlowError::unavailable(
        key,
        "not stored and not derivable from stored features",
      ));
    }

    let mut partial =
      compiler::partial(&schema.name, &schema.features, persistence, &self.id, key)?;
    let mut inputs = Inputs::new();
    for source in &partial.sources {
      let reader = persistence
        .database
        .read_stream(&persistence.key(&self.id, source))?;
      inputs.insert(source.clone(), crate::node::payload(StoredStream::new(reader)));
    }
    partial.graph.process(inputs)?;
    debug!(feature = %key, entity = %self.id, sources = ?partial.sources, "recomputed");

    let bytes = std::mem::take(
      &mut *partial
        .capture
        .lock()
        .map_err(|_| StorageError::Poisoned)?,
    );
    Ok(feature.decoder_ref().decode(Box::new(Cursor::new(bytes)))?)
  }
}
