//! Declarative feature definitions.
//!
//! A [Feature] names an extractor, the features it needs, whether its output
//! is stored and how it is encoded and decoded. Features are immutable once a
//! schema is built and are shared by every entity of that schema.

use crate::codec::{
  ArrayDecoder, ArrayEncoder, Decoder, Element, Encoder, EncoderFactory, IdentityEncoder,
  JsonDecoder, JsonEncoder, RawDecoder, TextDecoder, TextEncoder,
};
use crate::error::StorageError;
use crate::node::{Extractor, ExtractorFactory};
use crate::persistence::Persistence;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One named, declarative computation.
#[derive(Clone)]
pub struct Feature {
  key: String,
  extractor: ExtractorFactory,
  needs: Vec<String>,
  store: bool,
  encoder: EncoderFactory,
  content_type: String,
  decoder: Arc<dyn Decoder>,
}

impl Feature {
  /// A feature computed by extractors built from `factory`.
  ///
  /// Unstored, with no dependencies and raw byte encoding until configured.
  pub fn new<E, F>(factory: F) -> Self
  where
    E: Extractor + 'static,
    F: Fn() -> E + Send + Sync + 'static,
  {
    Self {
      key: String::new(),
      extractor: Arc::new(move || Box::new(factory()) as Box<dyn Extractor>),
      needs: Vec::new(),
      store: false,
      encoder: Arc::new(|| Box::new(IdentityEncoder) as Box<dyn Encoder>),
      content_type: IdentityEncoder.content_type().to_string(),
      decoder: Arc::new(RawDecoder::default()),
    }
  }

  /// Upstream features, in the order the extractor sees them as inputs.
  pub fn needs<I, S>(mut self, needs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.needs = needs.into_iter().map(Into::into).collect();
    self
  }

  pub fn store(mut self, store: bool) -> Self {
    self.store = store;
    self
  }

  /// Custom encoder.
  pub fn encoder<C, F>(mut self, factory: F) -> Self
  where
    C: Encoder + 'static,
    F: Fn() -> C + Send + Sync + 'static,
  {
    self.content_type = factory().content_type().to_string();
    self.encoder = Arc::new(move || Box::new(factory()) as Box<dyn Encoder>);
    self
  }

  /// Custom decoder.
  pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
    self.decoder = Arc::new(decoder);
    self
  }

  /// JSON-encoded `T`.
  pub fn json<T>(self) -> Self
  where
    T: Serialize + DeserializeOwned + Any + Send + Sync,
  {
    self
      .encoder(JsonEncoder::<T>::new)
      .decoder(JsonDecoder::<T>::new())
  }

  /// UTF-8 text.
  pub fn text(self) -> Self {
    self.encoder(|| TextEncoder).decoder(TextDecoder)
  }

  /// `ndarray` arrays of `T`, streamed along the first axis and read back as
  /// `ArrayD<T>`.
  pub fn array<T: Element>(self) -> Self {
    self
      .encoder(ArrayEncoder::<T>::new)
      .decoder(ArrayDecoder::<T>::new())
  }

  pub(crate) fn with_key(mut self, key: impl Into<String>) -> Self {
    self.key = key.into();
    self
  }

  /// Name assigned by the schema.
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn dependencies(&self) -> &[String] {
    &self.needs
  }

  pub fn stores(&self) -> bool {
    self.store
  }

  pub fn is_root(&self) -> bool {
    self.needs.is_empty()
  }

  pub fn content_type(&self) -> &str {
    &self.content_type
  }

  pub fn decoder_ref(&self) -> &Arc<dyn Decoder> {
    &self.decoder
  }

  pub(crate) fn build_extractor(&self) -> Box<dyn Extractor> {
    (self.extractor)()
  }

  pub(crate) fn build_encoder(&self) -> Box<dyn Encoder> {
    (self.encoder)()
  }

  /// Whether this feature can be derived from what is persisted.
  ///
  /// Stored features can; unstored roots cannot; anything else can iff every
  /// upstream can.
  pub fn can_compute(&self, features: &BTreeMap<String, Feature>) -> bool {
    if self.store {
      return true;
    }
    if self.needs.is_empty() {
      return false;
    }
    self.needs.iter().all(|key| {
      features
        .get(key)
        .is_some_and(|upstream| upstream.can_compute(features))
    })
  }

  /// Whether `id` has a persisted value for this feature.
  pub fn is_stored(&self, id: &str, persistence: &Persistence) -> Result<bool, StorageError> {
    persistence.database.contains(&persistence.key(id, &self.key))
  }
}

impl fmt::Debug for Feature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Feature")
      .field("key", &self.key)
      .field("needs", &self.needs)
      .field("store", &self.store)
      .field("content_type", &self.content_type)
      .finish_non_exhaustive()
  }
}
