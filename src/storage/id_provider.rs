use crate::error::IdError;
use crate::graph::Inputs;
use uuid::Uuid;

/// Mints the id that namespaces everything stored for one entity.
pub trait IdProvider: Send + Sync {
  fn new_id(&self, inputs: &Inputs) -> Result<String, IdError>;
}

/// Random v4 uuid in 32-char hex form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
  fn new_id(&self, _inputs: &Inputs) -> Result<String, IdError> {
    Ok(Uuid::new_v4().simple().to_string())
  }
}

/// Uses the string value of a named input as the id.
#[derive(Debug, Clone)]
pub struct UserSpecifiedIdProvider {
  key: String,
}

impl UserSpecifiedIdProvider {
  pub fn new(key: impl Into<String>) -> Self {
    Self { key: key.into() }
  }
}

impl IdProvider for UserSpecifiedIdProvider {
  fn new_id(&self, inputs: &Inputs) -> Result<String, IdError> {
    let value = inputs
      .get(&self.key)
      .ok_or_else(|| IdError::MissingField(self.key.clone()))?;
    if let Some(id) = value.downcast_ref::<String>() {
      return Ok(id.clone());
    }
    value
      .downcast_ref::<&'static str>()
      .map(|id| id.to_string())
      .ok_or_else(|| IdError::UnsupportedValue(self.key.clone()))
  }
}
