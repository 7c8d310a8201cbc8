use crate::error::StorageError;

/// Composes entity ids and feature keys into storage keys and back.
///
/// `decompose(build(id, feature)) == (id, feature)` must hold.
pub trait KeyBuilder: Send + Sync {
  fn build(&self, id: &str, feature: &str) -> String;
  fn decompose(&self, key: &str) -> Result<(String, String), StorageError>;

  /// Rejects feature keys that would break the round trip above.
  fn validate_feature_key(&self, feature: &str) -> Result<(), StorageError> {
    let _ = feature;
    Ok(())
  }
}

/// Joins id and feature key with a separator.
///
/// Splits at the last separator, so ids may contain it but feature keys may not.
#[derive(Debug, Clone)]
pub struct StringDelimitedKeyBuilder {
  separator: String,
}

impl StringDelimitedKeyBuilder {
  pub fn new(separator: impl Into<String>) -> Self {
    Self {
      separator: separator.into(),
    }
  }

  pub fn separator(&self) -> &str {
    &self.separator
  }
}

impl Default for StringDelimitedKeyBuilder {
  fn default() -> Self {
    Self::new(":")
  }
}

impl KeyBuilder for StringDelimitedKeyBuilder {
  fn build(&self, id: &str, feature: &str) -> String {
    format!("{id}{}{feature}", self.separator)
  }

  fn decompose(&self, key: &str) -> Result<(String, String), StorageError> {
    key
      .rsplit_once(self.separator.as_str())
      .map(|(id, feature)| (id.to_string(), feature.to_string()))
      .ok_or_else(|| StorageError::MalformedKey(key.to_string()))
  }

  fn validate_feature_key(&self, feature: &str) -> Result<(), StorageError> {
    if feature.is_empty() || feature.contains(self.separator.as_str()) {
      return Err(StorageError::MalformedKey(format!(
        "feature key '{feature}' is empty or contains the separator '{}'",
        self.separator
      )));
    }
    Ok(())
  }
}
