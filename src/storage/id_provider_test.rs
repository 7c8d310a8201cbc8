//! Tests for id providers.

use super::{IdProvider, UserSpecifiedIdProvider, UuidProvider};
use crate::error::IdError;
use crate::graph::Inputs;

#[test]
fn uuid_ids_are_hex_and_unique() {
  let p = UuidProvider;
  let a = p.new_id(&Inputs::new()).unwrap();
  let b = p.new_id(&Inputs::new()).unwrap();
  assert_eq!(a.len(), 32);
  assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  assert_ne!(a, b);
}

#[test]
fn user_specified_reads_named_input() {
  let p = UserSpecifiedIdProvider::new("name");
  let inputs = Inputs::new().with("name", "doc-1".to_string());
  assert_eq!(p.new_id(&inputs).unwrap(), "doc-1");
  let inputs = Inputs::new().with("name", "doc-2");
  assert_eq!(p.new_id(&inputs).unwrap(), "doc-2");
}

#[test]
fn user_specified_missing_or_non_string() {
  let p = UserSpecifiedIdProvider::new("name");
  assert!(matches!(
    p.new_id(&Inputs::new()),
    Err(IdError::MissingField(k)) if k == "name"
  ));
  let inputs = Inputs::new().with("name", 7u32);
  assert!(matches!(
    p.new_id(&inputs),
    Err(IdError::UnsupportedValue(_))
  ));
}
