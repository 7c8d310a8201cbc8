//! Tests for the array codec.

use super::{ArrayDecoder, ArrayEncoder, Decoder, Encoder, Source};
use crate::error::CodecError;
use crate::node::{Payload, payload};
use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};
use proptest::prelude::*;
use std::io::Cursor;

fn encode_all(enc: &mut dyn Encoder, chunks: &[Payload]) -> Vec<u8> {
  let mut out = Vec::new();
  for chunk in chunks {
    for b in enc.encode(chunk).unwrap() {
      out.extend_from_slice(&b);
    }
  }
  for b in enc.finish().unwrap() {
    out.extend_from_slice(&b);
  }
  out
}

fn decode<T: super::Element>(bytes: Vec<u8>) -> Result<ArrayD<T>, CodecError> {
  let source: Source = Box::new(Cursor::new(bytes));
  let value = ArrayDecoder::<T>::new().decode(source)?;
  Ok(value.downcast_ref::<ArrayD<T>>().unwrap().clone())
}

#[test]
fn header_then_row_major_elements() {
  let array = Array2::from_shape_vec((2, 3), vec![1u16, 2, 3, 4, 5, 6]).unwrap();
  let bytes = encode_all(&mut ArrayEncoder::<u16>::new(), &[payload(array.clone())]);
  let len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
  let header: serde_json::Value = serde_json::from_slice(&bytes[4..4 + len]).unwrap();
  assert_eq!(header, serde_json::json!({ "dtype": "<u2", "shape": [3] }));
  assert_eq!(&bytes[4 + len..4 + len + 2], &[1, 0]);
  assert_eq!(bytes.len(), 4 + len + 12);
  assert_eq!(decode::<u16>(bytes).unwrap(), array.into_dyn());
}

#[test]
fn chunks_are_appended_along_the_first_axis() {
  let first = Array2::from_shape_vec((1, 2), vec![0.5f32, 1.5]).unwrap();
  let second = Array2::from_shape_vec((2, 2), vec![2.5f32, 3.5, 4.5, 5.5]).unwrap();
  let bytes = encode_all(
    &mut ArrayEncoder::<f32>::new(),
    &[payload(first), payload(second)],
  );
  let decoded = decode::<f32>(bytes).unwrap();
  assert_eq!(decoded.shape(), &[3, 2]);
  assert_eq!(decoded[[2, 1]], 5.5);
}

#[test]
fn empty_and_one_dimensional_arrays() {
  let empty = Array1::<u8>::from_vec(Vec::new());
  let bytes = encode_all(&mut ArrayEncoder::<u8>::new(), &[payload(empty)]);
  assert_eq!(decode::<u8>(bytes).unwrap().shape(), &[0]);

  let line = Array1::from_vec((0..33).map(|i| i as f32).collect());
  let bytes = encode_all(&mut ArrayEncoder::<f32>::new(), &[payload(line.clone())]);
  assert_eq!(decode::<f32>(bytes).unwrap(), line.into_dyn());
}

#[test]
fn mismatched_chunks_and_types_are_rejected() {
  let mut enc = ArrayEncoder::<i32>::new();
  enc
    .encode(&payload(Array2::<i32>::zeros((1, 3))))
    .unwrap();
  assert!(matches!(
    enc.encode(&payload(Array2::<i32>::zeros((1, 4)))),
    Err(CodecError::MalformedArray(_))
  ));
  assert!(matches!(
    enc.encode(&payload(vec![1u8])),
    Err(CodecError::UnsupportedChunk { .. })
  ));
  assert!(matches!(
    ArrayEncoder::<i32>::new().encode(&payload(ArrayD::<i32>::zeros(IxDyn(&[])))),
    Err(CodecError::MalformedArray(_))
  ));

  let bytes = encode_all(
    &mut ArrayEncoder::<i32>::new(),
    &[payload(Array1::from_vec(vec![1i32, 2]))],
  );
  assert!(matches!(
    decode::<f32>(bytes.clone()),
    Err(CodecError::DtypeMismatch { expected: "<f4", .. })
  ));
  let truncated = bytes[..bytes.len() - 1].to_vec();
  assert!(matches!(
    decode::<i32>(truncated),
    Err(CodecError::MalformedArray(_))
  ));
}

fn arrays() -> impl Strategy<Value = ArrayD<i64>> {
  (0usize..6, prop::collection::vec(1usize..4, 0..3)).prop_flat_map(|(rows, trailing)| {
    let mut shape = vec![rows];
    shape.extend(trailing);
    let len = shape.iter().product::<usize>();
    prop::collection::vec(any::<i64>(), len)
      .prop_map(move |data| ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap())
  })
}

proptest! {
  #[test]
  fn array_round_trip(array in arrays(), split in 0usize..6) {
    let at = split.min(array.len_of(Axis(0)));
    let (head, tail) = array.view().split_at(Axis(0), at);
    let bytes = encode_all(
      &mut ArrayEncoder::<i64>::new(),
      &[
        payload(ArrayD::from_shape_vec(head.raw_dim(), head.iter().copied().collect()).unwrap()),
        payload(ArrayD::from_shape_vec(tail.raw_dim(), tail.iter().copied().collect()).unwrap()),
      ],
    );
    prop_assert_eq!(decode::<i64>(bytes).unwrap(), array);
  }

  #[test]
  fn float_round_trip(data in prop::collection::vec(-1.0e9f64..1.0e9, 0..40)) {
    let array = Array1::from_vec(data).into_dyn();
    let bytes = encode_all(&mut ArrayEncoder::<f64>::new(), &[payload(array.clone())]);
    prop_assert_eq!(decode::<f64>(bytes).unwrap(), array);
  }
}
