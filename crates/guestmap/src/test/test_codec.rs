// Tests for the type-directed field codec
use super::*;
use crate::codec::{FieldCodec, GuestCodec, encode_scalar};
use crate::error::{ErrorKind, MarshalError};
use crate::guest::{Allocator, GuestHeap, MemoryAccessor};
use crate::hash::XxHash32;
use crate::types::{STRING_ID, ScalarKind};
use crate::value::Value;
use smol_str::SmolStr;

#[test]
fn test_decode_scalars() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let at = heap.allocate(16, 1).unwrap();
    assert!(heap.write_bytes(at, &[0xFF; 8]));

    let read = |ty: &str| codec.read_field(&heap, ty, at).unwrap();
    assert_eq!(read("i8"), Value::Int(-1));
    assert_eq!(read("i16"), Value::Int(-1));
    assert_eq!(read("i32"), Value::Int(-1));
    assert_eq!(read("i64"), Value::Int(-1));
    assert_eq!(read("u8"), Value::UInt(0xFF));
    assert_eq!(read("u16"), Value::UInt(0xFFFF));
    assert_eq!(read("u32"), Value::UInt(u32::MAX as u64));
    assert_eq!(read("u64"), Value::UInt(u64::MAX));
    assert_eq!(read("bool"), Value::Bool(true));
}

#[test]
fn test_encode_scalar_ranges() {
    assert_eq!(encode_scalar(ScalarKind::I8, &Value::Int(-128)), Some((-128i64) as u64));
    assert_eq!(encode_scalar(ScalarKind::I8, &Value::Int(128)), None);
    assert_eq!(encode_scalar(ScalarKind::U8, &Value::Int(-1)), None);
    assert_eq!(encode_scalar(ScalarKind::U16, &Value::UInt(65535)), Some(65535));
    assert_eq!(encode_scalar(ScalarKind::I64, &Value::UInt(u64::MAX)), None);
    assert_eq!(encode_scalar(ScalarKind::U64, &Value::UInt(u64::MAX)), Some(u64::MAX));
    assert_eq!(encode_scalar(ScalarKind::I32, &Value::Float(1.0)), None);
    assert_eq!(encode_scalar(ScalarKind::Bool, &Value::Int(1)), None);
    assert_eq!(encode_scalar(ScalarKind::Bool, &Value::Bool(true)), Some(1));
    assert_eq!(
        encode_scalar(ScalarKind::F64, &Value::Int(3)),
        Some(3.0f64.to_bits())
    );
    assert_eq!(
        encode_scalar(ScalarKind::F32, &Value::Float(0.5)),
        Some(0.5f32.to_bits() as u64)
    );
}

#[test]
fn test_write_scalars_inline() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let at = heap.allocate(16, 1).unwrap();
    assert!(heap.write_bytes(at, &[0xAA; 16]));

    assert_eq!(codec.write_field(&mut heap, "i16", at, &Value::Int(-2)).unwrap(), 0);
    // only the scalar's own bytes change
    assert_eq!(heap.read_bytes(at, 4), Some(vec![0xFE, 0xFF, 0xAA, 0xAA]));
    assert_eq!(codec.read_field(&heap, "i16", at).unwrap(), Value::Int(-2));

    codec
        .write_field(&mut heap, "f32", at + 4, &Value::Float(-1.25))
        .unwrap();
    assert_eq!(codec.read_field(&heap, "f32", at + 4).unwrap(), Value::Float(-1.25));

    let err = codec
        .write_field(&mut heap, "u8", at, &Value::Int(256))
        .unwrap_err();
    assert_eq!(err, MarshalError::unsupported("u8", "int"));
}

#[test]
fn test_scalar_out_of_bounds() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let end = heap.memory_size();

    let err = codec.read_field(&heap, "i64", end - 4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryFault);
    assert_eq!(err.fault_field(), Some("scalar field"));

    let err = codec
        .write_field(&mut heap, "i32", end, &Value::Int(1))
        .unwrap_err();
    assert_eq!(
        err,
        MarshalError::MemoryFault {
            field: "scalar field",
            address: end,
            write: true
        }
    );
}

#[test]
fn test_string_field() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let slot = heap.allocate(4, 1).unwrap();

    let ptr = codec
        .write_field(&mut heap, STR, slot, &Value::from("héllo 😀"))
        .unwrap();
    assert_ne!(ptr, 0);
    assert_eq!(heap.read_u32_le(slot), Some(ptr));
    assert_eq!(heap.object_type_id(ptr), Some(STRING_ID));
    // 8 UTF-16 code units
    assert_eq!(heap.object_size(ptr), Some(16));
    assert_eq!(
        codec.read_field(&heap, STR, slot).unwrap(),
        Value::from("héllo 😀")
    );
}

#[test]
fn test_null_references() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let slot = heap.allocate(4, 1).unwrap();
    assert!(heap.write_u32_le(slot, 0xDEAD));

    let nullable_point = "assembly/models/Point | null";
    let ptr = codec
        .write_field(&mut heap, nullable_point, slot, &Value::Null)
        .unwrap();
    assert_eq!(ptr, 0);
    assert_eq!(heap.read_u32_le(slot), Some(0));
    assert_eq!(codec.read_field(&heap, nullable_point, slot).unwrap(), Value::Null);

    let err = codec
        .write_field(&mut heap, POINT, slot, &Value::Null)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedValue);
}

#[test]
fn test_object_field() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let slot = heap.allocate(4, 1).unwrap();
    let point = Value::Object(vec![
        (SmolStr::new("x"), Value::Int(-4)),
        (SmolStr::new("y"), Value::Int(9)),
    ]);

    let ptr = codec.write_field(&mut heap, POINT, slot, &point).unwrap();
    assert_eq!(heap.object_type_id(ptr), Some(20));
    assert_eq!(heap.object_size(ptr), Some(8));
    assert_eq!(heap.read_u32_le(ptr), Some((-4i32) as u32));
    assert_eq!(heap.read_u32_le(ptr + 4), Some(9));
    assert_eq!(codec.read_field(&heap, POINT, slot).unwrap(), point);
    assert_eq!(heap.pin_count(), 0);
}

#[test]
fn test_dangling_reference() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let mut heap = GuestHeap::default();
    let slot = heap.allocate(4, 1).unwrap();
    assert!(heap.write_u32_le(slot, heap.memory_size() + 64));

    let err = codec.read_field(&heap, STR, slot).unwrap_err();
    assert_eq!(err.fault_field(), Some("string length"));
}

#[test]
fn test_unknown_field_type() {
    let types = registry();
    let codec = GuestCodec::new(&types, &XxHash32);
    let heap = GuestHeap::default();

    let err = codec.read_field(&heap, "assembly/models/Nope", 1024).unwrap_err();
    assert!(matches!(err, MarshalError::TypeResolution { .. }));
    assert!(err.to_string().contains("assembly/models/Nope"));
}
