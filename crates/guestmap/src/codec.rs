//! Type-directed field codec.
//!
//! Reads and writes one value of a logical guest type at a memory offset.
//! Scalars are stored inline; strings, class instances and maps are managed
//! objects referenced by a 32-bit pointer, with `0` standing for null.

use crate::error::{MarshalError, MarshalResult};
use crate::guest::{Guest, MemoryAccessor, PinScope};
use crate::hash::{HashFn, encode_utf16};
use crate::map::{MapReader, MapWriter};
use crate::options::MarshalOptions;
use crate::types::{STRING_ID, ScalarKind, TypeKind, TypeResolver};
use crate::value::{HostMap, Value};
use smol_str::SmolStr;
use std::cell::Cell;

/// Generic scalar/object read-write at an offset.
pub trait FieldCodec {
    fn read_field(&self, mem: &dyn MemoryAccessor, ty: &str, addr: u32) -> MarshalResult<Value>;

    /// Write `value` at `addr`. Returns the pointer of a separate allocation
    /// made for it, or `0` when the value was stored inline.
    fn write_field(
        &self,
        guest: &mut dyn Guest,
        ty: &str,
        addr: u32,
        value: &Value,
    ) -> MarshalResult<u32>;
}

/// Codec for the full guest type vocabulary, and the entry point for map
/// conversion.
pub struct GuestCodec<'a> {
    types: &'a dyn TypeResolver,
    hasher: &'a dyn HashFn,
    options: MarshalOptions,
    depth: Cell<usize>,
}

impl<'a> GuestCodec<'a> {
    pub fn new(types: &'a dyn TypeResolver, hasher: &'a dyn HashFn) -> Self {
        Self::with_options(types, hasher, MarshalOptions::default())
    }

    pub fn with_options(
        types: &'a dyn TypeResolver,
        hasher: &'a dyn HashFn,
        options: MarshalOptions,
    ) -> Self {
        Self {
            types,
            hasher,
            options,
            depth: Cell::new(0),
        }
    }

    pub fn options(&self) -> &MarshalOptions {
        &self.options
    }

    /// Decode the guest map at `offset`
    pub fn read_map(
        &self,
        mem: &dyn MemoryAccessor,
        ty: &str,
        offset: u32,
    ) -> MarshalResult<HostMap> {
        let _depth = self.enter()?;
        MapReader::new(self.types, self)
            .with_max_entries(self.options.max_entries)
            .read(mem, ty, offset)
    }

    /// Build a guest map from `value`, returning the header offset
    pub fn write_map(&self, guest: &mut dyn Guest, ty: &str, value: &Value) -> MarshalResult<u32> {
        let _depth = self.enter()?;
        MapWriter::new(self.types, self, self.hasher).write(guest, ty, value)
    }

    fn enter(&self) -> MarshalResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.options.max_depth {
            return Err(MarshalError::LimitExceeded {
                limit: "nesting depth",
                value: depth as u64 + 1,
            });
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    fn read_string(&self, mem: &dyn MemoryAccessor, ty: &str, ptr: u32) -> MarshalResult<Value> {
        let length_addr = ptr.wrapping_sub(4);
        let len = mem
            .read_u32_le(length_addr)
            .ok_or(MarshalError::read_fault("string length", length_addr))?;
        if len % 2 != 0 {
            return Err(MarshalError::corrupt(ty, format!("odd UTF-16 byte length {len}")));
        }
        let bytes = mem
            .read_bytes(ptr, len)
            .ok_or(MarshalError::read_fault("string data", ptr))?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Value::String(String::from_utf16_lossy(&units)))
    }

    fn read_object(
        &self,
        mem: &dyn MemoryAccessor,
        name: &str,
        ptr: u32,
    ) -> MarshalResult<Value> {
        let _depth = self.enter()?;
        let def = self.types.type_definition(name)?;
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let value = self.read_field(mem, &field.ty, ptr.wrapping_add(field.offset))?;
            fields.push((field.name.clone(), value));
        }
        Ok(Value::Object(fields))
    }

    fn write_string(&self, guest: &mut dyn Guest, s: &str) -> MarshalResult<u32> {
        let bytes = encode_utf16(s);
        let ptr = guest.allocate(bytes.len() as u32, STRING_ID)?;
        if !guest.write_bytes(ptr, &bytes) {
            return Err(MarshalError::write_fault("string data", ptr));
        }
        Ok(ptr)
    }

    /// The new object stays pinned while its own fields allocate.
    fn write_object(
        &self,
        guest: &mut dyn Guest,
        name: &str,
        fields: &[(SmolStr, Value)],
    ) -> MarshalResult<u32> {
        let _depth = self.enter()?;
        let def = self.types.type_definition(name)?;
        let ptr = guest.allocate(def.size, def.id)?;
        PinScope::run(guest, 1, |scope, guest| {
            scope.pin(guest, ptr)?;
            // fields the host left out keep the allocator's zero fill
            for field in &def.fields {
                let Some((_, value)) = fields.iter().find(|(n, _)| *n == field.name) else {
                    continue;
                };
                self.write_field(guest, &field.ty, ptr + field.offset, value)?;
            }
            Ok(ptr)
        })
    }
}

impl FieldCodec for GuestCodec<'_> {
    fn read_field(&self, mem: &dyn MemoryAccessor, ty: &str, addr: u32) -> MarshalResult<Value> {
        match self.types.type_kind(ty)? {
            TypeKind::Scalar(scalar) => {
                let bytes = mem
                    .read_bytes(addr, scalar.size())
                    .ok_or(MarshalError::read_fault("scalar field", addr))?;
                Ok(decode_scalar(scalar, &bytes))
            }
            TypeKind::String { .. } => match read_pointer(mem, addr)? {
                Some(ptr) => self.read_string(mem, ty, ptr),
                None => Ok(Value::Null),
            },
            TypeKind::Map { .. } => match read_pointer(mem, addr)? {
                Some(ptr) => Ok(Value::Map(self.read_map(mem, ty, ptr)?)),
                None => Ok(Value::Null),
            },
            TypeKind::Class { name, .. } => match read_pointer(mem, addr)? {
                Some(ptr) => self.read_object(mem, &name, ptr),
                None => Ok(Value::Null),
            },
        }
    }

    fn write_field(
        &self,
        guest: &mut dyn Guest,
        ty: &str,
        addr: u32,
        value: &Value,
    ) -> MarshalResult<u32> {
        let kind = self.types.type_kind(ty)?;
        if let TypeKind::Scalar(scalar) = kind {
            let bits = encode_scalar(scalar, value)
                .ok_or(MarshalError::unsupported(ty, value.type_name()))?;
            let bytes = bits.to_le_bytes();
            if !guest.write_bytes(addr, &bytes[..scalar.size() as usize]) {
                return Err(MarshalError::write_fault("scalar field", addr));
            }
            return Ok(0);
        }

        let ptr = match (&kind, value) {
            (
                TypeKind::String { nullable: true }
                | TypeKind::Map { nullable: true, .. }
                | TypeKind::Class { nullable: true, .. },
                Value::Null,
            ) => 0,
            (TypeKind::String { .. }, Value::String(s)) => self.write_string(guest, s)?,
            (TypeKind::Map { .. }, Value::Map(_)) => self.write_map(guest, ty, value)?,
            (TypeKind::Class { name, .. }, Value::Object(fields)) => {
                self.write_object(guest, name, fields)?
            }
            _ => return Err(MarshalError::unsupported(ty, value.type_name())),
        };
        if !guest.write_u32_le(addr, ptr) {
            return Err(MarshalError::write_fault("reference field", addr));
        }
        Ok(ptr)
    }
}

/// Reference stored at `addr`, `None` for null
fn read_pointer(mem: &dyn MemoryAccessor, addr: u32) -> MarshalResult<Option<u32>> {
    let ptr = mem
        .read_u32_le(addr)
        .ok_or(MarshalError::read_fault("reference field", addr))?;
    Ok((ptr != 0).then_some(ptr))
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

fn decode_scalar(kind: ScalarKind, bytes: &[u8]) -> Value {
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    let bits = u64::from_le_bytes(raw);
    match kind {
        ScalarKind::Bool => Value::Bool(bits != 0),
        ScalarKind::I8 => Value::Int(bits as u8 as i8 as i64),
        ScalarKind::I16 => Value::Int(bits as u16 as i16 as i64),
        ScalarKind::I32 | ScalarKind::Isize => Value::Int(bits as u32 as i32 as i64),
        ScalarKind::I64 => Value::Int(bits as i64),
        ScalarKind::U8 | ScalarKind::U16 | ScalarKind::U32 | ScalarKind::Usize | ScalarKind::U64 => {
            Value::UInt(bits)
        }
        ScalarKind::F32 => Value::Float(f32::from_bits(bits as u32) as f64),
        ScalarKind::F64 => Value::Float(f64::from_bits(bits)),
    }
}

fn int_range(kind: ScalarKind) -> (i128, i128) {
    match kind {
        ScalarKind::I8 => (i8::MIN as i128, i8::MAX as i128),
        ScalarKind::U8 => (0, u8::MAX as i128),
        ScalarKind::I16 => (i16::MIN as i128, i16::MAX as i128),
        ScalarKind::U16 => (0, u16::MAX as i128),
        ScalarKind::I32 | ScalarKind::Isize => (i32::MIN as i128, i32::MAX as i128),
        ScalarKind::U32 | ScalarKind::Usize => (0, u32::MAX as i128),
        ScalarKind::I64 => (i64::MIN as i128, i64::MAX as i128),
        _ => (0, u64::MAX as i128),
    }
}

/// Raw bits of a scalar as the guest stores it: signed values sign-extended,
/// floats as their bit pattern. `None` when `value` does not fit `kind`.
pub(crate) fn encode_scalar(kind: ScalarKind, value: &Value) -> Option<u64> {
    match kind {
        ScalarKind::Bool => match value {
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        },
        ScalarKind::F32 => float_of(value).map(|n| (n as f32).to_bits() as u64),
        ScalarKind::F64 => float_of(value).map(f64::to_bits),
        _ => {
            let n: i128 = match value {
                Value::Int(i) => *i as i128,
                Value::UInt(u) => *u as i128,
                _ => return None,
            };
            let (min, max) = int_range(kind);
            if n < min || n > max {
                return None;
            }
            Some(n as i64 as u64)
        }
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Float(n) => Some(*n),
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        _ => None,
    }
}
