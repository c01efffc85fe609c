// Test module organization
pub mod test_codec;

use crate::error::{AllocFailure, MarshalResult};
use crate::guest::{Allocator, GuestHeap, MemoryAccessor};
use crate::types::{TypeDefinition, TypeRegistry};
use ahash::AHashMap;

pub const STR: &str = "~lib/string/String";
pub const MAP_STR_I32: &str = "~lib/map/Map<~lib/string/String,i32>";
pub const MAP_STR_STR: &str = "~lib/map/Map<~lib/string/String,~lib/string/String>";
pub const MAP_I32_I32: &str = "~lib/map/Map<i32,i32>";
pub const MAP_I32_STR: &str = "~lib/map/Map<i32,~lib/string/String>";
pub const MAP_I64_F64: &str = "~lib/map/Map<i64,f64>";
pub const MAP_U64_U8: &str = "~lib/map/Map<u64,u8>";
pub const MAP_BOOL_BOOL: &str = "~lib/map/Map<bool,bool>";
pub const MAP_U8_I32: &str = "~lib/map/Map<u8,i32>";
pub const MAP_F32_I16: &str = "~lib/map/Map<f32,i16>";
pub const MAP_STR_NSTR: &str = "~lib/map/Map<~lib/string/String,~lib/string/String | null>";
pub const MAP_STR_MAP: &str =
    "~lib/map/Map<~lib/string/String,~lib/map/Map<~lib/string/String,i32>>";
pub const MAP_STR_PERSON: &str = "~lib/map/Map<~lib/string/String,assembly/models/Person>";
pub const MAP_POINT_I32: &str = "~lib/map/Map<assembly/models/Point,i32>";
pub const MAP_STR_I64: &str = "~lib/map/Map<~lib/string/String,i64>";
pub const POINT: &str = "assembly/models/Point";
pub const PERSON: &str = "assembly/models/Person";

/// Type metadata of a small guest module
pub fn registry() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types
        .register_map(MAP_STR_I32, 5)
        .register_map(MAP_STR_STR, 6)
        .register_map(MAP_I32_I32, 7)
        .register_map(MAP_I32_STR, 8)
        .register_map(MAP_I64_F64, 9)
        .register_map(MAP_U64_U8, 10)
        .register_map(MAP_BOOL_BOOL, 11)
        .register_map(MAP_U8_I32, 12)
        .register_map(MAP_F32_I16, 13)
        .register_map(MAP_STR_NSTR, 14)
        .register_map(MAP_STR_MAP, 15)
        .register_map(MAP_STR_PERSON, 16)
        .register_map(MAP_POINT_I32, 17)
        .register_map(MAP_STR_I64, 18)
        .register_class(
            TypeDefinition::new(20, POINT, 8)
                .with_field("x", "i32", 0)
                .with_field("y", "i32", 4),
        )
        .register_class(
            TypeDefinition::new(21, PERSON, 16)
                .with_field("name", STR, 0)
                .with_field("age", "i32", 4)
                .with_field("score", "f64", 8),
        );
    types
}

/// Guest wrapper that injects failures into an underlying heap.
pub struct FaultyGuest<'a> {
    pub heap: &'a mut GuestHeap,
    /// Reads touching any of these addresses fail
    pub fail_reads: Vec<u32>,
    /// Writes into objects of this runtime type fail
    pub fail_writes_to_type: Option<u32>,
    /// Number of allocations allowed before the allocator gives up
    pub alloc_budget: Option<usize>,
    pub fail_unpin: bool,
    objects: AHashMap<u32, (u32, u32)>,
}

impl<'a> FaultyGuest<'a> {
    pub fn new(heap: &'a mut GuestHeap) -> Self {
        Self {
            heap,
            fail_reads: Vec::new(),
            fail_writes_to_type: None,
            alloc_budget: None,
            fail_unpin: false,
            objects: AHashMap::new(),
        }
    }

    fn write_blocked(&self, addr: u32, len: u32) -> bool {
        let Some(type_id) = self.fail_writes_to_type else {
            return false;
        };
        self.objects
            .iter()
            .any(|(&ptr, &(size, id))| id == type_id && addr < ptr + size && ptr < addr + len)
    }
}

impl MemoryAccessor for FaultyGuest<'_> {
    fn read_bytes(&self, addr: u32, len: u32) -> Option<Vec<u8>> {
        if self
            .fail_reads
            .iter()
            .any(|&bad| bad >= addr && bad < addr + len.max(1))
        {
            return None;
        }
        self.heap.read_bytes(addr, len)
    }

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> bool {
        if self.write_blocked(addr, bytes.len() as u32) {
            return false;
        }
        self.heap.write_bytes(addr, bytes)
    }

    fn read_u32_le(&self, addr: u32) -> Option<u32> {
        let bytes = self.read_bytes(addr, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Allocator for FaultyGuest<'_> {
    fn allocate(&mut self, size: u32, type_id: u32) -> MarshalResult<u32> {
        if let Some(budget) = self.alloc_budget.as_mut() {
            if *budget == 0 {
                return Err(AllocFailure::Exhausted { size, type_id }.into());
            }
            *budget -= 1;
        }
        let ptr = self.heap.allocate(size, type_id)?;
        self.objects.insert(ptr, (size, type_id));
        Ok(ptr)
    }

    fn pin(&mut self, ptr: u32) -> MarshalResult<()> {
        self.heap.pin(ptr)
    }

    fn unpin(&mut self, ptr: u32) -> MarshalResult<()> {
        if self.fail_unpin {
            return Err(AllocFailure::NotPinned(ptr).into());
        }
        self.heap.unpin(ptr)
    }
}
