// Guest instance access: linear memory and the guest-side allocator
mod heap;
mod pin;

pub use heap::{GuestHeap, OBJECT_HEADER_SIZE, PAGE_SIZE};
pub use pin::PinScope;

use crate::error::MarshalResult;

/// Raw little-endian access to a guest's linear memory.
///
/// A `None`/`false` result means the range is out of bounds or unmapped.
pub trait MemoryAccessor {
    fn read_bytes(&self, addr: u32, len: u32) -> Option<Vec<u8>>;

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> bool;

    fn read_u32_le(&self, addr: u32) -> Option<u32> {
        let bytes = self.read_bytes(addr, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn write_u32_le(&mut self, addr: u32, value: u32) -> bool {
        self.write_bytes(addr, &value.to_le_bytes())
    }
}

/// Guest-side allocation and GC pinning.
pub trait Allocator {
    /// Allocate a managed object of `size` payload bytes tagged with the
    /// runtime type `type_id`. Returns the payload offset.
    fn allocate(&mut self, size: u32, type_id: u32) -> MarshalResult<u32>;

    /// Protect an object from collection until `unpin`.
    fn pin(&mut self, ptr: u32) -> MarshalResult<()>;

    fn unpin(&mut self, ptr: u32) -> MarshalResult<()>;
}

/// A guest instance: memory and allocator together.
pub trait Guest: MemoryAccessor + Allocator {
    fn as_memory(&self) -> &dyn MemoryAccessor;

    fn as_memory_mut(&mut self) -> &mut dyn MemoryAccessor;
}

impl<T: MemoryAccessor + Allocator> Guest for T {
    fn as_memory(&self) -> &dyn MemoryAccessor {
        self
    }

    fn as_memory_mut(&mut self) -> &mut dyn MemoryAccessor {
        self
    }
}
