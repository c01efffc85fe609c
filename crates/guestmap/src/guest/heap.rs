// In-process guest instance: page-granular linear memory with a bump allocator
// that lays objects out the way the guest runtime does.
use super::{Allocator, MemoryAccessor};
use crate::error::{AllocFailure, MarshalResult};
use ahash::{AHashMap, AHashSet};

pub const PAGE_SIZE: u32 = 64 * 1024;

/// Bytes of runtime header in front of every managed object.
///
/// Layout relative to the payload pointer: `mmInfo` at -20, `gcInfo` at -16,
/// `gcInfo2` at -12, `rtId` at -8, `rtSize` at -4.
pub const OBJECT_HEADER_SIZE: u32 = 20;

const OBJECT_ALIGN: u32 = 16;
/// Low memory kept free so that no object sits at a small offset
const HEAP_BASE: u32 = 1024;

pub struct GuestHeap {
    memory: Vec<u8>,
    max_pages: u32,
    next: u32,
    /// Live objects: payload pointer -> payload size
    objects: AHashMap<u32, u32>,
    pinned: AHashSet<u32>,
    pin_calls: usize,
    unpin_calls: usize,
}

impl GuestHeap {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let initial_pages = initial_pages.clamp(1, max_pages.max(1));
        Self {
            memory: vec![0; (initial_pages * PAGE_SIZE) as usize],
            max_pages: max_pages.max(initial_pages),
            next: HEAP_BASE,
            objects: AHashMap::new(),
            pinned: AHashSet::new(),
            pin_calls: 0,
            unpin_calls: 0,
        }
    }

    #[inline]
    pub fn memory_size(&self) -> u32 {
        self.memory.len() as u32
    }

    pub fn page_count(&self) -> u32 {
        self.memory_size() / PAGE_SIZE
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_pinned(&self, ptr: u32) -> bool {
        self.pinned.contains(&ptr)
    }

    /// Objects currently pinned
    pub fn pin_count(&self) -> usize {
        self.pinned.len()
    }

    pub fn pinned(&self) -> impl Iterator<Item = u32> + '_ {
        self.pinned.iter().copied()
    }

    /// Total successful `pin` calls since creation
    pub fn pin_calls(&self) -> usize {
        self.pin_calls
    }

    pub fn unpin_calls(&self) -> usize {
        self.unpin_calls
    }

    /// Runtime type id from the object header
    pub fn object_type_id(&self, ptr: u32) -> Option<u32> {
        if !self.objects.contains_key(&ptr) {
            return None;
        }
        self.read_u32_le(ptr - 8)
    }

    /// Payload size from the object header
    pub fn object_size(&self, ptr: u32) -> Option<u32> {
        if !self.objects.contains_key(&ptr) {
            return None;
        }
        self.read_u32_le(ptr - 4)
    }

    fn grow_to(&mut self, end: u32) -> bool {
        if end as usize <= self.memory.len() {
            return true;
        }
        let pages = end.div_ceil(PAGE_SIZE);
        if pages > self.max_pages {
            return false;
        }
        self.memory.resize((pages * PAGE_SIZE) as usize, 0);
        true
    }

    fn range(&self, addr: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.memory.len()).then_some(start..end)
    }
}

impl Default for GuestHeap {
    fn default() -> Self {
        Self::new(1, 256)
    }
}

impl MemoryAccessor for GuestHeap {
    fn read_bytes(&self, addr: u32, len: u32) -> Option<Vec<u8>> {
        let range = self.range(addr, len)?;
        Some(self.memory[range].to_vec())
    }

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> bool {
        match self.range(addr, bytes.len() as u32) {
            Some(range) => {
                self.memory[range].copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    fn read_u32_le(&self, addr: u32) -> Option<u32> {
        let range = self.range(addr, 4)?;
        let bytes: [u8; 4] = self.memory[range].try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

impl Allocator for GuestHeap {
    fn allocate(&mut self, size: u32, type_id: u32) -> MarshalResult<u32> {
        let exhausted = AllocFailure::Exhausted { size, type_id };
        let ptr = self
            .next
            .checked_add(OBJECT_HEADER_SIZE + OBJECT_ALIGN - 1)
            .map(|p| p & !(OBJECT_ALIGN - 1))
            .ok_or(exhausted.clone())?;
        let end = ptr.checked_add(size).ok_or(exhausted.clone())?;
        if !self.grow_to(end) {
            return Err(exhausted.into());
        }

        let header = ptr - OBJECT_HEADER_SIZE;
        let mut raw = [0u8; OBJECT_HEADER_SIZE as usize];
        raw[0..4].copy_from_slice(&(size + OBJECT_HEADER_SIZE).to_le_bytes());
        raw[12..16].copy_from_slice(&type_id.to_le_bytes());
        raw[16..20].copy_from_slice(&size.to_le_bytes());
        self.memory[header as usize..ptr as usize].copy_from_slice(&raw);
        self.memory[ptr as usize..end as usize].fill(0);

        self.next = end;
        self.objects.insert(ptr, size);
        tracing::trace!(ptr, size, type_id, "guest allocate");
        Ok(ptr)
    }

    fn pin(&mut self, ptr: u32) -> MarshalResult<()> {
        if !self.objects.contains_key(&ptr) {
            return Err(AllocFailure::UnknownObject(ptr).into());
        }
        if !self.pinned.insert(ptr) {
            return Err(AllocFailure::AlreadyPinned(ptr).into());
        }
        self.pin_calls += 1;
        Ok(())
    }

    fn unpin(&mut self, ptr: u32) -> MarshalResult<()> {
        if !self.objects.contains_key(&ptr) {
            return Err(AllocFailure::UnknownObject(ptr).into());
        }
        if !self.pinned.remove(&ptr) {
            return Err(AllocFailure::NotPinned(ptr).into());
        }
        self.unpin_calls += 1;
        Ok(())
    }
}
