// Guest hash map object layout
//
// A map is a 24 byte header pointing at two array buffers: the bucket heads
// and the entries, which are stored densely in insertion order. Each entry is
// `[key][value][taggedNext]`; `taggedNext` links entries sharing a bucket,
// its low bit marks a deleted entry.
mod reader;
mod writer;

pub use reader::MapReader;
pub use writer::MapWriter;

use crate::error::{MarshalError, MarshalResult};
use crate::guest::MemoryAccessor;
use crate::types::{ScalarKind, TypeResolver};

pub const HEADER_SIZE: u32 = 24;
pub const BUCKET_SIZE: u32 = 4;
pub const TAGGED_NEXT_SIZE: u32 = 4;
pub const INITIAL_BUCKETS: u32 = 4;
/// Low bit of `taggedNext`: entry deleted
pub const EMPTY: u32 = 1;

/// Header fields of a guest map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapField {
    BucketsPtr,
    BucketsMask,
    EntriesPtr,
    EntriesCapacity,
    EntriesOffset,
    EntriesCount,
}

impl MapField {
    pub const ALL: [MapField; 6] = [
        MapField::BucketsPtr,
        MapField::BucketsMask,
        MapField::EntriesPtr,
        MapField::EntriesCapacity,
        MapField::EntriesOffset,
        MapField::EntriesCount,
    ];

    #[inline]
    pub fn offset(self) -> u32 {
        match self {
            MapField::BucketsPtr => 0,
            MapField::BucketsMask => 4,
            MapField::EntriesPtr => 8,
            MapField::EntriesCapacity => 12,
            MapField::EntriesOffset => 16,
            MapField::EntriesCount => 20,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MapField::BucketsPtr => "map buckets pointer",
            MapField::BucketsMask => "map buckets mask",
            MapField::EntriesPtr => "map entries pointer",
            MapField::EntriesCapacity => "map entries capacity",
            MapField::EntriesOffset => "map entries offset",
            MapField::EntriesCount => "map entries count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuestMapHeader {
    pub buckets_ptr: u32,
    pub buckets_mask: u32,
    pub entries_ptr: u32,
    pub entries_capacity: u32,
    pub entries_offset: u32,
    pub entries_count: u32,
}

impl GuestMapHeader {
    pub fn get(&self, field: MapField) -> u32 {
        match field {
            MapField::BucketsPtr => self.buckets_ptr,
            MapField::BucketsMask => self.buckets_mask,
            MapField::EntriesPtr => self.entries_ptr,
            MapField::EntriesCapacity => self.entries_capacity,
            MapField::EntriesOffset => self.entries_offset,
            MapField::EntriesCount => self.entries_count,
        }
    }

    fn slot(&mut self, field: MapField) -> &mut u32 {
        match field {
            MapField::BucketsPtr => &mut self.buckets_ptr,
            MapField::BucketsMask => &mut self.buckets_mask,
            MapField::EntriesPtr => &mut self.entries_ptr,
            MapField::EntriesCapacity => &mut self.entries_capacity,
            MapField::EntriesOffset => &mut self.entries_offset,
            MapField::EntriesCount => &mut self.entries_count,
        }
    }

    pub fn read(mem: &dyn MemoryAccessor, offset: u32) -> MarshalResult<Self> {
        let mut header = GuestMapHeader::default();
        for field in MapField::ALL {
            let addr = offset.wrapping_add(field.offset());
            *header.slot(field) = mem
                .read_u32_le(addr)
                .ok_or(MarshalError::read_fault(field.name(), addr))?;
        }
        Ok(header)
    }

    pub fn write(&self, mem: &mut dyn MemoryAccessor, offset: u32) -> MarshalResult<()> {
        for field in MapField::ALL {
            let addr = offset.wrapping_add(field.offset());
            if !mem.write_u32_le(addr, self.get(field)) {
                return Err(MarshalError::write_fault(field.name(), addr));
            }
        }
        Ok(())
    }

    /// Check the layout invariants a guest-built map always satisfies
    pub fn validate(&self, ty: &str) -> MarshalResult<()> {
        let buckets = self.buckets_mask.wrapping_add(1);
        if !buckets.is_power_of_two() {
            return Err(MarshalError::corrupt(
                ty,
                format!("bucket count {buckets} is not a power of two"),
            ));
        }
        if self.entries_capacity == 0 {
            return Err(MarshalError::corrupt(ty, "entries capacity is zero"));
        }
        if self.entries_count > self.entries_offset || self.entries_offset > self.entries_capacity
        {
            return Err(MarshalError::corrupt(
                ty,
                format!(
                    "entries count {} / offset {} / capacity {} out of order",
                    self.entries_count, self.entries_offset, self.entries_capacity
                ),
            ));
        }
        Ok(())
    }
}

/// Bucket and entry capacities of a freshly built map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub buckets: u32,
    pub entries: u32,
}

impl Capacity {
    /// Growth schedule: start at 4 buckets, double while below `count`,
    /// entries get 8/3 of the bucket count. `None` when the capacities do
    /// not fit in 32 bits.
    pub fn for_count(count: u32) -> Option<Capacity> {
        let mut buckets = INITIAL_BUCKETS;
        while buckets < count {
            buckets = buckets.checked_mul(2)?;
        }
        Some(Capacity {
            buckets,
            entries: buckets.checked_mul(8)? / 3,
        })
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.buckets - 1
    }
}

/// Round `n` up to a multiple of `a` (a power of two)
#[inline]
pub fn align(n: u32, a: u32) -> u32 {
    debug_assert!(a.is_power_of_two());
    (n + a - 1) & !(a - 1)
}

/// Displacement of the next sub-region after a key (or value) of type `ty`:
/// 8 for 64-bit scalars, 4 for everything else.
pub fn size_for_key_offset(ty: &str) -> u32 {
    match ScalarKind::parse(ty) {
        Some(kind) if kind.size() == 8 => 8,
        _ => 4,
    }
}

/// Entry stride for the given key and value sizes
#[inline]
pub fn entry_size(key_size: u32, value_size: u32) -> u32 {
    let alignment = key_size.max(value_size).max(4);
    align(key_size + value_size + TAGGED_NEXT_SIZE, alignment)
}

/// Placement of the sub-regions inside one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLayout {
    pub key_size: u32,
    pub value_size: u32,
    pub value_offset: u32,
    pub tagged_next_offset: u32,
    pub size: u32,
}

impl EntryLayout {
    pub fn resolve(types: &dyn TypeResolver, key_ty: &str, value_ty: &str) -> MarshalResult<Self> {
        let key_size = types.size_of_type(key_ty)?;
        let value_size = types.size_of_type(value_ty)?;
        let value_offset = size_for_key_offset(key_ty);
        let tagged_next_offset = value_offset + size_for_key_offset(value_ty);
        let alignment = key_size.max(value_size).max(4);
        // sub-word keys or values keep their fixed offsets, so the stride
        // has to reach past `taggedNext`
        let size = entry_size(key_size, value_size)
            .max(align(tagged_next_offset + TAGGED_NEXT_SIZE, alignment));
        Ok(EntryLayout {
            key_size,
            value_size,
            value_offset,
            tagged_next_offset,
            size,
        })
    }

    /// Whether `taggedNext` lies inside an entry of `stride` bytes
    #[inline]
    pub fn tagged_next_fits(&self, stride: u32) -> bool {
        self.tagged_next_offset + TAGGED_NEXT_SIZE <= stride
    }
}
