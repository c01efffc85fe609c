use super::{EMPTY, EntryLayout, GuestMapHeader};
use crate::codec::FieldCodec;
use crate::error::{MarshalError, MarshalResult};
use crate::guest::MemoryAccessor;
use crate::types::TypeResolver;
use crate::value::{HostMap, MapData, MapKey, Value};
use ahash::AHashMap;

const PRESIZE_LIMIT: u32 = 1024;

/// Decodes a guest map into a host value. Performs no allocation in the
/// guest; the bucket array is never consulted since entries are stored in
/// insertion order.
pub struct MapReader<'a> {
    types: &'a dyn TypeResolver,
    codec: &'a dyn FieldCodec,
    max_entries: u32,
}

impl<'a> MapReader<'a> {
    pub fn new(types: &'a dyn TypeResolver, codec: &'a dyn FieldCodec) -> Self {
        Self {
            types,
            codec,
            max_entries: u32::MAX,
        }
    }

    pub fn with_max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn read(&self, mem: &dyn MemoryAccessor, ty: &str, offset: u32) -> MarshalResult<HostMap> {
        let header = GuestMapHeader::read(mem, offset)?;
        header.validate(ty)?;
        if header.entries_count > self.max_entries {
            return Err(MarshalError::LimitExceeded {
                limit: "map entries",
                value: header.entries_count as u64,
            });
        }

        // the array buffer's byte length sits in the word before its data
        let length_addr = header.entries_ptr.checked_sub(4).ok_or(MarshalError::read_fault(
            "map entries buffer length",
            header.entries_ptr,
        ))?;
        let byte_length = mem
            .read_u32_le(length_addr)
            .ok_or(MarshalError::read_fault("map entries buffer length", length_addr))?;
        if byte_length % header.entries_capacity != 0 {
            return Err(MarshalError::corrupt(
                ty,
                format!(
                    "entries buffer of {byte_length} bytes does not hold {} whole entries",
                    header.entries_capacity
                ),
            ));
        }
        let stride = byte_length / header.entries_capacity;

        let (key_ty, value_ty) = self.types.map_subtypes(ty)?;
        let key_kind = self.types.type_kind(&key_ty)?;
        let layout = EntryLayout::resolve(self.types, &key_ty, &value_ty)?;
        let value_offset = layout.value_offset;
        if value_offset + layout.value_size > stride {
            return Err(MarshalError::corrupt(
                ty,
                format!("entry stride {stride} too small for value at offset {value_offset}"),
            ));
        }

        // without room for `taggedNext` deletions cannot be seen, so only the
        // live prefix is walked
        let tombstones = layout.tagged_next_fits(stride);
        let slots = if tombstones {
            header.entries_offset
        } else {
            header.entries_count
        };

        tracing::debug!(
            type_name = ty,
            offset,
            count = header.entries_count,
            stride,
            "reading guest map"
        );

        // the count is unverified until the walk ends
        let mut pairs = Vec::with_capacity(header.entries_count.min(PRESIZE_LIMIT) as usize);
        for slot in 0..slots {
            if pairs.len() == header.entries_count as usize {
                break;
            }
            let entry = header.entries_ptr.wrapping_add(slot * stride);
            if tombstones {
                let addr = entry.wrapping_add(layout.tagged_next_offset);
                let tagged_next = mem
                    .read_u32_le(addr)
                    .ok_or(MarshalError::read_fault("map entry tagged next", addr))?;
                if tagged_next & EMPTY != 0 {
                    tracing::trace!(slot, "skipping deleted entry");
                    continue;
                }
            }
            let key = self.codec.read_field(mem, &key_ty, entry)?;
            let value = self.codec.read_field(mem, &value_ty, entry.wrapping_add(value_offset))?;
            tracing::trace!(slot, key = %key, value = %value, "map entry");
            pairs.push((key, value));
        }

        if pairs.len() != header.entries_count as usize {
            return Err(MarshalError::corrupt(
                ty,
                format!(
                    "found {} live entries, header reports {}",
                    pairs.len(),
                    header.entries_count
                ),
            ));
        }

        if key_kind.is_comparable() && pairs.iter().all(|(k, _)| MapKey::from_value(k).is_some())
        {
            return Ok(HostMap::Native(into_native(pairs)));
        }
        Ok(HostMap::Pairs(MapData(pairs)))
    }
}

fn into_native(pairs: Vec<(Value, Value)>) -> AHashMap<MapKey, Value> {
    let mut map = AHashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        if let Some(key) = MapKey::from_value(&key) {
            // later key wins
            map.insert(key, value);
        }
    }
    map
}
