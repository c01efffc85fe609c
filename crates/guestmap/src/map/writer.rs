use super::{BUCKET_SIZE, Capacity, EntryLayout, GuestMapHeader, HEADER_SIZE};
use crate::codec::{FieldCodec, encode_scalar};
use crate::error::{MarshalError, MarshalResult};
use crate::guest::{Guest, PinScope};
use crate::hash::{HashFn, encode_utf16};
use crate::types::{ARRAY_BUFFER_ID, STRING_ID, TypeKind, TypeResolver};
use crate::value::{HostMap, MapKey, Value};
use ahash::{AHashMap, AHashSet};

/// Builds a guest map from a native host mapping.
///
/// Buckets and entries are laid out exactly as the guest runtime would after
/// inserting every key once: dense entries, LIFO bucket chains.
pub struct MapWriter<'a> {
    types: &'a dyn TypeResolver,
    codec: &'a dyn FieldCodec,
    hasher: &'a dyn HashFn,
}

impl<'a> MapWriter<'a> {
    pub fn new(
        types: &'a dyn TypeResolver,
        codec: &'a dyn FieldCodec,
        hasher: &'a dyn HashFn,
    ) -> Self {
        Self {
            types,
            codec,
            hasher,
        }
    }

    /// Allocate and fill a guest map, returning the header offset.
    ///
    /// Every buffer and every key/value allocation stays pinned until the
    /// header is linked; all of them are released before returning. The
    /// header itself is returned unpinned.
    pub fn write(&self, guest: &mut dyn Guest, ty: &str, value: &Value) -> MarshalResult<u32> {
        let map = match value {
            Value::Map(HostMap::Native(map)) => map,
            other => return Err(MarshalError::unsupported(ty, other.type_name())),
        };
        let count = u32::try_from(map.len()).map_err(|_| MarshalError::LimitExceeded {
            limit: "map entries",
            value: map.len() as u64,
        })?;

        let (key_ty, value_ty) = self.types.map_subtypes(ty)?;
        let key_kind = self.types.type_kind(&key_ty)?;
        if !key_kind.is_comparable() {
            return Err(MarshalError::unsupported(&key_ty, "native map key"));
        }
        self.types.type_kind(&value_ty)?;
        let type_id = self.types.type_definition(ty)?.id;
        let layout = EntryLayout::resolve(self.types, &key_ty, &value_ty)?;

        self.check_keys(&key_ty, &key_kind, map)?;

        let capacity = Capacity::for_count(count).ok_or(MarshalError::LimitExceeded {
            limit: "map entries",
            value: count as u64,
        })?;
        let mask = capacity.mask();
        let entries_size = layout
            .size
            .checked_mul(capacity.entries)
            .ok_or(MarshalError::LimitExceeded {
                limit: "map entries buffer",
                value: layout.size as u64 * capacity.entries as u64,
            })?;

        tracing::debug!(
            type_name = ty,
            count,
            buckets = capacity.buckets,
            entries = capacity.entries,
            entry_size = layout.size,
            "writing guest map"
        );

        let pins = 2 + 2 * map.len();
        PinScope::run(guest, pins, |scope, guest| {
            let buckets_size = BUCKET_SIZE * capacity.buckets;
            let buckets = guest.allocate(buckets_size, ARRAY_BUFFER_ID)?;
            scope.pin(guest, buckets)?;
            if !guest.write_bytes(buckets, &vec![0; buckets_size as usize]) {
                return Err(MarshalError::write_fault("map buckets", buckets));
            }

            // an empty map still owns both buffers
            let entries = guest.allocate(entries_size, ARRAY_BUFFER_ID)?;
            scope.pin(guest, entries)?;

            for (slot, (key, value)) in map.iter().enumerate() {
                let entry = entries + layout.size * slot as u32;

                let (hash, key_ptr) = self.write_key(guest, &key_ty, &key_kind, entry, key)?;
                scope.pin(guest, key_ptr)?;

                let value_addr = entry + layout.value_offset;
                let value_ptr = self.codec.write_field(guest, &value_ty, value_addr, value)?;
                scope.pin(guest, value_ptr)?;

                let bucket = buckets + (hash & mask) * BUCKET_SIZE;
                let prev = guest
                    .read_u32_le(bucket)
                    .ok_or(MarshalError::read_fault("map bucket head", bucket))?;
                let next_addr = entry + layout.tagged_next_offset;
                if !guest.write_u32_le(next_addr, prev) {
                    return Err(MarshalError::write_fault("map entry tagged next", next_addr));
                }
                if !guest.write_u32_le(bucket, entry) {
                    return Err(MarshalError::write_fault("map bucket head", bucket));
                }
                tracing::trace!(slot, hash, bucket = hash & mask, prev, "map entry linked");
            }

            let offset = guest.allocate(HEADER_SIZE, type_id)?;
            GuestMapHeader {
                buckets_ptr: buckets,
                buckets_mask: mask,
                entries_ptr: entries,
                entries_capacity: capacity.entries,
                entries_offset: count,
                entries_count: count,
            }
            .write(guest.as_memory_mut(), offset)?;
            Ok(offset)
        })
    }

    /// Distinct host keys may encode to the same guest key (`Int(1)` and
    /// `UInt(1)`, or two doubles rounding to one `f32`). The guest never holds
    /// two entries with equal keys, so such input is rejected up front.
    fn check_keys(
        &self,
        key_ty: &str,
        key_kind: &TypeKind,
        map: &AHashMap<MapKey, Value>,
    ) -> MarshalResult<()> {
        let TypeKind::Scalar(kind) = key_kind else {
            return Ok(());
        };
        let mut seen = AHashSet::with_capacity(map.len());
        for key in map.keys() {
            let value = key.to_value();
            let bits = encode_scalar(*kind, &value)
                .ok_or(MarshalError::unsupported(key_ty, value.type_name()))?;
            if !seen.insert(bits) {
                return Err(MarshalError::unsupported(key_ty, "duplicate key"));
            }
        }
        Ok(())
    }

    /// Write one key, returning its hash and the pointer of any allocation.
    fn write_key(
        &self,
        guest: &mut dyn Guest,
        key_ty: &str,
        key_kind: &TypeKind,
        entry: u32,
        key: &MapKey,
    ) -> MarshalResult<(u32, u32)> {
        match (key_kind, key) {
            // hashed over the exact UTF-16 bytes the guest compares against
            (TypeKind::String { .. }, MapKey::String(s)) => {
                let bytes = encode_utf16(s);
                let hash = self.hasher.hash_bytes(&bytes);
                let ptr = guest.allocate(bytes.len() as u32, STRING_ID)?;
                if !guest.write_bytes(ptr, &bytes) {
                    return Err(MarshalError::write_fault("map entry key string", ptr));
                }
                if !guest.write_u32_le(entry, ptr) {
                    return Err(MarshalError::write_fault("map entry key", entry));
                }
                Ok((hash, ptr))
            }
            (TypeKind::Scalar(kind), key) => {
                let value = key.to_value();
                let bits = encode_scalar(*kind, &value)
                    .ok_or(MarshalError::unsupported(key_ty, value.type_name()))?;
                let ptr = self.codec.write_field(guest, key_ty, entry, &value)?;
                Ok((self.hasher.hash_scalar(bits, kind.size()), ptr))
            }
            (_, key) => Err(MarshalError::unsupported(key_ty, key.to_value().type_name())),
        }
    }
}
