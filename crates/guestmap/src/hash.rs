// Guest map hashing (xxHash32 derived, seed 0)
//
// Bucket placement on the write path must agree with the guest's own lookup,
// so every function here reproduces the guest runtime bit for bit.

const P1: u32 = 2654435761;
const P2: u32 = 2246822519;
const P3: u32 = 3266489917;
const P4: u32 = 668265263;
const P5: u32 = 374761393;
const SEED: u32 = 0;

/// Key hash matching the guest compiler's map hashing.
pub trait HashFn {
    /// Hash of a string key's UTF-16LE encoding
    fn hash_bytes(&self, bytes: &[u8]) -> u32;

    /// Hash of a scalar key given its raw bits and byte width.
    /// Signed values are expected sign-extended, floats as bit patterns.
    fn hash_scalar(&self, bits: u64, size: u32) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XxHash32;

impl HashFn for XxHash32 {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        hash_str(bytes)
    }

    fn hash_scalar(&self, bits: u64, size: u32) -> u32 {
        if size == 8 {
            hash64(bits)
        } else {
            hash32(bits as u32, size)
        }
    }
}

#[inline]
fn avalanche(mut h: u32) -> u32 {
    h ^= h >> 15;
    h = h.wrapping_mul(P2);
    h ^= h >> 13;
    h = h.wrapping_mul(P3);
    h ^= h >> 16;
    h
}

#[inline]
fn step(h: u32, word: u32) -> u32 {
    h.wrapping_add(word.wrapping_mul(P3))
        .rotate_left(17)
        .wrapping_mul(P4)
}

#[inline]
fn mix(h: u32, word: u32) -> u32 {
    h.wrapping_add(word.wrapping_mul(P2))
        .rotate_left(13)
        .wrapping_mul(P1)
}

pub fn hash32(key: u32, len: u32) -> u32 {
    let h = SEED.wrapping_add(P5).wrapping_add(len);
    avalanche(step(h, key))
}

pub fn hash64(key: u64) -> u32 {
    let h = SEED.wrapping_add(P5).wrapping_add(8);
    let h = step(h, key as u32);
    let h = step(h, (key >> 32) as u32);
    avalanche(h)
}

#[inline]
fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub fn hash_str(bytes: &[u8]) -> u32 {
    let len = bytes.len();
    let mut h = len as u32;
    let mut pos = 0usize;

    if len >= 16 {
        let mut s1 = SEED.wrapping_add(P1).wrapping_add(P2);
        let mut s2 = SEED.wrapping_add(P2);
        let mut s3 = SEED;
        let mut s4 = SEED.wrapping_sub(P1);
        while pos + 16 <= len {
            s1 = mix(s1, word(bytes, pos));
            s2 = mix(s2, word(bytes, pos + 4));
            s3 = mix(s3, word(bytes, pos + 8));
            s4 = mix(s4, word(bytes, pos + 12));
            pos += 16;
        }
        h = h.wrapping_add(
            s1.rotate_left(1)
                .wrapping_add(s2.rotate_left(7))
                .wrapping_add(s3.rotate_left(12))
                .wrapping_add(s4.rotate_left(18)),
        );
    } else {
        h = h.wrapping_add(SEED.wrapping_add(P5));
    }

    while pos + 4 <= len {
        h = step(h, word(bytes, pos));
        pos += 4;
    }

    while pos < len {
        h = h
            .wrapping_add((bytes[pos] as u32).wrapping_mul(P5))
            .rotate_left(11)
            .wrapping_mul(P1);
        pos += 1;
    }

    avalanche(h)
}

/// UTF-16LE bytes of `s`, the guest's in-memory string encoding
pub fn encode_utf16(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}
