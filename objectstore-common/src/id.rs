// Copyright 2017 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Object identifier type.
//!
//! A fixed-size byte array identifier with a cached hash, so it is cheap
//! to use as a key in a concurrent map on the object-store hot path.

use rand::Rng;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Length of an ObjectId in bytes.
pub const OBJECT_ID_SIZE: usize = 20;

/// MurmurHash64A implementation matching the C++ version.
fn murmur_hash_64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: i32 = 47;

    let len = data.len();
    let mut h: u64 = seed ^ ((len as u64).wrapping_mul(M));

    let n_blocks = len / 8;
    for i in 0..n_blocks {
        let mut k = u64::from_le_bytes([
            data[i * 8],
            data[i * 8 + 1],
            data[i * 8 + 2],
            data[i * 8 + 3],
            data[i * 8 + 4],
            data[i * 8 + 5],
            data[i * 8 + 6],
            data[i * 8 + 7],
        ]);

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = &data[n_blocks * 8..];
    let tail_len = tail.len();
    if tail_len > 0 {
        let mut k: u64 = 0;
        for i in (0..tail_len).rev() {
            k = (k << 8) | (tail[i] as u64);
        }
        h ^= k;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

/// Trait implemented by fixed-width identifier types used across the store.
pub trait ObjectStoreId: Sized + Clone + PartialEq + Eq + Hash {
    /// The size of this ID type in bytes.
    const SIZE: usize;

    /// Returns the ID data as a byte slice.
    fn data(&self) -> &[u8];

    /// Create an ID from binary data.
    fn from_binary(data: &[u8]) -> Option<Self>;

    /// Create a nil ID (all 0xFF bytes).
    fn nil() -> Self;

    /// Check if this ID is nil.
    fn is_nil(&self) -> bool {
        self.data().iter().all(|&b| b == 0xFF)
    }

    /// Convert to binary representation.
    fn to_binary(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    /// Convert to hexadecimal string.
    fn to_hex(&self) -> String {
        hex::encode(self.data())
    }

    /// Create an ID from a hexadecimal string.
    fn from_hex(hex_str: &str) -> Option<Self> {
        let bytes = hex::decode(hex_str).ok()?;
        Self::from_binary(&bytes)
    }
}

/// Opaque identifier for an object tracked by the store.
///
/// Equality and hashing are defined purely over the byte payload; the
/// murmur hash is computed once at construction and cached so that using
/// an `ObjectId` as a `DashMap`/`HashMap` key does not re-hash the full
/// byte array on every lookup.
#[derive(Clone)]
pub struct ObjectId {
    data: [u8; OBJECT_ID_SIZE],
    hash: u64,
}

impl ObjectId {
    /// Create a new ObjectId with the given data.
    pub fn new(data: [u8; OBJECT_ID_SIZE]) -> Self {
        let hash = murmur_hash_64a(&data, 0);
        Self { data, hash }
    }

    /// Generate a random ObjectId.
    pub fn from_random() -> Self {
        let mut data = [0u8; OBJECT_ID_SIZE];
        rand::thread_rng().fill(&mut data);
        Self::new(data)
    }
}

impl ObjectStoreId for ObjectId {
    const SIZE: usize = OBJECT_ID_SIZE;

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn from_binary(data: &[u8]) -> Option<Self> {
        if data.len() != OBJECT_ID_SIZE {
            return None;
        }
        let mut arr = [0u8; OBJECT_ID_SIZE];
        arr.copy_from_slice(data);
        Some(Self::new(arr))
    }

    fn nil() -> Self {
        Self::new([0xFF; OBJECT_ID_SIZE])
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
