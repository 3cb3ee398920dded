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

//! LRU eviction policy.
//!
//! Tracks the set of sealed, unreferenced ("evictable") objects and
//! picks victims to satisfy a requested number of bytes. The policy
//! itself never touches the store or the allocator — it only hands the
//! lifecycle manager a list of ids to delete.

use std::collections::{HashMap, VecDeque};

use objectstore_common::ObjectId;

/// LRU-by-release-time eviction policy.
///
/// Victim order is least-recently-ended-access first: an object becomes
/// evictable when it is sealed and its reference count drops to zero
/// (or, for the "restored" path, immediately on creation), and it is
/// removed from the evictable set the moment a reference is taken again.
#[derive(Default)]
pub struct EvictionPolicy {
    /// Insertion-ordered queue of evictable ids paired with their sizes.
    /// Front = oldest (first to evict).
    evictable: VecDeque<(ObjectId, usize)>,
    /// Index from id to its position's size, for O(1) membership checks;
    /// the queue itself is still scanned for removal, which is
    /// acceptable since eviction is driven off actual memory pressure
    /// rather than a hot path.
    sizes: HashMap<ObjectId, usize>,
    bytes_evictable: usize,
    num_evictions_total: u64,
    bytes_evicted_total: u64,
}

impl EvictionPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created object.
    ///
    /// `is_create_op = true` means this is a normal client-driven create:
    /// the object is tracked but not yet evictable (it is unsealed and
    /// has no references). `is_create_op = false` models objects that
    /// enter the store already unreferenced (e.g. restored from
    /// storage) and so are evictable immediately.
    pub fn object_created(&mut self, id: ObjectId, size: usize, is_create_op: bool) {
        if !is_create_op {
            self.push_evictable(id, size);
        }
    }

    /// Mark `id` as no longer evictable because a reference was just
    /// taken on it (ref count 0 -> 1 for a sealed object).
    pub fn begin_object_access(&mut self, id: &ObjectId) {
        self.remove_from_evictable(id);
    }

    /// Mark `id` as evictable because its last reference was just
    /// released (ref count 1 -> 0 for a sealed object).
    pub fn end_object_access(&mut self, id: ObjectId, size: usize) {
        self.push_evictable(id, size);
    }

    /// Select victims covering at least `num_bytes`, removing them from
    /// the evictable set. Returns the victim ids in eviction order and
    /// the total bytes they free.
    pub fn require_space(&mut self, num_bytes: usize) -> (Vec<ObjectId>, usize) {
        let mut victims = Vec::new();
        let mut freed = 0usize;

        while freed < num_bytes {
            let Some((id, size)) = self.evictable.pop_front() else {
                break;
            };
            self.sizes.remove(&id);
            self.bytes_evictable -= size;
            freed += size;
            self.num_evictions_total += 1;
            self.bytes_evicted_total += size as u64;
            victims.push(id);
        }

        (victims, freed)
    }

    /// Remove `id` unconditionally, e.g. because the lifecycle manager
    /// deleted it for a reason other than eviction (explicit delete,
    /// abort). No-op if `id` is not in the evictable set.
    pub fn remove(&mut self, id: &ObjectId) {
        self.remove_from_evictable(id);
    }

    /// Total bytes currently held by evictable objects.
    pub fn bytes_evictable(&self) -> usize {
        self.bytes_evictable
    }

    /// Number of objects currently evictable.
    pub fn num_evictable(&self) -> usize {
        self.evictable.len()
    }

    /// Human-readable snapshot for debugging.
    pub fn debug_string(&self) -> String {
        format!(
            "EvictionPolicy{{evictable_objects={}, evictable_bytes={}, evictions_total={}, bytes_evicted_total={}}}",
            self.evictable.len(),
            self.bytes_evictable,
            self.num_evictions_total,
            self.bytes_evicted_total,
        )
    }

    fn push_evictable(&mut self, id: ObjectId, size: usize) {
        if self.sizes.contains_key(&id) {
            return;
        }
        self.sizes.insert(id.clone(), size);
        self.bytes_evictable += size;
        self.evictable.push_back((id, size));
    }

    fn remove_from_evictable(&mut self, id: &ObjectId) {
        let Some(size) = self.sizes.remove(id) else {
            return;
        };
        self.bytes_evictable -= size;
        if let Some(pos) = self.evictable.iter().position(|(oid, _)| oid == id) {
            self.evictable.remove(pos);
        }
    }
}
