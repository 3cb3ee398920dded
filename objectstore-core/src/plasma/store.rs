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

//! The object registry.
//!
//! `ObjectStore` is a single-writer map from object id to `LocalObject`.
//! It knows nothing about reference counts or eviction: those are the
//! lifecycle manager's and eviction policy's concerns respectively. Its
//! only internal bookkeeping is the running totals needed to answer
//! "how many unsealed bytes exist right now" without a linear scan.

use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use objectstore_common::ObjectId;

use super::common::{Allocation, LocalObject, ObjectInfo, ObjectSource, ObjectState};

/// Pure object registry. Duplicate-create and delete-of-absent are
/// programming errors in the surrounding lifecycle manager and panic
/// rather than returning a `Result`, mirroring the reference store's
/// fatal-on-corruption stance.
#[derive(Default)]
pub struct ObjectStore {
    objects: DashMap<ObjectId, LocalObject>,
    num_bytes_unsealed: AtomicUsize,
    num_objects_unsealed: AtomicUsize,
    num_bytes_created_total: AtomicUsize,
}

impl ObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record for `object_info.object_id`.
    ///
    /// # Panics
    /// Panics if an entry already exists for this id — the caller
    /// (`LifecycleManager`) must check `get` first.
    pub fn create(
        &self,
        allocation: Allocation,
        object_info: ObjectInfo,
        source: ObjectSource,
    ) -> ObjectId {
        let id = object_info.object_id.clone();
        let size = object_info.total_size();
        let object = LocalObject::new(allocation, object_info, source);

        match self.objects.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                panic!("ObjectStore::create called with an id already present: {id:?}");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(object);
            }
        }

        self.num_bytes_unsealed.fetch_add(size, Ordering::SeqCst);
        self.num_objects_unsealed.fetch_add(1, Ordering::SeqCst);
        self.num_bytes_created_total
            .fetch_add(size, Ordering::SeqCst);
        id
    }

    /// Look up a record by id.
    pub fn get(&self, id: &ObjectId) -> Option<Ref<'_, ObjectId, LocalObject>> {
        self.objects.get(id)
    }

    /// Mutably look up a record by id.
    pub fn get_mut(&self, id: &ObjectId) -> Option<RefMut<'_, ObjectId, LocalObject>> {
        self.objects.get_mut(id)
    }

    /// Whether an object with this id is currently registered.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Seal the given object. Returns `false` if the object is absent or
    /// already sealed; otherwise transitions it and updates counters.
    pub fn seal(&self, id: &ObjectId) -> bool {
        let Some(mut entry) = self.objects.get_mut(id) else {
            return false;
        };
        if entry.seal().is_err() {
            return false;
        }
        let size = entry.size();
        self.num_bytes_unsealed.fetch_sub(size, Ordering::SeqCst);
        self.num_objects_unsealed.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Remove the record for `id`, returning its allocation token so the
    /// caller can return it to the allocator.
    ///
    /// # Panics
    /// Panics if no entry exists for `id`.
    pub fn delete(&self, id: &ObjectId) -> Allocation {
        let (_, object) = self
            .objects
            .remove(id)
            .unwrap_or_else(|| panic!("ObjectStore::delete called for unknown id: {id:?}"));

        if object.state() == ObjectState::Created {
            self.num_bytes_unsealed
                .fetch_sub(object.size(), Ordering::SeqCst);
            self.num_objects_unsealed.fetch_sub(1, Ordering::SeqCst);
        }

        object.into_allocation()
    }

    /// Number of objects currently registered.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store has no registered objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Bytes currently occupied by unsealed (`Created`) objects.
    pub fn num_bytes_unsealed(&self) -> usize {
        self.num_bytes_unsealed.load(Ordering::SeqCst)
    }

    /// Count of unsealed (`Created`) objects.
    pub fn num_objects_unsealed(&self) -> usize {
        self.num_objects_unsealed.load(Ordering::SeqCst)
    }

    /// Monotonic total of bytes ever created through this store.
    pub fn num_bytes_created_total(&self) -> usize {
        self.num_bytes_created_total.load(Ordering::SeqCst)
    }

    /// Human-readable snapshot for debugging.
    pub fn debug_dump(&self) -> String {
        format!(
            "ObjectStore{{objects={}, unsealed_bytes={}, unsealed_objects={}, created_total={}}}",
            self.len(),
            self.num_bytes_unsealed(),
            self.num_objects_unsealed(),
            self.num_bytes_created_total(),
        )
    }
}
