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

//! The lifecycle manager: the public façade that sequences the store,
//! the eviction policy, and the allocator so that the invariants of the
//! object lifecycle hold after every operation.

use dashmap::mapref::one::Ref;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use objectstore_common::ObjectId;

use crate::config::LifecycleConfig;

use super::allocator::Allocator;
use super::common::{Allocation, LocalObject, ObjectInfo, ObjectSource, ObjectState, PlasmaError, PlasmaResult};
use super::eviction::EvictionPolicy;
use super::store::ObjectStore;

/// Callback invoked exactly once per deletion, after the object has left
/// the store. Must not re-enter the manager for the same id.
pub type DeleteCallback = Box<dyn Fn(&ObjectId) + Send + Sync>;

/// Orchestrates object creation, sealing, reference counting, and
/// eviction-backed allocation over a single allocator instance.
pub struct LifecycleManager<A: Allocator> {
    allocator: A,
    store: ObjectStore,
    eviction_policy: Mutex<EvictionPolicy>,
    deletion_cache: Mutex<HashSet<ObjectId>>,
    num_bytes_in_use: AtomicUsize,
    on_delete_callback: RwLock<Option<DeleteCallback>>,
    config: LifecycleConfig,
    last_usage_log: Mutex<Instant>,
}

impl<A: Allocator> LifecycleManager<A> {
    /// Create a new manager over the given allocator.
    pub fn new(allocator: A, config: LifecycleConfig) -> Self {
        Self {
            allocator,
            store: ObjectStore::new(),
            eviction_policy: Mutex::new(EvictionPolicy::new()),
            deletion_cache: Mutex::new(HashSet::new()),
            num_bytes_in_use: AtomicUsize::new(0),
            on_delete_callback: RwLock::new(None),
            config,
            last_usage_log: Mutex::new(Instant::now()),
        }
    }

    /// Install the deletion callback. Replaces any previously set callback.
    pub fn set_on_delete_callback(&self, callback: DeleteCallback) {
        *self.on_delete_callback.write() = Some(callback);
    }

    /// Create a new object. `device_num` must be 0 (host memory); any
    /// other value is rejected with `InvalidArgument`. `allow_fallback`
    /// permits the allocator's disk-backed fallback path once eviction
    /// alone cannot satisfy the request.
    pub fn create_object(
        &self,
        object_info: ObjectInfo,
        source: ObjectSource,
        device_num: i32,
        allow_fallback: bool,
    ) -> PlasmaResult<ObjectId> {
        if device_num != 0 {
            return Err(PlasmaError::InvalidArgument(format!(
                "unsupported device_num: {device_num}"
            )));
        }
        if self.store.contains(&object_info.object_id) {
            return Err(PlasmaError::ObjectExists(object_info.object_id.clone()));
        }

        let size = object_info.total_size();
        if size > self.allocator.footprint_limit() {
            tracing::debug!(
                object_id = %object_info.object_id,
                size,
                footprint_limit = self.allocator.footprint_limit(),
                "create_object rejected: size exceeds footprint limit",
            );
            return Err(PlasmaError::OutOfMemory);
        }
        let allocation = self.allocate_memory(size, allow_fallback)?;

        let id = self.store.create(allocation, object_info, source);
        self.eviction_policy.lock().object_created(id.clone(), size, true);
        self.num_bytes_in_use.fetch_add(size, Ordering::SeqCst);

        tracing::debug!(object_id = %id, size, "object created");
        self.maybe_log_usage();
        Ok(id)
    }

    /// Look up an object by id.
    pub fn get_object(&self, id: &ObjectId) -> Option<Ref<'_, ObjectId, LocalObject>> {
        self.store.get(id)
    }

    /// Whether an object with this id is currently registered.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.store.contains(id)
    }

    /// Whether the object is sealed. Returns `false` if absent.
    pub fn is_object_sealed(&self, id: &ObjectId) -> bool {
        self.store.get(id).map(|o| o.is_sealed()).unwrap_or(false)
    }

    /// Seal an object. Returns `false` if absent or already sealed.
    ///
    /// Sealing a still-unreferenced object immediately makes it
    /// evictable, since evictability is defined purely by
    /// `sealed && ref_count == 0`.
    pub fn seal_object(&self, id: &ObjectId) -> bool {
        if !self.store.seal(id) {
            return false;
        }
        let Some(entry) = self.store.get(id) else {
            return true;
        };
        let ref_count = entry.ref_count();
        let size = entry.size();
        drop(entry);

        if ref_count == 0 {
            self.eviction_policy.lock().end_object_access(id.clone(), size);
            self.num_bytes_in_use.fetch_sub(size, Ordering::SeqCst);
        }
        tracing::debug!(object_id = %id, "object sealed");
        true
    }

    /// Abort an unsealed object: discards it outright. Fails if absent
    /// or already sealed.
    pub fn abort_object(&self, id: &ObjectId) -> bool {
        let Some(entry) = self.store.get(id) else {
            return false;
        };
        if entry.is_sealed() {
            return false;
        }
        let size = entry.size();
        drop(entry);

        self.delete_impl(id);
        self.num_bytes_in_use.fetch_sub(size, Ordering::SeqCst);
        tracing::debug!(object_id = %id, "object aborted");
        true
    }

    /// Delete an object. If it is still referenced, the deletion is
    /// deferred until the last reference is released and `ObjectInUse`
    /// is returned; the caller should not treat this as a hard failure.
    pub fn delete_object(&self, id: &ObjectId) -> PlasmaResult<()> {
        let Some(entry) = self.store.get(id) else {
            return Err(PlasmaError::ObjectNonexistent(id.clone()));
        };

        if entry.ref_count() > 0 {
            drop(entry);
            self.deletion_cache.lock().insert(id.clone());
            return Err(PlasmaError::ObjectInUse(id.clone()));
        }

        let was_unsealed = entry.state() == ObjectState::Created;
        let size = entry.size();
        drop(entry);

        self.delete_impl(id);
        if was_unsealed {
            self.num_bytes_in_use.fetch_sub(size, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Take a reference on `id`. Returns `false` if absent.
    pub fn add_reference(&self, id: &ObjectId) -> bool {
        let Some(mut entry) = self.store.get_mut(id) else {
            return false;
        };
        let newly_accessed = entry.is_sealed() && entry.ref_count() == 0;
        entry.add_ref();
        let size = entry.size();
        drop(entry);

        if newly_accessed {
            self.eviction_policy.lock().begin_object_access(id);
            self.num_bytes_in_use.fetch_add(size, Ordering::SeqCst);
        }
        true
    }

    /// Release a reference on `id`. Returns `false` if absent or if the
    /// reference count is already zero.
    pub fn remove_reference(&self, id: &ObjectId) -> bool {
        let Some(mut entry) = self.store.get_mut(id) else {
            return false;
        };
        if entry.ref_count() == 0 {
            return false;
        }
        let new_count = entry.remove_ref();
        let sealed = entry.is_sealed();
        let size = entry.size();
        drop(entry);

        if new_count == 0 {
            if sealed {
                self.eviction_policy.lock().end_object_access(id.clone(), size);
                self.num_bytes_in_use.fetch_sub(size, Ordering::SeqCst);
            }
            if self.deletion_cache.lock().remove(id) {
                self.delete_impl(id);
            }
        }
        true
    }

    /// Evict sealed, unreferenced objects until at least `num_bytes`
    /// have been reclaimed (or the evictable set is exhausted). Returns
    /// the number of bytes actually freed.
    pub fn require_space(&self, num_bytes: usize) -> usize {
        self.evict_for(num_bytes)
    }

    /// Total bytes currently "in use": unsealed objects plus sealed
    /// objects with at least one outstanding reference.
    pub fn num_bytes_in_use(&self) -> usize {
        self.num_bytes_in_use.load(Ordering::SeqCst)
    }

    /// Monotonic total of bytes ever created.
    pub fn num_bytes_created_total(&self) -> usize {
        self.store.num_bytes_created_total()
    }

    /// Bytes currently occupied by unsealed objects.
    pub fn num_bytes_unsealed(&self) -> usize {
        self.store.num_bytes_unsealed()
    }

    /// Count of unsealed objects.
    pub fn num_objects_unsealed(&self) -> usize {
        self.store.num_objects_unsealed()
    }

    /// Number of objects currently registered.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no objects are registered.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Human-readable eviction policy snapshot.
    pub fn eviction_policy_debug_string(&self) -> String {
        self.eviction_policy.lock().debug_string()
    }

    /// Human-readable snapshot of the whole manager, for debug endpoints.
    pub fn debug_dump(&self) -> String {
        format!(
            "{}\n{}\nbytes_in_use={}",
            self.store.debug_dump(),
            self.eviction_policy_debug_string(),
            self.num_bytes_in_use(),
        )
    }

    fn allocate_memory(&self, size: usize, allow_fallback: bool) -> PlasmaResult<Allocation> {
        if let Some(allocation) = self.allocator.allocate(size) {
            return Ok(allocation);
        }

        self.evict_for(size);

        if let Some(allocation) = self.allocator.allocate(size) {
            return Ok(allocation);
        }
        if !allow_fallback {
            return Err(PlasmaError::OutOfMemory);
        }
        self.allocator
            .fallback_allocate(size)
            .ok_or(PlasmaError::OutOfMemory)
    }

    /// Ask the eviction policy for victims covering `num_bytes`, delete
    /// each through the uniform deletion path, and report bytes freed.
    fn evict_for(&self, num_bytes: usize) -> usize {
        let (victims, freed) = self.eviction_policy.lock().require_space(num_bytes);
        tracing::trace!(num_bytes, victims = victims.len(), freed, "eviction pass");
        for victim in victims {
            self.delete_impl(&victim);
        }
        freed
    }

    /// The uniform deletion path: every deletion — explicit, aborted, or
    /// evicted — goes through here exactly once.
    fn delete_impl(&self, id: &ObjectId) {
        self.eviction_policy.lock().remove(id);
        let allocation = self.store.delete(id);

        if let Some(callback) = self.on_delete_callback.read().as_ref() {
            callback(id);
        }

        self.allocator.free(allocation);
        tracing::debug!(object_id = %id, "object deleted");
    }

    fn maybe_log_usage(&self) {
        let mut last = self.last_usage_log.lock();
        if last.elapsed() < self.config.usage_log_interval() {
            return;
        }
        tracing::info!(
            bytes_in_use = self.num_bytes_in_use(),
            bytes_created_total = self.num_bytes_created_total(),
            objects_unsealed = self.num_objects_unsealed(),
            num_objects = self.len(),
            "object store usage",
        );
        *last = Instant::now();
    }
}
