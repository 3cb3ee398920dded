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

//! Core types shared by the store, eviction policy, and lifecycle manager.

use objectstore_common::ObjectId;
use std::time::{Duration, Instant};
use thiserror::Error;

/// State of an object tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Allocated but not yet sealed; still writable by its creator.
    Created = 1,
    /// Sealed; immutable, readable by any holder of a reference.
    Sealed = 2,
}

/// Where an object's bytes originated, for accounting/debugging only —
/// the lifecycle core treats this as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSource {
    /// Created by a local worker (the common case).
    CreatedByWorker = 0,
    /// Restored from external storage (e.g. object spilling).
    RestoredFromStorage = 1,
    /// Received from a remote node.
    ReceivedFromRemoteNode = 2,
    /// Placeholder stored after an upstream error.
    ErrorStored = 3,
    /// Created directly via fallback (disk-backed) allocation.
    CreatedByFallbackAllocation = 4,
}

/// Errors surfaced to callers of the lifecycle manager. Invariant
/// violations (duplicate insert, delete of an absent id from an internal
/// path) are not represented here; they are programming errors and panic
/// at the point of detection instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlasmaError {
    /// An object with this id already exists.
    #[error("object already exists: {0:?}")]
    ObjectExists(ObjectId),

    /// No object with this id is known to the store.
    #[error("object not found: {0:?}")]
    ObjectNonexistent(ObjectId),

    /// The object cannot be deleted because it is still referenced.
    #[error("object in use: {0:?}")]
    ObjectInUse(ObjectId),

    /// The allocator could not satisfy the request even after evicting
    /// every eligible object.
    #[error("out of memory")]
    OutOfMemory,

    /// Like `OutOfMemory`, but the caller may succeed by retrying later
    /// (e.g. once in-flight references are released).
    #[error("transient out of memory")]
    TransientOutOfMemory,

    /// A caller-supplied argument violates a precondition (e.g. a
    /// non-zero device number).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias for the lifecycle manager's fallible operations.
pub type PlasmaResult<T> = Result<T, PlasmaError>;

/// An allocator-issued memory token. Intentionally does not implement
/// `Clone`: it represents unique ownership of a backing region and is
/// consumed by `Allocator::free`.
#[derive(Debug)]
pub struct Allocation {
    address: *mut u8,
    size: usize,
    fd: i32,
    offset: i64,
    device_num: i32,
    mmap_size: usize,
    fallback_allocated: bool,
}

impl Allocation {
    /// Construct a new allocation token.
    pub fn new(
        address: *mut u8,
        size: usize,
        fd: i32,
        offset: i64,
        device_num: i32,
        mmap_size: usize,
        fallback_allocated: bool,
    ) -> Self {
        Self {
            address,
            size,
            fd,
            offset,
            device_num,
            mmap_size,
            fallback_allocated,
        }
    }

    /// The allocated address. Only valid for as long as the allocation
    /// has not been freed.
    pub fn address(&self) -> *mut u8 {
        self.address
    }

    /// Size in bytes of the usable region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Backing-file identifier assigned by the allocator.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    /// Byte offset within the backing file.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Device number; the lifecycle core accepts only 0 (host memory).
    pub fn device_num(&self) -> i32 {
        self.device_num
    }

    /// Size of the underlying mmap region (may exceed `size` due to
    /// alignment rounding).
    pub fn mmap_size(&self) -> usize {
        self.mmap_size
    }

    /// Whether this allocation came from the fallback (disk-backed) pool.
    pub fn is_fallback_allocated(&self) -> bool {
        self.fallback_allocated
    }

    /// View the allocation's bytes. Caller must ensure no concurrent
    /// mutable access exists.
    ///
    /// # Safety
    /// The address must still be mapped and `size` must not exceed the
    /// allocation's extent.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.address, self.size)
    }

    /// Mutably view the allocation's bytes.
    ///
    /// # Safety
    /// The address must still be mapped, `size` must not exceed the
    /// allocation's extent, and the caller must hold exclusive access.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.address, self.size)
    }
}

// The allocation owns a unique region of memory; it is not tied to the
// thread that created it.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// Caller-supplied descriptor accompanying a `create_object` call.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// The object's id.
    pub object_id: ObjectId,
    /// Size of the data region in bytes.
    pub data_size: usize,
    /// Size of the metadata region in bytes.
    pub metadata_size: usize,
    /// Serialized identity of the object's owner, opaque to the core.
    pub owner_address: Vec<u8>,
}

impl ObjectInfo {
    /// Total bytes this object occupies (data + metadata).
    pub fn total_size(&self) -> usize {
        self.data_size + self.metadata_size
    }
}

/// The store's per-object record.
pub struct LocalObject {
    allocation: Allocation,
    object_info: ObjectInfo,
    ref_count: i32,
    state: ObjectState,
    source: ObjectSource,
    create_time: Instant,
    construct_duration: Option<Duration>,
}

impl LocalObject {
    /// Construct a new record in the `Created` state with `ref_count = 0`.
    pub fn new(allocation: Allocation, object_info: ObjectInfo, source: ObjectSource) -> Self {
        Self {
            allocation,
            object_info,
            ref_count: 0,
            state: ObjectState::Created,
            source,
            create_time: Instant::now(),
            construct_duration: None,
        }
    }

    /// Borrow the allocation token.
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    /// Consume the record, returning its allocation token so it can be
    /// returned to the allocator.
    pub fn into_allocation(self) -> Allocation {
        self.allocation
    }

    /// Borrow the caller-supplied object descriptor.
    pub fn object_info(&self) -> &ObjectInfo {
        &self.object_info
    }

    /// This object's id.
    pub fn object_id(&self) -> &ObjectId {
        &self.object_info.object_id
    }

    /// Total bytes occupied (data + metadata).
    pub fn size(&self) -> usize {
        self.object_info.total_size()
    }

    /// Current reference count.
    pub fn ref_count(&self) -> i32 {
        self.ref_count
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Whether `seal` has been called on this object.
    pub fn is_sealed(&self) -> bool {
        self.state == ObjectState::Sealed
    }

    /// Origin tag.
    pub fn source(&self) -> ObjectSource {
        self.source
    }

    /// When this record was created.
    pub fn create_time(&self) -> Instant {
        self.create_time
    }

    /// Wall-clock time between creation and sealing, if sealed.
    pub fn construct_duration(&self) -> Option<Duration> {
        self.construct_duration
    }

    /// Increment the reference count, returning the new value.
    pub fn add_ref(&mut self) -> i32 {
        self.ref_count += 1;
        self.ref_count
    }

    /// Decrement the reference count, returning the new value. Does not
    /// clamp below zero; callers must not remove a reference they did
    /// not hold.
    pub fn remove_ref(&mut self) -> i32 {
        self.ref_count -= 1;
        self.ref_count
    }

    /// Transition `Created -> Sealed`. Idempotent calls are rejected.
    pub fn seal(&mut self) -> PlasmaResult<()> {
        if self.state == ObjectState::Sealed {
            return Err(PlasmaError::InvalidArgument(format!(
                "object {:?} already sealed",
                self.object_info.object_id
            )));
        }
        self.state = ObjectState::Sealed;
        self.construct_duration = Some(self.create_time.elapsed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectstore_common::ObjectId;

    fn make_object(size: usize) -> LocalObject {
        let allocation = Allocation::new(std::ptr::null_mut(), size, 1, 0, 0, size, false);
        let info = ObjectInfo {
            object_id: ObjectId::from_random(),
            data_size: size,
            metadata_size: 0,
            owner_address: vec![],
        };
        LocalObject::new(allocation, info, ObjectSource::CreatedByWorker)
    }

    #[test]
    fn test_new_object_is_created_unreferenced() {
        let obj = make_object(10);
        assert_eq!(obj.state(), ObjectState::Created);
        assert!(!obj.is_sealed());
        assert_eq!(obj.ref_count(), 0);
        assert_eq!(obj.size(), 10);
    }

    #[test]
    fn test_seal_transitions_state() {
        let mut obj = make_object(10);
        obj.seal().unwrap();
        assert!(obj.is_sealed());
        assert!(obj.construct_duration().is_some());
    }

    #[test]
    fn test_double_seal_is_rejected() {
        let mut obj = make_object(10);
        obj.seal().unwrap();
        assert!(obj.seal().is_err());
    }

    #[test]
    fn test_ref_counting() {
        let mut obj = make_object(10);
        assert_eq!(obj.add_ref(), 1);
        assert_eq!(obj.add_ref(), 2);
        assert_eq!(obj.remove_ref(), 1);
        assert_eq!(obj.remove_ref(), 0);
    }

    #[test]
    fn test_into_allocation_roundtrip() {
        let obj = make_object(42);
        let alloc = obj.into_allocation();
        assert_eq!(alloc.size(), 42);
    }

    #[test]
    fn test_object_info_total_size() {
        let info = ObjectInfo {
            object_id: ObjectId::from_random(),
            data_size: 3,
            metadata_size: 7,
            owner_address: vec![],
        };
        assert_eq!(info.total_size(), 10);
    }
}
