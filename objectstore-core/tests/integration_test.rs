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

//! End-to-end tests for the object lifecycle core, exercising the
//! `LifecycleManager` façade the way a surrounding service would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use objectstore_common::ObjectId;
use objectstore_core::{
    HeapAllocator, LifecycleConfig, LifecycleManager, ObjectInfo, ObjectSource, PlasmaError,
};
use objectstore_test_utils::{fake_owner_address, random_object_ids};

fn manager(capacity: usize) -> LifecycleManager<HeapAllocator> {
    LifecycleManager::new(HeapAllocator::new(capacity), LifecycleConfig::default())
}

fn info(size: usize) -> ObjectInfo {
    info_with_id(ObjectId::from_random(), size)
}

fn info_with_id(object_id: ObjectId, size: usize) -> ObjectInfo {
    ObjectInfo {
        object_id,
        data_size: size,
        metadata_size: 0,
        owner_address: fake_owner_address(4),
    }
}

/// S1: create -> seal -> delete with no references frees immediately.
#[test]
fn scenario_create_seal_delete() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();

    assert!(lm.contains(&id));
    assert!(!lm.is_object_sealed(&id));
    assert_eq!(lm.num_bytes_unsealed(), 10);

    assert!(lm.seal_object(&id));
    assert!(lm.is_object_sealed(&id));
    assert_eq!(lm.num_bytes_unsealed(), 0);

    lm.delete_object(&id).unwrap();
    assert!(!lm.contains(&id));
}

/// S2: aborting before sealing discards the object and its bytes.
#[test]
fn scenario_abort_before_seal() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();

    assert!(lm.abort_object(&id));
    assert!(!lm.contains(&id));
    assert_eq!(lm.num_bytes_in_use(), 0);
    assert_eq!(lm.num_bytes_unsealed(), 0);
}

/// S3: a referenced, sealed object is not evictable and delete is
/// refused with `ObjectInUse` until the reference drops.
#[test]
fn scenario_delete_deferred_while_referenced() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    lm.seal_object(&id);
    lm.add_reference(&id);

    let err = lm.delete_object(&id).unwrap_err();
    assert!(matches!(err, PlasmaError::ObjectInUse(_)));
    assert!(lm.contains(&id));

    assert!(lm.remove_reference(&id));
    assert!(!lm.contains(&id));
}

/// S4: create(A,10) -> seal(A) -> add_reference(A) -> delete(A) ->
/// remove_reference(A). Mirrors the deferred-deletion walk-through.
#[test]
fn scenario_s4_seal_reference_delete_release() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();

    assert!(lm.seal_object(&id));
    // Sealed and unreferenced: evictable, not counted as in use.
    assert_eq!(lm.num_bytes_in_use(), 0);

    assert!(lm.add_reference(&id));
    // Sealed and referenced: back to being counted as in use.
    assert_eq!(lm.num_bytes_in_use(), 10);

    let err = lm.delete_object(&id).unwrap_err();
    assert!(matches!(err, PlasmaError::ObjectInUse(_)));
    assert!(lm.contains(&id));

    assert!(lm.remove_reference(&id));
    assert!(!lm.contains(&id));
    assert_eq!(lm.num_bytes_in_use(), 0);
}

/// S5: under memory pressure, sealed unreferenced objects are evicted
/// oldest-first to make room for a new allocation.
#[test]
fn scenario_s5_eviction_under_pressure() {
    let lm = manager(100);
    let oldest_first = random_object_ids(10);
    for id in &oldest_first {
        lm.create_object(
            info_with_id(id.clone(), 10),
            ObjectSource::CreatedByWorker,
            0,
            false,
        )
        .unwrap();
        lm.seal_object(id);
    }

    let newcomer = lm
        .create_object(info(50), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();

    assert_eq!(lm.len(), 6);
    assert!(lm.contains(&newcomer));
    for victim in &oldest_first[..5] {
        assert!(!lm.contains(victim));
    }
    for survivor in &oldest_first[5..] {
        assert!(lm.contains(survivor));
    }
}

/// S6: eviction alone cannot reclaim enough space because the remaining
/// bytes are pinned by an outstanding reference; the call fails with
/// `OutOfMemory` rather than silently falling back.
#[test]
fn scenario_s6_eviction_insufficient_is_out_of_memory() {
    let lm = manager(100);
    for _ in 0..3 {
        let id = lm
            .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
            .unwrap();
        lm.seal_object(&id);
    }

    let pinned = lm
        .create_object(info(70), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    lm.seal_object(&pinned);
    lm.add_reference(&pinned);

    let err = lm
        .create_object(info(80), ObjectSource::CreatedByWorker, 0, false)
        .unwrap_err();
    assert!(matches!(err, PlasmaError::OutOfMemory));
    assert!(lm.contains(&pinned));
}

/// P1: an object is present iff it has been created and not yet deleted.
#[test]
fn property_presence_tracks_create_and_delete() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    assert!(lm.contains(&id));
    lm.abort_object(&id);
    assert!(!lm.contains(&id));
}

/// P2: duplicate ids are rejected rather than silently overwriting.
#[test]
fn property_duplicate_create_rejected() {
    let lm = manager(1024);
    let obj_info = info(10);
    let id = obj_info.object_id.clone();
    lm.create_object(obj_info, ObjectSource::CreatedByWorker, 0, false)
        .unwrap();

    let dup = ObjectInfo {
        object_id: id,
        data_size: 10,
        metadata_size: 0,
        owner_address: vec![],
    };
    let err = lm
        .create_object(dup, ObjectSource::CreatedByWorker, 0, false)
        .unwrap_err();
    assert!(matches!(err, PlasmaError::ObjectExists(_)));
}

/// P3: evictability tracks exactly `sealed && ref_count == 0`, verified
/// indirectly: a sealed-and-referenced object survives a pressure event
/// that would otherwise reclaim it, and becomes a normal eviction
/// candidate as soon as the reference is released.
#[test]
fn property_evictable_iff_sealed_and_unreferenced() {
    let lm = manager(100);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    lm.seal_object(&id);
    lm.add_reference(&id);

    // Nothing else evictable; a competing allocation must fail outright.
    let err = lm
        .create_object(info(95), ObjectSource::CreatedByWorker, 0, false)
        .unwrap_err();
    assert!(matches!(err, PlasmaError::OutOfMemory));
    assert!(lm.contains(&id));

    lm.remove_reference(&id);
    // Now evictable: the same request succeeds by reclaiming it.
    let ok = lm.create_object(info(95), ObjectSource::CreatedByWorker, 0, false);
    assert!(ok.is_ok());
    assert!(!lm.contains(&id));
}

/// P4: `num_bytes_in_use` always equals unsealed bytes plus referenced
/// sealed bytes, exercised across every transition in one object's life.
#[test]
fn property_bytes_in_use_accounting() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    assert_eq!(lm.num_bytes_in_use(), 10); // unsealed

    lm.seal_object(&id);
    assert_eq!(lm.num_bytes_in_use(), 0); // sealed, unreferenced

    lm.add_reference(&id);
    assert_eq!(lm.num_bytes_in_use(), 10); // sealed, referenced

    lm.add_reference(&id);
    assert_eq!(lm.num_bytes_in_use(), 10); // second ref: no further change

    lm.remove_reference(&id);
    assert_eq!(lm.num_bytes_in_use(), 10); // still one ref outstanding

    lm.remove_reference(&id);
    assert_eq!(lm.num_bytes_in_use(), 0); // back to evictable
}

/// P5: the monotonic creation total never decreases, even across deletes.
#[test]
fn property_bytes_created_total_is_monotonic() {
    let lm = manager(1024);
    let id1 = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    let id2 = lm
        .create_object(info(20), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    assert_eq!(lm.num_bytes_created_total(), 30);

    lm.delete_object(&id1).unwrap();
    lm.abort_object(&id2);
    assert_eq!(lm.num_bytes_created_total(), 30);
}

/// P6: `remove_reference` is rejected when there is no outstanding
/// reference to release.
#[test]
fn property_remove_reference_without_add_fails() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    assert!(!lm.remove_reference(&id));

    lm.seal_object(&id);
    assert!(!lm.remove_reference(&id));
}

/// The delete callback fires exactly once per object, regardless of
/// whether the deletion was explicit, an abort, or an eviction.
#[test]
fn delete_callback_fires_exactly_once_per_object() {
    let lm = manager(1024);
    let deleted = Arc::new(AtomicUsize::new(0));
    let deleted_handle = deleted.clone();
    lm.set_on_delete_callback(Box::new(move |_id| {
        deleted_handle.fetch_add(1, Ordering::SeqCst);
    }));

    let explicit = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    lm.seal_object(&explicit);
    lm.delete_object(&explicit).unwrap();

    let aborted = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 0, false)
        .unwrap();
    lm.abort_object(&aborted);

    assert_eq!(deleted.load(Ordering::SeqCst), 2);
}

/// A non-zero device number is rejected up front; this core only
/// manages host memory.
#[test]
fn device_num_other_than_zero_is_rejected() {
    let lm = manager(1024);
    let err = lm
        .create_object(info(10), ObjectSource::CreatedByWorker, 1, false)
        .unwrap_err();
    assert!(matches!(err, PlasmaError::InvalidArgument(_)));
}

/// Restoring objects from an external source round-trips through the
/// same sealed/referenced accounting as a freshly created one.
#[test]
fn restored_object_source_is_tracked() {
    let lm = manager(1024);
    let id = lm
        .create_object(info(10), ObjectSource::RestoredFromStorage, 0, false)
        .unwrap();
    assert!(lm.contains(&id));
    lm.seal_object(&id);
    assert_eq!(lm.num_bytes_in_use(), 0);
}
