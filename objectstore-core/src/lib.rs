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

//! Object lifecycle core for an in-process shared-memory object store.
//!
//! This crate owns the `Created -> Sealed` state machine, reference
//! counting, and eviction-backed allocation for objects held in shared
//! memory. It does not own the wire protocol, the allocator's backing
//! storage, or any cross-process coordination: those are the concern of
//! the surrounding service, which plugs in an `Allocator` and a delete
//! callback.

pub mod config;
pub mod plasma;

pub use config::LifecycleConfig;
pub use plasma::{
    Allocation, Allocator, DeleteCallback, EvictionPolicy, HeapAllocator, LifecycleManager,
    LocalObject, MmapAllocator, NullAllocator, ObjectInfo, ObjectSource, ObjectState, ObjectStore,
    PlasmaError, PlasmaResult,
};
