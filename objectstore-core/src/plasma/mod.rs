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

//! Object lifecycle core: store, eviction policy, allocator port, and the
//! lifecycle manager that sequences them.

pub mod allocator;
pub mod common;
pub mod eviction;
pub mod lifecycle;
pub mod store;

pub use allocator::{Allocator, HeapAllocator, MmapAllocator, NullAllocator};
pub use common::{
    Allocation, LocalObject, ObjectInfo, ObjectSource, ObjectState, PlasmaError, PlasmaResult,
};
pub use eviction::EvictionPolicy;
pub use lifecycle::{DeleteCallback, LifecycleManager};
pub use store::ObjectStore;
