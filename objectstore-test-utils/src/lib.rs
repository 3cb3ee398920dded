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

//! Shared test helpers for the object store core's test suites.

use objectstore_common::ObjectId;

/// Create `n` distinct random object ids, useful for seeding eviction
/// scenarios that need a batch of objects.
pub fn random_object_ids(n: usize) -> Vec<ObjectId> {
    (0..n).map(|_| ObjectId::from_random()).collect()
}

/// Build a fake `owner_address` payload of the given length, standing in
/// for the serialized owner-worker metadata a real caller would attach.
pub fn fake_owner_address(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}
