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

//! Constructor-level configuration for the lifecycle manager.
//!
//! Deliberately not a global singleton: a process may host more than one
//! independent `LifecycleManager`, each with its own allocator and usage
//! cadence, so configuration travels with the instance rather than a
//! static `OnceLock`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a `LifecycleManager` that are not already implied by its
/// allocator (footprint limit and fallback directory live on the
/// allocator itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Minimum interval between periodic usage-summary log lines.
    pub usage_log_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            usage_log_interval_ms: 10_000,
        }
    }
}

impl LifecycleConfig {
    /// The configured usage-log interval as a `Duration`.
    pub fn usage_log_interval(&self) -> Duration {
        Duration::from_millis(self.usage_log_interval_ms)
    }
}
