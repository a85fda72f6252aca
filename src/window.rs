// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window request counters, one per client identity.
//!
//! Every identity owns a [`ClientWindow`] of request timestamps (milliseconds
//! since the Unix epoch). The [`WindowMap`] keeps them in a sharded
//! concurrent map: the entry guard for an identity is its exclusive lock, so
//! requests from unrelated clients never contend on a global mutex.

use dashmap::DashMap;
use std::collections::VecDeque;

/// Request timestamps for a single identity.
#[derive(Debug, Default)]
pub struct ClientWindow {
    timestamps: VecDeque<i64>,
}

impl ClientWindow {
    /// Record a request at `now` and return the in-window count.
    pub fn record(&mut self, now: i64, window_ms: i64) -> usize {
        self.timestamps.push_back(now);
        self.prune(now, window_ms)
    }

    /// Drop timestamps older than `now - window_ms`, return what remains.
    pub fn prune(&mut self, now: i64, window_ms: i64) -> usize {
        self.timestamps.retain(|&t| now - t <= window_ms);
        self.timestamps.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Concurrent map of identity to [`ClientWindow`].
#[derive(Debug)]
pub struct WindowMap {
    window_ms: i64,
    windows: DashMap<String, ClientWindow>,
}

impl WindowMap {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
            windows: DashMap::new(),
        }
    }

    /// Record a request for `identity` and return its in-window count.
    ///
    /// The entry guard is held for the whole append-and-prune, which
    /// serializes calls for the same identity.
    pub fn record(&self, identity: &str, now: i64) -> usize {
        let mut window = self.windows.entry(identity.to_string()).or_default();
        window.record(now, self.window_ms)
    }

    /// Prune every window against `now` and evict the ones left empty.
    ///
    /// `retain` holds the shard write lock while deciding, so an eviction
    /// can never interleave with a `record` on the same identity.
    pub fn prune_all(&self, now: i64) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.prune(now, self.window_ms) > 0);
        before.saturating_sub(self.windows.len())
    }

    /// Drop the window for `identity`, if any.
    pub fn forget(&self, identity: &str) -> bool {
        self.windows.remove(identity).is_some()
    }

    /// Number of timestamps currently held for `identity`, without pruning.
    pub fn count(&self, identity: &str) -> Option<usize> {
        self.windows.get(identity).map(|w| w.len())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.windows.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
