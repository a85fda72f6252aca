// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for request governor abuse simulation.
//!
//! Scenarios drive the limiter with a simulated clock so window behaviour is
//! deterministic regardless of how fast the test machine is.

#![allow(dead_code)]

pub mod attacks;
pub mod generators;
pub mod metrics;

use request_governor::config::RateLimitConfig;
use request_governor::RateLimiter;
use std::sync::Arc;
use tempfile::TempDir;

/// Open a limiter with its state under `dir`.
pub fn open_limiter(dir: &TempDir, max_requests: u32, window_ms: u64) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::open(limiter_config(dir, max_requests, window_ms)).unwrap())
}

/// Config pointing the ban table and audit log into `dir`.
pub fn limiter_config(dir: &TempDir, max_requests: u32, window_ms: u64) -> RateLimitConfig {
    RateLimitConfig {
        max_requests,
        window_ms,
        data_dir: dir.path().join("data"),
        log_dir: dir.path().join("logs"),
        ..Default::default()
    }
}
