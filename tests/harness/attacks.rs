// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Abuse patterns replayed against the limiter on a simulated clock.

use super::generators;
use super::metrics::ScenarioMetrics;
use request_governor::RateLimiter;

/// Scenario configuration.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Simulated milliseconds between consecutive requests
    pub interval_ms: i64,
    /// Number of distinct identities, used round-robin
    pub unique_identities: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            interval_ms: 100,
            unique_identities: 1,
        }
    }
}

/// Predefined abuse patterns.
impl ScenarioConfig {
    /// One client hammering the API.
    pub fn single_client_flood() -> Self {
        Self {
            total_requests: 200,
            interval_ms: 10,
            unique_identities: 1,
        }
    }

    /// Many clients, each staying under the limit.
    pub fn distributed_low_rate() -> Self {
        Self {
            total_requests: 500,
            interval_ms: 10,
            unique_identities: 100,
        }
    }

    /// One client pacing itself just under the limit.
    pub fn slow_drip(max_requests: u32, window_ms: u64) -> Self {
        Self {
            total_requests: 100,
            // One request more than a window apart per `max_requests` slots.
            interval_ms: (window_ms / u64::from(max_requests)) as i64 + 1,
            unique_identities: 1,
        }
    }
}

/// Replay `config` against `limiter` starting at `start` ms.
pub fn run_scenario(limiter: &RateLimiter, config: &ScenarioConfig, start: i64) -> ScenarioMetrics {
    let identities = generators::generate_identities(config.unique_identities);
    let mut metrics = ScenarioMetrics::new();

    for i in 0..config.total_requests {
        let identity = &identities[i % identities.len()];
        let now = start + i as i64 * config.interval_ms;
        let decision = limiter.admit_with_context(identity, now, "GET /api/test");
        metrics.record(identity, &decision);
    }

    metrics
}
