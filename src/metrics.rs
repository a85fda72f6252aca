// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for admission decisions.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Governor metrics, registered on a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Admission decisions by outcome (`allow`, `deny`, `banned`)
    pub decisions: IntCounterVec,
    /// Identities with a live window
    pub tracked_identities: IntGauge,
    /// Entries in the ban table
    pub active_bans: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("governor_decisions_total", "Admission decisions by outcome"),
            &["outcome"],
        )?;
        let tracked_identities = IntGauge::new(
            "governor_tracked_identities",
            "Identities with a live request window",
        )?;
        let active_bans = IntGauge::new("governor_active_bans", "Entries in the ban table")?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(tracked_identities.clone()))?;
        registry.register(Box::new(active_bans.clone()))?;

        Ok(Self {
            registry,
            decisions,
            tracked_identities,
            active_bans,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.decisions.with_label_values(&["allow"]).inc();
        metrics.active_bans.set(2);
        let text = metrics.render().unwrap();
        assert!(text.contains("governor_decisions_total{outcome=\"allow\"} 1"));
        assert!(text.contains("governor_active_bans 2"));
    }
}
