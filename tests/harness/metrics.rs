// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for abuse simulation results.

use request_governor::Decision;
use std::collections::HashMap;

/// Possible outcomes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    Denied,
    NewlyBanned,
}

impl From<&Decision> for Outcome {
    fn from(decision: &Decision) -> Self {
        match decision {
            Decision::Allow { .. } => Self::Allowed,
            Decision::Deny { .. } => Self::Denied,
            Decision::NewlyBanned { .. } => Self::NewlyBanned,
        }
    }
}

/// Collects outcomes during a scenario run.
#[derive(Debug, Default)]
pub struct ScenarioMetrics {
    outcomes: HashMap<Outcome, usize>,
    allowed_per_identity: HashMap<String, usize>,
    requests_per_identity: HashMap<String, usize>,
}

impl ScenarioMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the decision for one request.
    pub fn record(&mut self, identity: &str, decision: &Decision) {
        let outcome = Outcome::from(decision);
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self
            .requests_per_identity
            .entry(identity.to_string())
            .or_insert(0) += 1;
        if outcome == Outcome::Allowed {
            *self
                .allowed_per_identity
                .entry(identity.to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Most requests any single identity got through.
    pub fn max_allowed_per_identity(&self) -> usize {
        self.allowed_per_identity.values().copied().max().unwrap_or(0)
    }

    pub fn unique_identities(&self) -> usize {
        self.requests_per_identity.len()
    }

    /// Ratio of refused to total requests.
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        (total - self.count(Outcome::Allowed)) as f64 / total as f64
    }
}

impl std::fmt::Display for ScenarioMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scenario Report ===")?;
        writeln!(f, "Total Requests:    {}", self.total_requests())?;
        writeln!(f, "Allowed:           {}", self.count(Outcome::Allowed))?;
        writeln!(f, "Newly Banned:      {}", self.count(Outcome::NewlyBanned))?;
        writeln!(f, "Denied:            {}", self.count(Outcome::Denied))?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate() * 100.0)?;
        writeln!(f, "Unique Identities: {}", self.unique_identities())?;
        Ok(())
    }
}
