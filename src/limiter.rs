// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter with automatic bans.
//!
//! Every request is checked against the ban table first. Clients that are
//! not banned get the request recorded in their window; the request that
//! pushes a window past `max_requests` bans the client. Bans are permanent
//! until lifted through [`RateLimiter::unban`].
//!
//! Ban checks, window updates and ban issuance run inline on the caller.
//! Audit entries are handed to the background [`AuditLog`] writer.

use crate::audit::{AuditEvent, AuditLog};
use crate::bans::{BanRecord, BanStore};
use crate::config::RateLimitConfig;
use crate::error::ConfigError;
use crate::metrics::Metrics;
use crate::window::WindowMap;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reason reported for requests from banned clients.
pub const BANNED_REASON: &str = "banned";

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Request may proceed
    Allow {
        /// Requests in the current window, this one included
        count: usize,
    },
    /// Client is banned
    Deny {
        reason: String,
        record: BanRecord,
    },
    /// This request crossed the limit and the client is now banned
    NewlyBanned { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Human-readable reason for a refusal.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { reason, .. } | Self::NewlyBanned { reason } => Some(reason),
        }
    }

    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Deny { .. } => "deny",
            Self::NewlyBanned { .. } => "banned",
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Process-wide rate limiter. Share it as `Arc<RateLimiter>`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    ban_reason: String,
    windows: WindowMap,
    bans: BanStore,
    audit: AuditLog,
    metrics: Metrics,
}

impl RateLimiter {
    /// Create state directories, load the ban table and start the audit
    /// writer. Must be called from within a Tokio runtime.
    pub fn open(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        ensure_dir(&config.data_dir)?;
        ensure_dir(&config.log_dir)?;

        let metrics = Metrics::new()?;
        let bans = BanStore::open(config.ban_file());
        let audit = AuditLog::spawn(config.audit_file(), config.audit_queue_capacity);
        metrics.active_bans.set(gauge_value(bans.len()));

        if config.ban_duration_secs > 0 {
            info!(
                ban_duration_secs = config.ban_duration_secs,
                "Ban duration is informational, bans last until lifted"
            );
        }

        Ok(Self {
            ban_reason: format!(
                "exceeded_{}_per_{}",
                config.max_requests,
                format_window(config.window())
            ),
            windows: WindowMap::new(config.window_ms),
            bans,
            audit,
            metrics,
            config,
        })
    }

    /// Admission check for `identity` at `now` (ms since the Unix epoch).
    pub fn admit(&self, identity: &str, now: i64) -> Decision {
        self.admit_with_context(identity, now, "")
    }

    /// Admission check carrying request context (e.g. `"GET /path"`) into
    /// the audit trail.
    pub fn admit_with_context(&self, identity: &str, now: i64, context: &str) -> Decision {
        let decision = self.decide(identity, now, context);
        self.metrics
            .decisions
            .with_label_values(&[decision.outcome()])
            .inc();
        decision
    }

    fn decide(&self, identity: &str, now: i64, context: &str) -> Decision {
        // Banned clients are not tracked any further.
        if let Some(record) = self.bans.get(identity) {
            self.audit.record(AuditEvent::blocked(identity, context));
            return Decision::Deny {
                reason: BANNED_REASON.to_string(),
                record,
            };
        }

        let count = self.windows.record(identity, now);
        if count == 1 {
            self.refresh_tracked();
        }
        self.audit.record(AuditEvent::request(identity, context, count));

        if count <= self.config.max_requests as usize {
            return Decision::Allow { count };
        }

        match self.bans.ban_if_absent(identity, &self.ban_reason) {
            Some(_) => {
                warn!(identity = %identity, count, reason = %self.ban_reason, "Client banned");
                self.audit.record(AuditEvent::ban(identity, &self.ban_reason));
                self.windows.forget(identity);
                self.refresh_tracked();
                self.metrics.active_bans.set(gauge_value(self.bans.len()));
                Decision::NewlyBanned {
                    reason: self.ban_reason.clone(),
                }
            }
            // Lost the race to a concurrent request from the same client.
            None => match self.bans.get(identity) {
                Some(record) => Decision::Deny {
                    reason: BANNED_REASON.to_string(),
                    record,
                },
                None => Decision::Allow { count },
            },
        }
    }

    /// Lift a ban. The client's next request starts from an empty window.
    pub fn unban(&self, identity: &str) -> bool {
        if !self.bans.is_banned(identity) {
            return false;
        }
        // Clear the window while the ban still refuses requests, so nothing
        // can record into it between the two steps.
        if self.windows.forget(identity) {
            self.refresh_tracked();
        }
        if !self.bans.unban(identity) {
            return false;
        }
        self.audit.record(AuditEvent::unban(identity));
        self.metrics.active_bans.set(gauge_value(self.bans.len()));
        info!(identity = %identity, "Client unbanned");
        true
    }

    pub fn is_banned(&self, identity: &str) -> Option<BanRecord> {
        self.bans.get(identity)
    }

    /// All current bans ordered by identity.
    pub fn bans(&self) -> Vec<BanRecord> {
        self.bans.list()
    }

    /// Evict windows with no request left inside the window at `now`.
    pub fn sweep(&self, now: i64) -> usize {
        let evicted = self.windows.prune_all(now);
        self.refresh_tracked();
        debug!(evicted, tracked = self.windows.len(), "Swept idle windows");
        evicted
    }

    fn refresh_tracked(&self) {
        self.metrics
            .tracked_identities
            .set(gauge_value(self.windows.len()));
    }

    /// Number of identities with a live window.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    pub fn is_tracked(&self, identity: &str) -> bool {
        self.windows.contains(identity)
    }

    /// Timestamps currently held for `identity`.
    pub fn window_count(&self, identity: &str) -> Option<usize> {
        self.windows.count(identity)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Run [`RateLimiter::sweep`] every `reaper_interval` for the life of the
/// process.
pub fn spawn_reaper(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    let period = limiter.config().reaper_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            limiter.sweep(now_millis());
        }
    })
}

/// Render a window for ban reasons the way Go's `time.Duration` prints:
/// `500ms`, `10s`, `1.5s`, `1m0s`, `1h0m0s`.
fn format_window(window: Duration) -> String {
    let ms = window.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    if ms < 1_000 {
        return format!("{ms}ms");
    }

    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let secs = ms / 1_000 % 60;
    let frac = ms % 1_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&secs.to_string());
    if frac > 0 {
        out.push('.');
        out.push_str(format!("{frac:03}").trim_end_matches('0'));
    }
    out.push('s');
    out
}

fn ensure_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
