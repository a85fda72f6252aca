// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Administrative control over the ban table.
//!
//! Every operation is authorized by a shared secret configured on the
//! server. The secret is checked before anything else, so a caller without
//! it learns nothing about which identities are banned.

use crate::bans::BanRecord;
use crate::config::AdminConfig;
use crate::error::AdminError;
use crate::limiter::RateLimiter;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Outcome of an authorized unban request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbanOutcome {
    Unbanned,
    NotFound,
}

/// Secret-guarded admin operations.
#[derive(Debug, Clone)]
pub struct AdminControl {
    secret: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl AdminControl {
    pub fn new(config: &AdminConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            limiter,
        }
    }

    /// Lift the ban on `identity`.
    pub fn unban(
        &self,
        provided_secret: Option<&str>,
        identity: Option<&str>,
    ) -> Result<UnbanOutcome, AdminError> {
        self.authorize(provided_secret)?;

        let identity = identity
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(AdminError::MissingIdentity)?;

        if self.limiter.unban(identity) {
            info!(identity = %identity, "Admin lifted ban");
            Ok(UnbanOutcome::Unbanned)
        } else {
            Ok(UnbanOutcome::NotFound)
        }
    }

    /// List every current ban.
    pub fn list_bans(&self, provided_secret: Option<&str>) -> Result<Vec<BanRecord>, AdminError> {
        self.authorize(provided_secret)?;
        Ok(self.limiter.bans())
    }

    /// Check a caller-presented secret against the configured one.
    pub fn authorize(&self, provided: Option<&str>) -> Result<(), AdminError> {
        let Some(expected) = self.secret.as_deref() else {
            warn!("Admin request rejected, no admin key configured");
            return Err(AdminError::NotConfigured);
        };
        match provided {
            Some(provided) if secrets_match(provided, expected) => Ok(()),
            _ => {
                warn!("Admin request with invalid key");
                Err(AdminError::Unauthorized)
            }
        }
    }
}

fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
