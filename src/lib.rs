// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request Governor
//!
//! In-process protection for a public API against abusive clients:
//!
//! - Per-client sliding-window request counting
//! - Automatic ban of clients exceeding the limit (25 per 10s default)
//! - Durable JSON ban table, rewritten on every change
//! - Append-only audit trail written off the request path
//! - Background eviction of idle client windows
//! - Secret-guarded admin unban

pub mod admin;
pub mod audit;
pub mod bans;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod window;

pub use admin::{AdminControl, UnbanOutcome};
pub use bans::{BanRecord, BanStore};
pub use config::Config;
pub use error::{AdminError, ConfigError};
pub use limiter::{Decision, RateLimiter};
