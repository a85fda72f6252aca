// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the request governor.
//!
//! Only [`ConfigError`] and [`AdminError`] ever reach a caller. Persistence
//! and audit failures are logged at the component that hit them and the
//! governor keeps serving.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or unusable configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_requests must be greater than zero")]
    ZeroMaxRequests,

    #[error("window must be greater than zero")]
    ZeroWindow,

    #[error("reaper interval must be greater than zero")]
    ZeroReaperInterval,

    #[error("audit queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("{0} directory path is empty")]
    EmptyPath(&'static str),

    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidVar { var: &'static str, value: String },

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Failure reading or writing the ban table file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("ban table I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ban table in {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot serialize ban table: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure appending to the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejection of an administrative request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdminError {
    /// Secret missing or wrong.
    #[error("unauthorized: provide a valid admin key")]
    Unauthorized,

    /// The server has no admin secret configured.
    #[error("admin key not configured on server")]
    NotConfigured,

    /// The request did not name an identity.
    #[error("provide ip in request body to unban")]
    MissingIdentity,
}

impl AdminError {
    /// HTTP status the boundary should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotConfigured | Self::MissingIdentity => 400,
        }
    }
}
