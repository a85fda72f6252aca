// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Durable ban table.
//!
//! The in-memory table is the source of truth and the JSON file mirrors it.
//! Every mutation rewrites the whole file before returning, so a ban
//! survives a crash right after it was issued. Read and write failures are
//! logged and never stop the governor from answering.

use crate::error::PersistenceError;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Issuer tag recorded on automatic bans.
pub const RATE_LIMITER_ISSUER: &str = "rateLimiter";

/// A banned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    /// Table key; not repeated inside the persisted value.
    #[serde(skip)]
    pub identity: String,
    /// RFC3339 UTC timestamp
    pub banned_at: String,
    pub reason: String,
    /// Who issued the ban
    pub by: String,
}

type BanTable = BTreeMap<String, BanRecord>;

/// File-backed table of banned identities.
#[derive(Debug)]
pub struct BanStore {
    path: PathBuf,
    table: RwLock<BanTable>,
}

impl BanStore {
    /// Open the ban table at `path`, creating an empty one if absent.
    ///
    /// An unreadable or corrupt file yields an empty table.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let table = match load(&path) {
            Ok(Some(table)) => {
                info!(path = %path.display(), bans = table.len(), "Loaded ban table");
                table
            }
            Ok(None) => {
                let table = BanTable::new();
                if let Err(err) = persist(&path, &table) {
                    error!(error = %err, "Failed to create ban table");
                }
                table
            }
            Err(err) => {
                warn!(error = %err, "Ban table unreadable, starting with no bans");
                BanTable::new()
            }
        };

        Self {
            path,
            table: RwLock::new(table),
        }
    }

    /// Ban `identity`, overwriting any existing record, and persist.
    pub fn ban(&self, identity: &str, reason: &str) -> BanRecord {
        let record = new_record(identity, reason);
        let mut table = self.table.write();
        table.insert(identity.to_string(), record.clone());
        self.persist_locked(&table);
        record
    }

    /// Ban `identity` unless it is already banned.
    ///
    /// Returns the new record, or `None` if a ban already existed. The check
    /// and the insert happen under one write lock, so concurrent callers
    /// issue exactly one ban.
    pub fn ban_if_absent(&self, identity: &str, reason: &str) -> Option<BanRecord> {
        let mut table = self.table.write();
        if table.contains_key(identity) {
            return None;
        }
        let record = new_record(identity, reason);
        table.insert(identity.to_string(), record.clone());
        self.persist_locked(&table);
        Some(record)
    }

    /// Lift the ban on `identity`. Returns whether a ban existed.
    pub fn unban(&self, identity: &str) -> bool {
        let mut table = self.table.write();
        if table.remove(identity).is_none() {
            return false;
        }
        self.persist_locked(&table);
        true
    }

    /// Look up the ban record for `identity`.
    pub fn get(&self, identity: &str) -> Option<BanRecord> {
        self.table.read().get(identity).cloned()
    }

    pub fn is_banned(&self, identity: &str) -> bool {
        self.table.read().contains_key(identity)
    }

    /// All current bans ordered by identity.
    pub fn list(&self) -> Vec<BanRecord> {
        self.table.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Called with the write lock held so file order matches mutation order.
    fn persist_locked(&self, table: &BanTable) {
        if let Err(err) = persist(&self.path, table) {
            error!(error = %err, "Failed to persist ban table");
        }
    }
}

fn new_record(identity: &str, reason: &str) -> BanRecord {
    BanRecord {
        identity: identity.to_string(),
        banned_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        reason: reason.to_string(),
        by: RATE_LIMITER_ISSUER.to_string(),
    }
}

fn load(path: &Path) -> Result<Option<BanTable>, PersistenceError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut table: BanTable =
        serde_json::from_str(&data).map_err(|source| PersistenceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    for (identity, record) in table.iter_mut() {
        record.identity.clone_from(identity);
    }
    Ok(Some(table))
}

fn persist(path: &Path, table: &BanTable) -> Result<(), PersistenceError> {
    let data = serde_json::to_string_pretty(table)?;
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
