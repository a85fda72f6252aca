// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only audit trail.
//!
//! Entries are queued on a bounded channel and written by a single
//! background task, one line per event:
//!
//! ```text
//! [TAG] <RFC3339-UTC> <identity> <context...>
//! ```
//!
//! Queueing never blocks. When the queue is full or the worker is gone the
//! entry is dropped; I/O errors in the worker are logged and the entry is
//! lost. The audit trail is best effort.

use crate::error::AuditError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditTag {
    Request,
    Ban,
    Unban,
    BlockedRequest,
}

impl AuditTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "REQ",
            Self::Ban => "BAN",
            Self::Unban => "UNBAN",
            Self::BlockedRequest => "BLOCKED_REQ",
        }
    }
}

impl fmt::Display for AuditTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit entry, timestamped when created.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub tag: AuditTag,
    pub at: DateTime<Utc>,
    pub identity: String,
    pub context: String,
}

impl AuditEvent {
    fn new(tag: AuditTag, identity: &str, context: String) -> Self {
        Self {
            tag,
            at: Utc::now(),
            identity: identity.to_string(),
            context,
        }
    }

    /// An admitted or rate-limited request; `count` is the in-window count.
    pub fn request(identity: &str, context: &str, count: usize) -> Self {
        Self::new(AuditTag::Request, identity, join(context, &format!("count={count}")))
    }

    /// A request refused because the identity is banned.
    pub fn blocked(identity: &str, context: &str) -> Self {
        Self::new(AuditTag::BlockedRequest, identity, join(context, "- blocked"))
    }

    pub fn ban(identity: &str, reason: &str) -> Self {
        Self::new(AuditTag::Ban, identity, format!("reason={reason}"))
    }

    pub fn unban(identity: &str) -> Self {
        Self::new(AuditTag::Unban, identity, String::new())
    }
}

fn join(context: &str, suffix: &str) -> String {
    if context.is_empty() {
        suffix.to_string()
    } else {
        format!("{context} {suffix}")
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.tag,
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.identity
        )?;
        if !self.context.is_empty() {
            write!(f, " {}", self.context)?;
        }
        Ok(())
    }
}

enum Command {
    Append(AuditEvent),
    Flush(oneshot::Sender<()>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append(event) => write!(f, "Append({event})"),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

/// Handle to the audit log writer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<Command>,
    dropped: Arc<AtomicU64>,
    path: PathBuf,
}

impl AuditLog {
    /// Create the log file if needed and start the background writer
    /// appending to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        if let Err(err) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            warn!(path = %path.display(), error = %err, "Failed to create audit log");
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(writer(rx, path.clone()));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            path,
        }
    }

    /// Queue an entry without waiting. Returns false if it was dropped.
    pub fn record(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(Command::Append(event)) {
            Ok(()) => true,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "Audit entry dropped");
                false
            }
        }
    }

    /// Wait until every entry queued before this call has been handled.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Entries dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn writer(mut rx: mpsc::Receiver<Command>, path: PathBuf) {
    let mut file = None;
    while let Some(command) = rx.recv().await {
        match command {
            Command::Append(event) => {
                if let Err(err) = append(&path, &mut file, &event).await {
                    warn!(error = %err, tag = %event.tag, "Audit entry lost");
                    // Reopen on the next entry.
                    file = None;
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Audit writer stopped");
}

async fn append(
    path: &Path,
    file: &mut Option<File>,
    event: &AuditEvent,
) -> Result<(), AuditError> {
    let io_err = |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    };
    if file.is_none() {
        let opened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_err)?;
        *file = Some(opened);
    }
    if let Some(handle) = file.as_mut() {
        handle
            .write_all(format!("{event}\n").as_bytes())
            .await
            .map_err(io_err)?;
        handle.flush().await.map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_line_format() {
        let event = AuditEvent::request("198.51.100.4", "GET /api/search", 3);
        let line = event.to_string();
        assert!(line.starts_with("[REQ] "));
        assert!(line.ends_with(" 198.51.100.4 GET /api/search count=3"));

        let ts = line.split(' ').nth(1).unwrap();
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_tags() {
        assert!(AuditEvent::ban("a", "x").to_string().starts_with("[BAN] "));
        assert!(AuditEvent::ban("a", "x").to_string().ends_with(" a reason=x"));
        assert!(AuditEvent::unban("a").to_string().starts_with("[UNBAN] "));
        assert!(AuditEvent::unban("a").to_string().ends_with(" a"));
        let blocked = AuditEvent::blocked("a", "").to_string();
        assert!(blocked.starts_with("[BLOCKED_REQ] "));
        assert!(blocked.ends_with(" a - blocked"));
    }

    #[tokio::test]
    async fn test_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::spawn(dir.path().join("request-logs.log"), 16);
        assert!(log.record(AuditEvent::ban("a", "spam")));
        assert!(log.record(AuditEvent::unban("a")));
        log.flush().await;

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[BAN] "));
        assert!(lines[1].starts_with("[UNBAN] "));
    }

    #[tokio::test]
    async fn test_spawn_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("request-logs.log");
        let log = AuditLog::spawn(&path, 4);
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        // Entries go to the same file across several batches.
        for round in 0..3 {
            assert!(log.record(AuditEvent::unban(&format!("10.0.0.{round}"))));
            log.flush().await;
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().last().unwrap().ends_with(" 10.0.0.2"));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::spawn(dir.path().join("missing").join("audit.log"), 4);
        assert!(log.record(AuditEvent::unban("a")));
        log.flush().await;
        // The worker keeps running after a failed write.
        assert!(log.record(AuditEvent::unban("b")));
        log.flush().await;
        assert_eq!(log.dropped(), 0);
    }
}
