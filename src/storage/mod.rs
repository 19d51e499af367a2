//! # Storage Module - Message Log
//!
//! Keeps every received and sent text message as one JSON object per line:
//!
//! ```text
//! data/
//! └── messages.jsonl   ← append-only message log
//! ```
//!
//! Appends take an exclusive `fs2` lock on the log so the poll worker and a
//! manual send never interleave partial lines.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsbridge::storage::{Direction, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Storage::new("./data").await?;
//!     storage.record("+15551234567", "Hello", Direction::In).await?;
//!     for msg in storage.recent(10).await? {
//!         println!("{} {}: {}", msg.created_at, msg.remote, msg.content);
//!     }
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::warn;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const MESSAGES_FILE: &str = "messages.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub remote: String,
    pub content: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Initialize storage with the given data directory
    pub async fn new(data_dir: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| anyhow!("Failed to create data directory {}: {}", data_dir, e))?;
        Ok(Storage {
            data_dir: PathBuf::from(data_dir),
        })
    }

    pub fn messages_path(&self) -> PathBuf {
        self.data_dir.join(MESSAGES_FILE)
    }

    /// Append one message to the log and return it.
    pub async fn record(&self, remote: &str, content: &str, direction: Direction) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            remote: remote.to_string(),
            content: content.to_string(),
            direction,
            created_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&message)
            .map_err(|e| anyhow!("Failed to serialize message: {}", e))?;
        line.push('\n');
        Self::append_line_locked(&self.messages_path(), &line).await?;
        Ok(message)
    }

    /// Helper function to append a line with exclusive locking
    async fn append_line_locked(path: &Path, line: &str) -> Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;

        // fs2 locks are synchronous; the critical section is a single short write
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
        file.lock_exclusive()
            .map_err(|e| anyhow!("Failed to lock {}: {}", path.display(), e))?;
        let result = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let _ = file.unlock();
        result.map_err(|e| anyhow!("Failed to append to {}: {}", path.display(), e))
    }

    /// The `limit` most recent messages, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        let path = self.messages_path();
        let data = match fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(anyhow!("Failed reading {}: {}", path.display(), e)),
        };
        let mut messages = Vec::new();
        for (lineno, line) in data.lines().enumerate() {
            let line = line.trim_start_matches('\0').trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("Skipping unreadable line {} in {}: {}", lineno + 1, path.display(), e),
            }
        }
        Ok(messages.into_iter().rev().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let s = Storage::new(dir.path().join("data").to_str().unwrap())
            .await
            .unwrap();
        (dir, s)
    }

    #[tokio::test]
    async fn empty_store_has_no_messages() {
        let (_dir, s) = storage().await;
        assert!(s.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let (_dir, s) = storage().await;
        s.record("+1", "first", Direction::In).await.unwrap();
        s.record("+2", "second", Direction::Out).await.unwrap();
        s.record("+3", "third\nline", Direction::In).await.unwrap();
        let got = s.recent(2).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].content, "third\nline");
        assert_eq!(got[1].remote, "+2");
        assert_eq!(got[1].direction, Direction::Out);
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let (_dir, s) = storage().await;
        s.record("+1", "ok", Direction::In).await.unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(s.messages_path())
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"{not json\n"))
            .unwrap();
        s.record("+2", "also ok", Direction::In).await.unwrap();
        let got = s.recent(10).await.unwrap();
        let remotes: Vec<&str> = got.iter().map(|m| m.remote.as_str()).collect();
        assert_eq!(remotes, vec!["+2", "+1"]);
    }

    #[tokio::test]
    async fn direction_serializes_lowercase() {
        let (_dir, s) = storage().await;
        s.record("+1", "x", Direction::Out).await.unwrap();
        let raw = std::fs::read_to_string(s.messages_path()).unwrap();
        assert!(raw.contains("\"direction\":\"out\""));
    }
}
