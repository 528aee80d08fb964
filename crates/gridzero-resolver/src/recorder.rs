//! Audit recording of round outcomes and player participation.
//!
//! Write-only from the pipeline's side: settlement never reads these
//! records back, and a failed write is logged without affecting the round.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use gridzero_types::{GridzeroError, ParticipationRecord, Result, RoundRecord};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record_round(&self, record: &RoundRecord) -> Result<()>;

    async fn record_participation(&self, record: &ParticipationRecord) -> Result<()>;
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum AuditEntry {
    Round(RoundRecord),
    Participation(ParticipationRecord),
}

/// Writes records to the structured log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

#[async_trait]
impl EventRecorder for TracingRecorder {
    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        info!(
            target: "gridzero::audit",
            round = record.round_id.0,
            outcome = %record.outcome,
            winner = record.winning_cell.map(|c| c.0),
            bonus = record.is_bonus_round,
            players = record.total_players,
            block = record.block_number,
            "round recorded"
        );
        Ok(())
    }

    async fn record_participation(&self, record: &ParticipationRecord) -> Result<()> {
        info!(
            target: "gridzero::audit",
            round = record.round_id.0,
            picks = record.picks.len(),
            "participation recorded"
        );
        Ok(())
    }
}

/// Append-only JSON-lines file.
#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlRecorder {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| GridzeroError::Io(format!("open audit log {}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventRecorder for JsonlRecorder {
    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        self.append(&AuditEntry::Round(record.clone())).await
    }

    async fn record_participation(&self, record: &ParticipationRecord) -> Result<()> {
        self.append(&AuditEntry::Participation(record.clone())).await
    }
}

/// Keeps records in memory. Used by tests and embedders that ship records
/// elsewhere themselves.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn rounds(&self) -> Vec<RoundRecord> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                AuditEntry::Round(r) => Some(r),
                AuditEntry::Participation(_) => None,
            })
            .collect()
    }

    pub fn participation(&self) -> Vec<ParticipationRecord> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                AuditEntry::Participation(p) => Some(p),
                AuditEntry::Round(_) => None,
            })
            .collect()
    }

    fn push(&self, entry: AuditEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| GridzeroError::Internal("memory recorder lock poisoned".into()))?
            .push(entry);
        Ok(())
    }
}

#[async_trait]
impl EventRecorder for MemoryRecorder {
    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        self.push(AuditEntry::Round(record.clone()))
    }

    async fn record_participation(&self, record: &ParticipationRecord) -> Result<()> {
        self.push(AuditEntry::Participation(record.clone()))
    }
}
