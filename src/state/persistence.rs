//! Component A: snapshot persistence and the append-only audit log.
//!
//! Snapshots are written atomically (temp file + rename) so a reader never observes a
//! half-written `state.json`. The audit log is append-only, daily-rotated, one JSON
//! record per line; records are never rewritten or deleted.

use chrono::Utc;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::state::store::StateSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: chrono::DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub armed_mode: bool,
    pub approved_by: Option<String>,
    pub params_hash: String,
    pub before_snapshot_id: Option<String>,
    pub result_artifact_id: Option<String>,
    pub outcome: AuditOutcome,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Blocked,
}

pub struct Persistence {
    state_root: PathBuf,
}

impl Persistence {
    pub fn new(state_root: impl Into<PathBuf>) -> Result<Self> {
        let state_root = state_root.into();
        std::fs::create_dir_all(state_root.join("state").join("snapshots"))?;
        std::fs::create_dir_all(state_root.join("state").join("audit"))?;
        std::fs::create_dir_all(state_root.join("state").join("storage"))?;
        Ok(Self { state_root })
    }

    fn main_snapshot_path(&self) -> PathBuf {
        self.state_root.join("state").join("state.json")
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.state_root.join("state").join("snapshots")
    }

    fn audit_dir(&self) -> PathBuf {
        self.state_root.join("state").join("audit")
    }

    /// Atomically writes the main `state.json` snapshot: serialize to a temp file in
    /// the same directory, then rename over the target so readers never see a
    /// partial write.
    pub fn save_main_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.atomic_write(&self.main_snapshot_path(), snapshot)
    }

    pub fn load_main_snapshot(&self) -> Result<Option<StateSnapshot>> {
        let path = self.main_snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let snapshot: StateSnapshot = serde_json::from_str(&data)?;
        Ok(Some(snapshot))
    }

    /// Writes a retained, labeled snapshot named `<UTC>_<label>.json`. Called before
    /// `spawn_agent_immediate`, self-heal application, mission completion, any
    /// destructive action, and circuit-breaker trip/reset.
    pub fn write_labeled_snapshot(&self, snapshot: &StateSnapshot, label: &str) -> Result<PathBuf> {
        let filename = format!("{}_{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), label);
        let path = self.snapshots_dir().join(filename);
        self.atomic_write(&path, snapshot)?;
        self.prune_old_snapshots()?;
        Ok(path)
    }

    fn prune_old_snapshots(&self) -> Result<()> {
        let dir = self.snapshots_dir();
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .collect();
        if entries.len() <= crate::constants::MAX_RETAINED_SNAPSHOTS {
            return Ok(());
        }
        entries.sort_by_key(|e| e.file_name());
        let overflow = entries.len() - crate::constants::MAX_RETAINED_SNAPSHOTS;
        for entry in entries.into_iter().take(overflow) {
            let _ = std::fs::remove_file(entry.path());
        }
        Ok(())
    }

    fn atomic_write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            let json = serde_json::to_vec_pretty(value)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Appends one audit record as a JSON line to today's rotated audit file. Never
    /// rewritten or truncated.
    pub fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let filename = format!("audit_{}.jsonl", record.timestamp.format("%Y-%m-%d"));
        let path = self.audit_dir().join(filename);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
