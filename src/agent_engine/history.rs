use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::DeskPilotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    SessionStart,
    Request,
    RawResponse,
    Parsed,
    AttemptFailed,
    DuplicateBlocked,
    CycleFailed,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: i64,
    pub step: usize,
    pub kind: LogKind,
    pub content: serde_json::Value,
}

/// Append-only diagnostic log for one agent session, one JSON object per line.
///
/// Best-effort: write failures are logged at debug level and dropped.
pub struct SessionLog {
    pub session_id: String,
    file_path: Option<PathBuf>,
}

impl SessionLog {
    /// Log into `dir`, or into the per-user data directory when `None`.
    pub fn new(dir: Option<&Path>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(data_dir_or_cwd);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::debug!(error = %e, dir = %dir.display(), "cannot create session log dir");
        }
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path: Some(file_path),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            file_path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn record(&self, step: usize, kind: LogKind, content: serde_json::Value) {
        let entry = LogEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            step,
            kind,
            content,
        };
        if let Err(e) = self.append(&entry) {
            tracing::debug!(error = %e, ?kind, "session log write dropped");
        }
    }

    fn append(&self, entry: &LogEntry) -> DeskPilotResult<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// `<data_local_dir>/deskpilot/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("deskpilot").join("sessions");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Read back a session log, skipping lines that fail to parse.
pub fn read_log(path: &Path) -> DeskPilotResult<Vec<LogEntry>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
