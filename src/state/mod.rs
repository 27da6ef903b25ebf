//! State manager: durable checkpoints for a run's [`RunnerState`], plus an
//! append-only execution log.
//!
//! Persistence is atomic write-then-rename: a crash during save must never
//! leave a partially written file. The log is kept in a
//! sibling newline-delimited JSON file so appending a line doesn't require
//! rewriting the whole snapshot.

use crate::errors::RunnerResult;
use crate::model::{LogEntry, LogLevel, RunnerState};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct StateManager {
    state_dir: PathBuf,
    run_id: String,
}

impl StateManager {
    pub fn new(state_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            state_dir: state_dir.into(),
            run_id: run_id.into(),
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}.json", self.run_id))
    }

    fn log_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}.log.jsonl", self.run_id))
    }

    pub fn has_state(&self) -> bool {
        self.snapshot_path().exists()
    }

    /// Atomically persists `state`: serialize to a temp file in the same
    /// directory, then rename over the target. Rename is atomic on the same
    /// filesystem, so a crash mid-write leaves the previous snapshot intact.
    pub fn save_state(&self, state: &RunnerState) -> RunnerResult<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let target = self.snapshot_path();
        let tmp = tmp_path(&target);

        let serialized = serde_json::to_vec_pretty(state)?;
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&serialized)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &target)?;
        debug!(run_id = %self.run_id, "state checkpoint saved");
        Ok(())
    }

    pub fn load_state(&self) -> RunnerResult<RunnerState> {
        let raw = std::fs::read(self.snapshot_path())?;
        let mut state: RunnerState = serde_json::from_slice(&raw)?;
        state.execution_log = self.read_log()?;
        Ok(state)
    }

    fn read_log(&self) -> RunnerResult<Vec<LogEntry>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Appends a structured log entry to the NDJSON sidecar and mirrors it
    /// onto `state.execution_log` so the in-memory record and the next
    /// `load_state` agree without re-reading the file. Error-level entries
    /// carry up to 5 backtrace frames.
    pub fn add_execution_log(
        &self,
        state: &mut RunnerState,
        level: LogLevel,
        message: impl Into<String>,
        backtrace: Vec<String>,
    ) -> RunnerResult<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let entry = LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
            backtrace: backtrace.into_iter().take(5).collect(),
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{line}")?;
        state.execution_log.push(entry);
        Ok(())
    }

    /// Records an answered question, keyed by `question_<n>`, directly on
    /// the current snapshot.
    pub fn add_user_input(&self, state: &mut RunnerState, key: impl Into<String>, value: impl Into<String>) -> RunnerResult<()> {
        state.user_input.insert(key.into(), value.into());
        self.save_state(state)?;
        info!(run_id = %self.run_id, "recorded user input and re-checkpointed");
        Ok(())
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
