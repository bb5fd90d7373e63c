use crate::errors::ConsoleError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 10 * 1024 * 1024;
/// The live file rolls over at this fraction of the directory budget.
const ROTATE_PARTS: u64 = 4;

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: 4096,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget_bytes = budget_bytes;
        self
    }

    /// Live file size at which it is rolled over to a numbered sibling.
    pub fn max_file_bytes(&self) -> u64 {
        (self.budget_bytes / ROTATE_PARTS).max(1)
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), ConsoleError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConsoleError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| ConsoleError::Io(e.to_string()))?;

        self.rotate_if_full(line.len() as u64 + 1)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ConsoleError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ConsoleError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| ConsoleError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = enforce_total_budget(parent, self.budget_bytes, &self.path)?;
            }
        }

        Ok(())
    }

    fn rotate_if_full(&self, incoming: u64) -> Result<(), ConsoleError> {
        let Ok(meta) = fs::metadata(&self.path) else {
            return Ok(());
        };
        let current = meta.len();
        if current == 0 || current + incoming <= self.max_file_bytes() {
            return Ok(());
        }
        fs::rename(&self.path, self.rotated_path()).map_err(|e| ConsoleError::Io(e.to_string()))
    }

    /// `console.jsonl` rolls over to `console.<nanos>.jsonl`, so rotated
    /// names sort in creation order.
    fn rotated_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        let mut stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        loop {
            let candidate = self
                .path
                .with_file_name(format!("{stem}.{stamp:020}.jsonl"));
            if !candidate.exists() {
                return candidate;
            }
            stamp += 1;
        }
    }
}

/// Installs the process-wide logger used by [`log_event`].
pub fn init_run_logger(logger: JsonlLogger) {
    let slot = RUN_LOGGER.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(logger);
    }
}

/// Appends to the installed logger. Without one this does nothing, and write
/// failures never reach the caller.
pub fn log_event(level: &str, event_type: &str, payload: Value) {
    let Some(slot) = RUN_LOGGER.get() else {
        return;
    };
    let Ok(guard) = slot.lock() else {
        return;
    };
    if let Some(logger) = guard.as_ref() {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

pub fn structured_fallback_line(run_id: Option<u64>, phase: &str, message: &str) -> String {
    let run = run_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    format!(
        "run_id={run} phase={phase} message={}",
        message.replace('\n', "\\n")
    )
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
