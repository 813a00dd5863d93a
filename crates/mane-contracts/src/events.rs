use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::Dialect;

/// One line of a transform run's event log. Every pipeline stage emits
/// exactly one of these shapes; free-form payloads are not accepted, so the
/// log stays machine-readable per event type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformEvent {
    AssessmentStarted,
    AssessmentReady {
        is_realistic: bool,
        feasibility_score: u8,
    },
    AssessmentFailed {
        error: String,
    },
    GenerationStarted {
        model: String,
        dialect: Dialect,
        request_hash: String,
    },
    ImageExtracted {
        model: String,
        image_kind: String,
    },
    TextFallback {
        model: String,
        chars: usize,
    },
    TransformFinished {
        model: String,
        result: String,
    },
}

/// Append-only `events.jsonl` writer, one compact JSON object per line with
/// `transform_id` and `ts` stamped onto every event. The file is opened on
/// first use and the handle is reused for the rest of the run.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    transform_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, transform_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transform_id: transform_id.into(),
            file: Mutex::new(None),
        }
    }

    pub fn record(&self, event: &TransformEvent) -> anyhow::Result<()> {
        let mut row = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("event serialized to a non-object: {other}"),
        };
        row.insert(
            "transform_id".to_string(),
            Value::String(self.transform_id.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));
        let line = serde_json::to_string(&Value::Object(row))?;

        let mut guard = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
