use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::transform::{ExtractionResult, Gender};

/// What the caller hands over once a transform finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub style_text: String,
    pub subject_gender: Gender,
    pub model_id: String,
    pub result: ExtractionResult,
    /// Local path the artifact was written to, when one exists.
    pub artifact_path: Option<String>,
}

/// A persisted transform, one JSON document per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub created_at: String,
    pub style_text: String,
    pub subject_gender: Gender,
    pub model_id: String,
    pub result: ExtractionResult,
    pub artifact_path: Option<String>,
}

/// Keyed file store for finished transforms. The transform core never touches
/// this; it is the caller-side collaborator that keeps results around.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Assigns a fresh id and timestamp, writes `{id}.json`, and returns the
    /// persisted record.
    pub fn save(&self, entry: NewHistoryEntry) -> anyhow::Result<HistoryRecord> {
        let record = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            style_text: entry.style_text,
            subject_gender: entry.subject_gender,
            model_id: entry.model_id,
            result: entry.result,
            artifact_path: entry.artifact_path,
        };

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed creating {}", self.dir.display()))?;
        let path = self.record_path(&record.id);
        let raw = serde_json::to_string_pretty(&record)?;
        fs::write(&path, raw).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<HistoryRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let record = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt history record {}", path.display()))?;
        Ok(Some(record))
    }

    /// All records, newest first. Unreadable files are skipped rather than
    /// failing the whole listing.
    pub fn list(&self) -> anyhow::Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(records),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(record) = serde_json::from_str::<HistoryRecord>(&raw) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
