//! JSON persistence of the dataset and the per-phase record sets
//!
//! All files live in one data directory:
//!
//! | file                      | content                    |
//! |---------------------------|----------------------------|
//! | `dataset.json`            | input items                |
//! | `analysis.json`           | consensus records          |
//! | `analysis_verified.json`  | verified records           |
//! | `analysis_hybrid.json`    | hybrid records             |
//!
//! Record sets are written pretty-printed through a temporary file and a
//! rename, so an interrupted run never leaves a truncated file behind.

use crate::core::judgment::{Category, Item, ItemId, Phase, Record, Sentiment};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Input dataset file name
pub const DATASET_FILE: &str = "dataset.json";

/// Record file name of a phase
pub fn phase_file(phase: Phase) -> &'static str {
    match phase {
        Phase::Consensus => "analysis.json",
        Phase::Verified => "analysis_verified.json",
        Phase::Hybrid => "analysis_hybrid.json",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path} not found")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate id {id} in {path}")]
    DuplicateId { path: PathBuf, id: ItemId },
}

/// Data directory handle
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.dir.join(DATASET_FILE)
    }

    pub fn phase_path(&self, phase: Phase) -> PathBuf {
        self.dir.join(phase_file(phase))
    }

    /// Load the input items; ids must be unique
    pub async fn load_items(&self) -> Result<Vec<Item>, StoreError> {
        let path = self.dataset_path();
        let items: Vec<Item> = read_json(&path).await?;
        ensure_unique(&path, items.iter().map(|item| item.id))?;
        Ok(items)
    }

    pub async fn save_items(&self, items: &[Item]) -> Result<(), StoreError> {
        write_json_atomic(&self.dataset_path(), items).await
    }

    /// Load the record set of a phase; ids must be unique
    pub async fn load_records(&self, phase: Phase) -> Result<Vec<Record>, StoreError> {
        let path = self.phase_path(phase);
        let records: Vec<Record> = read_json(&path).await?;
        ensure_unique(&path, records.iter().map(|record| record.id))?;
        Ok(records)
    }

    pub async fn save_records(&self, phase: Phase, records: &[Record]) -> Result<(), StoreError> {
        let path = self.phase_path(phase);
        write_json_atomic(&path, records).await?;
        info!(phase = %phase, path = %path.display(), records = records.len(), "Saved records");
        Ok(())
    }
}

fn ensure_unique(path: &Path, ids: impl Iterator<Item = ItemId>) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(StoreError::DuplicateId {
                path: path.to_path_buf(),
                id,
            });
        }
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON through `<file>.tmp` and a rename
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).await.map_err(io_error)?;
    fs::rename(&temp_path, path).await.map_err(io_error)?;
    Ok(())
}

/// Predicted-label counts of a record set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub total: usize,
    pub errors: usize,
    pub categories: BTreeMap<Category, usize>,
    pub sentiments: BTreeMap<Sentiment, usize>,
    pub mean_score: f64,
}

impl Distribution {
    /// Counts over judged records; error records only count in `errors`
    pub fn from_records(records: &[Record]) -> Self {
        let mut distribution = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut score_sum = 0u64;
        let mut judged = 0u64;

        for record in records {
            if record.is_error() {
                distribution.errors += 1;
                continue;
            }
            let judgment = record.judgment();
            *distribution.categories.entry(judgment.category).or_insert(0) += 1;
            *distribution.sentiments.entry(judgment.sentiment).or_insert(0) += 1;
            score_sum += judgment.score.get() as u64;
            judged += 1;
        }

        if judged > 0 {
            distribution.mean_score = score_sum as f64 / judged as f64;
        }
        distribution
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records: {} ({} errors)", self.total, self.errors)?;
        writeln!(f, "Categories:")?;
        for (category, count) in &self.categories {
            writeln!(f, "  {:<16} {}", category.as_str(), count)?;
        }
        writeln!(f, "Sentiments:")?;
        for (sentiment, count) in &self.sentiments {
            writeln!(f, "  {:<16} {}", sentiment.as_str(), count)?;
        }
        write!(f, "Mean score: {:.2}", self.mean_score)
    }
}
