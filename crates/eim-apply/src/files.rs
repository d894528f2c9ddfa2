//! JSON file I/O around a single record set application.
//!
//! The item, record set and (optionally) the parent collection's children
//! are each stored as a JSON document.

use anyhow::{Context, Result};
use eim_core::{ApplyContext, ApplyReport, Dispatcher, Item, ParentIndex, RecordSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Read and deserialize a JSON document.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Serialize a value as pretty JSON, creating parent directories if needed.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Paths and identity for one apply run.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub item: PathBuf,
    pub records: PathBuf,
    pub siblings: Option<PathBuf>,
    pub acting_user: Option<String>,
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub item: Item,
    pub report: ApplyReport,
}

/// Load the inputs named by `request` and apply the record set to the item.
///
/// The item is returned rather than written so the caller decides where it
/// goes. A dispatch error leaves nothing on disk changed.
pub async fn apply_files(request: &ApplyRequest, dispatcher: &Dispatcher) -> Result<ApplyOutcome> {
    let mut item: Item = load_json(&request.item).await?;
    let records: RecordSet = load_json(&request.records).await?;
    let siblings: Option<ParentIndex> = match &request.siblings {
        Some(path) => Some(load_json(path).await?),
        None => None,
    };
    debug!(
        "Applying {} record(s) to {} ({} sibling(s))",
        records.len(),
        item.uid,
        siblings.as_ref().map_or(0, |s| s.children.len())
    );

    let ctx = ApplyContext {
        parent: siblings.as_ref(),
        acting_user: request.acting_user.as_deref(),
    };
    let report = dispatcher
        .apply_record_set(&records, &mut item, &ctx)
        .with_context(|| format!("Failed to apply {}", request.records.display()))?;

    Ok(ApplyOutcome { item, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eim_core::{Record, RecordField};
    use tempfile::TempDir;

    const NOTE_NS: &str = "http://osafoundation.org/eim/note/0";

    async fn write_inputs(dir: &TempDir, item: &Item, set: &RecordSet) -> ApplyRequest {
        let item_path = dir.path().join("item.json");
        let records_path = dir.path().join("records.json");
        save_json(&item_path, item).await.unwrap();
        save_json(&records_path, set).await.unwrap();
        ApplyRequest {
            item: item_path,
            records: records_path,
            siblings: None,
            acting_user: None,
        }
    }

    #[tokio::test]
    async fn test_save_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("item.json");

        save_json(&path, &Item::note("n1")).await.unwrap();
        let loaded: Item = load_json(&path).await.unwrap();

        assert_eq!(loaded, Item::note("n1"));
    }

    #[tokio::test]
    async fn test_load_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let err = load_json::<Item>(&path).await.unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn test_apply_files_updates_item() {
        let dir = TempDir::new().unwrap();
        let set = RecordSet::new("n1")
            .with_record(Record::new("note", NOTE_NS).with_field(RecordField::clob("body", "Hello")));
        let request = write_inputs(&dir, &Item::note("n1"), &set).await;

        let outcome = apply_files(&request, &Dispatcher::default()).await.unwrap();

        assert_eq!(outcome.item.body.as_deref(), Some("Hello"));
        assert_eq!(outcome.report.applied, 1);
    }

    #[tokio::test]
    async fn test_apply_files_leaves_input_untouched() {
        let dir = TempDir::new().unwrap();
        let set = RecordSet::new("n1")
            .with_record(Record::new("note", NOTE_NS).with_field(RecordField::clob("body", "Hello")));
        let request = write_inputs(&dir, &Item::note("n1"), &set).await;

        apply_files(&request, &Dispatcher::default()).await.unwrap();

        let on_disk: Item = load_json(&request.item).await.unwrap();
        assert_eq!(on_disk.body, None);
    }

    #[tokio::test]
    async fn test_apply_files_uid_mismatch() {
        let dir = TempDir::new().unwrap();
        let request = write_inputs(&dir, &Item::note("n1"), &RecordSet::new("n2")).await;

        let err = apply_files(&request, &Dispatcher::default()).await.unwrap_err();
        assert!(err.to_string().contains("records.json"));
    }
}
