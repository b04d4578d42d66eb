use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{error, info};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::{config::AccountIndex, error::MonitorError, scores::ScoreSnapshot};

/// Per-account files: the score baseline and the GPA summary.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshot_path: PathBuf,
    summary_path: PathBuf,
}

impl SnapshotStore {
    pub fn for_account(dir: &Path, index: AccountIndex) -> Self {
        Self {
            snapshot_path: dir.join(format!("scores_{index}.json")),
            summary_path: dir.join(format!("output_{index}.txt")),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Last persisted snapshot. A missing file is created as `[]`; an
    /// unreadable one is logged and treated as no history.
    pub fn load(&self) -> ScoreSnapshot {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{e}");
                Vec::new()
            }
        }
    }

    pub fn try_load(&self) -> Result<ScoreSnapshot, MonitorError> {
        let path = &self.snapshot_path;
        if !path.exists() {
            info!("Initializing score file {}", path.display());
            ensure_parent(path)?;
            fs::write(path, "[]")
                .with_context(|| format!("failed to create {}", path.display()))?;
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| MonitorError::SnapshotParse(format!("{}: {e}", path.display())))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| MonitorError::SnapshotParse(format!("{}: {e}", path.display())))
    }

    /// Replaces the stored snapshot in one go (write to a sibling, then rename).
    pub fn save(&self, snapshot: &ScoreSnapshot) -> anyhow::Result<()> {
        let path = &self.snapshot_path;
        ensure_parent(path)?;

        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        snapshot.serialize(&mut ser)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &buf).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        info!("Saved {} scores to {}", snapshot.len(), path.display());
        Ok(())
    }

    pub fn write_summary(&self, content: &str) -> anyhow::Result<()> {
        let path = &self.summary_path;
        ensure_parent(path)?;
        fs::write(path, content).with_context(|| format!("写入文件{}失败", path.display()))?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}
