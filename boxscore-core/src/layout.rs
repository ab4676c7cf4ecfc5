use crate::error::{ExtractError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const MANIFEST_FILE: &str = "manifest.json";

/// On-disk layout: `<root>/<source>/<year>/<entity>.json` plus one
/// `<root>/<source>/manifest.json` per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.root.join(source)
    }

    pub fn manifest_path(&self, source: &str) -> PathBuf {
        self.source_dir(source).join(MANIFEST_FILE)
    }

    pub fn entity_path(&self, source: &str, year: u16, entity: &str) -> PathBuf {
        self.source_dir(source)
            .join(year.to_string())
            .join(format!("{}.json", entity))
    }
}

/// Writes pretty-printed JSON next to the target and renames it into place, so
/// readers only ever see the old or the new file.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ExtractError::Serialize {
        what: path.display().to_string(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json.as_bytes())
        .await
        .map_err(|e| ExtractError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| ExtractError::io(path, e))?;
    Ok(())
}
