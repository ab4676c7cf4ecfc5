use crate::error::{ExtractError, Result};
use crate::layout::{write_json_atomic, OutputLayout};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_VERSION: u32 = 1;

/// Extraction state of one entity in one season. The default value is the
/// empty state (not extracted, no records, no timestamp).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    pub extracted: bool,
    pub count: usize,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl EntityStatus {
    pub fn extracted(count: usize, timestamp: String, duration_ms: u64) -> Self {
        Self {
            extracted: true,
            count,
            timestamp,
            duration_ms: Some(duration_ms),
        }
    }

    /// Hours since the recorded timestamp, or `None` if it can't be read.
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        let at = DateTime::parse_from_rfc3339(&self.timestamp).ok()?;
        let age = now - at.with_timezone(&Utc);
        Some(age.num_milliseconds() as f64 / 3_600_000.0)
    }
}

pub type SeasonManifest = BTreeMap<String, EntityStatus>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionManifest {
    pub source: String,
    pub seasons: BTreeMap<String, SeasonManifest>,
    pub last_run: String,
    pub version: u32,
}

impl ExtractionManifest {
    pub fn empty(source: &str) -> Self {
        Self {
            source: source.to_string(),
            seasons: BTreeMap::new(),
            last_run: String::new(),
            version: MANIFEST_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSummary {
    pub year: String,
    pub extracted: usize,
    pub total: usize,
    pub records: usize,
    pub latest: Option<String>,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sole owner of a source's manifest. Every mutation is written through to
/// disk before it returns.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: ExtractionManifest,
}

impl ManifestStore {
    pub async fn open(layout: &OutputLayout, source: &str) -> Result<Self> {
        Self::open_at(layout.manifest_path(source), source).await
    }

    /// Loads the manifest at `path`, or starts an empty one if the file does
    /// not exist yet. Nothing is written until the first mutation.
    pub async fn open_at(path: impl Into<PathBuf>, source: &str) -> Result<Self> {
        let path = path.into();
        let manifest = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let manifest: ExtractionManifest = serde_json::from_str(&content)
                    .map_err(|source| ExtractError::ManifestFormat {
                        path: path.clone(),
                        source,
                    })?;
                if manifest.source != source {
                    return Err(ExtractError::SourceMismatch {
                        path,
                        expected: source.to_string(),
                        found: manifest.source,
                    });
                }
                debug!(path = %path.display(), seasons = manifest.seasons.len(), "Loaded manifest");
                manifest
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No manifest found, starting fresh");
                ExtractionManifest::empty(source)
            }
            Err(e) => return Err(ExtractError::io(path, e)),
        };

        Ok(Self { path, manifest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.manifest.source
    }

    pub fn manifest(&self) -> &ExtractionManifest {
        &self.manifest
    }

    pub fn entity_status(&self, year: u16, entity: &str) -> Option<&EntityStatus> {
        self.manifest
            .seasons
            .get(&year.to_string())
            .and_then(|season| season.get(entity))
    }

    pub fn is_extracted(&self, year: u16, entity: &str) -> bool {
        self.entity_status(year, entity)
            .map(|status| status.extracted)
            .unwrap_or(false)
    }

    pub async fn record(&mut self, year: u16, entity: &str, status: EntityStatus) -> Result<()> {
        self.manifest
            .seasons
            .entry(year.to_string())
            .or_default()
            .insert(entity.to_string(), status);
        self.persist().await
    }

    pub async fn mark_run(&mut self, timestamp: String) -> Result<()> {
        self.manifest.last_run = timestamp;
        self.persist().await
    }

    pub async fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.manifest).await
    }

    pub fn summary(&self) -> Vec<SeasonSummary> {
        self.manifest
            .seasons
            .iter()
            .map(|(year, season)| SeasonSummary {
                year: year.clone(),
                extracted: season.values().filter(|s| s.extracted).count(),
                total: season.len(),
                records: season.values().map(|s| s.count).sum(),
                latest: season
                    .values()
                    .filter(|s| s.extracted)
                    .map(|s| s.timestamp.clone())
                    .max(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_wire_format() {
        let mut manifest = ExtractionManifest::empty("hoops-archive");
        manifest.last_run = "2024-03-01T10:00:00.000Z".to_string();
        manifest.seasons.entry("2019".to_string()).or_default().insert(
            "teams".to_string(),
            EntityStatus::extracted(30, "2024-03-01T10:00:00.000Z".to_string(), 412),
        );
        manifest
            .seasons
            .entry("2019".to_string())
            .or_default()
            .insert("standings".to_string(), EntityStatus::default());

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "source": "hoops-archive",
                "seasons": {
                    "2019": {
                        "standings": { "extracted": false, "count": 0, "timestamp": "" },
                        "teams": {
                            "extracted": true,
                            "count": 30,
                            "timestamp": "2024-03-01T10:00:00.000Z",
                            "durationMs": 412
                        }
                    }
                },
                "lastRun": "2024-03-01T10:00:00.000Z",
                "version": 1
            })
        );
    }

    #[test]
    fn test_age_hours() {
        let now = Utc::now();
        let status = EntityStatus::extracted(
            1,
            (now - Duration::hours(3)).to_rfc3339_opts(SecondsFormat::Millis, true),
            5,
        );
        let age = status.age_hours(now).unwrap();
        assert!((age - 3.0).abs() < 0.01);

        assert!(EntityStatus::default().age_hours(now).is_none());
    }

    #[tokio::test]
    async fn test_open_missing_manifest_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path());

        let store = ManifestStore::open(&layout, "league-api").await.unwrap();
        assert_eq!(store.source(), "league-api");
        assert!(store.manifest().seasons.is_empty());
        assert_eq!(store.manifest().version, MANIFEST_VERSION);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_record_persists_and_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path());

        let mut store = ManifestStore::open(&layout, "league-api").await.unwrap();
        store
            .record(2024, "teams", EntityStatus::extracted(30, now_timestamp(), 10))
            .await
            .unwrap();
        store
            .record(2024, "players", EntityStatus::default())
            .await
            .unwrap();

        let reopened = ManifestStore::open(&layout, "league-api").await.unwrap();
        assert!(reopened.is_extracted(2024, "teams"));
        assert!(!reopened.is_extracted(2024, "players"));
        assert!(!reopened.is_extracted(2023, "teams"));
        assert_eq!(reopened.entity_status(2024, "teams").unwrap().count, 30);

        let summary = reopened.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].year, "2024");
        assert_eq!(summary[0].extracted, 1);
        assert_eq!(summary[0].total, 2);
        assert_eq!(summary[0].records, 30);
    }

    #[tokio::test]
    async fn test_foreign_manifest_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path());

        let mut store = ManifestStore::open(&layout, "league-api").await.unwrap();
        store.mark_run(now_timestamp()).await.unwrap();

        let err = ManifestStore::open_at(layout.manifest_path("league-api"), "hoops-archive")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::SourceMismatch { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ManifestStore::open_at(&path, "league-api").await.unwrap_err();
        assert!(matches!(err, ExtractError::ManifestFormat { .. }));
    }
}
