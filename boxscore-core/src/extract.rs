use crate::error::{ExtractError, Result};
use crate::layout::{write_json_atomic, OutputLayout};
use crate::manifest::{now_timestamp, EntityStatus, ManifestStore};
use crate::source::SourceClient;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Incremental extraction policy for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Skip entities the manifest already marks as extracted.
    pub skip_existing: bool,
    /// With `skip_existing`, re-extract entries older than this many hours.
    pub max_age_hours: Option<f64>,
    /// Include optional entities (the schedule/game pass).
    pub with_schedule: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            max_age_hours: None,
            with_schedule: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Skipped,
    Extracted {
        count: usize,
        duration_ms: u64,
        path: PathBuf,
    },
    Failed {
        error: String,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    pub year: u16,
    pub entity: String,
    pub outcome: EntityOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonReport {
    pub year: u16,
    pub entities: Vec<EntityReport>,
}

impl SeasonReport {
    pub fn extracted(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Extracted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&EntityOutcome) -> bool) -> usize {
        self.entities.iter().filter(|e| predicate(&e.outcome)).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub source: String,
    pub seasons: Vec<SeasonReport>,
}

impl RunReport {
    pub fn extracted(&self) -> usize {
        self.seasons.iter().map(SeasonReport::extracted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.seasons.iter().map(SeasonReport::skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.seasons.iter().map(SeasonReport::failed).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Callback for reporting each entity as soon as it is settled
pub type EntityCallback = Arc<dyn Fn(&EntityReport) + Send + Sync>;

/// Whether an entity can be left alone this run.
pub fn should_skip(status: Option<&EntityStatus>, options: &ExtractOptions, now: DateTime<Utc>) -> bool {
    if !options.skip_existing {
        return false;
    }
    let Some(status) = status.filter(|s| s.extracted) else {
        return false;
    };

    match options.max_age_hours {
        None => true,
        // An unreadable timestamp counts as stale
        Some(max_age) => status
            .age_hours(now)
            .map(|age| age < max_age)
            .unwrap_or(false),
    }
}

/// Number of records in an extraction result. Single objects count as one.
pub fn record_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// Runs entity extraction for one source against its manifest.
pub struct Extractor<'a> {
    client: &'a dyn SourceClient,
    store: &'a mut ManifestStore,
    layout: OutputLayout,
    pacing: Duration,
    entity_callback: Option<EntityCallback>,
}

impl<'a> Extractor<'a> {
    pub fn new(
        client: &'a dyn SourceClient,
        store: &'a mut ManifestStore,
        layout: OutputLayout,
    ) -> Result<Self> {
        if store.source() != client.name() {
            return Err(ExtractError::SourceMismatch {
                path: store.path().to_path_buf(),
                expected: client.name().to_string(),
                found: store.source().to_string(),
            });
        }

        Ok(Self {
            client,
            store,
            layout,
            pacing: Duration::ZERO,
            entity_callback: None,
        })
    }

    /// Pause after every entity that went to the network.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_entity_callback(mut self, callback: EntityCallback) -> Self {
        self.entity_callback = Some(callback);
        self
    }

    pub async fn extract_season(&mut self, year: u16, options: &ExtractOptions) -> Result<SeasonReport> {
        self.check_year(year)?;
        let report = self.run_season(year, options).await?;
        self.store.mark_run(now_timestamp()).await?;
        Ok(report)
    }

    pub async fn extract_all(&mut self, options: &ExtractOptions) -> Result<RunReport> {
        let mut report = RunReport {
            source: self.client.name().to_string(),
            seasons: Vec::new(),
        };

        for year in self.client.years() {
            report.seasons.push(self.run_season(year, options).await?);
        }

        self.store.mark_run(now_timestamp()).await?;
        info!(
            source = %report.source,
            extracted = report.extracted(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Extraction run complete"
        );
        Ok(report)
    }

    fn check_year(&self, year: u16) -> Result<()> {
        let years = self.client.years();
        if years.contains(&year) {
            Ok(())
        } else {
            Err(ExtractError::YearOutOfRange {
                source_name: self.client.name().to_string(),
                year,
                first: *years.start(),
                last: *years.end(),
            })
        }
    }

    async fn run_season(&mut self, year: u16, options: &ExtractOptions) -> Result<SeasonReport> {
        let mut report = SeasonReport {
            year,
            entities: Vec::new(),
        };

        let entities = self
            .client
            .entities()
            .into_iter()
            .filter(|e| options.with_schedule || !e.optional);

        for entity in entities {
            let outcome = self.run_entity(year, &entity.name, options).await?;
            let went_to_network = !matches!(outcome, EntityOutcome::Skipped);

            let entity_report = EntityReport {
                year,
                entity: entity.name,
                outcome,
            };
            if let Some(ref callback) = self.entity_callback {
                callback(&entity_report);
            }
            report.entities.push(entity_report);

            if went_to_network && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Ok(report)
    }

    async fn run_entity(&mut self, year: u16, entity: &str, options: &ExtractOptions) -> Result<EntityOutcome> {
        let source = self.client.name().to_string();

        if should_skip(self.store.entity_status(year, entity), options, Utc::now()) {
            info!(source = %source, year, entity, "Already extracted, skipping");
            return Ok(EntityOutcome::Skipped);
        }

        let start = Instant::now();
        match self.client.fetch_entity(entity, year).await {
            Ok(value) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let path = self.layout.entity_path(&source, year, entity);
                write_json_atomic(&path, &value).await?;

                let count = record_count(&value);
                self.store
                    .record(
                        year,
                        entity,
                        EntityStatus::extracted(count, now_timestamp(), duration_ms),
                    )
                    .await?;
                info!(source = %source, year, entity, count, duration_ms, "Extracted");

                Ok(EntityOutcome::Extracted {
                    count,
                    duration_ms,
                    path,
                })
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                warn!(source = %source, year, entity, error = %e, "Extraction failed");
                self.store
                    .record(year, entity, EntityStatus::default())
                    .await?;

                Ok(EntityOutcome::Failed {
                    error: e.to_string(),
                    duration_ms,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SecondsFormat;
    use serde_json::json;

    fn extracted_hours_ago(hours: i64) -> EntityStatus {
        let at = Utc::now() - chrono::Duration::hours(hours);
        EntityStatus::extracted(30, at.to_rfc3339_opts(SecondsFormat::Millis, true), 100)
    }

    #[test]
    fn test_skip_when_fresh_enough() {
        let status = extracted_hours_ago(1);
        let options = ExtractOptions {
            max_age_hours: Some(24.0),
            ..Default::default()
        };
        assert!(should_skip(Some(&status), &options, Utc::now()));

        let options = ExtractOptions {
            max_age_hours: Some(0.5),
            ..Default::default()
        };
        assert!(!should_skip(Some(&status), &options, Utc::now()));
    }

    #[test]
    fn test_skip_without_max_age_ignores_staleness() {
        let status = extracted_hours_ago(24 * 365);
        assert!(should_skip(Some(&status), &ExtractOptions::default(), Utc::now()));
    }

    #[test]
    fn test_force_never_skips() {
        let status = extracted_hours_ago(1);
        let options = ExtractOptions {
            skip_existing: false,
            ..Default::default()
        };
        assert!(!should_skip(Some(&status), &options, Utc::now()));
    }

    #[test]
    fn test_missing_or_failed_entries_are_extracted() {
        let options = ExtractOptions::default();
        assert!(!should_skip(None, &options, Utc::now()));
        assert!(!should_skip(Some(&EntityStatus::default()), &options, Utc::now()));
    }

    #[test]
    fn test_unreadable_timestamp_is_stale() {
        let status = EntityStatus {
            extracted: true,
            count: 1,
            timestamp: "yesterday".to_string(),
            duration_ms: None,
        };
        let options = ExtractOptions {
            max_age_hours: Some(24.0),
            ..Default::default()
        };
        assert!(!should_skip(Some(&status), &options, Utc::now()));
    }

    #[test]
    fn test_record_count() {
        assert_eq!(record_count(&json!([1, 2, 3])), 3);
        assert_eq!(record_count(&json!([])), 0);
        assert_eq!(record_count(&json!({"leader": "BOS"})), 1);
    }
}
