use crate::error::SourceError;
use async_trait::async_trait;
use boxscore_scanner::html;
use boxscore_scanner::{
    BatchOptions, BatchScraper, FetchRequest, FetchResponse, Fetcher, RetryingFetcher,
    ScannerConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Name of an extractable entity and whether it belongs to the optional
/// schedule pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub name: String,
    pub optional: bool,
}

impl EntitySpec {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
        }
    }

    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: true,
        }
    }
}

/// The data client of one source: which entities and seasons exist and how to
/// obtain one entity for one season.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn name(&self) -> &str;
    fn entities(&self) -> Vec<EntitySpec>;
    fn years(&self) -> RangeInclusive<u16>;
    fn default_year(&self) -> u16;
    async fn fetch_entity(&self, entity: &str, year: u16) -> Result<Value, SourceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadFormat {
    #[default]
    Json,
    HtmlTable {
        selector: String,
    },
    HtmlLinks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    pub name: String,
    /// Path templates relative to the base URL; `{year}` is substituted.
    pub paths: Vec<String>,
    #[serde(default)]
    pub format: PayloadFormat,
    /// JSON pointer selecting the records inside a JSON response.
    #[serde(default)]
    pub pointer: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    pub name: String,
    pub base_url: String,
    pub first_year: u16,
    pub last_year: u16,
    pub default_year: u16,
    pub entities: Vec<EntityDefinition>,
}

impl SourceDefinition {
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |msg: String| Err(SourceError::InvalidDefinition(msg));

        if !is_plain_name(&self.name) {
            return invalid(format!(
                "source name '{}' must be non-empty and use only letters, digits, '-' or '_'",
                self.name
            ));
        }
        if Url::parse(&self.base_url).is_err() {
            return invalid(format!("{}: base URL '{}' is not absolute", self.name, self.base_url));
        }
        if self.first_year > self.last_year
            || !(self.first_year..=self.last_year).contains(&self.default_year)
        {
            return invalid(format!(
                "{}: default year {} outside {}-{}",
                self.name, self.default_year, self.first_year, self.last_year
            ));
        }
        if self.entities.is_empty() {
            return invalid(format!("{}: no entities defined", self.name));
        }
        for entity in &self.entities {
            if !is_plain_name(&entity.name) {
                return invalid(format!(
                    "{}: entity name '{}' must use only letters, digits, '-' or '_'",
                    self.name, entity.name
                ));
            }
            if entity.paths.is_empty() {
                return invalid(format!("{}: entity '{}' has no paths", self.name, entity.name));
            }
        }
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Applies `<PREFIX>_BASE_URL` from the environment, if set.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = format!("{}_BASE_URL", env_prefix(&self.name));
        if let Some(base_url) = lookup(&key).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
        self
    }
}

/// `hoops-archive` becomes `HOOPS_ARCHIVE`.
/// Names become path segments under the output root.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn env_prefix(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Per-source request headers from the environment. Values never show up in
/// `Debug` output.
#[derive(Clone, Default, PartialEq)]
pub struct SourceCredentials {
    headers: HashMap<String, String>,
}

impl SourceCredentials {
    pub fn from_env(source: &str) -> Self {
        Self::from_lookup(source, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(source: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = env_prefix(source);
        let mut headers = HashMap::new();

        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());
        if let Some(token) = var("TOKEN") {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        if let Some(origin) = var("ORIGIN") {
            headers.insert("Origin".to_string(), origin);
        }
        if let Some(referer) = var("REFERER") {
            headers.insert("Referer".to_string(), referer);
        }

        Self { headers }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.headers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_map()
            .entries(names.into_iter().map(|name| (name, "<redacted>")))
            .finish()
    }
}

/// Source client driven entirely by a [`SourceDefinition`].
pub struct HttpSource<F> {
    definition: SourceDefinition,
    base_url: Url,
    credentials: SourceCredentials,
    fetcher: Arc<RetryingFetcher<F>>,
    scraper: BatchScraper<F>,
}

impl<F: Fetcher + 'static> HttpSource<F> {
    pub fn new(
        definition: SourceDefinition,
        credentials: SourceCredentials,
        fetcher: Arc<RetryingFetcher<F>>,
        config: &ScannerConfig,
    ) -> Result<Self, SourceError> {
        definition.validate()?;

        // Joining drops the last path segment unless the base ends with '/'
        let mut base = definition.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| SourceError::InvalidDefinition(format!("{}: {}", definition.base_url, e)))?;

        Ok(Self {
            scraper: BatchScraper::new(fetcher.clone(), config),
            definition,
            base_url,
            credentials,
            fetcher,
        })
    }

    pub fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    pub fn entity_url(&self, template: &str, year: u16) -> Result<String, SourceError> {
        let path = template.replace("{year}", &year.to_string());
        self.base_url
            .join(path.trim_start_matches('/'))
            .map(|url| url.to_string())
            .map_err(|e| SourceError::InvalidDefinition(format!("{}: {}", template, e)))
    }

    async fn fetch_pages(&self, urls: &[String]) -> Result<Vec<FetchResponse>, SourceError> {
        if let [url] = urls {
            let request = FetchRequest::new(url)?.with_headers(self.credentials.headers());
            return Ok(vec![self.fetcher.fetch_with_retry(&request).await?]);
        }

        let options = BatchOptions {
            headers: self.credentials.headers().clone(),
            ..Default::default()
        };
        let batch = self.scraper.scrape_batch(urls, &options).await;

        if batch.failure_count > 0 {
            let first_error = batch
                .failures()
                .next()
                .and_then(|r| r.error.clone())
                .unwrap_or_default();
            return Err(SourceError::Batch {
                failed: batch.failure_count,
                total: batch.total_count,
                first_error,
            });
        }

        Ok(batch
            .results
            .into_iter()
            .filter_map(|result| result.response)
            .collect())
    }
}

#[async_trait]
impl<F: Fetcher + 'static> SourceClient for HttpSource<F> {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn entities(&self) -> Vec<EntitySpec> {
        self.definition
            .entities
            .iter()
            .map(|e| EntitySpec {
                name: e.name.clone(),
                optional: e.optional,
            })
            .collect()
    }

    fn years(&self) -> RangeInclusive<u16> {
        self.definition.first_year..=self.definition.last_year
    }

    fn default_year(&self) -> u16 {
        self.definition.default_year
    }

    async fn fetch_entity(&self, entity: &str, year: u16) -> Result<Value, SourceError> {
        let definition = self
            .definition
            .entity(entity)
            .ok_or_else(|| SourceError::UnknownEntity(entity.to_string()))?;

        let urls = definition
            .paths
            .iter()
            .map(|template| self.entity_url(template, year))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(source = %self.definition.name, entity, year, pages = urls.len(), "Fetching entity");

        let pages = self.fetch_pages(&urls).await?;
        let mut decoded = pages
            .iter()
            .map(|page| decode_payload(definition, page))
            .collect::<Result<Vec<_>, _>>()?;

        if decoded.len() == 1 {
            return Ok(decoded.remove(0));
        }
        Ok(merge_pages(decoded))
    }
}

fn decode_payload(definition: &EntityDefinition, page: &FetchResponse) -> Result<Value, SourceError> {
    match &definition.format {
        PayloadFormat::Json => {
            let value: Value = serde_json::from_str(&page.body).map_err(|source| SourceError::Decode {
                url: page.url.clone(),
                source,
            })?;
            match &definition.pointer {
                Some(pointer) => value.pointer(pointer).cloned().ok_or_else(|| {
                    SourceError::MissingPointer {
                        url: page.url.clone(),
                        pointer: pointer.clone(),
                    }
                }),
                None => Ok(value),
            }
        }
        PayloadFormat::HtmlTable { selector } => {
            let rows = html::extract_table(&page.body, selector)?;
            Ok(Value::Array(rows.into_iter().map(Value::from).collect()))
        }
        PayloadFormat::HtmlLinks => {
            let links = html::extract_links(&page.body, Some(&page.final_url))?;
            Ok(Value::Array(
                links
                    .into_iter()
                    .map(|link| json!({ "href": link.href, "text": link.text, "title": link.title }))
                    .collect(),
            ))
        }
    }
}

/// Concatenates pages: arrays are flattened, anything else is appended as is.
fn merge_pages(pages: Vec<Value>) -> Value {
    let mut merged = Vec::new();
    for page in pages {
        match page {
            Value::Array(items) => merged.extend(items),
            other => merged.push(other),
        }
    }
    Value::Array(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn definition() -> SourceDefinition {
        SourceDefinition {
            name: "league-api".to_string(),
            base_url: "https://api.league.test/v1".to_string(),
            first_year: 2021,
            last_year: 2025,
            default_year: 2025,
            entities: vec![EntityDefinition {
                name: "teams".to_string(),
                paths: vec!["/teams?season={year}".to_string()],
                format: PayloadFormat::Json,
                pointer: Some("/data".to_string()),
                optional: false,
            }],
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix("hoops-archive"), "HOOPS_ARCHIVE");
        assert_eq!(env_prefix("league.api"), "LEAGUE_API");
    }

    #[test]
    fn test_credentials_from_environment_are_redacted() {
        let credentials = SourceCredentials::from_lookup(
            "league-api",
            lookup_from(&[
                ("LEAGUE_API_TOKEN", "s3cr3t"),
                ("LEAGUE_API_REFERER", "https://league.test/"),
            ]),
        );

        assert_eq!(
            credentials.headers().get("Authorization").map(String::as_str),
            Some("Bearer s3cr3t")
        );
        assert_eq!(
            credentials.headers().get("Referer").map(String::as_str),
            Some("https://league.test/")
        );
        assert!(!credentials.headers().contains_key("Origin"));

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("Authorization"));
    }

    #[test]
    fn test_base_url_override() {
        let overridden = definition()
            .with_env_overrides(lookup_from(&[("LEAGUE_API_BASE_URL", "http://localhost:9000")]));
        assert_eq!(overridden.base_url, "http://localhost:9000");

        let untouched = definition().with_env_overrides(lookup_from(&[]));
        assert_eq!(untouched.base_url, "https://api.league.test/v1");
    }

    #[test]
    fn test_validate_rejects_bad_year_range() {
        let mut bad = definition();
        bad.default_year = 2030;
        assert!(matches!(bad.validate(), Err(SourceError::InvalidDefinition(_))));

        let mut no_paths = definition();
        no_paths.entities[0].paths.clear();
        assert!(no_paths.validate().is_err());

        assert!(definition().validate().is_ok());
    }

    #[test]
    fn test_payload_format_wire_names() {
        let format: PayloadFormat =
            serde_json::from_str(r#"{"type":"html_table","selector":"tbody tr"}"#).unwrap();
        assert_eq!(
            format,
            PayloadFormat::HtmlTable {
                selector: "tbody tr".to_string()
            }
        );
        let entity: EntityDefinition =
            serde_json::from_str(r#"{"name":"teams","paths":["/t"]}"#).unwrap();
        assert_eq!(entity.format, PayloadFormat::Json);
        assert!(!entity.optional);
    }

    #[test]
    fn test_merge_pages_flattens_arrays() {
        let merged = merge_pages(vec![json!([1, 2]), json!({"id": 3}), json!([4])]);
        assert_eq!(merged, json!([1, 2, {"id": 3}, 4]));
    }
}
