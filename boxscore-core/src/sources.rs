use crate::error::SourceError;
use crate::source::SourceDefinition;
use std::env;
use std::fs;
use std::path::Path;

const BUILTIN_SOURCES: &str = include_str!("../sources/builtin.json");

/// Known source definitions, built-ins first, with later loads replacing
/// definitions of the same name.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    definitions: Vec<SourceDefinition>,
}

impl SourceRegistry {
    pub fn builtin() -> Result<Self, SourceError> {
        let mut registry = Self::default();
        registry.extend_from_json(BUILTIN_SOURCES)?;
        Ok(registry)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), SourceError> {
        let content = fs::read_to_string(path).map_err(|e| {
            SourceError::InvalidDefinition(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.extend_from_json(&content)
    }

    pub fn extend_from_json(&mut self, json: &str) -> Result<(), SourceError> {
        let definitions: Vec<SourceDefinition> = serde_json::from_str(json)
            .map_err(|e| SourceError::InvalidDefinition(e.to_string()))?;

        for definition in definitions {
            definition.validate()?;
            match self.definitions.iter_mut().find(|d| d.name == definition.name) {
                Some(existing) => *existing = definition,
                None => self.definitions.push(definition),
            }
        }
        Ok(())
    }

    /// The named definition with `<PREFIX>_BASE_URL` applied.
    pub fn resolve(&self, name: &str) -> Option<SourceDefinition> {
        self.get(name)
            .cloned()
            .map(|d| d.with_env_overrides(|key| env::var(key).ok()))
    }

    pub fn get(&self, name: &str) -> Option<&SourceDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDefinition> {
        self.definitions.iter()
    }
}
