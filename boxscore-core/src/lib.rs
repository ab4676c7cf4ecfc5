pub mod error;
pub mod extract;
pub mod layout;
pub mod manifest;
pub mod source;
pub mod sources;

pub use error::{ExtractError, SourceError};
pub use extract::{
    EntityCallback, EntityOutcome, EntityReport, ExtractOptions, Extractor, RunReport,
    SeasonReport,
};
pub use layout::OutputLayout;
pub use manifest::{EntityStatus, ExtractionManifest, ManifestStore, SeasonManifest};
pub use source::{
    EntityDefinition, EntitySpec, HttpSource, PayloadFormat, SourceClient, SourceCredentials,
    SourceDefinition,
};
pub use sources::SourceRegistry;
