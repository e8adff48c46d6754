//! TOML configuration for opening a docmap database.
//!
//! ```toml
//! backend = "memory"        # or "null"
//! read_only = false
//! install_views = true
//!
//! [log]
//! filter = "info,docmap_orm=debug"
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docmap_orm::{ClassMapper, Database};
use docmap_store::{Backend, InMemoryBackend, NullBackend};

use crate::error::{SdkError, SdkResult};

/// Which storage backend [`DocmapConfig::open`] builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// An `EnvFilter` directive string.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocmapConfig {
    pub backend: BackendKind,
    /// Reject every write at the backend.
    pub read_only: bool,
    /// Install the mapper's view definitions when opening.
    pub install_views: bool,
    pub log: LogConfig,
}

impl Default for DocmapConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            read_only: false,
            install_views: true,
            log: LogConfig::default(),
        }
    }
}

impl DocmapConfig {
    /// Parse and validate a TOML document. Absent keys take their defaults.
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> SdkResult<()> {
        EnvFilter::try_new(&self.log.filter)
            .map_err(|e| SdkError::Config(format!("log.filter {:?}: {e}", self.log.filter)))?;
        Ok(())
    }

    /// Build the configured backend and open a [`Database`] over it.
    pub fn open(&self, mapper: Arc<ClassMapper>) -> SdkResult<Database> {
        let backend: Arc<dyn Backend> = match self.backend {
            BackendKind::Memory => Arc::new(InMemoryBackend::new().read_only(self.read_only)),
            BackendKind::Null => Arc::new(NullBackend),
        };
        let db = Database::new(backend, mapper);
        if self.install_views {
            db.update_designs()?;
        }
        info!(
            backend = db.database_type(),
            read_only = self.read_only,
            install_views = self.install_views,
            "opened database"
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_orm::fixtures;
    use docmap_orm::{Document, DocumentStore, OrmError};
    use docmap_store::StoreError;

    #[test]
    fn empty_config_uses_defaults() {
        let config = DocmapConfig::from_toml_str("").unwrap();
        assert_eq!(config, DocmapConfig::default());
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(config.install_views);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn parses_every_key() {
        let config = DocmapConfig::from_toml_str(
            r#"
            backend = "null"
            read_only = true
            install_views = false

            [log]
            filter = "warn,docmap_orm=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Null);
        assert!(config.read_only);
        assert!(!config.install_views);
        assert_eq!(config.log.filter, "warn,docmap_orm=debug");
    }

    #[test]
    fn rejects_unknown_keys_and_backends() {
        assert!(matches!(
            DocmapConfig::from_toml_str("colour = \"blue\""),
            Err(SdkError::ConfigParse(_))
        ));
        assert!(DocmapConfig::from_toml_str("backend = \"couchdb\"").is_err());
    }

    #[test]
    fn rejects_bad_filters() {
        let err = DocmapConfig::from_toml_str("[log]\nfilter = \"docmap=verbose\"").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn load_reports_missing_files() {
        let err = DocmapConfig::load("/nonexistent/docmap.toml").unwrap_err();
        assert!(matches!(err, SdkError::Io(_)));
    }

    #[test]
    fn open_installs_views() {
        let zoo = fixtures::zoo();
        let db = DocmapConfig::default().open(Arc::clone(&zoo.mapper)).unwrap();
        let person = Document::new(&zoo.person);
        db.save(&person).unwrap();
        assert!(person.get_references("dogs").unwrap().is_empty());
    }

    #[test]
    fn open_without_views_leaves_queries_unknown() {
        let zoo = fixtures::zoo();
        let config = DocmapConfig {
            install_views: false,
            ..DocmapConfig::default()
        };
        let db = config.open(Arc::clone(&zoo.mapper)).unwrap();
        assert!(matches!(
            db.query_view("raw/all", &serde_json::json!("dog")),
            Err(OrmError::Store(StoreError::UnknownView(_)))
        ));
    }

    #[test]
    fn read_only_rejects_saves() {
        let zoo = fixtures::zoo();
        let config = DocmapConfig {
            read_only: true,
            ..DocmapConfig::default()
        };
        let db = config.open(Arc::clone(&zoo.mapper)).unwrap();
        let err = db.save(&Document::new(&zoo.dog)).unwrap_err();
        assert!(matches!(err, OrmError::Store(StoreError::ReadOnly)));
    }
}
