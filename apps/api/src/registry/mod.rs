//! Registry: the process-wide skills taxonomy and module catalog.
//!
//! Both are loaded from JSON files once at startup and validated together.
//! Readers take an `Arc<KnowledgeBase>` snapshot and never observe a partial
//! update: `reload()` builds a complete new snapshot before swapping it in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::learning::LearningModule;
use crate::models::skills::SkillTaxonomyEntry;

pub mod catalog;
pub mod handlers;
pub mod taxonomy;

pub use catalog::ModuleCatalog;
pub use taxonomy::SkillTaxonomy;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate skill id '{0}'")]
    DuplicateSkill(String),

    #[error("skill '{0}' has no proficiency levels")]
    EmptyLevels(String),

    #[error("skill '{skill}' references unknown {relation} '{target}'")]
    UnknownReference {
        skill: String,
        relation: &'static str,
        target: String,
    },

    #[error("prerequisite cycle through skill '{0}'")]
    TaxonomyCycle(String),

    #[error("parent chain of skill '{0}' loops")]
    ParentCycle(String),

    #[error("duplicate module id '{0}'")]
    DuplicateModule(String),

    #[error("module '{0}' covers no skills")]
    EmptyModule(String),

    #[error("module '{module}' lasts {minutes} min, expected 7-15")]
    InvalidDuration { module: String, minutes: u32 },

    #[error("module '{module}' covers unknown skill '{skill}'")]
    UnknownModuleSkill { module: String, skill: String },
}

/// An immutable, validated (taxonomy, catalog) pair.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    pub taxonomy: SkillTaxonomy,
    pub catalog: ModuleCatalog,
}

impl KnowledgeBase {
    pub fn build(
        entries: Vec<SkillTaxonomyEntry>,
        modules: Vec<LearningModule>,
    ) -> Result<Self, RegistryError> {
        let taxonomy = SkillTaxonomy::from_entries(entries)?;
        let catalog = ModuleCatalog::from_modules(modules, &taxonomy)?;
        Ok(Self { taxonomy, catalog })
    }

    pub async fn load(taxonomy_path: &Path, catalog_path: &Path) -> Result<Self, RegistryError> {
        let entries: Vec<SkillTaxonomyEntry> = read_json(taxonomy_path).await?;
        let modules: Vec<LearningModule> = read_json(catalog_path).await?;
        Self::build(entries, modules)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load-once holder of the current knowledge base with an explicit reload.
pub struct Registry {
    taxonomy_path: PathBuf,
    catalog_path: PathBuf,
    current: RwLock<Arc<KnowledgeBase>>,
}

impl Registry {
    pub async fn load(
        taxonomy_path: impl Into<PathBuf>,
        catalog_path: impl Into<PathBuf>,
    ) -> Result<Self, RegistryError> {
        let taxonomy_path = taxonomy_path.into();
        let catalog_path = catalog_path.into();
        let kb = KnowledgeBase::load(&taxonomy_path, &catalog_path).await?;
        info!(
            "Registry loaded: {} skills, {} modules",
            kb.taxonomy.len(),
            kb.catalog.len()
        );
        Ok(Self {
            taxonomy_path,
            catalog_path,
            current: RwLock::new(Arc::new(kb)),
        })
    }

    /// Wraps an already-built knowledge base. Reload reads from the given paths.
    pub fn from_parts(
        kb: KnowledgeBase,
        taxonomy_path: impl Into<PathBuf>,
        catalog_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            taxonomy_path: taxonomy_path.into(),
            catalog_path: catalog_path.into(),
            current: RwLock::new(Arc::new(kb)),
        }
    }

    /// The current snapshot. The lock is released before this returns.
    pub async fn snapshot(&self) -> Arc<KnowledgeBase> {
        self.current.read().await.clone()
    }

    /// Re-reads both files and swaps the snapshot only if the new pair validates.
    pub async fn reload(&self) -> Result<Arc<KnowledgeBase>, RegistryError> {
        let kb = Arc::new(KnowledgeBase::load(&self.taxonomy_path, &self.catalog_path).await?);
        *self.current.write().await = kb.clone();
        info!(
            "Registry reloaded: {} skills, {} modules",
            kb.taxonomy.len(),
            kb.catalog.len()
        );
        Ok(kb)
    }
}
