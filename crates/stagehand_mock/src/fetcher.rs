use stagehand_core::prelude::{defaults, *};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Materialises known sources as directories of empty extension manifests.
///
/// Unknown sources fail with [`StorageError::NotFound`].
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    sources: Arc<BTreeMap<String, Vec<String>>>,
    hanging: Arc<BTreeSet<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetching `source` yields one extension directory per name.
    pub fn with_source<I, S>(self, source: &str, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sources = (*self.sources).clone();
        sources.insert(
            source.to_string(),
            extensions.into_iter().map(Into::into).collect(),
        );
        Self {
            sources: Arc::new(sources),
            ..self
        }
    }

    /// Fetching `source` never completes.
    pub fn with_hanging_source(self, source: &str) -> Self {
        let mut hanging = (*self.hanging).clone();
        hanging.insert(source.to_string());
        Self {
            hanging: Arc::new(hanging),
            ..self
        }
    }
}

impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &str, dest: &Path) -> Result<(), StorageError> {
        if self.hanging.contains(source) {
            tokio::fs::create_dir_all(dest).await?;
            std::future::pending::<()>().await;
        }
        let Some(extensions) = self.sources.get(source) else {
            return Err(StorageError::NotFound(format!("repository {source}")));
        };

        tokio::fs::create_dir_all(dest).await?;
        for name in extensions {
            let dir = dest.join(name);
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join(defaults::MANIFEST_MARKER), "{}").await?;
        }
        Ok(())
    }
}
