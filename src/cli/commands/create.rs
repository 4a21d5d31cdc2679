use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::{connect_store, Command};
use crate::config::ReleaseBundleConfig;
use crate::export::ReleaseExporter;
use crate::manifest::SchemaVersion;
use crate::store::RemoteStore;

pub struct CreateCommand {
    pub release_id: u64,
    pub output: Option<PathBuf>,
    pub schema: Option<SchemaVersion>,
    config: ReleaseBundleConfig,
    store: Option<Arc<dyn RemoteStore>>,
}

impl CreateCommand {
    pub fn new(release_id: u64, config: ReleaseBundleConfig) -> Self {
        Self {
            release_id,
            output: None,
            schema: None,
            config,
            store: None,
        }
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_schema(mut self, schema: Option<SchemaVersion>) -> Self {
        self.schema = schema;
        self
    }

    /// Use this store instead of connecting to the configured API
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl Command for CreateCommand {
    async fn execute(&self) -> Result<()> {
        let store = match &self.store {
            Some(store) => store.clone(),
            None => connect_store(&self.config)?,
        };

        let exporter = ReleaseExporter::new(store)
            .with_image_requirement(self.config.export.require_images)
            .with_schema(self.schema.unwrap_or(self.config.apply.schema));

        eprintln!("📤 Creating bundle from release {}", self.release_id);
        let bundle = exporter.create(self.release_id, None).await?.into_inner();

        match &self.output {
            Some(path) => {
                tokio::fs::write(path, &bundle)
                    .await
                    .with_context(|| format!("Failed to write bundle to {}", path.display()))?;
                eprintln!("✅ Wrote {} bytes to {}", bundle.len(), path.display());
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&bundle).context("Failed to write bundle to stdout")?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}
