use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use super::{connect_store, Command};
use crate::apply::{ApplyOptions, CleanupPolicy, ReleaseApplier};
use crate::config::ReleaseBundleConfig;
use crate::manifest::SchemaVersion;
use crate::store::RemoteStore;

pub struct ApplyCommand {
    pub application_id: u64,
    pub bundle: PathBuf,
    pub options: ApplyOptions,
    pub cleanup_policy: Option<CleanupPolicy>,
    config: ReleaseBundleConfig,
    store: Option<Arc<dyn RemoteStore>>,
}

impl ApplyCommand {
    pub fn new(application_id: u64, bundle: PathBuf, config: ReleaseBundleConfig) -> Self {
        Self {
            application_id,
            bundle,
            options: ApplyOptions::default(),
            cleanup_policy: None,
            config,
            store: None,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.options.force = force;
        self
    }

    pub fn with_release_version(mut self, version: Option<String>) -> Self {
        self.options.version_override = version;
        self
    }

    pub fn with_schema(mut self, schema: Option<SchemaVersion>) -> Self {
        self.options.schema = schema;
        self
    }

    pub fn with_cleanup_policy(mut self, policy: Option<CleanupPolicy>) -> Self {
        self.cleanup_policy = policy;
        self
    }

    /// Use this store instead of connecting to the configured API
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl Command for ApplyCommand {
    async fn execute(&self) -> Result<()> {
        let bytes = tokio::fs::read(&self.bundle)
            .await
            .with_context(|| format!("Failed to read bundle {}", self.bundle.display()))?;

        let store = match &self.store {
            Some(store) => store.clone(),
            None => connect_store(&self.config)?,
        };
        let mut applier = ReleaseApplier::from_config(store, &self.config.apply);
        if let Some(policy) = self.cleanup_policy {
            applier = applier.with_cleanup_policy(policy);
        }

        println!(
            "📥 Applying {} to application {}",
            self.bundle.display(),
            self.application_id
        );
        if self.options.force {
            println!("⚠️  --force: existing releases with the same identity will be overwritten");
        }

        let release_id = applier
            .apply(self.application_id, Cursor::new(bytes), &self.options)
            .await?;

        println!("✅ Created release {release_id}");
        Ok(())
    }
}
