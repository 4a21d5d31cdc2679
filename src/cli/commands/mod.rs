use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::ReleaseBundleConfig;
use crate::store::{HttpStore, RemoteStore};

pub mod apply;
pub mod create;
pub mod inspect;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Build the HTTP store handle described by the configuration
pub fn connect_store(config: &ReleaseBundleConfig) -> Result<Arc<dyn RemoteStore>> {
    if config.api.token.is_none() {
        tracing::warn!("No API token configured; requests will be unauthenticated");
    }
    let store = HttpStore::from_config(&config.api)
        .with_context(|| format!("Failed to set up client for {}", config.api.url))?;
    tracing::debug!(base_url = store.base_url(), "Remote store client ready");
    Ok(Arc::new(store))
}

pub async fn show_usage() -> Result<()> {
    println!("📦 release-bundle - portable release bundles");
    println!();
    println!("Commands:");
    println!("  📤 release-bundle create <release-id> -o release.tar   # Export a successful release");
    println!("  📥 release-bundle apply <application-id> release.tar   # Recreate it elsewhere");
    println!("  🔍 release-bundle inspect release.tar                  # Validate a bundle offline");
    println!();
    println!("💡 Set RELEASE_BUNDLE_API_TOKEN or add [api] token to release-bundle.toml first.");
    Ok(())
}
