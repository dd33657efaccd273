//! The `mmrag reset` command: drop every modality collection and, unless
//! asked to keep them, the materialized audio segment files.

use anyhow::{Context, Result};
use mmrag_core::models::Modality;
use mmrag_core::store::VectorStore;

use crate::config::Config;
use crate::services;

pub async fn run_reset(config: &Config, keep_artifacts: bool) -> Result<()> {
    let store = services::open_store(config).await?;

    println!("reset");
    for modality in Modality::ALL {
        let name = modality.collection_name();
        let records = match store.collection_info(name).await? {
            Some(_) => store.count(name).await?,
            None => 0,
        };
        if store.drop_collection(name).await? {
            tracing::info!(collection = name, records, "collection dropped");
            println!("  dropped {} ({} records)", name, records);
        } else {
            println!("  {} not present", name);
        }
    }

    let artifacts = &config.chunking.audio.output_dir;
    if keep_artifacts {
        println!("  kept audio chunks in {}", artifacts.display());
    } else if artifacts.exists() {
        std::fs::remove_dir_all(artifacts).with_context(|| {
            format!("Failed to remove audio chunk directory: {}", artifacts.display())
        })?;
        println!("  removed audio chunks in {}", artifacts.display());
    }

    store.pool().close().await;
    Ok(())
}
