use anyhow::{anyhow, bail, Context, Result};
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ModelConfig;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";
pub const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
pub const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// On-disk locations of everything needed to build the model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub config: PathBuf,
    pub weights: Vec<PathBuf>,
}

pub async fn resolve(cfg: &ModelConfig) -> Result<ModelFiles> {
    match &cfg.local_dir {
        Some(dir) => resolve_local(dir),
        None => resolve_hub(cfg).await,
    }
}

// ---------------------------------------------------------
// Local snapshot directory
// ---------------------------------------------------------
pub fn resolve_local(snapshot_dir: &Path) -> Result<ModelFiles> {
    info!(snapshot = %snapshot_dir.display(), "resolving model from local snapshot");

    let tokenizer = existing(snapshot_dir.join(TOKENIZER_FILE))?;
    let config = existing(snapshot_dir.join(CONFIG_FILE))?;

    let index_path = snapshot_dir.join(WEIGHTS_INDEX_FILE);
    let weights = if index_path.exists() {
        let index_json: serde_json::Value = serde_json::from_slice(&fs::read(&index_path)?)
            .with_context(|| format!("parsing {}", index_path.display()))?;
        shard_names(&index_json)?
            .into_iter()
            .map(|name| existing(snapshot_dir.join(name)))
            .collect::<Result<Vec<_>>>()?
    } else {
        vec![existing(snapshot_dir.join(SINGLE_WEIGHTS_FILE))?]
    };

    info!(shards = weights.len(), "local snapshot resolved");
    Ok(ModelFiles {
        tokenizer,
        config,
        weights,
    })
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(anyhow!("missing model file: {}", path.display()))
    }
}

// ---------------------------------------------------------
// Hugging Face hub (downloads into the shared hub cache)
// ---------------------------------------------------------
async fn resolve_hub(cfg: &ModelConfig) -> Result<ModelFiles> {
    info!(model = %cfg.model_id, revision = %cfg.revision, "resolving model from the hub");

    let api = hub_builder(cfg)
        .build()
        .map_err(|e| anyhow!("failed to initialize Hugging Face API: {e}"))?;
    let repo = api.repo(Repo::with_revision(
        cfg.model_id.clone(),
        RepoType::Model,
        cfg.revision.clone(),
    ));

    let tokenizer = fetch(&repo, &cfg.model_id, TOKENIZER_FILE).await?;
    let config = fetch(&repo, &cfg.model_id, CONFIG_FILE).await?;

    let weights = match repo.get(WEIGHTS_INDEX_FILE).await {
        Ok(index_path) => {
            let index_json: serde_json::Value = serde_json::from_slice(&fs::read(&index_path)?)
                .with_context(|| format!("parsing {}", index_path.display()))?;
            let mut paths = Vec::new();
            for name in shard_names(&index_json)? {
                paths.push(fetch(&repo, &cfg.model_id, &name).await?);
            }
            paths
        }
        Err(e) => {
            warn!(error = %e, "no sharded index, falling back to {SINGLE_WEIGHTS_FILE}");
            vec![fetch(&repo, &cfg.model_id, SINGLE_WEIGHTS_FILE).await?]
        }
    };

    info!(shards = weights.len(), "hub snapshot resolved");
    Ok(ModelFiles {
        tokenizer,
        config,
        weights,
    })
}

/// Keeps the token cached by `huggingface-cli login` unless one is
/// configured explicitly.
fn hub_builder(cfg: &ModelConfig) -> ApiBuilder {
    let builder = ApiBuilder::new().with_progress(false);
    match explicit_token(cfg) {
        Some(token) => builder.with_token(Some(token)),
        None => builder,
    }
}

fn explicit_token(cfg: &ModelConfig) -> Option<String> {
    cfg.hf_token.clone().filter(|t| !t.trim().is_empty())
}

async fn fetch(repo: &ApiRepo, model_id: &str, filename: &str) -> Result<PathBuf> {
    repo.get(filename)
        .await
        .map_err(|e| anyhow!("failed to download '{filename}' from '{model_id}': {e}"))
}

/// Distinct shard file names referenced by a safetensors index, in
/// sorted order.
pub fn shard_names(index_json: &serde_json::Value) -> Result<Vec<String>> {
    let weight_map = index_json["weight_map"]
        .as_object()
        .ok_or_else(|| anyhow!("{WEIGHTS_INDEX_FILE}: weight_map is not an object"))?;

    let mut names = BTreeSet::new();
    for value in weight_map.values() {
        let name = value
            .as_str()
            .ok_or_else(|| anyhow!("invalid shard entry in {WEIGHTS_INDEX_FILE}"))?;
        names.insert(name.to_string());
    }

    if names.is_empty() {
        bail!("{WEIGHTS_INDEX_FILE} lists no shards");
    }
    Ok(names.into_iter().collect())
}
