//! Fetches model artifacts from a Hugging Face-style repository. Only
//! required to succeed before conversion and loading; the decode core
//! never touches the network.

use std::path::Path;

use anyhow::{anyhow, Result};
use log::{debug, info};

use crate::convert::CHECKPOINT_FILE;
use crate::store::VOCAB_FILE;

/// Files a model repository must provide. `config.json` is derived later
/// by the converter, so it is not fetched.
const MODEL_FILES: &[&str] = &[CHECKPOINT_FILE, VOCAB_FILE];

/// Downloads the checkpoint and vocabulary for `model_name`
/// (`organization/model`) into `model_dir`, skipping files already
/// present unless `overwrite` is set.
pub async fn download(model_dir: &Path, model_name: &str, overwrite: bool) -> Result<()> {
    tokio::fs::create_dir_all(model_dir).await?;
    for file in MODEL_FILES {
        let url = format!("https://huggingface.co/{model_name}/resolve/main/{file}");
        download_file(model_dir, file, &url, overwrite).await?;
    }
    info!("model '{}' available in {}", model_name, model_dir.display());
    Ok(())
}

async fn download_file(model_dir: &Path, filename: &str, url: &str, overwrite: bool) -> Result<()> {
    let local_path = model_dir.join(filename);
    if local_path.exists() && !overwrite {
        debug!("{} already present, skipping", local_path.display());
        return Ok(());
    }

    debug!("fetching {url}");
    let client = reqwest::Client::new();
    let mut req = client.get(url);
    if let Ok(token) = std::env::var("HF_TOKEN") {
        req = req.header("Authorization", format!("Bearer {token}"));
    }

    let response = req.send().await?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "failed to download {}: HTTP {}",
            filename,
            response.status()
        ));
    }

    let bytes = response.bytes().await?;
    tokio::fs::write(&local_path, &bytes).await?;
    Ok(())
}
