use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use vigil::config::{DetectionConfig, EmbeddingConfig};
use vigil::stuck::{evaluate_no_progress, progress};

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = vigil::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let model_path = cache_dir.join("model.onnx");
    let tokenizer_path = cache_dir.join("tokenizer.json");

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading model.onnx (~90MB)...");
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading tokenizer.json...");
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Set embedding.provider = \"local\" to use it.");
    Ok(())
}

/// Stream a file to disk with a progress bar. Writes to `<dest>.tmp` then renames.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Run the no-progress check on a directory and print the verdict.
pub async fn idle(path: PathBuf, config: &DetectionConfig) -> Result<()> {
    anyhow::ensure!(path.is_dir(), "not a directory: {}", path.display());

    let latest =
        progress::scan_latest_modification(path.clone(), config.ignored_dirs.clone()).await;
    let pattern = evaluate_no_progress(latest, config, Utc::now());

    println!("Project:     {}", path.display());
    match latest {
        Some(t) => println!("Last change: {}", t.to_rfc3339()),
        None => println!("Last change: (no files found)"),
    }
    if let Some(idle) = pattern.details.idle_minutes {
        println!("Idle:        {idle:.1} min (threshold {} min)", config.idle_threshold_minutes);
    }
    if pattern.detected {
        println!("Verdict:     NO PROGRESS (confidence {:.2})", pattern.confidence);
    } else {
        println!("Verdict:     ok");
    }
    println!("{}", pattern.details.description);
    Ok(())
}
