//! Offline fit: corpus JSON in, fitted pipeline and cluster artifact out
//!
//! Usage: recommender-fit [config-file]   (default: config/fit)

use anyhow::Context;
use reels_recommender::{fit_corpus, FitConfig, TrainingRecord};
use std::fs;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = match std::env::args().nth(1) {
        Some(file) => FitConfig::load_from(&file),
        None => FitConfig::load(),
    }
    .context("Failed to load fit configuration")?;

    let raw = fs::read(&config.corpus_path)
        .with_context(|| format!("Failed to read corpus {}", config.corpus_path.display()))?;
    let corpus: Vec<TrainingRecord> = serde_json::from_slice(&raw)
        .with_context(|| format!("Malformed corpus {}", config.corpus_path.display()))?;
    info!("Loaded {} training records", corpus.len());

    let outcome = fit_corpus(&corpus, &config).context("Fit failed")?;

    outcome
        .pipeline
        .save(&config.pipeline_path)
        .context("Failed to write fitted pipeline")?;
    outcome
        .index
        .save(&config.clusters_path)
        .context("Failed to write cluster artifact")?;

    info!(
        "Fit complete: {} clusters, {} noise, {} dimensions",
        outcome.cluster_count,
        outcome.noise_count,
        outcome.pipeline.dimension()
    );
    Ok(())
}
