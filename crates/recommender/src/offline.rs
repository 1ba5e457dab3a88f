//! Offline fit: feature pipeline, reducer and DBSCAN over a training corpus

use crate::clustering::{ClusterIndex, Dbscan};
use crate::config::FitConfig;
use crate::error::{RecommenderError, Result};
use crate::features::FeaturePipeline;
use crate::pipeline::FittedPipeline;
use crate::reducer::Pca;
use crate::types::{is_noise, ClusterLabel, Pid, TrainingRecord, VideoRecord};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Everything a fit produces
#[derive(Debug)]
pub struct FitOutcome {
    pub pipeline: FittedPipeline,
    pub index: ClusterIndex,
    /// Per-record labels in corpus order
    pub labels: Vec<ClusterLabel>,
    pub cluster_count: usize,
    pub noise_count: usize,
}

/// Fit the whole offline stack on `corpus`
pub fn fit_corpus(corpus: &[TrainingRecord], config: &FitConfig) -> Result<FitOutcome> {
    let start = Instant::now();
    config.validate()?;

    if corpus.is_empty() {
        return Err(RecommenderError::InvalidInput("training corpus is empty".into()));
    }

    let mut seen: HashSet<Pid> = HashSet::with_capacity(corpus.len());
    for item in corpus {
        if !seen.insert(item.record.pid) {
            return Err(RecommenderError::InvalidInput(format!(
                "duplicate pid {} in training corpus",
                item.record.pid
            )));
        }
    }

    let records: Vec<VideoRecord> = corpus.iter().map(|t| t.record.clone()).collect();
    let pids: Vec<Pid> = records.iter().map(|r| r.pid).collect();
    let scores: HashMap<Pid, f32> = corpus.iter().map(|t| (t.record.pid, t.score)).collect();

    let mut features = FeaturePipeline::from_schema(&config.schema, config.frequency_threshold);
    features.fit(&records)?;
    let matrix = features.transform_batch(&records)?;
    tracing::info!(
        "Transformed {} records into {} features",
        matrix.nrows(),
        matrix.ncols()
    );

    let reducer = Pca::fit(matrix.view(), config.variance_target)?;
    let reduced = reducer.reduce_batch(matrix.view())?;
    tracing::info!(
        "Reduced {} -> {} dimensions (variance target {})",
        reducer.input_dim(),
        reducer.output_dim(),
        config.variance_target
    );

    let labels = Dbscan::new(config.eps, config.min_samples).fit(reduced.view())?;
    let index = ClusterIndex::build(&pids, reduced.view(), &labels, scores)?;
    let noise_count = labels.iter().filter(|l| is_noise(**l)).count();

    tracing::info!(
        "Fit {} clusters ({} noise of {} records) in {:?}",
        index.len(),
        noise_count,
        labels.len(),
        start.elapsed()
    );

    Ok(FitOutcome {
        pipeline: FittedPipeline::new(features, reducer)?,
        cluster_count: index.len(),
        index,
        labels,
        noise_count,
    })
}
