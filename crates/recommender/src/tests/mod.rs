//! Crate-level behaviour tests over a small hand-built catalogue

mod concurrency_test;
mod scenario_test;

use crate::clustering::ClusterIndex;
use crate::types::{ClusterLabel, Pid, NOISE_LABEL};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;

/// Pids that DBSCAN labelled noise; they carry the best scores of the catalogue
pub(crate) const NOISE_PIDS: [Pid; 3] = [7, 8, 9];

/// Members of `label` in the test catalogue
pub(crate) fn cluster_pids(label: ClusterLabel) -> Vec<Pid> {
    match label {
        // pid 42 sits in cluster 3 so the interaction scenarios read naturally
        3 => std::iter::once(42).chain(401..=411).collect(),
        c => (1..=12).map(|i| 100 * (c as Pid + 1) + i).collect(),
    }
}

/// Five clusters of twelve videos in a 2-d reduced space plus three noise points.
///
/// Scores fall with pid inside each cluster, and cluster 4 holds the best
/// clustered scores overall.
pub(crate) fn catalogue() -> Arc<ClusterIndex> {
    let mut pids = Vec::new();
    let mut labels = Vec::new();
    let mut coords = Vec::new();
    let mut scores = HashMap::new();

    for label in 0..5 {
        for (i, pid) in cluster_pids(label).into_iter().enumerate() {
            pids.push(pid);
            labels.push(label);
            coords.extend([label as f64 * 10.0 + i as f64 * 0.01, 0.0]);
            scores.insert(pid, label as f32 * 10.0 + (12 - i) as f32);
        }
    }
    for (i, pid) in NOISE_PIDS.into_iter().enumerate() {
        pids.push(pid);
        labels.push(NOISE_LABEL);
        coords.extend([i as f64 * 3.0 + 5.0, 50.0]);
        scores.insert(pid, 1000.0);
    }

    let reduced = Array2::from_shape_vec((pids.len(), 2), coords).unwrap();
    Arc::new(ClusterIndex::build(&pids, reduced.view(), &labels, scores).unwrap())
}
