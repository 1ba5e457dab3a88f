//! Cluster Assigner
//!
//! DBSCAN has no prediction function, so items that arrive after training
//! are placed in the cluster whose centroid is nearest in reduced space.
//! Equal distances resolve to the lowest label.

use crate::clustering::{euclidean, ClusterIndex};
use crate::error::{RecommenderError, Result};
use crate::pipeline::FittedPipeline;
use crate::types::{ClusterLabel, VideoRecord};
use ndarray::ArrayView1;
use std::sync::Arc;

/// Result of a nearest-centroid lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub cluster_label: ClusterLabel,
    pub distance: f64,
}

pub struct NearestCentroid {
    index: Arc<ClusterIndex>,
}

impl NearestCentroid {
    pub fn new(index: Arc<ClusterIndex>) -> Self {
        Self { index }
    }

    pub fn assign(&self, reduced: &[f64]) -> Result<Assignment> {
        if self.index.is_empty() {
            return Err(RecommenderError::NoClustersAvailable);
        }
        if reduced.len() != self.index.dimension() {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: reduced.len(),
            });
        }

        let point = ArrayView1::from(reduced);
        let mut best: Option<Assignment> = None;

        // Profiles iterate in ascending label order, so a strict comparison
        // keeps the lowest label among equal distances.
        for profile in self.index.profiles() {
            let distance = euclidean(&point, &ArrayView1::from(profile.centroid.as_slice()));
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Assignment {
                    cluster_label: profile.label,
                    distance,
                });
            }
        }

        best.ok_or(RecommenderError::NoClustersAvailable)
    }

    /// Transform, reduce, then assign
    pub fn assign_record(
        &self,
        pipeline: &FittedPipeline,
        record: &VideoRecord,
    ) -> Result<Assignment> {
        if self.index.is_empty() {
            return Err(RecommenderError::NoClustersAvailable);
        }
        let reduced = pipeline.embed(record)?;
        self.assign(&reduced)
    }
}
