//! Fitted feature pipeline artifact
//!
//! Bundles the fitted transformer stages with the fitted reducer so serving
//! applies exactly the parameters learned offline. Persisted with bincode.

use crate::error::{RecommenderError, Result};
use crate::features::FeaturePipeline;
use crate::persist;
use crate::reducer::Pca;
use crate::types::VideoRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub features: FeaturePipeline,
    pub reducer: Pca,
}

impl FittedPipeline {
    pub fn new(features: FeaturePipeline, reducer: Pca) -> Result<Self> {
        if !features.is_fitted() {
            return Err(RecommenderError::Fit("feature pipeline is not fitted".into()));
        }
        if features.output_dim() != reducer.input_dim() {
            return Err(RecommenderError::DimensionMismatch {
                expected: features.output_dim(),
                actual: reducer.input_dim(),
            });
        }
        Ok(Self { features, reducer })
    }

    /// Reduced dimension `k`
    pub fn dimension(&self) -> usize {
        self.reducer.output_dim()
    }

    /// Raw record → reduced vector
    pub fn embed(&self, record: &VideoRecord) -> Result<Vec<f64>> {
        let features = self.features.transform(record)?;
        self.reducer.reduce(&features)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| RecommenderError::Persistence(format!("serialize pipeline: {e}")))?;
        persist::write_atomic(path, &bytes)?;

        tracing::info!(
            "Saved fitted pipeline to {} ({} -> {} dimensions)",
            path.display(),
            self.features.output_dim(),
            self.dimension()
        );
        Ok(())
    }

    /// Load a pipeline; `None` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let start = Instant::now();

        let Some(bytes) = persist::read_optional(path)? else {
            return Ok(None);
        };

        let pipeline: FittedPipeline =
            bincode::deserialize(&bytes).map_err(|e| RecommenderError::corrupt(path, e))?;

        if pipeline.features.output_dim() != pipeline.reducer.input_dim() {
            return Err(RecommenderError::corrupt(
                path,
                format!(
                    "transformer emits {} features but reducer expects {}",
                    pipeline.features.output_dim(),
                    pipeline.reducer.input_dim()
                ),
            ));
        }

        tracing::debug!("Loaded fitted pipeline from {} in {:?}", path.display(), start.elapsed());
        Ok(Some(pipeline))
    }
}
