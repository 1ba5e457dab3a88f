//! Reels Cluster Recommender
//!
//! Clusters short videos in a learned feature space and recommends unseen
//! videos from the clusters a user has engaged with.

pub mod assigner;
pub mod clustering;
pub mod cold_start;
pub mod comments;
pub mod config;
pub mod error;
pub mod features;
pub mod offline;
pub mod persist;
pub mod pipeline;
pub mod recommendation;
pub mod reducer;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export key types
pub use assigner::{Assignment, NearestCentroid};
pub use clustering::{ClusterArtifact, ClusterIndex, ClusterProfile, Dbscan};
pub use cold_start::HandleColdStartUser;
pub use comments::{Comment, CommentStore};
pub use config::{FitConfig, RecommenderConfig};
pub use error::{RecommenderError, Result};
pub use features::{FeaturePipeline, FeatureSchema, FeatureStage, Transformer};
pub use offline::{fit_corpus, FitOutcome};
pub use pipeline::FittedPipeline;
pub use recommendation::{GenerateRecommendations, RecommendationEngine};
pub use reducer::Pca;
pub use store::{DegradedStore, FileAffinityStore, ProfileStore};
pub use types::*;
