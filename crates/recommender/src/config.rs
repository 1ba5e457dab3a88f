use crate::error::{RecommenderError, Result};
use crate::features::{FeatureSchema, DEFAULT_FREQUENCY_THRESHOLD};
use crate::reducer::DEFAULT_VARIANCE_TARGET;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_VIDEO_BASE_URL: &str =
    "https://fi.ee.tsinghua.edu.cn/datasets/short-video-dataset/raw_file/";

/// Recommendation service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Server host
    pub bind_address: String,

    /// Server port (default: 8082)
    pub port: u16,

    /// Worker threads
    pub workers: Option<usize>,

    /// Directory holding every persisted artifact
    pub data_dir: PathBuf,

    pub profiles_file: String,
    pub clusters_file: String,
    pub pipeline_file: String,
    pub comments_file: String,

    /// Page size when the caller does not ask for one
    pub default_count: usize,

    /// Upper bound on a single recommendation request
    pub max_recommendations: usize,

    /// Prefix for playback links; `<pid>.mp4` is appended
    pub video_base_url: String,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8082,
            workers: None,
            data_dir: PathBuf::from("./data"),
            profiles_file: "user_profiles.json".to_string(),
            clusters_file: "videos_by_cluster.json".to_string(),
            pipeline_file: "pipeline.bin".to_string(),
            comments_file: "comments.json".to_string(),
            default_count: 8,
            max_recommendations: 100,
            video_base_url: DEFAULT_VIDEO_BASE_URL.to_string(),
        }
    }
}

impl RecommenderConfig {
    /// Load configuration from `.env`, config file and environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/recommender").required(false))
            .add_source(
                config::Environment::with_prefix("RECOMMENDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RecommenderError::Config("port must be non-zero".into()));
        }
        if self.default_count == 0 {
            return Err(RecommenderError::Config(
                "default_count must be at least 1".into(),
            ));
        }
        if self.default_count > self.max_recommendations {
            return Err(RecommenderError::Config(format!(
                "default_count {} exceeds max_recommendations {}",
                self.default_count, self.max_recommendations
            )));
        }
        Ok(())
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join(&self.profiles_file)
    }

    pub fn clusters_path(&self) -> PathBuf {
        self.data_dir.join(&self.clusters_file)
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.data_dir.join(&self.pipeline_file)
    }

    pub fn comments_path(&self) -> PathBuf {
        self.data_dir.join(&self.comments_file)
    }

    /// Playback link for a video
    pub fn video_url(&self, pid: u64) -> String {
        format!("{}{}.mp4", self.video_base_url, pid)
    }
}

/// Offline fit configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FitConfig {
    /// Categories seen fewer times than this fall into the rare bucket
    pub frequency_threshold: usize,

    /// Cumulative explained variance the reducer must retain, in (0, 1]
    pub variance_target: f64,

    /// DBSCAN neighbourhood radius
    pub eps: f64,

    /// DBSCAN core-point threshold (the point itself included)
    pub min_samples: usize,

    pub schema: FeatureSchema,

    /// JSON array of training records
    pub corpus_path: PathBuf,

    pub pipeline_path: PathBuf,
    pub clusters_path: PathBuf,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            frequency_threshold: DEFAULT_FREQUENCY_THRESHOLD,
            variance_target: DEFAULT_VARIANCE_TARGET,
            eps: 0.5,
            min_samples: 5,
            schema: FeatureSchema::default(),
            corpus_path: PathBuf::from("./data/corpus.json"),
            pipeline_path: PathBuf::from("./data/pipeline.bin"),
            clusters_path: PathBuf::from("./data/videos_by_cluster.json"),
        }
    }
}

impl FitConfig {
    pub fn load() -> Result<Self> {
        Self::load_from("config/fit")
    }

    /// Load from a specific config file (optional) plus environment
    pub fn load_from(file: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let file = file.as_ref().to_string_lossy().into_owned();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("RECOMMENDER_FIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.variance_target > 0.0 && self.variance_target <= 1.0) {
            return Err(RecommenderError::Config(format!(
                "variance_target must be in (0, 1], got {}",
                self.variance_target
            )));
        }
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(RecommenderError::Config(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        if self.min_samples < 2 {
            return Err(RecommenderError::Config(format!(
                "min_samples must be at least 2, got {}",
                self.min_samples
            )));
        }
        if self.schema.is_empty() {
            return Err(RecommenderError::Config(
                "feature schema names no fields".into(),
            ));
        }
        Ok(())
    }
}
