pub mod handlers;

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

use crate::clustering::ClusterIndex;
use crate::comments::CommentStore;
use crate::config::RecommenderConfig;
use crate::error::{RecommenderError, Result};
use crate::pipeline::FittedPipeline;
use crate::recommendation::RecommendationEngine;
use crate::store::{DegradedStore, FileAffinityStore, ProfileStore};

/// How a persisted artifact came through startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Loaded,
    /// No file yet, as on a fresh install
    #[default]
    Absent,
    /// A file exists but could not be used; it is left in place
    Corrupt,
}

impl ArtifactStatus {
    fn of<T>(path: &Path, loaded: &Result<T>) -> Self {
        match loaded {
            Err(_) => Self::Corrupt,
            Ok(_) if path.exists() => Self::Loaded,
            Ok(_) => Self::Absent,
        }
    }
}

/// Startup outcome for every artifact the service reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub profiles: ArtifactStatus,
    pub clusters: ArtifactStatus,
    pub pipeline: ArtifactStatus,
    pub comments: ArtifactStatus,
}

impl ArtifactReport {
    pub fn any_corrupt(&self) -> bool {
        [self.profiles, self.clusters, self.pipeline, self.comments]
            .contains(&ArtifactStatus::Corrupt)
    }
}

/// Application state shared across all handlers
pub struct AppState {
    pub config: Arc<RecommenderConfig>,
    pub engine: Arc<RecommendationEngine>,
    pub comments: Arc<CommentStore>,
    pub artifacts: ArtifactReport,
}

impl AppState {
    /// Open every artifact named by `config`.
    ///
    /// Corrupt files never abort startup: each one is logged, left untouched
    /// and recorded as [`ArtifactStatus::Corrupt`] while the service runs
    /// degraded. Only non-corruption failures of the profile store are errors.
    pub fn load(config: RecommenderConfig) -> Result<Self> {
        let profiles_path = config.profiles_path();
        let opened = FileAffinityStore::open(&profiles_path);
        let profiles_status = ArtifactStatus::of(&profiles_path, &opened);
        let store: Arc<dyn ProfileStore> = match opened {
            Ok(store) => Arc::new(store),
            Err(RecommenderError::CorruptState { path, reason }) => {
                error!("Profile store {} unusable, user operations disabled: {}", path, reason);
                Arc::new(DegradedStore::new(path, reason))
            }
            Err(e) => return Err(e),
        };

        let clusters_path = config.clusters_path();
        let loaded = ClusterIndex::load(&clusters_path);
        let clusters_status = ArtifactStatus::of(&clusters_path, &loaded);
        let index = loaded.unwrap_or_else(|e| {
            error!("Cluster artifact unusable, serving without clusters: {}", e);
            ClusterIndex::empty()
        });
        if index.is_empty() {
            warn!("No clusters loaded; recommendations fall back to the global ranking");
        }

        let mut engine = RecommendationEngine::new(store, Arc::new(index))
            .with_max_recommendations(config.max_recommendations);

        let pipeline_path = config.pipeline_path();
        let loaded = FittedPipeline::load(&pipeline_path);
        let pipeline_status = ArtifactStatus::of(&pipeline_path, &loaded);
        match loaded {
            Ok(Some(pipeline)) => engine = engine.with_pipeline(Arc::new(pipeline)),
            Ok(None) => warn!("No fitted pipeline found; new videos will be treated as noise"),
            Err(e) => error!("Fitted pipeline unusable: {}", e),
        }

        let comments_path = config.comments_path();
        let opened = CommentStore::open(&comments_path);
        let comments_status = ArtifactStatus::of(&comments_path, &opened);
        let comments = opened.unwrap_or_else(|e| {
            error!("Comment store unusable, new comments will not be persisted: {}", e);
            CommentStore::in_memory()
        });

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            comments: Arc::new(comments),
            artifacts: ArtifactReport {
                profiles: profiles_status,
                clusters: clusters_status,
                pipeline: pipeline_status,
                comments: comments_status,
            },
        })
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
    clusters: usize,
    users: usize,
    artifacts: ArtifactReport,
}

/// Health check endpoint
async fn health(state: web::Data<AppState>) -> impl Responder {
    let clusters = state.engine.index().len();
    let healthy = clusters > 0 && !state.artifacts.any_corrupt();
    HttpResponse::Ok().json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        service: "reels-recommender".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        clusters,
        users: state.engine.store().len(),
        artifacts: state.artifacts,
    })
}

/// Configure application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/users")
                .route("", web::post().to(handlers::create_user))
                .route("/{username}", web::get().to(handlers::get_user))
                .route(
                    "/{username}/interactions",
                    web::post().to(handlers::record_interaction),
                )
                .route(
                    "/{username}/recommendations",
                    web::get().to(handlers::get_recommendations),
                ),
        )
        .service(
            web::scope("/videos")
                .route("/{pid}/similar", web::get().to(handlers::similar_videos))
                .route("/{pid}/comments", web::get().to(handlers::list_comments))
                .route("/{pid}/comments", web::post().to(handlers::post_comment)),
        );
}
