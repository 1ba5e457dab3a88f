use actix_web::{web, HttpResponse};
use actix_web::ResponseError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AppState;
use crate::comments::Comment;
use crate::error::RecommenderError;
use crate::types::{ClusterLabel, Pid, Recommendation, RecommendationSource, UserProfile};

type HandlerResult = Result<HttpResponse, RecommenderError>;

/// Log failures that the client only sees as a generic 5xx
fn logged(err: RecommenderError) -> RecommenderError {
    if err.status_code().is_server_error() {
        error!("Request failed: {}", err);
    }
    err
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub pid: Pid,
    pub cluster_label: ClusterLabel,
}

/// Query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct CountQuery {
    /// Number of items (default: configured page size)
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: String,
    pub seen: Vec<Pid>,
    pub liked: Vec<Pid>,
    pub affinity: std::collections::BTreeMap<ClusterLabel, u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_interaction_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            username: profile.username,
            seen: profile.seen.into_iter().collect(),
            liked: profile.liked.into_iter().collect(),
            affinity: profile.affinity,
            created_at: profile.created_at,
            last_interaction_at: profile.last_interaction_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationItem {
    pub pid: Pid,
    pub cluster_label: ClusterLabel,
    pub source: RecommendationSource,
    pub video_url: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub username: String,
    pub recommendations: Vec<RecommendationItem>,
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub pid: Pid,
    pub similar: Vec<SimilarItem>,
}

#[derive(Debug, Serialize)]
pub struct SimilarItem {
    pub pid: Pid,
    pub video_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    pub username: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub pid: Pid,
    pub comments: Vec<Comment>,
}

/// POST /users - Create an empty profile
pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> HandlerResult {
    let profile = state
        .engine
        .create_user(&body.username)
        .await
        .map_err(logged)?;

    info!("Created user '{}'", profile.username);
    Ok(HttpResponse::Created().json(UserResponse::from(profile)))
}

/// GET /users/{username}
pub async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> HandlerResult {
    let profile = state.engine.get_user(&path).await.map_err(logged)?;
    Ok(HttpResponse::Ok().json(UserResponse::from(profile)))
}

/// POST /users/{username}/interactions - Record a like
pub async fn record_interaction(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<InteractionRequest>,
) -> HandlerResult {
    let profile = state
        .engine
        .record_interaction(&path, body.pid, body.cluster_label)
        .await
        .map_err(logged)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "recorded",
        "username": profile.username,
        "pid": body.pid,
        "affinity": profile.affinity,
    })))
}

/// GET /users/{username}/recommendations?count=N
pub async fn get_recommendations(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<CountQuery>,
) -> HandlerResult {
    let count = query.count.unwrap_or(state.config.default_count);
    let recommendations = state
        .engine
        .get_recommendations(&path, count)
        .await
        .map_err(logged)?;

    let items = recommendations
        .into_iter()
        .map(|Recommendation { pid, cluster_label, source }| RecommendationItem {
            pid,
            cluster_label,
            source,
            video_url: state.config.video_url(pid),
        })
        .collect();

    Ok(HttpResponse::Ok().json(RecommendationsResponse {
        username: path.trim().to_string(),
        recommendations: items,
    }))
}

/// GET /videos/{pid}/similar?count=N
pub async fn similar_videos(
    state: web::Data<AppState>,
    path: web::Path<Pid>,
    query: web::Query<CountQuery>,
) -> HandlerResult {
    let pid = path.into_inner();
    let count = query.count.unwrap_or(state.config.default_count);

    let similar = state
        .engine
        .similar_videos(pid, count)
        .into_iter()
        .map(|pid| SimilarItem {
            pid,
            video_url: state.config.video_url(pid),
        })
        .collect();

    Ok(HttpResponse::Ok().json(SimilarResponse { pid, similar }))
}

/// GET /videos/{pid}/comments
pub async fn list_comments(state: web::Data<AppState>, path: web::Path<Pid>) -> HandlerResult {
    let pid = path.into_inner();
    let comments = state.comments.list(pid).await;
    Ok(HttpResponse::Ok().json(CommentsResponse { pid, comments }))
}

/// POST /videos/{pid}/comments
pub async fn post_comment(
    state: web::Data<AppState>,
    path: web::Path<Pid>,
    body: web::Json<PostCommentRequest>,
) -> HandlerResult {
    let pid = path.into_inner();
    let comment = state
        .comments
        .post(pid, &body.username, &body.text)
        .await
        .map_err(logged)?;

    Ok(HttpResponse::Created().json(comment))
}
