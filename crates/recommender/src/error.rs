use actix_web::{http::StatusCode, HttpResponse, ResponseError};

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RecommenderError {
    #[error("Schema error on field '{field}': {reason}")]
    Schema { field: String, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No clusters available")]
    NoClustersAvailable,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt state in {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecommenderError {
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::CorruptState {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema_error",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::NoClustersAvailable => "no_clusters_available",
            Self::UserNotFound(_) => "user_not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::CorruptState { .. } => "corrupt_state",
            Self::InvalidInput(_) => "invalid_input",
            Self::Fit(_) => "fit_error",
            Self::Persistence(_) => "persistence_error",
            Self::Config(_) => "config_error",
        }
    }
}

impl From<std::io::Error> for RecommenderError {
    fn from(err: std::io::Error) -> Self {
        RecommenderError::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for RecommenderError {
    fn from(err: config::ConfigError) -> Self {
        RecommenderError::Config(err.to_string())
    }
}

impl ResponseError for RecommenderError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Schema { .. } | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::CorruptState { .. } | Self::NoClustersAvailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::DimensionMismatch { .. }
            | Self::Fit(_)
            | Self::Persistence(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details stay in the logs.
        let description = match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal error".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "Service degraded".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.code(),
            "error_description": description,
        }))
    }
}
