use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid booking fields: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("service unavailable: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Logic(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl AppError {
    pub fn validation<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppError::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<rusqlite::Error>() {
            Ok(db) => AppError::Database(db),
            Err(other) => AppError::Logic(format!("{other:#}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Logic(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = match &self {
            AppError::Validation { fields } => {
                serde_json::json!({ "error": "validation", "fields": fields })
            }
            AppError::Conflict(_) => {
                serde_json::json!({ "error": "conflict", "message": self.to_string() })
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                serde_json::json!({ "error": "temporarily unavailable" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
