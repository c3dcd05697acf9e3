use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::FeedError;

/// Error surface of the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Odds not ready")]
    NotReady,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::NotReady => ApiError::NotReady,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY"),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_maps_to_503() {
        let resp = ApiError::from(FeedError::NotReady).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn other_feed_errors_are_internal() {
        let resp = ApiError::from(FeedError::InvalidChange("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
