//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use seoforge_shared::SeoforgeError;

/// A [`SeoforgeError`] rendered as `{status: "error", message}`.
#[derive(Debug)]
pub(crate) struct ApiError(pub SeoforgeError);

impl ApiError {
    pub(crate) fn status(&self) -> StatusCode {
        match &self.0 {
            SeoforgeError::Validation { .. } => StatusCode::BAD_REQUEST,
            SeoforgeError::NotFound(_) => StatusCode::NOT_FOUND,
            SeoforgeError::UnmetDependency { .. } => StatusCode::CONFLICT,
            SeoforgeError::UpstreamFetch(_) | SeoforgeError::Generation { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SeoforgeError> for ApiError {
    fn from(e: SeoforgeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        } else {
            warn!(%status, error = %self.0, "request rejected");
        }
        let body = Json(json!({
            "status": "error",
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (SeoforgeError::validation("bad"), StatusCode::BAD_REQUEST),
            (SeoforgeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (SeoforgeError::unmet("ad-copy", "missing"), StatusCode::CONFLICT),
            (SeoforgeError::UpstreamFetch("down".into()), StatusCode::BAD_GATEWAY),
            (SeoforgeError::generation("write-blog", "x"), StatusCode::BAD_GATEWAY),
            (SeoforgeError::Storage("db".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
