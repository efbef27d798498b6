use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::PredictorError;

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub status: u16,
    pub message: String,
}

impl PredictorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Self::NotTrained => StatusCode::SERVICE_UNAVAILABLE,
            Self::TrainingInProgress | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ModelLoad(_) | Self::ShapeMismatch { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let message = if self.is_client_safe() {
            self.to_string()
        } else {
            "internal server error".to_string()
        };
        ErrorEnvelope {
            code: self.code(),
            status: self.status_code().as_u16(),
            message,
        }
    }
}

impl IntoResponse for PredictorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), "request failed: {}", self);
        } else {
            warn!(code = self.code(), "request rejected: {}", self);
        }

        let unauthorized = matches!(self, Self::Unauthorized(_));
        let mut response = (status, Json(self.envelope())).into_response();
        if unauthorized {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
