use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use wag_common::GatewayError;

/// The single adaptation layer between the typed error taxonomy and the
/// wire-level error envelope.
#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    message: String,
    error: &'static str,
}

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope {
            success: false,
            message: self.0.to_string(),
            error: self.0.code(),
        };
        (status, Json(envelope)).into_response()
    }
}
