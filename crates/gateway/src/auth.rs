use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use wag_common::GatewayError;

use crate::{error::ApiError, state::AppState};

/// The authentication middleware is an external collaborator the
/// specification defers (it only requires that a verified caller identity
/// come out the other end). This is the minimal stand-in: HTTP Basic auth
/// against the configured admin credentials.
pub async fn auth_gate(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::MissingCredentials)?;

    if header != state.settings.basic_auth_header() {
        return Err(GatewayError::InvalidCredentials.into());
    }

    Ok(next.run(request).await)
}
