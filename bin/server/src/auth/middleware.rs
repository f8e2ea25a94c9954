//! Authentication extractors for Axum.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use parley_platform_access::{AuthenticationError, CallerIdentity};
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::error::ErrorBody;

/// Extractor for requiring a verified caller.
///
/// Reads `Authorization: Bearer <token>` and checks it with the configured
/// verifier.
pub struct RequireAuth(pub CallerIdentity);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthRejection::NotAuthenticated)?;

        let identity = app_state
            .verifier
            .verify(bearer.token())
            .await
            .map_err(|e| {
                debug!(error = %e, "Bearer credential rejected");
                AuthRejection::from(e)
            })?;

        Ok(RequireAuth(identity))
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    InvalidCredential,
    AccessDenied,
}

impl From<AuthenticationError> for AuthRejection {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::MissingCredential => Self::NotAuthenticated,
            AuthenticationError::InvalidToken { .. } => Self::InvalidCredential,
            AuthenticationError::AccessDenied { .. } => Self::AccessDenied,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
            Self::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid credential"),
            Self::AccessDenied => (StatusCode::FORBIDDEN, "Access denied"),
        };

        let body = Json(ErrorBody::new(message));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
