use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;
use crate::github::GitHubError;

/// Failures that end the handling of one inbound event.
///
/// Nothing is retried: each variant is terminal for the request that hit it.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Invalid signature")]
    Authentication,

    #[error("No installation found for this GitHub App.")]
    NoInstallation,

    #[error("{0}")]
    MalformedInput(String),

    #[error("{0} is not configured")]
    MissingSetting(&'static str),

    #[error("Failed to sign app token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error(transparent)]
    Upstream(#[from] GitHubError),
}

impl BotError {
    pub fn status(&self) -> StatusCode {
        match self {
            BotError::Authentication => StatusCode::UNAUTHORIZED,
            BotError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            BotError::NoInstallation
            | BotError::MissingSetting(_)
            | BotError::Signing(_)
            | BotError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for BotError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NoInstallation => BotError::NoInstallation,
            AuthError::Signing(e) => BotError::Signing(e),
            AuthError::Api(e) => BotError::Upstream(e),
        }
    }
}
