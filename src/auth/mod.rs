pub mod cache;

pub use cache::TokenCache;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::github::GitHubError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";
/// Lifetime of the app identity token in seconds. GitHub rejects anything over ten minutes.
const APP_TOKEN_TTL_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to sign app token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("No installation found for this GitHub App.")]
    NoInstallation,

    #[error(transparent)]
    Api(#[from] GitHubError),
}

/// Identity of the GitHub App, used to mint installation tokens.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub app_id: String,
    /// PEM encoded RSA private key
    pub private_key: String,
}

/// Claims of the app identity token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Check a webhook delivery against its `x-hub-signature-256` header.
///
/// `raw_body` must be the bytes exactly as received. A missing header,
/// a missing `sha256=` prefix or a digest that is not lowercase hex all
/// fail verification.
pub fn verify_signature(raw_body: &[u8], header: Option<&str>, secret: &str) -> bool {
    let Some(digest) = header.and_then(|h| h.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    if digest.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Mint an RS256 JWT authenticating as the app itself.
pub fn mint_app_token(
    credentials: &AppCredentials,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let claims = AppClaims {
        iat: now.timestamp(),
        exp: (now + Duration::seconds(APP_TOKEN_TTL_SECS)).timestamp(),
        iss: credentials.app_id.clone(),
    };
    let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
    let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)?;
    Ok(token)
}
