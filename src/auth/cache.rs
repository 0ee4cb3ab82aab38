use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use super::{mint_app_token, AppCredentials, AuthError};
use crate::github::Connector;

/// Installation tokens live for 60 minutes; we stop using ours a minute early.
const INSTALLATION_TOKEN_TTL_MINUTES: i64 = 59;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-wide installation token cache.
///
/// The lock only guards reads and writes of the slot, never the exchange
/// itself: two requests that miss at the same time both mint a token and
/// the later one wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<InstallationToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if one exists and is still valid at `now`.
    pub fn cached(&self, now: DateTime<Utc>) -> Option<InstallationToken> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().filter(|t| t.is_valid_at(now)).cloned()
    }

    fn store(&self, token: InstallationToken) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Return a valid installation token, exchanging a fresh app JWT for a
    /// new one when the cache is empty or expired.
    ///
    /// The app is assumed to have exactly one installation; the first one
    /// listed is used.
    #[instrument(skip_all, fields(app_id = %credentials.app_id))]
    pub async fn installation_token(
        &self,
        connector: &dyn Connector,
        credentials: &AppCredentials,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        if let Some(token) = self.cached(now) {
            debug!(expires_at = %token.expires_at, "using cached installation token");
            return Ok(token.value);
        }

        let jwt = mint_app_token(credentials, now)?;
        let app = connector.connect(Some(&jwt));
        let installations = app.list_installations().await?;
        let installation = installations.first().ok_or(AuthError::NoInstallation)?;
        let access = app.create_installation_token(installation.id).await?;

        let token = InstallationToken {
            value: access.token.clone(),
            expires_at: now + Duration::minutes(INSTALLATION_TOKEN_TTL_MINUTES),
        };
        info!(
            installation = installation.id,
            expires_at = %token.expires_at,
            server_expires_at = ?access.expires_at,
            "minted installation token"
        );
        self.store(token.clone());
        Ok(token.value)
    }
}
