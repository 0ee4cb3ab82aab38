use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, info_span, warn, Instrument};

use crate::auth::{verify_signature, TokenCache};
use crate::classify::classify;
use crate::comment::{reconcile, Action};
use crate::config::Config;
use crate::error::BotError;
use crate::github::{Connector, PullRequestEvent, PullRequestRef};

static SUBJECT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\] .* \(PR #(\d+)\)").expect("subject pattern is valid")
});

const PULL_REQUEST_EVENT: &str = "pull_request";

/// An inbound request, reduced to the parts the bot looks at.
#[derive(Debug, Clone, Copy)]
pub enum InboundEvent<'a> {
    /// A GitHub webhook delivery; `raw_body` is exactly what was received.
    Webhook {
        event_type: Option<&'a str>,
        signature: Option<&'a str>,
        raw_body: &'a [u8],
    },
    /// A notification email forwarded as a form post.
    Mailhook { subject: Option<&'a str> },
}

/// How an event was handled when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed(Action),
    Ignored(&'static str),
}

/// Parse `[owner/repo] ... (PR #123)` out of a notification subject.
pub fn parse_subject(subject: &str) -> Option<PullRequestRef> {
    let captures = SUBJECT_PATTERN.captures(subject)?;
    let number = captures[2].parse().ok()?;
    PullRequestRef::from_full_name(&captures[1], number)
}

/// Runs inbound events through authentication, classification and
/// comment reconciliation.
///
/// Handles no shared state besides the token cache, so any number of events
/// may be dispatched concurrently, including several for one pull request.
pub struct Dispatcher {
    config: Config,
    tokens: TokenCache,
    connector: Arc<dyn Connector>,
}

impl Dispatcher {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            tokens: TokenCache::new(),
            connector,
        }
    }

    pub async fn dispatch(&self, event: InboundEvent<'_>) -> Result<Outcome, BotError> {
        match event {
            InboundEvent::Webhook {
                event_type,
                signature,
                raw_body,
            } => {
                let span = info_span!("webhook", event = event_type.unwrap_or(""));
                self.handle_webhook(event_type, signature, raw_body)
                    .instrument(span)
                    .await
            }
            InboundEvent::Mailhook { subject } => {
                self.handle_mailhook(subject)
                    .instrument(info_span!("mailhook"))
                    .await
            }
        }
    }

    async fn handle_webhook(
        &self,
        event_type: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<Outcome, BotError> {
        let secret = self
            .config
            .github
            .webhook_secret
            .as_deref()
            .ok_or(BotError::MissingSetting("WEBHOOK_SECRET"))?;
        if !verify_signature(raw_body, signature, secret) {
            warn!(has_signature = signature.is_some(), "rejected webhook signature");
            return Err(BotError::Authentication);
        }

        if event_type != Some(PULL_REQUEST_EVENT) {
            return Ok(Outcome::Ignored("event not handled"));
        }
        let event: PullRequestEvent = serde_json::from_slice(raw_body).map_err(|e| {
            BotError::MalformedInput(format!("Invalid pull_request payload: {}", e))
        })?;
        if !event.action.touches_files() {
            return Ok(Outcome::Ignored("action not handled"));
        }

        let head = PullRequestRef::from_full_name(
            &event.repository.full_name,
            event.pull_request.number,
        )
        .ok_or_else(|| malformed_repo(&event.repository.full_name))?;
        let base = event
            .pull_request
            .base_ref()
            .ok_or_else(|| malformed_repo(&event.pull_request.base_repo_full_name))?;
        info!(pr = %head, action = ?event.action, "handling pull request event");

        let credentials = self
            .config
            .app_credentials()
            .ok_or(BotError::MissingSetting("APP_ID/PRIVATE_KEY"))?;
        let token = self
            .tokens
            .installation_token(self.connector.as_ref(), &credentials, Utc::now())
            .await?;
        let api = self.connector.connect(Some(&token));

        let classification = classify(api.as_ref(), &head).await?;
        if !classification.has_component_changes() {
            return Ok(Outcome::Ignored("No component changes"));
        }
        let action = reconcile(api.as_ref(), &base, &event.pull_request, &classification).await?;
        Ok(Outcome::Processed(action))
    }

    async fn handle_mailhook(&self, subject: Option<&str>) -> Result<Outcome, BotError> {
        let subject = subject
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BotError::MalformedInput("Missing subject".to_string()))?;
        let pr = parse_subject(subject)
            .ok_or_else(|| BotError::MalformedInput("Invalid subject format".to_string()))?;

        let reader = self.connector.connect(None);
        let details = reader.get_pull_request(&pr).await?;
        info!(pr = %pr, author = %details.author_login, state = %details.state, "handling notification");
        if details.author_login != self.config.bot.allowed_author {
            warn!(author = %details.author_login, "ignoring pull request from other author");
            return Ok(Outcome::Ignored("Wrong user"));
        }

        let classification = classify(reader.as_ref(), &pr).await?;
        if !classification.has_component_changes() {
            return Ok(Outcome::Ignored("No component changes"));
        }

        let token = self
            .config
            .github
            .cps_token
            .as_deref()
            .ok_or(BotError::MissingSetting("CPS_TOKEN"))?;
        let base = details
            .base_ref()
            .ok_or_else(|| malformed_repo(&details.base_repo_full_name))?;
        let writer = self.connector.connect(Some(token));
        let action = reconcile(writer.as_ref(), &base, &details, &classification).await?;
        Ok(Outcome::Processed(action))
    }
}

fn malformed_repo(full_name: &str) -> BotError {
    BotError::MalformedInput(format!("Invalid repository name: {}", full_name))
}
