pub mod types;

#[cfg(test)]
pub mod fake;

pub use types::{
    AccessToken, ChangedFile, Comment, Installation, PullRequestDetails, PullRequestEvent,
    PullRequestRef,
};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

const USER_AGENT: &str = "esphome-pr-bot";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
/// Upper bound on pages per listing; the file listing itself stops at 30.
const MAX_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned an unexpected response: {0}")]
    Unexpected(String),
}

/// The hosting-platform operations the bot performs.
///
/// Every list operation returns the fully drained result; callers never
/// see a partial page.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn list_installations(&self) -> Result<Vec<Installation>, GitHubError>;

    async fn create_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, GitHubError>;

    async fn get_pull_request(&self, pr: &PullRequestRef)
        -> Result<PullRequestDetails, GitHubError>;

    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFile>, GitHubError>;

    async fn list_issue_comments(&self, pr: &PullRequestRef) -> Result<Vec<Comment>, GitHubError>;

    async fn create_issue_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<Comment, GitHubError>;

    async fn update_issue_comment(
        &self,
        pr: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> Result<Comment, GitHubError>;
}

/// Produces an API handle acting with the given credential
/// (app JWT, installation token, personal token, or anonymous).
pub trait Connector: Send + Sync {
    fn connect(&self, token: Option<&str>) -> Arc<dyn GitHubApi>;
}

/// Connector backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    base_url: String,
}

impl HttpConnector {
    pub fn new(base_url: &str) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, token: Option<&str>) -> Arc<dyn GitHubApi> {
        Arc::new(GitHubClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.map(str::to_string),
        })
    }
}

/// REST client for api.github.com (or a compatible base URL).
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GitHubError> {
        let value = builder.send().await?.error_for_status()?.json::<T>().await?;
        Ok(value)
    }

    /// Request every page of a list endpoint in sequence.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<T> = self
                .send_json(
                    self.request(Method::GET, path)
                        .query(&[("per_page", PER_PAGE), ("page", page)]),
                )
                .await?;
            let received = batch.len();
            items.extend(batch);
            debug!(path, page, received, "fetched page");
            if received < PER_PAGE {
                return Ok(items);
            }
        }
        Err(GitHubError::Unexpected(format!(
            "{} returned more than {} pages",
            path, MAX_PAGES
        )))
    }
}

fn repo_path(pr: &PullRequestRef) -> String {
    format!("/repos/{}/{}", pr.owner, pr.repo)
}

#[derive(serde::Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self))]
    async fn list_installations(&self) -> Result<Vec<Installation>, GitHubError> {
        self.send_json(self.request(Method::GET, "/app/installations"))
            .await
    }

    #[instrument(skip(self))]
    async fn create_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, GitHubError> {
        let path = format!("/app/installations/{}/access_tokens", installation_id);
        self.send_json(self.request(Method::POST, &path)).await
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn get_pull_request(
        &self,
        pr: &PullRequestRef,
    ) -> Result<PullRequestDetails, GitHubError> {
        let path = format!("{}/pulls/{}", repo_path(pr), pr.number);
        self.send_json(self.request(Method::GET, &path)).await
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFile>, GitHubError> {
        self.get_all(&format!("{}/pulls/{}/files", repo_path(pr), pr.number))
            .await
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn list_issue_comments(&self, pr: &PullRequestRef) -> Result<Vec<Comment>, GitHubError> {
        self.get_all(&format!("{}/issues/{}/comments", repo_path(pr), pr.number))
            .await
    }

    #[instrument(skip_all, fields(pr = %pr))]
    async fn create_issue_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<Comment, GitHubError> {
        let path = format!("{}/issues/{}/comments", repo_path(pr), pr.number);
        self.send_json(self.request(Method::POST, &path).json(&CommentBody { body }))
            .await
    }

    #[instrument(skip_all, fields(pr = %pr, comment_id = comment_id))]
    async fn update_issue_comment(
        &self,
        pr: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> Result<Comment, GitHubError> {
        let path = format!("{}/issues/comments/{}", repo_path(pr), comment_id);
        self.send_json(self.request(Method::PATCH, &path).json(&CommentBody { body }))
            .await
    }
}
