//! In-memory stand-in for the GitHub API, shared by unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    AccessToken, ChangedFile, Comment, Connector, GitHubApi, GitHubError, Installation,
    PullRequestDetails, PullRequestRef,
};

/// A recorded API call: which credential was used and what was done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub token: Option<String>,
    pub op: String,
}

#[derive(Debug, Default)]
struct State {
    files: Vec<String>,
    fail_files: bool,
    comments: Vec<Comment>,
    next_comment_id: u64,
    pull: Option<PullRequestDetails>,
    installations: Vec<u64>,
    tokens_issued: u32,
    calls: Vec<Call>,
}

/// Cloning shares the underlying state; each connected handle records
/// the token it was created with. Comment reads and writes yield to the
/// runtime first, so concurrently dispatched events interleave there.
#[derive(Debug, Clone, Default)]
pub struct FakeGitHub {
    state: Arc<Mutex<State>>,
    token: Option<String>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.installations = vec![1];
            state.next_comment_id = 1000;
        }
        fake
    }

    pub fn with_files(self, files: &[&str]) -> Self {
        self.state.lock().unwrap().files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_comment(self, id: u64, body: &str) -> Self {
        self.state.lock().unwrap().comments.push(Comment {
            id,
            body: body.to_string(),
        });
        self
    }

    pub fn with_pull(self, pull: PullRequestDetails) -> Self {
        self.state.lock().unwrap().pull = Some(pull);
        self
    }

    pub fn with_installations(self, ids: &[u64]) -> Self {
        self.state.lock().unwrap().installations = ids.to_vec();
        self
    }

    /// Make the file listing fail, as if a page request errored midway.
    pub fn failing_files(self) -> Self {
        self.state.lock().unwrap().fail_files = true;
        self
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn tokens_issued(&self) -> u32 {
        self.state.lock().unwrap().tokens_issued
    }

    fn record(&self, state: &mut State, op: String) {
        state.calls.push(Call {
            token: self.token.clone(),
            op,
        });
    }
}

impl Connector for FakeGitHub {
    fn connect(&self, token: Option<&str>) -> Arc<dyn GitHubApi> {
        Arc::new(FakeGitHub {
            state: Arc::clone(&self.state),
            token: token.map(str::to_string),
        })
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn list_installations(&self) -> Result<Vec<Installation>, GitHubError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "list_installations".to_string());
        Ok(state
            .installations
            .iter()
            .map(|&id| Installation { id })
            .collect())
    }

    async fn create_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, GitHubError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("create_installation_token {}", installation_id));
        state.tokens_issued += 1;
        Ok(AccessToken {
            token: format!("ghs_{}", state.tokens_issued),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn get_pull_request(
        &self,
        pr: &PullRequestRef,
    ) -> Result<PullRequestDetails, GitHubError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("get_pull_request {}", pr));
        state
            .pull
            .clone()
            .ok_or_else(|| GitHubError::Unexpected(format!("no pull request {}", pr)))
    }

    async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFile>, GitHubError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("list_pull_request_files {}", pr));
        if state.fail_files {
            return Err(GitHubError::Unexpected("page 2 failed".to_string()));
        }
        Ok(state
            .files
            .iter()
            .map(|f| ChangedFile {
                filename: f.clone(),
            })
            .collect())
    }

    async fn list_issue_comments(&self, pr: &PullRequestRef) -> Result<Vec<Comment>, GitHubError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("list_issue_comments {}", pr));
        Ok(state.comments.clone())
    }

    async fn create_issue_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<Comment, GitHubError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("create_issue_comment {}", pr));
        state.next_comment_id += 1;
        let comment = Comment {
            id: state.next_comment_id,
            body: body.to_string(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn update_issue_comment(
        &self,
        pr: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> Result<Comment, GitHubError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, format!("update_issue_comment {} {}", pr, comment_id));
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| GitHubError::Unexpected(format!("no comment {}", comment_id)))?;
        comment.body = body.to_string();
        Ok(comment.clone())
    }
}
