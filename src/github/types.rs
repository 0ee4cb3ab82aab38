use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Identifies one pull request on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestRef {
    /// Build a reference from an `owner/repo` full name.
    /// Returns None when the name has no `/` or either half is empty.
    pub fn from_full_name(full_name: &str, number: u64) -> Option<Self> {
        let (owner, repo) = full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }
}

impl std::fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// The parts of a pull request the bot needs, flattened out of the
/// nested JSON object GitHub returns (both from the REST API and inside
/// webhook payloads).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PullRequestWire")]
pub struct PullRequestDetails {
    pub number: u64,
    /// Name of the head branch (`head.ref`)
    pub head_branch: String,
    /// `owner/repo` of the base repository
    pub base_repo_full_name: String,
    /// Browser URL of the base repository, used as the clone URL
    pub base_repo_url: String,
    pub author_login: String,
    pub state: String,
}

impl PullRequestDetails {
    /// Reference to this pull request inside its base repository.
    pub fn base_ref(&self) -> Option<PullRequestRef> {
        PullRequestRef::from_full_name(&self.base_repo_full_name, self.number)
    }
}

#[derive(Deserialize)]
struct PullRequestWire {
    number: u64,
    state: String,
    user: User,
    head: HeadBranch,
    base: BaseBranch,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct HeadBranch {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Deserialize)]
struct BaseBranch {
    repo: Repository,
}

impl From<PullRequestWire> for PullRequestDetails {
    fn from(wire: PullRequestWire) -> Self {
        Self {
            number: wire.number,
            head_branch: wire.head.branch,
            base_repo_full_name: wire.base.repo.full_name,
            base_repo_url: wire.base.repo.html_url,
            author_login: wire.user.login,
            state: wire.state,
        }
    }
}

/// Repository object as it appears in payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
}

/// One entry of the pull request file listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
}

/// An issue comment. Pull request conversation comments live on the
/// pull request's issue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
}

/// Treats `"body": null` like a missing body.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
}

/// Installation access token as returned by the token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    #[serde(other)]
    Other,
}

impl PullRequestAction {
    /// Actions that mean the pull request's file set may have changed.
    pub fn touches_files(self) -> bool {
        matches!(self, PullRequestAction::Opened | PullRequestAction::Synchronize)
    }
}

/// Payload of a `pull_request` webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub pull_request: PullRequestDetails,
    pub repository: Repository,
}
