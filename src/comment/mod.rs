pub mod templates;

pub use templates::MARKER;

use tracing::{debug, info, instrument};

use crate::classify::ChangeClassification;
use crate::github::{Comment, GitHubApi, GitHubError, PullRequestDetails, PullRequestRef};

/// What to do with the bot's comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Create { body: String },
    Update { comment_id: u64, body: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::Create { .. } => write!(f, "create"),
            Action::Update { comment_id, .. } => write!(f, "update {}", comment_id),
        }
    }
}

/// Render the full comment body, trailer and marker included.
///
/// `base` is the pull request inside its base repository.
pub fn render(
    base: &PullRequestRef,
    pr: &PullRequestDetails,
    classification: &ChangeClassification,
) -> String {
    // Any component change is itself a change below the root prefix.
    debug_assert!(
        !classification.has_component_changes() || !classification.top_level_dirs.is_empty()
    );
    let body = if classification.is_single_top_level() {
        templates::external_component_instructions(base, &classification.component_dirs)
    } else {
        templates::clone_instructions(pr.number, &pr.head_branch, &pr.base_repo_url)
    };
    templates::with_trailer(&body)
}

/// The first comment carrying the ownership marker.
pub fn find_owned(comments: &[Comment]) -> Option<&Comment> {
    comments.iter().find(|c| c.body.contains(MARKER))
}

/// Decide how to bring the existing comments in line with `body`.
pub fn decide(comments: &[Comment], body: String) -> Action {
    match find_owned(comments) {
        None => Action::Create { body },
        Some(existing) if existing.body == body => Action::None,
        Some(existing) => Action::Update {
            comment_id: existing.id,
            body,
        },
    }
}

/// Compute the action for a pull request without performing it.
pub async fn plan(
    api: &dyn GitHubApi,
    base: &PullRequestRef,
    pr: &PullRequestDetails,
    classification: &ChangeClassification,
) -> Result<Action, GitHubError> {
    if !classification.has_component_changes() {
        return Ok(Action::None);
    }
    let body = render(base, pr, classification);
    let comments = api.list_issue_comments(base).await?;
    debug!(comments = comments.len(), "listed existing comments");
    Ok(decide(&comments, body))
}

/// Perform a previously planned action.
pub async fn apply(
    api: &dyn GitHubApi,
    base: &PullRequestRef,
    action: &Action,
) -> Result<(), GitHubError> {
    match action {
        Action::None => {}
        Action::Create { body } => {
            let created = api.create_issue_comment(base, body).await?;
            debug!(comment_id = created.id, "created comment");
        }
        Action::Update { comment_id, body } => {
            api.update_issue_comment(base, *comment_id, body).await?;
        }
    }
    Ok(())
}

/// Bring the bot comment on a pull request up to date and report what was done.
///
/// Running this again with unchanged inputs yields `Action::None`.
#[instrument(skip_all, fields(pr = %base))]
pub async fn reconcile(
    api: &dyn GitHubApi,
    base: &PullRequestRef,
    pr: &PullRequestDetails,
    classification: &ChangeClassification,
) -> Result<Action, GitHubError> {
    let action = plan(api, base, pr, classification).await?;
    apply(api, base, &action).await?;
    info!(action = %action, "reconciled comment");
    Ok(action)
}
