use std::collections::BTreeSet;

use crate::github::PullRequestRef;

/// Invisible marker identifying the comment this bot owns on a pull request.
pub const MARKER: &str = "<!-- This comment was generated automatically by a personal bot. -->";

const UPSTREAM_OWNER: &str = "esphome";
const UPSTREAM_REPO: &str = "esphome";

/// `external_components` source reference for a pull request.
pub fn external_source(pr: &PullRequestRef) -> String {
    if pr.owner == UPSTREAM_OWNER && pr.repo == UPSTREAM_REPO {
        format!("github://pr#{}", pr.number)
    } else {
        format!("github://{}/{}@pull/{}/head", pr.owner, pr.repo, pr.number)
    }
}

/// Instructions for pulling the changed components into a configuration.
pub fn external_component_instructions(
    pr: &PullRequestRef,
    components: &BTreeSet<String>,
) -> String {
    let names = components
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"To use the changes from this PR as an external component, add the following to your ESPHome configuration YAML file:

```yaml
external_components:
  - source: {source}
    components: [{names}]
    refresh: 1h
```"#,
        source = external_source(pr),
        names = names,
    )
}

/// Last non-empty path segment of a repository URL.
pub fn repo_name(url: &str) -> &str {
    url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url)
}

/// Instructions for cloning the repository and checking out the pull request.
pub fn clone_instructions(number: u64, branch: &str, url: &str) -> String {
    format!(
        r#"To use the changes in this PR:

   ```bash
   # Clone the repository:
   git clone {url}
   cd {name}

   # Checkout the PR branch:
   git fetch origin pull/{number}/head:{branch}
   git checkout {branch}

   # Install the development version:
   script/setup

   # Activate the development version:
   source venv/bin/activate
   ```

Now you can run `esphome` as usual to test the changes in this PR.
"#,
        url = url,
        name = repo_name(url),
        number = number,
        branch = branch,
    )
}

/// Append the bot trailer and ownership marker.
pub fn with_trailer(body: &str) -> String {
    format!("{}\n\n---\n(Added by my bot)\n\n{}", body, MARKER)
}
