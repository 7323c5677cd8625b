//! Pull request and issue state.

use std::collections::BTreeMap;

use classpulse_core::{Issue, PullRequest};
use serde::{Deserialize, Serialize};

/// Final state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    Merged,
    Closed,
    Open,
}

/// Final state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Closed,
}

fn is_set(ts: &Option<String>) -> bool {
    ts.as_deref().is_some_and(|s| !s.is_empty())
}

/// Merged beats closed beats open.
///
/// # Examples
///
/// ```
/// use classpulse_core::PullRequest;
/// use classpulse_metrics::lifecycle::{classify_pull, PrStatus};
///
/// let pr = PullRequest {
///     number: 1,
///     created_at: "2025-03-01T00:00:00Z".into(),
///     closed_at: Some("2025-03-02T00:00:00Z".into()),
///     merged_at: Some("2025-03-02T00:00:00Z".into()),
///     author_login: None,
///     commit_count: 1,
/// };
/// assert_eq!(classify_pull(&pr), PrStatus::Merged);
/// ```
pub fn classify_pull(pr: &PullRequest) -> PrStatus {
    if is_set(&pr.merged_at) {
        PrStatus::Merged
    } else if is_set(&pr.closed_at) {
        PrStatus::Closed
    } else {
        PrStatus::Open
    }
}

pub fn classify_issue(issue: &Issue) -> IssueStatus {
    if is_set(&issue.closed_at) {
        IssueStatus::Closed
    } else {
        IssueStatus::Open
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStatusDistribution {
    pub merged: u64,
    pub closed: u64,
    pub open: u64,
}

impl PrStatusDistribution {
    pub fn total(&self) -> u64 {
        self.merged + self.closed + self.open
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatusDistribution {
    pub open: u64,
    pub closed: u64,
}

/// Tally PR states over the listed repositories.
pub fn pr_status_distribution<'a>(
    repo_names: impl IntoIterator<Item = &'a str>,
    pulls: &BTreeMap<String, Vec<PullRequest>>,
) -> PrStatusDistribution {
    let mut dist = PrStatusDistribution::default();
    for pr in repo_names
        .into_iter()
        .filter_map(|name| pulls.get(name))
        .flatten()
    {
        match classify_pull(pr) {
            PrStatus::Merged => dist.merged += 1,
            PrStatus::Closed => dist.closed += 1,
            PrStatus::Open => dist.open += 1,
        }
    }
    dist
}

/// Tally issue states over the listed repositories.
pub fn issue_status_distribution<'a>(
    repo_names: impl IntoIterator<Item = &'a str>,
    issues: &BTreeMap<String, Vec<Issue>>,
) -> IssueStatusDistribution {
    let mut dist = IssueStatusDistribution::default();
    for issue in repo_names
        .into_iter()
        .filter_map(|name| issues.get(name))
        .flatten()
    {
        match classify_issue(issue) {
            IssueStatus::Closed => dist.closed += 1,
            IssueStatus::Open => dist.open += 1,
        }
    }
    dist
}
