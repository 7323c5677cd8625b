use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An enrolled account from the organization roster.
///
/// # Examples
///
/// ```
/// use classpulse_core::RosterAccount;
///
/// let account: RosterAccount = serde_json::from_str(
///     r#"{"id": "MDQ6VXNlcjE=", "login": "alice", "name": "Alice", "email": null}"#,
/// ).unwrap();
/// assert_eq!(account.account_id, "MDQ6VXNlcjE=");
/// assert_eq!(account.display_name.as_deref(), Some("Alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterAccount {
    /// Platform account id (the canonical contributor id).
    #[serde(alias = "id")]
    pub account_id: String,
    /// Platform login.
    pub login: String,
    /// Profile display name, if public.
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    /// Profile email, if public.
    #[serde(default)]
    pub email: Option<String>,
}

/// Line counts for one file touched by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    /// Lines added.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
}

/// A commit as extracted from local history, before any filtering.
///
/// # Examples
///
/// ```
/// use classpulse_core::RawCommit;
///
/// let commit = RawCommit {
///     hash: "4f2c".into(),
///     author_name: "alice".into(),
///     author_email: "alice@example.com".into(),
///     committed_at: "2025-03-01T10:00:00+08:00".into(),
///     message: "init".into(),
///     insertions: 10,
///     deletions: 0,
///     files_changed: 1,
///     per_file: Default::default(),
/// };
/// assert_eq!(commit.insertions + commit.deletions, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    /// Full commit hash, unique within a repository.
    #[serde(alias = "commit_hash")]
    pub hash: String,
    /// Author name as recorded in the commit.
    pub author_name: String,
    /// Author email as recorded in the commit.
    pub author_email: String,
    /// ISO-8601 timestamp with offset.
    #[serde(alias = "committed_datetime")]
    pub committed_at: String,
    /// Trimmed commit message.
    pub message: String,
    /// Total lines added.
    #[serde(default)]
    pub insertions: u64,
    /// Total lines removed.
    #[serde(default)]
    pub deletions: u64,
    /// Number of files touched.
    #[serde(default)]
    pub files_changed: u64,
    /// Per-path line counts.
    #[serde(default)]
    pub per_file: BTreeMap<String, FileDelta>,
}

/// Commits extracted from one local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCommits {
    /// Repository name (directory name of the clone).
    pub repo_name: String,
    /// Commits across all branches, deduplicated by hash.
    pub commits: Vec<RawCommit>,
}

/// Answer to "who authored commit X" from the hosting platform.
///
/// `email` is the local authorship email the lookup was issued for;
/// `resolved_email` is what the platform reported back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    /// Representative commit hash that was queried.
    pub commit: String,
    /// Local authorship email this lookup stands for.
    pub email: String,
    /// Linked platform account, if the commit is tied to one.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Author name reported by the platform.
    #[serde(default)]
    pub name: Option<String>,
    /// Author email reported by the platform.
    #[serde(default)]
    pub resolved_email: Option<String>,
}

/// A pull request as reported by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number within the repository.
    pub number: u64,
    /// Creation timestamp.
    pub created_at: String,
    /// Close timestamp, if closed.
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Merge timestamp, if merged.
    #[serde(default)]
    pub merged_at: Option<String>,
    /// Login of the author (absent for deleted accounts).
    #[serde(default)]
    pub author_login: Option<String>,
    /// Number of commits in the PR.
    #[serde(default)]
    pub commit_count: u64,
}

/// An issue as reported by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number within the repository.
    pub number: u64,
    /// Creation timestamp.
    pub created_at: String,
    /// Close timestamp, if closed.
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Login of the author.
    #[serde(default)]
    pub author_login: Option<String>,
    /// Number of comments.
    #[serde(default)]
    pub comment_count: u64,
    /// Label names.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A branch head as reported by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name without the `refs/heads/` prefix.
    pub name: String,
    /// Committed time of the head commit.
    #[serde(default)]
    pub head_commit_time: Option<String>,
}

/// A classroom visible to the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

/// One assignment of a classroom; its `id` is a semester's `assignment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomAssignment {
    pub id: u64,
    pub title: String,
    /// `individual` or `group`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Accepted submissions so far.
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub deadline: Option<String>,
}
