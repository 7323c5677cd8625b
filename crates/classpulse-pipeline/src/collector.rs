use std::collections::BTreeMap;

use async_trait::async_trait;
use classpulse_core::{
    AuthorRecord, Branch, Classroom, ClassroomAssignment, Issue, PullRequest, PulseError,
    RosterAccount,
};

/// Hosting-platform data the pipeline consumes.
///
/// [`crate::github::GitHubClient`] is the production implementation; stage
/// tests substitute fixtures.
#[async_trait]
pub trait RemoteCollector: Send + Sync {
    /// Every member of the organization.
    async fn roster(&self) -> Result<Vec<RosterAccount>, PulseError>;

    /// Repository name → student logins for a classroom assignment.
    async fn team_logins(
        &self,
        assignment_id: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, PulseError>;

    /// Who authored `commit`; `email` is the local email the lookup stands for.
    async fn commit_author(
        &self,
        repo: &str,
        commit: &str,
        email: &str,
    ) -> Result<AuthorRecord, PulseError>;

    async fn pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, PulseError>;

    async fn issues(&self, repo: &str) -> Result<Vec<Issue>, PulseError>;

    async fn branches(&self, repo: &str) -> Result<Vec<Branch>, PulseError>;

    /// Classrooms the token can administer.
    async fn list_classrooms(&self) -> Result<Vec<Classroom>, PulseError>;

    /// Assignments of one classroom, for locating a semester's `assignment_id`.
    async fn list_assignments(
        &self,
        classroom_id: u64,
    ) -> Result<Vec<ClassroomAssignment>, PulseError>;
}
