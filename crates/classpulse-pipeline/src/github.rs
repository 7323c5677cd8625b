//! GitHub collector: GraphQL through octocrab, classroom REST through reqwest.
//!
//! Transport and parsing are split. Every `parse_*` function works on a
//! `serde_json::Value` so responses can be checked against fixtures.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use classpulse_core::{
    AuthorRecord, Branch, Classroom, ClassroomAssignment, Issue, PullRequest, PulseError,
    RosterAccount,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collector::RemoteCollector;

const MEMBERS_PAGE_SIZE: u64 = 100;
const REPO_PAGE_SIZE: u64 = 50;
const REST_PAGE_SIZE: u64 = 100;
const API_BASE: &str = "https://api.github.com";

const MEMBERS_QUERY: &str = r#"
query($org: String!, $first: Int!, $after: String) {
  organization(login: $org) {
    membersWithRole(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      nodes { id login name email }
    }
  }
}"#;

const COMMIT_AUTHOR_QUERY: &str = r#"
query($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Commit { author { user { id } name email } }
    }
  }
}"#;

const PULLS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    pullRequests(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number createdAt closedAt mergedAt
        author { login }
        commits { totalCount }
      }
    }
  }
}"#;

const ISSUES_QUERY: &str = r#"
query($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    issues(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number createdAt closedAt
        author { login }
        comments { totalCount }
        labels(first: 5) { nodes { name } }
      }
    }
  }
}"#;

const BRANCHES_QUERY: &str = r#"
query($owner: String!, $repo: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    refs(refPrefix: "refs/heads/", first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        target { ... on Commit { committedDate } }
      }
    }
  }
}"#;

/// GitHub client scoped to one organization.
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: String,
    organization: String,
    request_timeout: Duration,
}

impl GitHubClient {
    /// # Errors
    ///
    /// Returns [`PulseError::Remote`] if either HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use classpulse_pipeline::github::GitHubClient;
    ///
    /// let client = GitHubClient::new("ghp_xxxx", "sustech-cs304", Duration::from_secs(15)).unwrap();
    /// ```
    pub fn new(
        token: &str,
        organization: &str,
        request_timeout: Duration,
    ) -> Result<Self, PulseError> {
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| PulseError::Remote(format!("failed to create GitHub client: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("classpulse")
            .build()
            .map_err(|e| PulseError::Remote(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            octocrab,
            http,
            token: token.to_string(),
            organization: organization.to_string(),
            request_timeout,
        })
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, PulseError>>,
    ) -> Result<T, PulseError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| PulseError::Timeout {
                what: what.to_string(),
                secs: self.request_timeout.as_secs(),
            })?
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, PulseError> {
        let payload = json!({ "query": query, "variables": variables });
        let body: Value = self
            .with_timeout("graphql request", async {
                self.octocrab
                    .graphql(&payload)
                    .await
                    .map_err(|e| PulseError::Remote(format!("graphql request failed: {e}")))
            })
            .await?;
        check_graphql_errors(&body)?;
        Ok(body)
    }

    async fn paginate(
        &self,
        query: &str,
        mut variables: Value,
        page_size: u64,
        connection: &[&str],
    ) -> Result<Vec<Value>, PulseError> {
        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            variables["first"] = json!(page_size);
            variables["after"] = json!(cursor);
            let body = self.graphql(query, variables.clone()).await?;
            let page = parse_page(&body, connection)?;
            nodes.extend(page.nodes);
            match page.end_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                _ => break,
            }
        }
        Ok(nodes)
    }

    fn repo_variables(&self, repo: &str) -> Value {
        json!({ "owner": self.organization, "repo": repo })
    }

    async fn rest_page(&self, path: &str, page: u64) -> Result<Value, PulseError> {
        let url = format!("{API_BASE}{path}");
        self.with_timeout(path, async {
            let response = self
                .http
                .get(&url)
                .query(&[("page", page), ("per_page", REST_PAGE_SIZE)])
                .header("Accept", "application/vnd.github+json")
                .header("Authorization", format!("Bearer {}", self.token))
                .send()
                .await
                .map_err(|e| PulseError::Remote(format!("GET {path} failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PulseError::Remote(format!(
                    "GitHub API error {status} on {path}: {body}"
                )));
            }
            response
                .json()
                .await
                .map_err(|e| PulseError::Remote(format!("failed to read {path}: {e}")))
        })
        .await
    }

    /// Concatenate a paged REST listing; an empty page ends it.
    async fn rest_list(&self, path: &str) -> Result<Value, PulseError> {
        let mut items = Vec::new();
        for page in 1.. {
            let body = self.rest_page(path, page).await?;
            let batch = body
                .as_array()
                .ok_or_else(|| PulseError::Parse(format!("{path} did not return a list")))?;
            if batch.is_empty() {
                break;
            }
            items.extend(batch.iter().cloned());
            if (batch.len() as u64) < REST_PAGE_SIZE {
                break;
            }
        }
        Ok(Value::Array(items))
    }
}

#[async_trait]
impl RemoteCollector for GitHubClient {
    async fn roster(&self) -> Result<Vec<RosterAccount>, PulseError> {
        let nodes = self
            .paginate(
                MEMBERS_QUERY,
                json!({ "org": self.organization }),
                MEMBERS_PAGE_SIZE,
                &["organization", "membersWithRole"],
            )
            .await?;
        nodes.into_iter().map(parse_member).collect()
    }

    async fn team_logins(
        &self,
        assignment_id: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, PulseError> {
        let body = self
            .rest_list(&format!("/assignments/{assignment_id}/accepted_assignments"))
            .await?;
        parse_accepted_assignments(&body)
    }

    async fn commit_author(
        &self,
        repo: &str,
        commit: &str,
        email: &str,
    ) -> Result<AuthorRecord, PulseError> {
        let body = self
            .graphql(
                COMMIT_AUTHOR_QUERY,
                json!({ "owner": self.organization, "name": repo, "expression": commit }),
            )
            .await?;
        parse_commit_author(&body, commit, email)
    }

    async fn pull_requests(&self, repo: &str) -> Result<Vec<PullRequest>, PulseError> {
        let nodes = self
            .paginate(
                PULLS_QUERY,
                self.repo_variables(repo),
                REPO_PAGE_SIZE,
                &["repository", "pullRequests"],
            )
            .await?;
        nodes.into_iter().map(parse_pull).collect()
    }

    async fn issues(&self, repo: &str) -> Result<Vec<Issue>, PulseError> {
        let nodes = self
            .paginate(
                ISSUES_QUERY,
                self.repo_variables(repo),
                REPO_PAGE_SIZE,
                &["repository", "issues"],
            )
            .await?;
        nodes.into_iter().map(parse_issue).collect()
    }

    async fn branches(&self, repo: &str) -> Result<Vec<Branch>, PulseError> {
        let nodes = self
            .paginate(
                BRANCHES_QUERY,
                self.repo_variables(repo),
                REPO_PAGE_SIZE,
                &["repository", "refs"],
            )
            .await?;
        nodes.into_iter().map(parse_branch).collect()
    }

    async fn list_classrooms(&self) -> Result<Vec<Classroom>, PulseError> {
        let body = self.rest_list("/classrooms").await?;
        parse_classrooms(&body)
    }

    async fn list_assignments(
        &self,
        classroom_id: u64,
    ) -> Result<Vec<ClassroomAssignment>, PulseError> {
        let body = self
            .rest_list(&format!("/classrooms/{classroom_id}/assignments"))
            .await?;
        parse_assignments(&body)
    }
}

/// One page of a GraphQL connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub nodes: Vec<Value>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Fail if the response carries a GraphQL `errors` array.
///
/// # Examples
///
/// ```
/// use classpulse_pipeline::github::check_graphql_errors;
///
/// let body = serde_json::json!({"errors": [{"message": "API rate limit exceeded"}]});
/// let err = check_graphql_errors(&body).unwrap_err();
/// assert!(err.to_string().contains("rate limit"));
/// ```
pub fn check_graphql_errors(body: &Value) -> Result<(), PulseError> {
    match body.get("errors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            Err(PulseError::Remote(format!(
                "graphql errors: {}",
                messages.join("; ")
            )))
        }
        _ => Ok(()),
    }
}

fn descend<'a>(body: &'a Value, path: &[&str]) -> Result<&'a Value, PulseError> {
    let mut current = body
        .get("data")
        .ok_or_else(|| PulseError::Remote("response has no data".into()))?;
    for field in path {
        current = match current.get(*field) {
            Some(Value::Null) | None => {
                return Err(PulseError::Remote(format!("response is missing '{field}'")))
            }
            Some(v) => v,
        };
    }
    Ok(current)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

/// Extract nodes and page info from the connection at `data.<path>`.
pub fn parse_page(body: &Value, path: &[&str]) -> Result<Page, PulseError> {
    let connection = descend(body, path)?;
    let info: PageInfo = serde_json::from_value(connection["pageInfo"].clone())
        .map_err(|e| PulseError::Parse(format!("bad pageInfo: {e}")))?;
    let nodes = connection["nodes"]
        .as_array()
        .cloned()
        .ok_or_else(|| PulseError::Parse("connection has no nodes".into()))?;
    Ok(Page {
        nodes,
        has_next_page: info.has_next_page,
        end_cursor: info.end_cursor,
    })
}

pub fn parse_member(node: Value) -> Result<RosterAccount, PulseError> {
    serde_json::from_value(node).map_err(|e| PulseError::Parse(format!("bad member: {e}")))
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullNode {
    number: u64,
    created_at: String,
    closed_at: Option<String>,
    merged_at: Option<String>,
    author: Option<Login>,
    commits: Option<TotalCount>,
}

pub fn parse_pull(node: Value) -> Result<PullRequest, PulseError> {
    let pr: PullNode =
        serde_json::from_value(node).map_err(|e| PulseError::Parse(format!("bad pull: {e}")))?;
    Ok(PullRequest {
        number: pr.number,
        created_at: pr.created_at,
        closed_at: pr.closed_at,
        merged_at: pr.merged_at,
        author_login: pr.author.map(|a| a.login),
        commit_count: pr.commits.map_or(0, |c| c.total_count),
    })
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
struct Labels {
    nodes: Vec<Label>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    number: u64,
    created_at: String,
    closed_at: Option<String>,
    author: Option<Login>,
    comments: Option<TotalCount>,
    labels: Option<Labels>,
}

pub fn parse_issue(node: Value) -> Result<Issue, PulseError> {
    let issue: IssueNode =
        serde_json::from_value(node).map_err(|e| PulseError::Parse(format!("bad issue: {e}")))?;
    Ok(Issue {
        number: issue.number,
        created_at: issue.created_at,
        closed_at: issue.closed_at,
        author_login: issue.author.map(|a| a.login),
        comment_count: issue.comments.map_or(0, |c| c.total_count),
        labels: issue
            .labels
            .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
            .unwrap_or_default(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchTarget {
    committed_date: Option<String>,
}

#[derive(Deserialize)]
struct BranchNode {
    name: String,
    target: Option<BranchTarget>,
}

pub fn parse_branch(node: Value) -> Result<Branch, PulseError> {
    let branch: BranchNode =
        serde_json::from_value(node).map_err(|e| PulseError::Parse(format!("bad branch: {e}")))?;
    Ok(Branch {
        name: branch.name,
        head_commit_time: branch.target.and_then(|t| t.committed_date),
    })
}

/// Read the author of a commit lookup response.
///
/// A commit that is not linked to an account yields `account_id: None`.
pub fn parse_commit_author(body: &Value, commit: &str, email: &str) -> Result<AuthorRecord, PulseError> {
    let author = descend(body, &["repository", "object", "author"])?;
    Ok(AuthorRecord {
        commit: commit.to_string(),
        email: email.to_string(),
        account_id: author["user"]["id"].as_str().map(str::to_string),
        name: author["name"].as_str().map(str::to_string),
        resolved_email: author["email"].as_str().map(str::to_string),
    })
}

#[derive(Deserialize)]
struct AcceptedRepository {
    name: String,
}

#[derive(Deserialize)]
struct AcceptedAssignment {
    repository: AcceptedRepository,
    #[serde(default)]
    students: Vec<Login>,
}

/// Repository name → student logins from a classroom accepted-assignments listing.
pub fn parse_accepted_assignments(body: &Value) -> Result<BTreeMap<String, Vec<String>>, PulseError> {
    let accepted: Vec<AcceptedAssignment> = serde_json::from_value(body.clone())
        .map_err(|e| PulseError::Parse(format!("bad accepted assignments: {e}")))?;
    Ok(accepted
        .into_iter()
        .map(|a| {
            (
                a.repository.name,
                a.students.into_iter().map(|s| s.login).collect(),
            )
        })
        .collect())
}

pub fn parse_classrooms(body: &Value) -> Result<Vec<Classroom>, PulseError> {
    serde_json::from_value(body.clone())
        .map_err(|e| PulseError::Parse(format!("bad classroom list: {e}")))
}

pub fn parse_assignments(body: &Value) -> Result<Vec<ClassroomAssignment>, PulseError> {
    serde_json::from_value(body.clone())
        .map_err(|e| PulseError::Parse(format!("bad assignment list: {e}")))
}
