//! Authorship identity resolution.
//!
//! Maps every local authorship email to a roster account id using the
//! hosting platform's answer for one representative commit per email.
//! Email is the sole identity key: two emails of the same person stay two
//! identities unless the platform links both to the same account.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use classpulse_core::{AuthorRecord, PulseError, RepoCommits, RosterAccount};
use serde::{Deserialize, Serialize};

/// One remote authorship query: "who authored `commit` in `repo_name`".
///
/// # Examples
///
/// ```
/// use classpulse_reconcile::identity::LookupRequest;
///
/// let req = LookupRequest {
///     repo_name: "team-project-42".into(),
///     email: "alice@example.com".into(),
///     commit: "9a1f".into(),
/// };
/// assert_eq!(req.commit, "9a1f");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    /// Repository holding the commit.
    pub repo_name: String,
    /// Authorship email this lookup resolves.
    pub email: String,
    /// Representative commit hash for the email.
    pub commit: String,
}

/// Pick one representative commit per distinct author email, per repository.
///
/// The first commit seen for an email is its representative, so each email
/// is queried at most once per repository.
///
/// # Examples
///
/// ```
/// use classpulse_core::{RawCommit, RepoCommits};
/// use classpulse_reconcile::identity::plan_lookups;
///
/// let commit = |hash: &str, email: &str| RawCommit {
///     hash: hash.into(),
///     author_name: "x".into(),
///     author_email: email.into(),
///     committed_at: "2025-03-01T00:00:00+08:00".into(),
///     message: String::new(),
///     insertions: 0,
///     deletions: 0,
///     files_changed: 0,
///     per_file: Default::default(),
/// };
/// let repo = RepoCommits {
///     repo_name: "r".into(),
///     commits: vec![commit("a", "p@x"), commit("b", "p@x"), commit("c", "q@x")],
/// };
/// let plan = plan_lookups(&[repo]);
/// let hashes: Vec<_> = plan["r"].iter().map(|r| r.commit.as_str()).collect();
/// assert_eq!(hashes, ["a", "c"]);
/// ```
pub fn plan_lookups(repos: &[RepoCommits]) -> BTreeMap<String, Vec<LookupRequest>> {
    let mut plan = BTreeMap::new();
    for repo in repos {
        let mut seen = BTreeSet::new();
        let mut requests = Vec::new();
        for commit in &repo.commits {
            if seen.insert(commit.author_email.as_str()) {
                requests.push(LookupRequest {
                    repo_name: repo.repo_name.clone(),
                    email: commit.author_email.clone(),
                    commit: commit.hash.clone(),
                });
            }
        }
        plan.insert(repo.repo_name.clone(), requests);
    }
    plan
}

/// Index roster accounts by login.
pub fn login_to_id(roster: &[RosterAccount]) -> HashMap<&str, &str> {
    roster
        .iter()
        .map(|a| (a.login.as_str(), a.account_id.as_str()))
        .collect()
}

/// Turn per-repository member logins into per-repository account id sets.
///
/// Logins that are not on the roster are logged and left out.
pub fn team_rosters(
    roster: &[RosterAccount],
    team_logins: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let index = login_to_id(roster);
    let mut teams = BTreeMap::new();
    let mut unknown = 0usize;
    for (repo, logins) in team_logins {
        let mut ids = BTreeSet::new();
        for login in logins {
            match index.get(login.as_str()) {
                Some(id) => {
                    ids.insert((*id).to_string());
                }
                None => {
                    log::warn!("team member {login} of {repo} is not on the roster");
                    unknown += 1;
                }
            }
        }
        teams.insert(repo.clone(), ids);
    }
    log::info!(
        "joined {} teams with the roster ({} unknown logins)",
        teams.len(),
        unknown
    );
    teams
}

/// Resolved authorship emails for one pipeline run.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use classpulse_core::{AuthorRecord, RosterAccount};
/// use classpulse_reconcile::identity::IdentityMap;
///
/// let roster = vec![RosterAccount {
///     account_id: "U1".into(),
///     login: "alice".into(),
///     display_name: None,
///     email: None,
/// }];
/// let lookups = BTreeMap::from([(
///     "repo".to_string(),
///     vec![AuthorRecord {
///         commit: "a".into(),
///         email: "alice@example.com".into(),
///         account_id: Some("U1".into()),
///         name: Some("Alice".into()),
///         resolved_email: Some("alice@example.com".into()),
///     }],
/// )]);
/// let map = IdentityMap::resolve(&roster, &lookups).unwrap();
/// assert_eq!(map.account_for("alice@example.com"), Some("U1"));
/// assert_eq!(map.account_for("stranger@example.com"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    resolved: BTreeMap<String, String>,
    external: BTreeSet<String>,
}

impl IdentityMap {
    /// Resolve emails against the roster.
    ///
    /// An email resolves only when the platform linked it to an account that
    /// is on the roster; every other queried email is external.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::IdentityConflict`] if one email was reported
    /// with two different accounts.
    pub fn resolve(
        roster: &[RosterAccount],
        lookups: &BTreeMap<String, Vec<AuthorRecord>>,
    ) -> Result<Self, PulseError> {
        let enrolled: BTreeSet<&str> = roster.iter().map(|a| a.account_id.as_str()).collect();

        let mut linked: BTreeMap<&str, &str> = BTreeMap::new();
        let mut queried: BTreeSet<&str> = BTreeSet::new();
        for (repo, records) in lookups {
            for record in records {
                queried.insert(record.email.as_str());
                let Some(account) = record.account_id.as_deref() else {
                    continue;
                };
                match linked.get(record.email.as_str()) {
                    Some(existing) if *existing != account => {
                        log::error!(
                            "{repo}: {} linked to {existing} and {account}",
                            record.email
                        );
                        return Err(PulseError::IdentityConflict {
                            email: record.email.clone(),
                            first: (*existing).to_string(),
                            second: account.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        linked.insert(record.email.as_str(), account);
                    }
                }
            }
        }

        let mut map = IdentityMap::default();
        for email in queried {
            match linked.get(email) {
                Some(account) if enrolled.contains(account) => {
                    map.resolved.insert(email.to_string(), (*account).to_string());
                }
                _ => {
                    map.external.insert(email.to_string());
                }
            }
        }
        log::info!(
            "resolved {} emails to roster accounts, {} external",
            map.resolved.len(),
            map.external.len()
        );
        Ok(map)
    }

    /// Roster account an email resolves to.
    pub fn account_for(&self, email: &str) -> Option<&str> {
        self.resolved.get(email).map(String::as_str)
    }

    /// Whether the email was queried and found not to belong to the roster.
    pub fn is_external(&self, email: &str) -> bool {
        self.external.contains(email)
    }

    /// Number of resolved emails.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Build contributor records from the observed authorship pairs.
    ///
    /// Emails resolving to the same account collapse into one contributor;
    /// an unresolved email is its own contributor with no roster membership.
    pub fn contributors(&self, repos: &[RepoCommits]) -> Vec<Contributor> {
        let mut by_id: BTreeMap<String, Contributor> = BTreeMap::new();
        for commit in repos.iter().flat_map(|r| &r.commits) {
            let account = self.account_for(&commit.author_email);
            let canonical_id = account
                .map(str::to_string)
                .unwrap_or_else(|| commit.author_email.clone());
            let entry = by_id
                .entry(canonical_id.clone())
                .or_insert_with(|| Contributor {
                    canonical_id,
                    display_names: BTreeSet::new(),
                    emails: BTreeSet::new(),
                    roster_membership: account.map(str::to_string),
                });
            entry.display_names.insert(commit.author_name.clone());
            entry.emails.insert(commit.author_email.clone());
        }
        by_id.into_values().collect()
    }
}

/// A reconciled contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Roster account id, or the email for external contributors.
    pub canonical_id: String,
    /// Author names seen in history.
    pub display_names: BTreeSet<String>,
    /// Authorship emails seen in history.
    pub emails: BTreeSet<String>,
    /// Roster account, when the contributor is enrolled.
    pub roster_membership: Option<String>,
}
