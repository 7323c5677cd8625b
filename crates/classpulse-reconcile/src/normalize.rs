//! Commit normalization.
//!
//! Turns one repository's raw history into the analysis-ready record:
//! window filter, attribution filter, per-file noise suppression and net
//! line accounting, applied in that order.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use classpulse_core::{PipelineConfig, RawCommit, RepoCommits, Semester};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityMap;

/// Drop repeated commit hashes, keeping the first occurrence.
///
/// # Examples
///
/// ```
/// use classpulse_core::RawCommit;
/// use classpulse_reconcile::normalize::dedup_commits;
///
/// let commit = |hash: &str| RawCommit {
///     hash: hash.into(),
///     author_name: "a".into(),
///     author_email: "a@x".into(),
///     committed_at: "2025-03-01T00:00:00+08:00".into(),
///     message: String::new(),
///     insertions: 0,
///     deletions: 0,
///     files_changed: 0,
///     per_file: Default::default(),
/// };
/// let unique = dedup_commits(vec![commit("a"), commit("b"), commit("a")]);
/// assert_eq!(unique.len(), 2);
/// ```
pub fn dedup_commits(commits: Vec<RawCommit>) -> Vec<RawCommit> {
    let mut seen = HashSet::new();
    commits
        .into_iter()
        .filter(|c| seen.insert(c.hash.clone()))
        .collect()
}

/// Lowercased extension of a path including the leading dot.
///
/// Dotfiles such as `.gitignore` have no extension.
///
/// # Examples
///
/// ```
/// use classpulse_reconcile::normalize::extension_of;
///
/// assert_eq!(extension_of("src/Main.JAVA").as_deref(), Some(".java"));
/// assert_eq!(extension_of("Makefile"), None);
/// ```
pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// Line accounting policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePolicy {
    /// Files whose insertions or deletions exceed this are skipped.
    pub single_file_line_limit: u64,
    /// Recognized source extensions, lowercase with leading dot.
    pub extensions: BTreeSet<String>,
}

impl LinePolicy {
    /// Build the policy from pipeline settings.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            single_file_line_limit: cfg.single_file_line_limit,
            extensions: cfg.extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Add one commit's net per-extension lines into `totals`.
    pub fn accumulate(&self, commit: &RawCommit, totals: &mut BTreeMap<String, u64>) {
        for (path, delta) in &commit.per_file {
            if delta.insertions > self.single_file_line_limit
                || delta.deletions > self.single_file_line_limit
            {
                continue;
            }
            let Some(ext) = extension_of(path) else {
                continue;
            };
            if self.extensions.contains(&ext) {
                *totals.entry(ext).or_insert(0) += delta.insertions.saturating_sub(delta.deletions);
            }
        }
    }
}

/// A retained, attributed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCommit {
    /// Commit hash.
    pub hash: String,
    /// Author name as recorded.
    pub author_name: String,
    /// Author email as recorded.
    pub author_email: String,
    /// Roster account the email resolved to.
    pub canonical_author_id: String,
    /// Commit timestamp with its original offset.
    pub committed_at: DateTime<FixedOffset>,
    /// Commit message.
    pub message: String,
    /// Lines added.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
    /// Files touched.
    pub files_changed: u64,
    /// Net lines per recognized extension for this commit.
    pub per_file_deltas: BTreeMap<String, u64>,
}

impl NormalizedCommit {
    /// Insertions plus deletions.
    pub fn changed_lines(&self) -> u64 {
        self.insertions + self.deletions
    }
}

/// One repository after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRepo {
    /// Repository name.
    pub repo_name: String,
    /// Team identifier parsed from the name.
    pub group_name: String,
    /// Retained commits, oldest first.
    pub commits: Vec<NormalizedCommit>,
    /// Net lines per extension over retained commits.
    pub code_line_totals: BTreeMap<String, u64>,
    /// Team roster as account ids.
    pub roster_member_ids: BTreeSet<String>,
}

impl NormalizedRepo {
    /// Whether the repository takes part in chart aggregation.
    pub fn is_analyzed(&self) -> bool {
        !self.commits.is_empty()
    }

    /// Total net lines across all extensions.
    pub fn total_lines(&self) -> u64 {
        self.code_line_totals.values().sum()
    }
}

/// Applies the normalization rules for one semester.
pub struct Normalizer<'a> {
    semester: &'a Semester,
    identities: &'a IdentityMap,
    policy: LinePolicy,
}

impl<'a> Normalizer<'a> {
    pub fn new(semester: &'a Semester, identities: &'a IdentityMap, policy: LinePolicy) -> Self {
        Self {
            semester,
            identities,
            policy,
        }
    }

    /// Normalize one repository.
    ///
    /// Returns `None` when the name does not follow the semester's grammar.
    pub fn normalize_repo(
        &self,
        repo: &RepoCommits,
        roster_member_ids: &BTreeSet<String>,
    ) -> Option<NormalizedRepo> {
        let Some(group_name) = self.semester.group_name(&repo.repo_name) else {
            log::debug!(
                "{}: {} does not match the naming pattern, skipped",
                self.semester.key,
                repo.repo_name
            );
            return None;
        };

        let mut commits = Vec::new();
        let mut code_line_totals = BTreeMap::new();
        for raw in dedup_commits(repo.commits.clone()) {
            let committed_at = match DateTime::parse_from_rfc3339(&raw.committed_at) {
                Ok(at) => at,
                Err(e) => {
                    log::warn!(
                        "{}: commit {} has an unreadable timestamp '{}': {e}",
                        repo.repo_name,
                        raw.hash,
                        raw.committed_at
                    );
                    continue;
                }
            };
            if !self.semester.contains(&committed_at) {
                continue;
            }
            let Some(account) = self
                .identities
                .account_for(&raw.author_email)
                .filter(|id| roster_member_ids.contains(*id))
            else {
                continue;
            };

            let mut per_file_deltas = BTreeMap::new();
            self.policy.accumulate(&raw, &mut per_file_deltas);
            for (ext, lines) in &per_file_deltas {
                *code_line_totals.entry(ext.clone()).or_insert(0) += lines;
            }
            commits.push(NormalizedCommit {
                hash: raw.hash,
                author_name: raw.author_name,
                author_email: raw.author_email,
                canonical_author_id: account.to_string(),
                committed_at,
                message: raw.message,
                insertions: raw.insertions,
                deletions: raw.deletions,
                files_changed: raw.files_changed,
                per_file_deltas,
            });
        }
        commits.sort_by_key(|c| c.committed_at);

        Some(NormalizedRepo {
            repo_name: repo.repo_name.clone(),
            group_name,
            commits,
            code_line_totals,
            roster_member_ids: roster_member_ids.clone(),
        })
    }

    /// Normalize every repository of the semester, sorted by name.
    ///
    /// Repositories with zero retained commits are kept in the output but
    /// report `is_analyzed() == false`.
    pub fn normalize_semester(
        &self,
        repos: &[RepoCommits],
        teams: &BTreeMap<String, BTreeSet<String>>,
    ) -> Vec<NormalizedRepo> {
        let empty = BTreeSet::new();
        let mut out: Vec<NormalizedRepo> = repos
            .iter()
            .filter_map(|repo| {
                let roster = teams.get(&repo.repo_name).unwrap_or(&empty);
                self.normalize_repo(repo, roster)
            })
            .collect();
        out.sort_by(|a, b| a.repo_name.cmp(&b.repo_name));
        let analyzed = out.iter().filter(|r| r.is_analyzed()).count();
        log::info!(
            "{}: normalized {} repositories, {} with attributed commits",
            self.semester.key,
            out.len(),
            analyzed
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::{AuthorRecord, FileDelta, PulseConfig, RosterAccount};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn raw(hash: &str, email: &str, at: &str) -> RawCommit {
        RawCommit {
            hash: hash.into(),
            author_name: "n".into(),
            author_email: email.into(),
            committed_at: at.into(),
            message: "m".into(),
            insertions: 0,
            deletions: 0,
            files_changed: 0,
            per_file: BTreeMap::new(),
        }
    }

    fn identities() -> IdentityMap {
        let roster = vec![RosterAccount {
            account_id: "U1".into(),
            login: "alice".into(),
            display_name: None,
            email: None,
        }];
        let lookups = BTreeMap::from([(
            "team-project-25spring-1".to_string(),
            vec![AuthorRecord {
                commit: "a".into(),
                email: "alice@x".into(),
                account_id: Some("U1".into()),
                name: None,
                resolved_email: None,
            }],
        )]);
        IdentityMap::resolve(&roster, &lookups).unwrap()
    }

    fn policy() -> LinePolicy {
        LinePolicy::from_config(&PipelineConfig::default())
    }

    fn spring25() -> Semester {
        PulseConfig::default().semester("25spring").unwrap()
    }

    #[test]
    fn noise_limit_and_extension_filter() {
        let mut commit = raw("a", "alice@x", "2025-03-01T10:00:00+08:00");
        commit.per_file = BTreeMap::from([
            ("src/App.JS".to_string(), FileDelta { insertions: 30, deletions: 10 }),
            ("vendor/big.js".to_string(), FileDelta { insertions: 5000, deletions: 0 }),
            ("notes.txt".to_string(), FileDelta { insertions: 40, deletions: 0 }),
            ("main.py".to_string(), FileDelta { insertions: 2, deletions: 9 }),
        ]);
        let mut totals = BTreeMap::new();
        policy().accumulate(&commit, &mut totals);
        assert_eq!(
            totals,
            BTreeMap::from([(".js".to_string(), 20), (".py".to_string(), 0)])
        );
    }

    #[test]
    fn limit_is_inclusive() {
        let mut commit = raw("a", "alice@x", "2025-03-01T10:00:00+08:00");
        commit.per_file = BTreeMap::from([(
            "a.py".to_string(),
            FileDelta { insertions: 2000, deletions: 0 },
        )]);
        let mut totals = BTreeMap::new();
        policy().accumulate(&commit, &mut totals);
        assert_eq!(totals[".py"], 2000);
    }

    #[test]
    fn unreadable_timestamp_drops_only_that_commit() {
        let semester = spring25();
        let ids = identities();
        let normalizer = Normalizer::new(&semester, &ids, policy());
        let repo = RepoCommits {
            repo_name: "team-project-25spring-1".into(),
            commits: vec![
                raw("a", "alice@x", "not a date"),
                raw("b", "alice@x", "2025-04-01T09:00:00+08:00"),
            ],
        };
        let roster = BTreeSet::from(["U1".to_string()]);
        let out = normalizer.normalize_repo(&repo, &roster).unwrap();
        assert_eq!(out.commits.len(), 1);
        assert_eq!(out.commits[0].hash, "b");
    }

    #[test]
    fn window_uses_semester_civil_date() {
        let semester = spring25();
        let ids = identities();
        let normalizer = Normalizer::new(&semester, &ids, policy());
        // 2025-01-31T17:00Z is Feb 1 in UTC+8; 2025-06-30T16:30Z is Jul 1.
        let repo = RepoCommits {
            repo_name: "team-project-25spring-1".into(),
            commits: vec![
                raw("first", "alice@x", "2025-01-31T17:00:00Z"),
                raw("late", "alice@x", "2025-06-30T16:30:00Z"),
            ],
        };
        let roster = BTreeSet::from(["U1".to_string()]);
        let out = normalizer.normalize_repo(&repo, &roster).unwrap();
        let hashes: Vec<_> = out.commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, ["first"]);
    }

    #[test]
    fn account_outside_team_is_not_attributed() {
        let semester = spring25();
        let ids = identities();
        let normalizer = Normalizer::new(&semester, &ids, policy());
        let repo = RepoCommits {
            repo_name: "team-project-25spring-2".into(),
            commits: vec![raw("a", "alice@x", "2025-03-01T00:00:00+08:00")],
        };
        let other_team = BTreeSet::from(["U2".to_string()]);
        let out = normalizer.normalize_repo(&repo, &other_team).unwrap();
        assert!(!out.is_analyzed());
    }

    #[test]
    fn commits_come_out_oldest_first() {
        let semester = spring25();
        let ids = identities();
        let normalizer = Normalizer::new(&semester, &ids, policy());
        let repo = RepoCommits {
            repo_name: "team-project-25spring-1".into(),
            commits: vec![
                raw("late", "alice@x", "2025-05-01T00:00:00+08:00"),
                raw("early", "alice@x", "2025-03-01T00:00:00+08:00"),
            ],
        };
        let roster = BTreeSet::from(["U1".to_string()]);
        let out = normalizer.normalize_repo(&repo, &roster).unwrap();
        assert_eq!(out.commits[0].hash, "early");
        assert_eq!(out.commits[1].hash, "late");
    }

    #[test]
    fn semester_output_skips_mismatched_names_and_sorts() {
        let semester = spring25();
        let ids = identities();
        let normalizer = Normalizer::new(&semester, &ids, policy());
        let repos = vec![
            RepoCommits {
                repo_name: "team-project-25spring-9".into(),
                commits: vec![],
            },
            RepoCommits {
                repo_name: "team-project-25spring-template".into(),
                commits: vec![],
            },
            RepoCommits {
                repo_name: "team-project-25spring-1".into(),
                commits: vec![],
            },
        ];
        let out = normalizer.normalize_semester(&repos, &BTreeMap::new());
        let names: Vec<_> = out.iter().map(|r| r.repo_name.as_str()).collect();
        assert_eq!(names, ["team-project-25spring-1", "team-project-25spring-9"]);
        assert_eq!(out[0].group_name, "1");
    }

    fn arb_commit() -> impl Strategy<Value = RawCommit> {
        ("[a-d]", 0u64..50, 0u64..50).prop_map(|(hash, ins, del)| {
            let mut c = raw(&hash, "alice@x", "2025-03-01T00:00:00+08:00");
            c.insertions = ins;
            c.deletions = del;
            c
        })
    }

    #[test]
    fn oversized_deletions_alone_skip_the_file() {
        let mut commit = raw("a", "alice@x", "2025-03-01T00:00:00+08:00");
        commit.per_file = BTreeMap::from([
            ("old.js".to_string(), FileDelta { insertions: 10, deletions: 2500 }),
            ("edge.md".to_string(), FileDelta { insertions: 2000, deletions: 2000 }),
            ("util.py".to_string(), FileDelta { insertions: 30, deletions: 5 }),
        ]);
        let mut totals = BTreeMap::new();
        policy().accumulate(&commit, &mut totals);
        assert_eq!(
            totals,
            BTreeMap::from([(".md".to_string(), 0), (".py".to_string(), 25)])
        );
    }

    proptest! {
        #[test]
        fn dedup_is_idempotent(commits in proptest::collection::vec(arb_commit(), 0..20)) {
            let once = dedup_commits(commits);
            let twice = dedup_commits(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn per_extension_totals_are_bounded_by_insertions(
            files in proptest::collection::btree_map(
                "[a-z]{1,4}\\.(py|js|txt|md)",
                (0u64..3000, 0u64..3000),
                0..10,
            )
        ) {
            let mut commit = raw("a", "alice@x", "2025-03-01T00:00:00+08:00");
            commit.per_file = files
                .iter()
                .map(|(p, (i, d))| (p.clone(), FileDelta { insertions: *i, deletions: *d }))
                .collect();
            let mut totals = BTreeMap::new();
            policy().accumulate(&commit, &mut totals);
            let inserted: u64 = files.values().map(|(i, _)| *i).sum();
            prop_assert!(totals.values().sum::<u64>() <= inserted);
            prop_assert!(totals.keys().all(|k| k != ".txt"));
        }
    }
}
