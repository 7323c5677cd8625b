//! Per-team counts and their means.

use std::collections::{BTreeMap, BTreeSet};

use classpulse_core::{Branch, Issue, PullRequest};
use classpulse_reconcile::NormalizedRepo;
use serde::{Deserialize, Serialize};

fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitCounts {
    pub group_names: Vec<String>,
    pub commit_counts: Vec<u64>,
    /// Rounded to two decimals.
    pub average_commit_count: f64,
}

/// Retained commits per team.
///
/// # Examples
///
/// ```
/// use classpulse_metrics::teams::commit_counts;
///
/// let counts = commit_counts(&[]);
/// assert_eq!(counts.average_commit_count, 0.0);
/// ```
pub fn commit_counts(repos: &[&NormalizedRepo]) -> CommitCounts {
    let counts: Vec<u64> = repos.iter().map(|r| r.commits.len() as u64).collect();
    CommitCounts {
        group_names: group_names(repos),
        average_commit_count: round2(mean(&counts)),
        commit_counts: counts,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeLines {
    pub group_names: Vec<String>,
    pub total_lines: Vec<u64>,
    pub average_lines: f64,
}

/// Net source lines per team.
pub fn code_lines(repos: &[&NormalizedRepo]) -> CodeLines {
    let totals: Vec<u64> = repos.iter().map(|r| r.total_lines()).collect();
    CodeLines {
        group_names: group_names(repos),
        average_lines: mean(&totals),
        total_lines: totals,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDistribution {
    pub languages: Vec<String>,
    pub counts: Vec<u64>,
}

/// Net lines per extension across teams, largest first.
///
/// Every extension in `extensions` is listed, untouched ones with zero.
/// Equal volumes keep configured order, then the order in which any other
/// extension was first met.
pub fn language_distribution(
    repos: &[&NormalizedRepo],
    extensions: &[String],
) -> LanguageDistribution {
    let mut totals: Vec<(String, u64)> = Vec::new();
    for ext in extensions {
        if !totals.iter().any(|(e, _)| e == ext) {
            totals.push((ext.clone(), 0));
        }
    }
    for (ext, lines) in repos.iter().flat_map(|r| &r.code_line_totals) {
        match totals.iter_mut().find(|(e, _)| e == ext) {
            Some((_, total)) => *total += lines,
            None => totals.push((ext.clone(), *lines)),
        }
    }
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    let (languages, counts) = totals.into_iter().unzip();
    LanguageDistribution { languages, counts }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrCounts {
    pub group_names: Vec<String>,
    pub pr_counts: Vec<u64>,
    pub average_pr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub group_names: Vec<String>,
    pub issue_counts: Vec<u64>,
    pub average_issues: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchCounts {
    pub group_names: Vec<String>,
    pub branch_counts: Vec<u64>,
    pub average_branches: f64,
}

fn collected_counts<T>(repos: &[&NormalizedRepo], records: &BTreeMap<String, Vec<T>>) -> Vec<u64> {
    repos
        .iter()
        .map(|r| records.get(&r.repo_name).map_or(0, |v| v.len() as u64))
        .collect()
}

/// Pull requests per team; a repository with no collected list counts zero.
pub fn pr_counts(repos: &[&NormalizedRepo], pulls: &BTreeMap<String, Vec<PullRequest>>) -> PrCounts {
    let counts = collected_counts(repos, pulls);
    PrCounts {
        group_names: group_names(repos),
        average_pr: mean(&counts),
        pr_counts: counts,
    }
}

pub fn issue_counts(repos: &[&NormalizedRepo], issues: &BTreeMap<String, Vec<Issue>>) -> IssueCounts {
    let counts = collected_counts(repos, issues);
    IssueCounts {
        group_names: group_names(repos),
        average_issues: mean(&counts),
        issue_counts: counts,
    }
}

pub fn branch_counts(
    repos: &[&NormalizedRepo],
    branches: &BTreeMap<String, Vec<Branch>>,
) -> BranchCounts {
    let counts = collected_counts(repos, branches);
    BranchCounts {
        group_names: group_names(repos),
        average_branches: mean(&counts),
        branch_counts: counts,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveContributors {
    pub group_name: String,
    pub active_contributor_count: usize,
}

/// Distinct attributed authors per team.
pub fn active_contributors(repos: &[&NormalizedRepo]) -> Vec<ActiveContributors> {
    repos
        .iter()
        .map(|r| ActiveContributors {
            group_name: r.group_name.clone(),
            active_contributor_count: r
                .commits
                .iter()
                .map(|c| c.canonical_author_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
        })
        .collect()
}

/// How many teams have exactly N active contributors.
pub fn active_contributor_histogram(active: &[ActiveContributors]) -> BTreeMap<usize, u64> {
    let mut hist = BTreeMap::new();
    for team in active {
        *hist.entry(team.active_contributor_count).or_insert(0) += 1;
    }
    hist
}

fn group_names(repos: &[&NormalizedRepo]) -> Vec<String> {
    repos.iter().map(|r| r.group_name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_at, repo};
    use pretty_assertions::assert_eq;

    #[test]
    fn commit_mean_is_rounded() {
        let a = repo("a", vec![commit_at("1", "U1", "2025-03-01T00:00:00+08:00")]);
        let b = repo(
            "b",
            vec![
                commit_at("2", "U1", "2025-03-01T00:00:00+08:00"),
                commit_at("3", "U1", "2025-03-01T00:00:00+08:00"),
            ],
        );
        let c = repo("c", vec![commit_at("4", "U1", "2025-03-01T00:00:00+08:00")]);
        let counts = commit_counts(&[&a, &b, &c]);
        assert_eq!(counts.commit_counts, [1, 2, 1]);
        assert_eq!(counts.average_commit_count, 1.33);
    }

    #[test]
    fn languages_sorted_descending_with_stable_ties() {
        let mut a = repo("a", vec![]);
        a.code_line_totals = BTreeMap::from([(".java".into(), 50), (".md".into(), 10)]);
        let mut b = repo("b", vec![]);
        b.code_line_totals = BTreeMap::from([(".css".into(), 10), (".java".into(), 5)]);
        let dist = language_distribution(&[&a, &b], &[]);
        assert_eq!(dist.languages, [".java", ".md", ".css"]);
        assert_eq!(dist.counts, [55, 10, 10]);
    }

    #[test]
    fn configured_extensions_list_in_config_order() {
        let mut a = repo("a", vec![]);
        a.code_line_totals = BTreeMap::from([(".css".into(), 10), (".java".into(), 40)]);
        let extensions: Vec<String> = [".py", ".java", ".md", ".css"]
            .iter()
            .map(|e| e.to_string())
            .collect();
        let dist = language_distribution(&[&a], &extensions);
        assert_eq!(dist.languages, [".java", ".css", ".py", ".md"]);
        assert_eq!(dist.counts, [40, 10, 0, 0]);

        let mut tied = repo("b", vec![]);
        tied.code_line_totals = BTreeMap::from([(".css".into(), 7), (".md".into(), 7)]);
        let dist = language_distribution(&[&tied], &extensions);
        assert_eq!(dist.languages, [".md", ".css", ".py", ".java"]);
    }

    #[test]
    fn missing_collector_output_counts_zero() {
        let a = repo("a", vec![]);
        let b = repo("b", vec![]);
        let branches = BTreeMap::from([(
            "team-project-a".to_string(),
            vec![
                Branch { name: "main".into(), head_commit_time: None },
                Branch { name: "dev".into(), head_commit_time: None },
            ],
        )]);
        let counts = branch_counts(&[&a, &b], &branches);
        assert_eq!(counts.branch_counts, [2, 0]);
        assert_eq!(counts.average_branches, 1.0);
        assert_eq!(pr_counts(&[], &BTreeMap::new()).average_pr, 0.0);
    }

    #[test]
    fn active_contributors_are_distinct_authors() {
        let a = repo(
            "a",
            vec![
                commit_at("1", "U1", "2025-03-01T00:00:00+08:00"),
                commit_at("2", "U2", "2025-03-01T00:00:00+08:00"),
                commit_at("3", "U1", "2025-03-01T00:00:00+08:00"),
            ],
        );
        let b = repo("b", vec![commit_at("4", "U3", "2025-03-01T00:00:00+08:00")]);
        let c = repo("c", vec![commit_at("5", "U4", "2025-03-01T00:00:00+08:00")]);
        let active = active_contributors(&[&a, &b, &c]);
        assert_eq!(active[0].active_contributor_count, 2);
        let hist = active_contributor_histogram(&active);
        assert_eq!(hist, BTreeMap::from([(1, 2), (2, 1)]));
    }
}
