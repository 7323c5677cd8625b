//! Contribution inequality per team.

use std::collections::BTreeMap;

use classpulse_reconcile::NormalizedRepo;
use serde::{Deserialize, Serialize};

/// Gini coefficient of a set of non-negative values.
///
/// Zero for empty input or a zero total.
///
/// # Examples
///
/// ```
/// use classpulse_metrics::inequality::gini;
///
/// assert_eq!(gini(&[]), 0.0);
/// assert_eq!(gini(&[0, 0, 0, 10]), 0.75);
/// assert!(gini(&[4, 4, 4]).abs() < 1e-12);
/// ```
pub fn gini(values: &[u64]) -> f64 {
    let n = values.len();
    let total: u64 = values.iter().sum();
    if n == 0 || total == 0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 + 1.0) * *v as f64)
        .sum();
    let n = n as f64;
    (2.0 * weighted) / (n * total as f64) - (n + 1.0) / n
}

/// Per-team Gini over commits and over changed lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionDifference {
    pub group_names: Vec<String>,
    pub gini_commit: Vec<f64>,
    pub gini_add_lines: Vec<f64>,
}

/// Compute both coefficients for every team.
///
/// The population is the team's commit authors.
pub fn contribution_difference(repos: &[&NormalizedRepo]) -> ContributionDifference {
    let mut out = ContributionDifference::default();
    for repo in repos {
        let mut per_person: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for commit in &repo.commits {
            let entry = per_person
                .entry(commit.canonical_author_id.as_str())
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += commit.changed_lines();
        }
        let commits: Vec<u64> = per_person.values().map(|(c, _)| *c).collect();
        let lines: Vec<u64> = per_person.values().map(|(_, l)| *l).collect();
        out.group_names.push(repo.group_name.clone());
        out.gini_commit.push(gini(&commits));
        out.gini_add_lines.push(gini(&lines));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_at, repo};
    use proptest::prelude::*;

    #[test]
    fn degenerate_inputs_are_zero() {
        assert_eq!(gini(&[]), 0.0);
        assert_eq!(gini(&[0, 0, 0]), 0.0);
        assert_eq!(gini(&[5]), 0.0);
    }

    #[test]
    fn pinned_value_for_single_contributor_of_four() {
        assert_eq!(gini(&[0, 0, 0, 10]), 0.75);
        assert_eq!(gini(&[10, 0, 0, 0]), 0.75);
    }

    #[test]
    fn two_person_split() {
        // sorted [1, 3]: 2*(1*1 + 2*3)/(2*4) - 3/2 = 14/8 - 1.5
        assert!((gini(&[3, 1]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn members_without_commits_do_not_count() {
        let mut team = repo(
            "7",
            vec![
                commit_at("a1", "U1", "2025-03-01T10:00:00+08:00"),
                commit_at("a2", "U1", "2025-03-02T10:00:00+08:00"),
            ],
        );
        team.roster_member_ids = ["U1", "U2", "U3", "U4"]
            .iter()
            .map(|id| id.to_string())
            .collect();

        let diff = contribution_difference(&[&team]);
        assert_eq!(diff.group_names, vec!["7".to_string()]);
        assert_eq!(diff.gini_commit, vec![0.0]);
        assert_eq!(diff.gini_add_lines, vec![0.0]);
    }

    #[test]
    fn uneven_authors_within_larger_roster() {
        let mut team = repo(
            "8",
            vec![
                commit_at("b1", "U1", "2025-03-01T10:00:00+08:00"),
                commit_at("b2", "U1", "2025-03-02T10:00:00+08:00"),
                commit_at("b3", "U1", "2025-03-03T10:00:00+08:00"),
                commit_at("b4", "U2", "2025-03-04T10:00:00+08:00"),
            ],
        );
        team.roster_member_ids.insert("U3".to_string());

        let diff = contribution_difference(&[&team]);
        // authors only: gini([3, 1])
        assert!((diff.gini_commit[0] - 0.25).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn equal_values_have_zero_gini(v in 1u64..10_000, n in 1usize..50) {
            let values = vec![v; n];
            prop_assert!(gini(&values).abs() < 1e-9);
        }

        #[test]
        fn gini_stays_in_unit_range(values in proptest::collection::vec(0u64..1000, 0..40)) {
            let g = gini(&values);
            prop_assert!(g >= -1e-9);
            prop_assert!(g < 1.0);
        }
    }
}
