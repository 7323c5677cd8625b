//! Per-semester chart document.

use std::collections::BTreeMap;

use chrono::FixedOffset;
use classpulse_core::{Branch, Issue, PipelineConfig, PulseError, PullRequest};
use classpulse_reconcile::NormalizedRepo;
use serde::{Deserialize, Serialize};

use crate::inequality::{contribution_difference, ContributionDifference};
use crate::lifecycle::{
    issue_status_distribution, pr_status_distribution, IssueStatusDistribution,
    PrStatusDistribution,
};
use crate::messages::{commit_message_info, CommitMessageInfo};
use crate::teams::{
    active_contributor_histogram, active_contributors, branch_counts, code_lines, commit_counts,
    issue_counts, language_distribution, pr_counts, ActiveContributors, BranchCounts, CodeLines,
    CommitCounts, IssueCounts, LanguageDistribution, PrCounts,
};
use crate::timeline::{daily_histogram, hourly_histogram, DailyHistogram, HourlyHistogram};

/// Knobs that shape the charts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSettings {
    /// Zone used for date and hour buckets.
    pub target_offset: FixedOffset,
    /// Longest message length kept in the length histogram.
    pub message_length_limit: usize,
    pub message_length_bin_width: usize,
    /// Recognized extensions in configured order; every one is listed in
    /// the language distribution.
    pub extensions: Vec<String>,
}

impl ChartSettings {
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] for an out-of-range target offset.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, PulseError> {
        Ok(Self {
            target_offset: cfg.target_offset()?,
            message_length_limit: cfg.message_length_limit,
            message_length_bin_width: cfg.message_length_bin_width,
            extensions: cfg.extensions.iter().map(|e| e.to_lowercase()).collect(),
        })
    }
}

/// Collector output for one semester, keyed by repository name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub pulls: BTreeMap<String, Vec<PullRequest>>,
    #[serde(default)]
    pub issues: BTreeMap<String, Vec<Issue>>,
    #[serde(default)]
    pub branches: BTreeMap<String, Vec<Branch>>,
}

/// Every chart for one semester. Each field renders on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterCharts {
    pub commit_time_distribution_date: DailyHistogram,
    pub commit_time_distribution_hourly: HourlyHistogram,
    pub commit_count_per_repo: CommitCounts,
    pub code_line_per_repo: CodeLines,
    pub language_distribution: LanguageDistribution,
    pub pr_count_per_repo: PrCounts,
    pub issue_count_per_repo: IssueCounts,
    pub branch_count_per_repo: BranchCounts,
    pub pr_status_distribution: PrStatusDistribution,
    pub issue_status_distribution: IssueStatusDistribution,
    pub repo_active_contributor_count: Vec<ActiveContributors>,
    pub active_contributor_pie_chart: BTreeMap<usize, u64>,
    pub contribution_difference: ContributionDifference,
    pub commit_message_info: CommitMessageInfo,
}

/// Semester key → charts.
pub type ChartDataset = BTreeMap<String, SemesterCharts>;

/// Compute every chart over the analyzed repositories of a semester.
///
/// Repositories without retained commits are ignored, and the rest are
/// visited in name order, so the result does not depend on input order.
///
/// # Examples
///
/// ```
/// use chrono::FixedOffset;
/// use classpulse_metrics::dataset::{build_semester_charts, Activity, ChartSettings};
///
/// let settings = ChartSettings {
///     target_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
///     message_length_limit: 100,
///     message_length_bin_width: 5,
///     extensions: vec![".py".into(), ".java".into()],
/// };
/// let charts = build_semester_charts(&[], &Activity::default(), &settings);
/// assert!(charts.commit_count_per_repo.group_names.is_empty());
/// assert_eq!(charts.commit_time_distribution_hourly.counts.len(), 24);
/// assert_eq!(charts.language_distribution.languages, [".py", ".java"]);
/// ```
pub fn build_semester_charts(
    repos: &[NormalizedRepo],
    activity: &Activity,
    settings: &ChartSettings,
) -> SemesterCharts {
    let mut analyzed: Vec<&NormalizedRepo> = repos.iter().filter(|r| r.is_analyzed()).collect();
    analyzed.sort_by(|a, b| a.repo_name.cmp(&b.repo_name));
    let names = || analyzed.iter().map(|r| r.repo_name.as_str());

    let active = active_contributors(&analyzed);
    let charts = SemesterCharts {
        commit_time_distribution_date: daily_histogram(&analyzed, settings.target_offset),
        commit_time_distribution_hourly: hourly_histogram(&analyzed, settings.target_offset),
        commit_count_per_repo: commit_counts(&analyzed),
        code_line_per_repo: code_lines(&analyzed),
        language_distribution: language_distribution(&analyzed, &settings.extensions),
        pr_count_per_repo: pr_counts(&analyzed, &activity.pulls),
        issue_count_per_repo: issue_counts(&analyzed, &activity.issues),
        branch_count_per_repo: branch_counts(&analyzed, &activity.branches),
        pr_status_distribution: pr_status_distribution(names(), &activity.pulls),
        issue_status_distribution: issue_status_distribution(names(), &activity.issues),
        active_contributor_pie_chart: active_contributor_histogram(&active),
        repo_active_contributor_count: active,
        contribution_difference: contribution_difference(&analyzed),
        commit_message_info: commit_message_info(
            &analyzed,
            settings.message_length_limit,
            settings.message_length_bin_width,
        ),
    };
    log::debug!(
        "charts over {} analyzed repositories ({} skipped)",
        analyzed.len(),
        repos.len() - analyzed.len()
    );
    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_at, repo};
    use pretty_assertions::assert_eq;

    fn settings() -> ChartSettings {
        ChartSettings::from_config(&PipelineConfig::default()).unwrap()
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = repo("a", vec![commit_at("1", "U1", "2025-03-01T08:00:00+08:00")]);
        let b = repo(
            "b",
            vec![
                commit_at("2", "U2", "2025-03-02T08:00:00+08:00"),
                commit_at("3", "U3", "2025-03-03T08:00:00+08:00"),
            ],
        );
        let forward = build_semester_charts(&[a.clone(), b.clone()], &Activity::default(), &settings());
        let backward = build_semester_charts(&[b, a], &Activity::default(), &settings());
        assert_eq!(forward, backward);
        assert_eq!(forward.commit_count_per_repo.group_names, ["a", "b"]);
    }

    #[test]
    fn empty_repositories_are_not_charted() {
        let a = repo("a", vec![commit_at("1", "U1", "2025-03-01T08:00:00+08:00")]);
        let idle = repo("idle", vec![]);
        let activity = Activity {
            pulls: BTreeMap::from([(
                "team-project-idle".to_string(),
                vec![PullRequest {
                    number: 1,
                    created_at: "2025-03-01T00:00:00Z".into(),
                    closed_at: None,
                    merged_at: None,
                    author_login: None,
                    commit_count: 0,
                }],
            )]),
            ..Activity::default()
        };
        let charts = build_semester_charts(&[a, idle], &activity, &settings());
        assert_eq!(charts.commit_count_per_repo.group_names, ["a"]);
        assert_eq!(charts.pr_count_per_repo.pr_counts, [0]);
        assert_eq!(charts.pr_status_distribution.total(), 0);
    }

    #[test]
    fn serialized_keys_match_chart_names() {
        let a = repo("a", vec![commit_at("1", "U1", "2025-03-01T08:00:00+08:00")]);
        let charts = build_semester_charts(&[a], &Activity::default(), &settings());
        let value = serde_json::to_value(&charts).unwrap();
        for key in [
            "commit_time_distribution_date",
            "commit_time_distribution_hourly",
            "commit_count_per_repo",
            "code_line_per_repo",
            "language_distribution",
            "pr_count_per_repo",
            "issue_count_per_repo",
            "branch_count_per_repo",
            "pr_status_distribution",
            "issue_status_distribution",
            "repo_active_contributor_count",
            "active_contributor_pie_chart",
            "contribution_difference",
            "commit_message_info",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["active_contributor_pie_chart"]["1"], 1);
        assert_eq!(value["commit_message_info"]["lang_counter"]["english"], 1);
    }
}
