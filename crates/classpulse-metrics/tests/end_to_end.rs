//! Integration test: raw commits → identities → normalization → charts.

use std::collections::{BTreeMap, BTreeSet};

use classpulse_core::{AuthorRecord, PulseConfig, RawCommit, RepoCommits, RosterAccount};
use classpulse_metrics::{build_semester_charts, Activity, ChartSettings};
use classpulse_reconcile::{IdentityMap, LinePolicy, Normalizer};

fn commit(hash: &str, email: &str, at: &str) -> RawCommit {
    RawCommit {
        hash: hash.into(),
        author_name: email.split('@').next().unwrap_or_default().into(),
        author_email: email.into(),
        committed_at: at.into(),
        message: "实现 user login".into(),
        insertions: 12,
        deletions: 3,
        files_changed: 1,
        per_file: BTreeMap::new(),
    }
}

#[test]
fn only_in_window_roster_commit_survives() {
    let config = PulseConfig::default();
    let semester = config.semester("25spring").unwrap();
    let repo_name = "team-project-25spring-12";

    let roster = vec![RosterAccount {
        account_id: "U_alice".into(),
        login: "alice".into(),
        display_name: Some("Alice".into()),
        email: None,
    }];
    let lookups = BTreeMap::from([(
        repo_name.to_string(),
        vec![
            AuthorRecord {
                commit: "in-roster".into(),
                email: "alice@uni.edu".into(),
                account_id: Some("U_alice".into()),
                name: Some("Alice".into()),
                resolved_email: Some("alice@uni.edu".into()),
            },
            AuthorRecord {
                commit: "in-external".into(),
                email: "helper@gmail.com".into(),
                account_id: None,
                name: None,
                resolved_email: None,
            },
        ],
    )]);
    let identities = IdentityMap::resolve(&roster, &lookups).unwrap();

    let local = vec![RepoCommits {
        repo_name: repo_name.into(),
        commits: vec![
            commit("in-roster", "alice@uni.edu", "2025-03-10T14:00:00+08:00"),
            commit("in-external", "helper@gmail.com", "2025-03-11T14:00:00+08:00"),
            commit("out-of-window", "alice@uni.edu", "2025-08-01T14:00:00+08:00"),
        ],
    }];
    let teams = BTreeMap::from([(repo_name.to_string(), BTreeSet::from(["U_alice".to_string()]))]);

    let normalizer = Normalizer::new(
        &semester,
        &identities,
        LinePolicy::from_config(&config.pipeline),
    );
    let repos = normalizer.normalize_semester(&local, &teams);
    assert_eq!(repos.len(), 1);
    let hashes: Vec<_> = repos[0].commits.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, ["in-roster"]);

    let settings = ChartSettings::from_config(&config.pipeline).unwrap();
    let charts = build_semester_charts(&repos, &Activity::default(), &settings);
    assert_eq!(charts.commit_count_per_repo.group_names, ["12"]);
    assert_eq!(charts.commit_count_per_repo.commit_counts, [1]);
    assert_eq!(charts.commit_time_distribution_date.full_dates, ["2025-03-10"]);
    assert_eq!(charts.commit_time_distribution_hourly.counts[14], 1);
    assert_eq!(charts.contribution_difference.gini_commit, [0.0]);
    assert_eq!(charts.commit_message_info.lang_counter.mixed, 1);
}
