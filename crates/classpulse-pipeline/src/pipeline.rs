//! Stage orchestration.
//!
//! Each stage reads its inputs from the injected [`SnapshotStore`], fans
//! per-repository work out through the shared [`WorkerPool`], and saves its
//! output only after every repository finished. Any stage can therefore be
//! re-run on its own from the stored outputs of earlier stages.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use classpulse_core::{
    AuthorRecord, Branch, Issue, PulseConfig, PulseError, PullRequest, RepoCommits, RosterAccount,
    Semester,
};
use classpulse_metrics::{build_semester_charts, Activity, ChartDataset, ChartSettings};
use classpulse_reconcile::{plan_lookups, team_rosters, IdentityMap, LinePolicy, NormalizedRepo, Normalizer};
use classpulse_store::{SnapshotStore, SnapshotStoreExt};
use serde::de::DeserializeOwned;

use crate::collector::RemoteCollector;
use crate::mining::{discover_repositories, mine_repository};
use crate::pool::{StageOutcome, WorkerPool};
use crate::stages::{keys, Stage};

/// What one stage did for one semester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// `None` for semester-independent stages.
    pub semester: Option<String>,
    pub completed: usize,
    pub failed: usize,
}

/// The batch pipeline over a store, a collector and a worker pool.
pub struct Pipeline {
    config: PulseConfig,
    store: Arc<dyn SnapshotStore>,
    collector: Option<Arc<dyn RemoteCollector>>,
    pool: WorkerPool,
}

impl Pipeline {
    /// `collector` may be `None` when only offline stages will run.
    pub fn new(
        config: PulseConfig,
        store: Arc<dyn SnapshotStore>,
        collector: Option<Arc<dyn RemoteCollector>>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            config,
            store,
            collector,
            pool,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run `from` and every later stage for the given semesters.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. Per-repository failures are reported
    /// in the returned [`StageReport`]s instead.
    pub async fn run(
        &self,
        from: Stage,
        semesters: &[Semester],
    ) -> Result<Vec<StageReport>, PulseError> {
        let mut reports = Vec::new();
        for stage in Stage::from_stage(from) {
            reports.extend(self.run_stage(stage, semesters).await?);
        }
        Ok(reports)
    }

    /// Run exactly one stage.
    pub async fn run_stage(
        &self,
        stage: Stage,
        semesters: &[Semester],
    ) -> Result<Vec<StageReport>, PulseError> {
        if self.pool.is_cancelled() {
            return Err(PulseError::Cancelled(stage.to_string()));
        }
        log::info!("stage {stage} started");
        let reports = match stage {
            Stage::Roster => vec![self.roster().await?],
            Stage::Charts => self.charts(semesters)?,
            _ => {
                let mut reports = Vec::new();
                for semester in semesters {
                    let report = match stage {
                        Stage::Teams => self.teams(semester).await?,
                        Stage::Local => self.local(semester).await?,
                        Stage::Authors => self.authors(semester).await?,
                        Stage::Activity => self.activity(semester).await?,
                        _ => self.reconcile(semester)?,
                    };
                    reports.push(report);
                }
                reports
            }
        };
        log::info!("stage {stage} finished");
        Ok(reports)
    }

    fn collector(&self, stage: Stage) -> Result<Arc<dyn RemoteCollector>, PulseError> {
        self.collector.clone().ok_or_else(|| {
            PulseError::Config(format!(
                "stage '{stage}' needs GitHub access; set github_token or GITHUB_TOKEN"
            ))
        })
    }

    fn require<T: DeserializeOwned>(&self, key: &str, producer: Stage) -> Result<T, PulseError> {
        self.store.load_as(key)?.ok_or_else(|| {
            PulseError::Config(format!(
                "snapshot '{key}' is missing; run `classpulse stage {producer}` first"
            ))
        })
    }

    async fn roster(&self) -> Result<StageReport, PulseError> {
        let collector = self.collector(Stage::Roster)?;
        let roster = collector.roster().await?;
        log::info!("roster: {} accounts in {}", roster.len(), self.config.organization);
        self.store.save_as(keys::ROSTER, &roster)?;
        Ok(StageReport {
            stage: Stage::Roster,
            semester: None,
            completed: roster.len(),
            failed: 0,
        })
    }

    async fn teams(&self, semester: &Semester) -> Result<StageReport, PulseError> {
        let collector = self.collector(Stage::Teams)?;
        let mut failed = 0;
        let teams = match &semester.assignment_id {
            Some(id) => match collector.team_logins(id).await {
                Ok(teams) => teams,
                Err(e) if !e.is_fatal() => {
                    log::warn!("teams: {}: accepted assignments unavailable: {e}", semester.key);
                    failed = 1;
                    BTreeMap::new()
                }
                Err(e) => return Err(e),
            },
            None => {
                log::warn!("teams: {} has no assignment_id, no team rosters", semester.key);
                BTreeMap::new()
            }
        };
        self.store.save_as(&keys::teams(&semester.key), &teams)?;
        Ok(StageReport {
            stage: Stage::Teams,
            semester: Some(semester.key.clone()),
            completed: teams.len(),
            failed,
        })
    }

    async fn local(&self, semester: &Semester) -> Result<StageReport, PulseError> {
        let dir = semester.submissions_path(&self.config.repos_dir);
        let paths = match discover_repositories(&dir, semester) {
            Ok(paths) => paths,
            Err(PulseError::NotFound(missing)) => {
                log::warn!("local: {}: {} does not exist", semester.key, missing.display());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let by_name: Arc<BTreeMap<String, PathBuf>> = Arc::new(
            paths
                .into_iter()
                .filter_map(|p| {
                    let name = p.file_name()?.to_string_lossy().to_string();
                    Some((name, p))
                })
                .collect(),
        );

        let names: Vec<String> = by_name.keys().cloned().collect();
        let outcome = self
            .pool
            .map("local", names, move |name| {
                let by_name = Arc::clone(&by_name);
                async move {
                    let path = by_name
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| PulseError::Git(format!("unknown repository {name}")))?;
                    tokio::task::spawn_blocking(move || mine_repository(&path))
                        .await
                        .map_err(|e| PulseError::Git(format!("extraction task failed: {e}")))?
                }
            })
            .await?;

        let report = report(Stage::Local, semester, &outcome);
        let repos: Vec<RepoCommits> = outcome.completed.into_values().collect();
        self.store.save_as(&keys::local(&semester.key), &repos)?;
        Ok(report)
    }

    async fn authors(&self, semester: &Semester) -> Result<StageReport, PulseError> {
        let collector = self.collector(Stage::Authors)?;
        let local: Vec<RepoCommits> = self.require(&keys::local(&semester.key), Stage::Local)?;
        let plan = Arc::new(plan_lookups(&local));
        let request_timeout = Duration::from_secs(self.config.pipeline.request_timeout_secs);

        let names: Vec<String> = plan.keys().cloned().collect();
        let outcome = self
            .pool
            .map("authors", names, move |repo| {
                let plan = Arc::clone(&plan);
                let collector = Arc::clone(&collector);
                async move {
                    let mut records = Vec::new();
                    for req in plan.get(&repo).into_iter().flatten() {
                        let lookup = collector.commit_author(&req.repo_name, &req.commit, &req.email);
                        let record = match tokio::time::timeout(request_timeout, lookup).await {
                            Ok(Ok(record)) => record,
                            Ok(Err(e)) => {
                                log::warn!("authors: {repo}/{}: {e}", req.commit);
                                absent_author(&req.commit, &req.email)
                            }
                            Err(_) => {
                                log::warn!("authors: {repo}/{}: lookup timed out", req.commit);
                                absent_author(&req.commit, &req.email)
                            }
                        };
                        records.push(record);
                    }
                    Ok::<_, PulseError>(records)
                }
            })
            .await?;

        let report = report(Stage::Authors, semester, &outcome);
        self.store
            .save_as(&keys::authors(&semester.key), &outcome.completed)?;
        Ok(report)
    }

    async fn activity(&self, semester: &Semester) -> Result<StageReport, PulseError> {
        let collector = self.collector(Stage::Activity)?;
        let local: Vec<RepoCommits> = self.require(&keys::local(&semester.key), Stage::Local)?;
        let names: Vec<String> = local.iter().map(|r| r.repo_name.clone()).collect();

        let c = Arc::clone(&collector);
        let pulls: StageOutcome<Vec<PullRequest>> = self
            .pool
            .map("pulls", names.clone(), move |repo| {
                let c = Arc::clone(&c);
                async move { c.pull_requests(&repo).await }
            })
            .await?;
        let c = Arc::clone(&collector);
        let issues: StageOutcome<Vec<Issue>> = self
            .pool
            .map("issues", names.clone(), move |repo| {
                let c = Arc::clone(&c);
                async move { c.issues(&repo).await }
            })
            .await?;
        let c = Arc::clone(&collector);
        let branches: StageOutcome<Vec<Branch>> = self
            .pool
            .map("branches", names, move |repo| {
                let c = Arc::clone(&c);
                async move { c.branches(&repo).await }
            })
            .await?;

        let failed = pulls.failed.len() + issues.failed.len() + branches.failed.len();
        self.store.save_as(&keys::pulls(&semester.key), &pulls.completed)?;
        self.store.save_as(&keys::issues(&semester.key), &issues.completed)?;
        self.store
            .save_as(&keys::branches(&semester.key), &branches.completed)?;
        Ok(StageReport {
            stage: Stage::Activity,
            semester: Some(semester.key.clone()),
            completed: local.len(),
            failed,
        })
    }

    fn reconcile(&self, semester: &Semester) -> Result<StageReport, PulseError> {
        let roster: Vec<RosterAccount> = self.require(keys::ROSTER, Stage::Roster)?;
        let team_logins: BTreeMap<String, Vec<String>> =
            self.require(&keys::teams(&semester.key), Stage::Teams)?;
        let local: Vec<RepoCommits> = self.require(&keys::local(&semester.key), Stage::Local)?;
        let lookups: BTreeMap<String, Vec<AuthorRecord>> =
            self.require(&keys::authors(&semester.key), Stage::Authors)?;

        let identities = IdentityMap::resolve(&roster, &lookups)?;
        let teams = team_rosters(&roster, &team_logins);
        let normalizer = Normalizer::new(
            semester,
            &identities,
            LinePolicy::from_config(&self.config.pipeline),
        );
        let repos = normalizer.normalize_semester(&local, &teams);
        let contributors = identities.contributors(&local);

        self.store
            .save_as(&keys::normalized(&semester.key), &repos)?;
        self.store
            .save_as(&keys::contributors(&semester.key), &contributors)?;
        Ok(StageReport {
            stage: Stage::Reconcile,
            semester: Some(semester.key.clone()),
            completed: repos.iter().filter(|r| r.is_analyzed()).count(),
            failed: repos.iter().filter(|r| !r.is_analyzed()).count(),
        })
    }

    /// Rebuild the chart dataset from every semester with normalized data.
    fn charts(&self, semesters: &[Semester]) -> Result<Vec<StageReport>, PulseError> {
        let settings = ChartSettings::from_config(&self.config.pipeline)?;
        for semester in semesters {
            self.require::<serde_json::Value>(&keys::normalized(&semester.key), Stage::Reconcile)?;
        }

        let mut dataset = ChartDataset::new();
        let mut reports = Vec::new();
        for key in self.config.semesters.keys() {
            let Some(repos) = self
                .store
                .load_as::<Vec<NormalizedRepo>>(&keys::normalized(key))?
            else {
                continue;
            };
            let activity = Activity {
                pulls: self.require(&keys::pulls(key), Stage::Activity)?,
                issues: self.require(&keys::issues(key), Stage::Activity)?,
                branches: self.require(&keys::branches(key), Stage::Activity)?,
            };
            let charts = build_semester_charts(&repos, &activity, &settings);
            self.store.save_as(&keys::charts(key), &charts)?;
            reports.push(StageReport {
                stage: Stage::Charts,
                semester: Some(key.clone()),
                completed: charts.commit_count_per_repo.group_names.len(),
                failed: 0,
            });
            dataset.insert(key.clone(), charts);
        }
        self.store.save_as(keys::CHARTS, &dataset)?;
        log::info!("charts: {} semesters written", dataset.len());
        Ok(reports)
    }
}

fn absent_author(commit: &str, email: &str) -> AuthorRecord {
    AuthorRecord {
        commit: commit.to_string(),
        email: email.to_string(),
        account_id: None,
        name: None,
        resolved_email: None,
    }
}

fn report<T>(stage: Stage, semester: &Semester, outcome: &StageOutcome<T>) -> StageReport {
    StageReport {
        stage,
        semester: Some(semester.key.clone()),
        completed: outcome.completed.len(),
        failed: outcome.failed.len(),
    }
}
