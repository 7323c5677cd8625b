//! Local history extraction via git2.
//!
//! Walks every local branch of a cloned team repository and records each
//! reachable commit once, with totals and per-file line counts measured
//! against the first parent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use classpulse_core::{FileDelta, PulseError, RawCommit, RepoCommits, Semester};
use classpulse_reconcile::dedup_commits;
use git2::{BranchType, Commit, DiffOptions, Repository, Sort};

/// Extract all commits reachable from local branches.
///
/// # Errors
///
/// Returns [`PulseError::Git`] if the repository cannot be opened or walked.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use classpulse_pipeline::mining::mine_repository;
///
/// let repo = mine_repository(Path::new("repos/team-project-25spring-3")).unwrap();
/// println!("{}: {} commits", repo.repo_name, repo.commits.len());
/// ```
pub fn mine_repository(repo_path: &Path) -> Result<RepoCommits, PulseError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| PulseError::Git(format!("failed to open repository: {e}")))?;

    let mut revwalk = repo
        .revwalk()
        .map_err(|e| PulseError::Git(format!("failed to create revwalk: {e}")))?;
    revwalk
        .set_sorting(Sort::TIME)
        .map_err(|e| PulseError::Git(format!("failed to set sorting: {e}")))?;

    let branches = repo
        .branches(Some(BranchType::Local))
        .map_err(|e| PulseError::Git(format!("failed to list branches: {e}")))?;
    let mut pushed = 0usize;
    for branch in branches {
        let (branch, _) = branch.map_err(|e| PulseError::Git(format!("bad branch: {e}")))?;
        if let Some(oid) = branch.get().target() {
            revwalk
                .push(oid)
                .map_err(|e| PulseError::Git(format!("failed to push branch tip: {e}")))?;
            pushed += 1;
        }
    }
    if pushed == 0 && revwalk.push_head().is_err() {
        // empty repository
        return Ok(RepoCommits {
            repo_name: repo_name_of(repo_path),
            commits: Vec::new(),
        });
    }

    let mut commits = Vec::new();
    for oid_result in revwalk {
        let oid = oid_result.map_err(|e| PulseError::Git(format!("revwalk error: {e}")))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| PulseError::Git(format!("failed to find commit: {e}")))?;
        commits.push(extract_commit(&repo, &commit)?);
    }

    Ok(RepoCommits {
        repo_name: repo_name_of(repo_path),
        commits: dedup_commits(commits),
    })
}

/// Clone directories under `dir` that look like repositories of `semester`.
///
/// Directories without `.git` and names outside the semester grammar are
/// skipped. The result is sorted by path.
///
/// # Errors
///
/// Returns [`PulseError::NotFound`] if `dir` does not exist.
pub fn discover_repositories(dir: &Path, semester: &Semester) -> Result<Vec<PathBuf>, PulseError> {
    if !dir.is_dir() {
        return Err(PulseError::NotFound(dir.to_path_buf()));
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.join(".git").exists() {
            continue;
        }
        let name = repo_name_of(&path);
        if semester.group_name(&name).is_none() {
            log::debug!("{}: skipping {name}, not a team repository", semester.key);
            continue;
        }
        found.push(path);
    }
    found.sort();
    Ok(found)
}

fn repo_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn commit_time(commit: &Commit) -> Result<DateTime<FixedOffset>, PulseError> {
    let time = commit.time();
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)
        .ok_or_else(|| PulseError::Parse(format!("bad offset on {}", commit.id())))?;
    DateTime::from_timestamp(time.seconds(), 0)
        .map(|utc| utc.with_timezone(&offset))
        .ok_or_else(|| PulseError::Parse(format!("bad timestamp on {}", commit.id())))
}

fn extract_commit(repo: &Repository, commit: &Commit) -> Result<RawCommit, PulseError> {
    let commit_tree = commit
        .tree()
        .map_err(|e| PulseError::Git(format!("failed to get commit tree: {e}")))?;

    // root commits diff against the empty tree
    let parent_tree = if commit.parent_count() > 0 {
        let parent = commit
            .parent(0)
            .map_err(|e| PulseError::Git(format!("failed to get parent: {e}")))?;
        Some(
            parent
                .tree()
                .map_err(|e| PulseError::Git(format!("failed to get parent tree: {e}")))?,
        )
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), Some(&mut diff_opts))
        .map_err(|e| PulseError::Git(format!("failed to compute diff: {e}")))?;

    let mut per_file: BTreeMap<String, FileDelta> = BTreeMap::new();
    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .unwrap_or(Path::new(""))
            .to_string_lossy()
            .to_string();
        if !path.is_empty() {
            per_file.entry(path).or_default();
        }
    }

    diff.foreach(
        &mut |_delta, _progress| true,
        None,
        None,
        Some(&mut |delta, _hunk, line| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .unwrap_or(Path::new(""))
                .to_string_lossy()
                .to_string();
            let entry = per_file.entry(path).or_default();
            match line.origin() {
                '+' => entry.insertions += 1,
                '-' => entry.deletions += 1,
                _ => {}
            }
            true
        }),
    )
    .map_err(|e| PulseError::Git(format!("failed to iterate diff lines: {e}")))?;

    let author = commit.author();
    Ok(RawCommit {
        hash: commit.id().to_string(),
        author_name: author.name().unwrap_or("unknown").to_string(),
        author_email: author.email().unwrap_or("unknown").to_string(),
        committed_at: commit_time(commit)?.to_rfc3339(),
        message: commit.message().unwrap_or("").trim().to_string(),
        insertions: per_file.values().map(|d| d.insertions).sum(),
        deletions: per_file.values().map(|d| d.deletions).sum(),
        files_changed: per_file.len() as u64,
        per_file,
    })
}
