//! Bounded per-repository fan-out.
//!
//! Every stage hands its repository keys to [`WorkerPool::map`], which runs
//! at most `width` tasks at a time, gives each task its own timeout, and
//! collects results keyed by repository. A repository's result is recorded
//! only when its task finished, so an interrupted stage never yields a
//! partial entry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use classpulse_core::PulseError;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Per-key results of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    /// Keys whose task finished successfully.
    pub completed: BTreeMap<String, T>,
    /// Keys whose task failed or timed out, with a short reason.
    pub failed: BTreeMap<String, String>,
}

impl<T> Default for StageOutcome<T> {
    fn default() -> Self {
        Self {
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

/// Reusable bounded worker pool shared across stages.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use classpulse_pipeline::pool::WorkerPool;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let pool = WorkerPool::new(4, Duration::from_secs(5));
///     let keys = vec!["a".to_string(), "bb".to_string()];
///     let outcome = pool
///         .map("demo", keys, |key| async move { Ok(key.len()) })
///         .await
///         .unwrap();
///     assert_eq!(outcome.completed["bb"], 2);
/// });
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPool {
    width: usize,
    task_timeout: Duration,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// `width` is clamped to at least one.
    pub fn new(width: usize, task_timeout: Duration) -> Self {
        Self {
            width: width.max(1),
            task_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Stop dispatching and abort in-flight tasks, for this and later stages.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this pool when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `f` once per key and wait for all of them.
    ///
    /// Non-fatal task errors and timeouts land in [`StageOutcome::failed`].
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Cancelled`] if the pool was cancelled before
    /// every task finished, or the first fatal error a task returned.
    pub async fn map<T, F, Fut>(
        &self,
        stage: &str,
        keys: Vec<String>,
        f: F,
    ) -> Result<StageOutcome<T>, PulseError>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PulseError>> + Send + 'static,
    {
        let total = keys.len();
        log::info!("{stage}: dispatching {total} tasks on {} workers", self.width);

        let semaphore = Arc::new(Semaphore::new(self.width));
        let completed: Arc<Mutex<BTreeMap<String, T>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let failed: Arc<Mutex<BTreeMap<String, String>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let fatal: Arc<Mutex<Option<PulseError>>> = Arc::new(Mutex::new(None));
        let stage_token = self.cancel.child_token();
        let f = Arc::new(f);

        let mut tasks = JoinSet::new();
        let mut task_keys = HashMap::new();
        for key in keys {
            let permit = tokio::select! {
                _ = stage_token.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let f = Arc::clone(&f);
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            let fatal = Arc::clone(&fatal);
            let token = stage_token.clone();
            let timeout = self.task_timeout;
            let stage_name = stage.to_string();
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = tokio::time::timeout(timeout, f(task_key.clone())) => result,
                };
                match result {
                    Ok(Ok(value)) => {
                        completed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(task_key, value);
                    }
                    Ok(Err(e)) if e.is_fatal() => {
                        log::error!("{stage_name}: {task_key}: {e}");
                        fatal
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert(e);
                        token.cancel();
                    }
                    Ok(Err(e)) => {
                        log::warn!("{stage_name}: {task_key} failed: {e}");
                        failed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(task_key, e.to_string());
                    }
                    Err(_) => {
                        let reason = format!("timed out after {}s", timeout.as_secs());
                        log::warn!("{stage_name}: {task_key} {reason}");
                        failed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(task_key, reason);
                    }
                }
            });
            task_keys.insert(handle.id(), key);
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
                next = tasks.join_next_with_id() => match next {
                    None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) if e.is_panic() => {
                        let key = task_keys.get(&e.id()).cloned().unwrap_or_default();
                        log::error!("{stage}: task for {key} panicked");
                        failed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(key, "worker panicked".into());
                    }
                    Some(Err(_)) => {}
                },
            }
        }

        if let Some(e) = fatal.lock().unwrap_or_else(PoisonError::into_inner).take() {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            log::warn!("{stage}: cancelled, nothing from this stage is kept");
            return Err(PulseError::Cancelled(stage.to_string()));
        }

        let outcome = StageOutcome {
            completed: std::mem::take(&mut *completed.lock().unwrap_or_else(PoisonError::into_inner)),
            failed: std::mem::take(&mut *failed.lock().unwrap_or_else(PoisonError::into_inner)),
        };
        log::info!(
            "{stage}: {} of {total} completed, {} failed",
            outcome.completed.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("repo-{i:02}")).collect()
    }

    #[tokio::test]
    async fn results_are_keyed_by_repository() {
        let pool = WorkerPool::new(3, Duration::from_secs(5));
        let outcome = pool
            .map("test", keys(10), |key| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(key.to_uppercase())
            })
            .await
            .unwrap();
        assert_eq!(outcome.completed.len(), 10);
        assert_eq!(outcome.completed["repo-03"], "REPO-03");
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn width_bounds_concurrency() {
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        pool.map("test", keys(8), move |_| {
            let running = Arc::clone(&r);
            let peak = Arc::clone(&p);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_and_timeouts_do_not_stop_the_stage() {
        let pool = WorkerPool::new(4, Duration::from_millis(50));
        let outcome = pool
            .map("test", keys(3), |key| async move {
                match key.as_str() {
                    "repo-00" => Err(PulseError::Remote("502".into())),
                    "repo-01" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(1)
                    }
                    _ => Ok(2),
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.completed.keys().collect::<Vec<_>>(), ["repo-02"]);
        assert!(outcome.failed["repo-00"].contains("502"));
        assert!(outcome.failed["repo-01"].contains("timed out"));
    }

    #[tokio::test]
    async fn fatal_error_aborts_the_stage() {
        let pool = WorkerPool::new(4, Duration::from_secs(5));
        let err = pool
            .map("test", keys(3), |key| async move {
                if key == "repo-01" {
                    Err(PulseError::Config("bad token".into()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Config(_)));
        assert!(!pool.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_discards_in_flight_results() {
        let pool = WorkerPool::new(2, Duration::from_secs(30));
        let canceller = pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = pool
            .map("local", keys(6), |_| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Cancelled(ref s) if s == "local"));
    }
}
