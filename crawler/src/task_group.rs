//! Supervised long-running tasks sharing one shutdown signal.

use crate::shutdown::{Shutdown, ShutdownTrigger};
use log::{debug, error, info, warn};
use std::error::Error;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of one run of a supervised task.
pub type TaskResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Default delay before relaunching a failed task.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// How a task is relaunched after it fails or panics.
///
/// A task that returns `Ok(())` is considered finished and is never relaunched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Wait between a failure and the relaunch.
    pub delay: Duration,
    /// Upper bound on relaunches, `None` for no bound.
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RESTART_DELAY,
            max_restarts: None,
        }
    }
}

impl RestartPolicy {
    /// Run the task once.
    pub fn never() -> Self {
        Self {
            delay: Duration::ZERO,
            max_restarts: Some(0),
        }
    }
}

/// A set of named tasks that stop together.
///
/// Every task receives a [`Shutdown`] listener. [`TaskGroup::shutdown`] fires it and
/// waits for every task to return.
#[derive(Debug)]
pub struct TaskGroup {
    trigger: ShutdownTrigger,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self {
            trigger: ShutdownTrigger::new(),
            tasks: Vec::new(),
        }
    }

    /// A listener on this group's shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.trigger.subscribe()
    }

    /// Number of tasks spawned into the group.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(name, _)| name.as_str())
    }

    /// Spawn a supervised task.
    ///
    /// # Arguments
    ///
    /// * `name` - Used in log lines.
    /// * `policy` - When to relaunch the task after a failure.
    /// * `make` - Builds one run of the task. Called again for every relaunch.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, policy: RestartPolicy, make: F)
    where
        F: FnMut(Shutdown) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(supervise(
            name.clone(),
            policy,
            self.trigger.subscribe(),
            make,
        ));
        self.tasks.push((name, handle));
    }

    /// Signal every task to stop and wait until all of them have returned.
    pub async fn shutdown(self) {
        info!("Stopping {} tasks", self.tasks.len());
        self.trigger.trigger();
        self.join().await;
    }

    /// Wait for every task to return without signalling them.
    pub async fn join(self) {
        // Dropping the trigger would read as shutdown, keep it until every task is done.
        let TaskGroup { trigger, tasks } = self;
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                warn!("[{name}] supervisor ended abnormally: {e}");
            }
        }
        drop(trigger);
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

async fn supervise<F, Fut>(name: String, policy: RestartPolicy, shutdown: Shutdown, mut make: F)
where
    F: FnMut(Shutdown) -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    let mut restarts = 0u32;
    loop {
        debug!("[{name}] starting");
        // Run on its own task so a panic surfaces as a JoinError here.
        let outcome = tokio::spawn(make(shutdown.clone())).await;
        if shutdown.is_cancelled() {
            debug!("[{name}] stopped");
            return;
        }
        match outcome {
            Ok(Ok(())) => {
                info!("[{name}] finished");
                return;
            }
            Ok(Err(e)) => warn!("[{name}] failed: {e}"),
            Err(e) if e.is_panic() => error!("[{name}] panicked"),
            Err(_) => {
                debug!("[{name}] aborted");
                return;
            }
        }
        if policy.max_restarts.is_some_and(|max| restarts >= max) {
            error!("[{name}] not restarting after {restarts} restarts");
            return;
        }
        if shutdown.sleep(policy.delay).await.is_err() {
            return;
        }
        restarts += 1;
        info!("[{name}] restarting (restart {restarts})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_restarted_until_limit() {
        let runs = counter();
        let mut group = TaskGroup::new();
        let seen = Arc::clone(&runs);
        group.spawn(
            "flaky",
            RestartPolicy {
                delay: Duration::from_secs(1),
                max_restarts: Some(3),
            },
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".into()) }
            },
        );

        group.join().await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_restarted() {
        let runs = counter();
        let mut group = TaskGroup::new();
        let seen = Arc::clone(&runs);
        group.spawn(
            "panicky",
            RestartPolicy {
                delay: Duration::from_millis(10),
                max_restarts: Some(1),
            },
            move |_| {
                let run = seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    if run == 0 {
                        panic!("first run panics");
                    }
                    Ok(())
                }
            },
        );

        group.join().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_not_restarted() {
        let runs = counter();
        let mut group = TaskGroup::new();
        let seen = Arc::clone(&runs);
        group.spawn("once", RestartPolicy::default(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        group.join().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_task() {
        let stopped = counter();
        let mut group = TaskGroup::new();
        for i in 0..3 {
            let stopped = Arc::clone(&stopped);
            group.spawn(format!("worker-{i}"), RestartPolicy::default(), move |shutdown| {
                let stopped = Arc::clone(&stopped);
                async move {
                    shutdown.cancelled().await;
                    stopped.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        assert_eq!(group.len(), 3);
        assert_eq!(
            group.names().collect::<Vec<_>>(),
            vec!["worker-0", "worker-1", "worker-2"]
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        group.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_restart_delay() {
        let runs = counter();
        let mut group = TaskGroup::new();
        let seen = Arc::clone(&runs);
        group.spawn(
            "slow-restart",
            RestartPolicy {
                delay: Duration::from_secs(3600),
                max_restarts: None,
            },
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".into()) }
            },
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        group.shutdown().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
