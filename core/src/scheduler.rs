//! Worker scheduler
//!
//! Tracks every worker instance of one invocation. Workers run as tokio
//! tasks; the scheduler only counts them in and out and records failures so
//! the invocation can join on all of them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::RunError;
use crate::interpreter::Fault;
use crate::program::FunctionId;
use crate::values::Value;

pub type WorkerId = u64;

/// A running worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInstance {
    pub id: WorkerId,
    pub function: FunctionId,
    pub function_name: String,
    pub worker_name: String,
}

/// A worker that ended in a fault
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker: WorkerInstance,
    pub fault: Fault,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker '{}' of {} failed: {}",
            self.worker.worker_name, self.worker.function_name, self.fault
        )
    }
}

pub type WorkerOutcome = Result<Vec<Value>, Fault>;

#[derive(Debug)]
pub struct WorkerScheduler {
    in_flight: watch::Sender<usize>,
    live: Mutex<IndexMap<WorkerId, WorkerInstance>>,
    failures: Mutex<Vec<WorkerFailure>>,
    next_id: AtomicU64,
}

impl Default for WorkerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerScheduler {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            in_flight,
            live: Mutex::new(IndexMap::new()),
            failures: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Count a worker in. Must be paired with exactly one [`complete`](Self::complete).
    pub fn register(
        &self,
        function: FunctionId,
        function_name: &str,
        worker_name: &str,
    ) -> WorkerInstance {
        let instance = WorkerInstance {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            function,
            function_name: function_name.to_string(),
            worker_name: worker_name.to_string(),
        };
        self.live.lock().insert(instance.id, instance.clone());
        self.in_flight.send_modify(|n| *n += 1);
        debug!(
            worker_id = instance.id,
            function = %instance.function_name,
            worker = %instance.worker_name,
            "worker registered"
        );
        instance
    }

    /// Count a worker out, recording its fault if it had one
    pub fn complete(&self, id: WorkerId, outcome: &WorkerOutcome) {
        let Some(instance) = self.live.lock().shift_remove(&id) else {
            warn!(worker_id = id, "completion for unknown worker ignored");
            return;
        };

        match outcome {
            Ok(_) => debug!(worker_id = id, worker = %instance.worker_name, "worker completed"),
            Err(fault) => {
                warn!(
                    worker_id = id,
                    worker = %instance.worker_name,
                    error = %fault.error,
                    "worker faulted"
                );
                self.failures.lock().push(WorkerFailure {
                    worker: instance,
                    fault: fault.clone(),
                });
            }
        }
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn live_workers(&self) -> Vec<WorkerInstance> {
        self.live.lock().values().cloned().collect()
    }

    pub fn failures(&self) -> Vec<WorkerFailure> {
        self.failures.lock().clone()
    }

    /// Wait until no worker is in flight.
    ///
    /// Returns every recorded failure once all workers have drained.
    pub async fn await_all(&self) -> Result<(), RunError> {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|n| *n == 0).await;

        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunError::WorkersFailed(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::errors::ExecutionError;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_await_returns_after_racing_completions() {
        let scheduler = Arc::new(WorkerScheduler::new());
        let done = Arc::new(AtomicU64::new(0));

        for i in 0..16u64 {
            let instance = scheduler.register(FunctionId(0), "main", &format!("w{}", i));
            let scheduler = scheduler.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis((i * 7) % 5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                scheduler.complete(instance.id, &Ok(vec![]));
            });
        }

        scheduler.await_all().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 16);
        assert_eq!(scheduler.in_flight(), 0);
        assert!(scheduler.live_workers().is_empty());
    }

    #[tokio::test]
    async fn test_await_with_nothing_in_flight() {
        let scheduler = WorkerScheduler::new();
        tokio_test::assert_ok!(scheduler.await_all().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_are_aggregated_without_cancelling_siblings() {
        let scheduler = Arc::new(WorkerScheduler::new());
        let a = scheduler.register(FunctionId(0), "main", "a");
        let b = scheduler.register(FunctionId(0), "main", "b");
        let c = scheduler.register(FunctionId(0), "main", "c");

        let fault = Fault {
            error: ExecutionError::DivisionByZero,
            stack_trace: vec![],
        };
        scheduler.complete(a.id, &Err(fault.clone()));
        scheduler.complete(b.id, &Ok(vec![Value::Int(1)]));

        let late = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                scheduler.complete(c.id, &Err(fault));
            })
        };

        let err = scheduler.await_all().await.unwrap_err();
        late.await.unwrap();
        match err {
            RunError::WorkersFailed(failures) => {
                let names: Vec<_> = failures
                    .iter()
                    .map(|f| f.worker.worker_name.as_str())
                    .collect();
                assert_eq!(names, vec!["a", "c"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
