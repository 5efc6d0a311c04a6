use std::collections::HashMap;
use std::sync::Arc;

use ap_core::{ActionExecutor, Job};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Bounded pool of executor units.
///
/// Each [`Job`] runs on the blocking thread pool once one of `max_workers`
/// permits is free. Handles are tracked per action id until the unit
/// finishes, so shutdown can wait for in-flight work with [`WorkerPool::drain`].
#[derive(Clone)]
pub struct WorkerPool {
    executor: ActionExecutor,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl WorkerPool {
    pub fn new(executor: ActionExecutor, max_workers: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue `job`. Returns immediately; the unit waits for a permit.
    pub async fn dispatch(&self, job: Job) {
        let action_id = job.lease.action_id().to_string();
        let executor = self.executor.clone();
        let permits = self.permits.clone();
        let in_flight = self.in_flight.clone();
        let id = action_id.clone();

        // Held across the spawn so the unit cannot deregister before it is registered.
        let mut tracked = self.in_flight.lock().await;
        let handle = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            tracing::debug!(action_id = %id, "worker started");
            let unit = executor.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || unit.run(job)).await {
                executor.record_lost(&id, &format!("execution unit aborted: {e}"));
            }
            in_flight.lock().await.remove(&id);
        });
        tracked.insert(action_id, handle);
    }

    /// Number of units queued or running.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Wait for every queued and running unit to finish.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tracked = self.in_flight.lock().await;
                tracked.drain().map(|(_, handle)| handle).collect()
            };
            if handles.is_empty() {
                return;
            }
            tracing::info!(count = handles.len(), "waiting for in-flight actions");
            for handle in handles {
                let _ = handle.await;
            }
        }
    }
}
