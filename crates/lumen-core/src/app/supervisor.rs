//! RenderSupervisor - バックグラウンド描画タスクの管理
//!
//! - リクエストごとに 1 タスク。`JoinHandle` を `RequestId` で保持する
//! - 同時描画数は `Semaphore` で制限（超過分は permit 待ち）
//! - タスクが panic しても `NoVideo` を書く（Pending のまま残さない）
//! - `shutdown_and_join()` で新規受付を止め、全タスクの終了を待つ

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::{RenderReport, RenderSignal, RequestId};
use crate::ports::OutcomeStore;

use super::orchestrator::RenderOrchestrator;

type TaskMap = HashMap<RequestId, JoinHandle<()>>;

pub struct RenderSupervisor {
    orchestrator: Arc<RenderOrchestrator>,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<TaskMap>>,
    accepting: AtomicBool,
}

impl RenderSupervisor {
    pub fn new(orchestrator: Arc<RenderOrchestrator>, max_concurrent_renders: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent_renders.max(1))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            accepting: AtomicBool::new(true),
        }
    }

    /// Launch the render pipeline for `request_id` without waiting on it.
    ///
    /// Returns `false` (and records `NoVideo`) once shutdown has begun.
    pub async fn submit(&self, request_id: RequestId, script: String) -> bool {
        if !self.spawn_registered(request_id, script) {
            tracing::warn!(%request_id, "supervisor is shutting down, render not started");
            self.orchestrator.store().mark_no_video(request_id).await;
            return false;
        }
        true
    }

    /// Spawns and registers the render task under the registry lock.
    ///
    /// `accepting` is read while the lock is held, so a task is either
    /// registered before `shutdown_and_join` drains the registry or refused.
    fn spawn_registered(&self, request_id: RequestId, script: String) -> bool {
        let mut registry = lock(&self.tasks);
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);
        let inner = tokio::spawn(async move {
            // never closed, so acquisition only fails if we are being torn down
            let _permit = permits.acquire_owned().await.ok();
            orchestrator.run(request_id, script).await
        });

        let store = Arc::clone(self.orchestrator.store());
        let tasks = Arc::clone(&self.tasks);
        // the outer task's own removal blocks on this lock until the insert below
        let outer = tokio::spawn(async move {
            let report = match inner.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(%request_id, "render task aborted: {}", e);
                    store.mark_no_video(request_id).await;
                    faulted(request_id, e.to_string())
                }
            };
            tracing::debug!(
                %request_id,
                state = ?report.final_state,
                renders = report.renders(),
                repairs = report.repairs,
                "render task finished"
            );
            lock(&tasks).remove(&request_id);
        });
        registry.insert(request_id, outer);
        true
    }

    pub fn store(&self) -> &Arc<dyn OutcomeStore> {
        self.orchestrator.store()
    }

    /// Number of render tasks not yet finished.
    pub fn in_flight(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting new renders and wait for every in-flight one.
    pub async fn shutdown_and_join(&self) {
        let handles: Vec<_> = {
            let mut registry = lock(&self.tasks);
            self.accepting.store(false, Ordering::SeqCst);
            registry.drain().map(|(_, h)| h).collect()
        };
        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "waiting for in-flight renders");
        }
        for h in handles {
            let _ = h.await;
        }
    }
}

fn lock(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    match tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn faulted(request_id: RequestId, reason: String) -> RenderReport {
    let mut report = RenderReport::new(request_id);
    report.final_state = report
        .final_state
        .transition(RenderSignal::Fault)
        .unwrap_or(report.final_state);
    report.reason = Some(reason);
    report
}
