//! InMemoryOutcomeStore - プロセス内の相関ストア
//!
//! # 実装詳細
//! - `RwLock<HashMap<RequestId, Entry>>` で管理（poll は read lock のみ）
//! - Entry に記録時刻を持たせ、TTL 退避に使う（NoVideo と取りに来られなかった Ready）
//! - 終端状態は上書きしない（NoVideo の後の Ready は無視）
//! - 時刻は Clock port から取る（テストでは FixedClock）

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{PollResult, RequestId, RequestOutcome};
use crate::ports::{Clock, OutcomeStore, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    outcome: RequestOutcome,
    recorded_at: DateTime<Utc>,
}

pub struct InMemoryOutcomeStore {
    entries: RwLock<HashMap<RequestId, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryOutcomeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryOutcomeStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn mark_ready(&self, id: RequestId, path: PathBuf) {
        let recorded_at = self.clock.now();
        let mut entries = self.entries.write().await;
        if matches!(entries.get(&id), Some(e) if e.outcome == RequestOutcome::NoVideo) {
            tracing::warn!(request_id = %id, "ignoring ready mark for a no-video request");
            return;
        }
        entries.insert(
            id,
            Entry {
                outcome: RequestOutcome::Ready(path),
                recorded_at,
            },
        );
    }

    async fn mark_no_video(&self, id: RequestId) {
        let recorded_at = self.clock.now();
        let mut entries = self.entries.write().await;
        // already terminal: keep the original record (and its timestamp)
        entries.entry(id).or_insert(Entry {
            outcome: RequestOutcome::NoVideo,
            recorded_at,
        });
    }

    async fn poll(&self, id: RequestId) -> PollResult {
        let entries = self.entries.read().await;
        entries.get(&id).map(|e| e.outcome.clone()).into()
    }

    async fn take_ready(&self, id: RequestId) -> Option<PathBuf> {
        let mut entries = self.entries.write().await;
        match entries.get(&id).map(|e| &e.outcome) {
            Some(RequestOutcome::Ready(_)) => match entries.remove(&id) {
                Some(Entry {
                    outcome: RequestOutcome::Ready(path),
                    ..
                }) => Some(path),
                _ => None,
            },
            _ => None,
        }
    }

    async fn evict_no_video_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.outcome == RequestOutcome::NoVideo && e.recorded_at < cutoff));
        before - entries.len()
    }

    async fn evict_ready_older_than(&self, cutoff: DateTime<Utc>) -> Vec<PathBuf> {
        let mut entries = self.entries.write().await;
        let stale: Vec<RequestId> = entries
            .iter()
            .filter(|(_, e)| {
                matches!(e.outcome, RequestOutcome::Ready(_)) && e.recorded_at < cutoff
            })
            .map(|(id, _)| *id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| match entries.remove(&id) {
                Some(Entry {
                    outcome: RequestOutcome::Ready(path),
                    ..
                }) => Some(path),
                _ => None,
            })
            .collect()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
