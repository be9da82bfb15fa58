//! OutcomeStore port - request id → 動画の状態
//!
//! # 設計原則
//! - 書き込みはリクエストごとのバックグラウンドタスク 1 つだけ
//! - 読み取りは poll ハンドラ（成功時のみ 1 回だけ削除）
//! - 全操作が 1 キーだけに触れる（複数キーのトランザクションは不要）

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{PollResult, RequestId};

#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Idempotent. Sets `Ready(path)`; a later call replaces the path.
    /// No-op when the entry is already `NoVideo`.
    async fn mark_ready(&self, id: RequestId, path: PathBuf);

    /// Idempotent. Sets `NoVideo` unless the entry is already `Ready`.
    async fn mark_no_video(&self, id: RequestId);

    async fn poll(&self, id: RequestId) -> PollResult;

    /// Atomically removes a `Ready` entry and returns its path.
    ///
    /// Of several concurrent callers at most one receives the path.
    async fn take_ready(&self, id: RequestId) -> Option<PathBuf>;

    /// Drops `NoVideo` entries recorded before `cutoff`. Returns how many.
    async fn evict_no_video_older_than(&self, cutoff: DateTime<Utc>) -> usize;

    /// Drops `Ready` entries recorded before `cutoff` and hands back their
    /// video paths so the caller can delete the files.
    async fn evict_ready_older_than(&self, cutoff: DateTime<Utc>) -> Vec<PathBuf>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
