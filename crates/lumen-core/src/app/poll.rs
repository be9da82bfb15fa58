//! VideoPoller - 動画ポーリング（1 回だけ配信）
//!
//! `Ready` のエントリはストアから原子的に取り出し、読み込み後にファイルを削除する。
//! 同じ id への並行ポーリングでも、動画を受け取るのは 1 つだけ。
//! base64 でも生バイトでも、取り出しは同じ `take()` を通る。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::domain::{PollResult, RequestId, StoreError};
use crate::ports::OutcomeStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPoll {
    Pending,
    NoVideo,
    Ready { video_base64: String },
}

/// Raw bytes of a consumed video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoFile {
    Pending,
    NoVideo,
    Ready(Vec<u8>),
}

const WAIT_INTERVAL: Duration = Duration::from_millis(250);

pub struct VideoPoller {
    store: Arc<dyn OutcomeStore>,
}

impl VideoPoller {
    pub fn new(store: Arc<dyn OutcomeStore>) -> Self {
        Self { store }
    }

    pub async fn poll(&self, id: RequestId) -> VideoPoll {
        match self.take(id).await {
            VideoFile::Pending => VideoPoll::Pending,
            VideoFile::NoVideo => VideoPoll::NoVideo,
            VideoFile::Ready(bytes) => VideoPoll::Ready {
                video_base64: STANDARD.encode(bytes),
            },
        }
    }

    /// Consumes a ready video: the entry leaves the store and the file is deleted.
    pub async fn take(&self, id: RequestId) -> VideoFile {
        match self.store.poll(id).await {
            PollResult::Pending => {
                tracing::debug!(request_id = %id, "video not ready");
                return VideoFile::Pending;
            }
            PollResult::NoVideo => return VideoFile::NoVideo,
            PollResult::Ready(_) => {}
        }

        // another poller may have consumed it between poll and take
        let Some(path) = self.store.take_ready(id).await else {
            return VideoFile::Pending;
        };

        match consume(&path).await {
            Ok(bytes) => {
                tracing::info!(request_id = %id, bytes = bytes.len(), "video served");
                VideoFile::Ready(bytes)
            }
            Err(e) => {
                tracing::error!(request_id = %id, "{}", e);
                self.store.mark_no_video(id).await;
                VideoFile::NoVideo
            }
        }
    }

    /// Polls until the request leaves `Pending` or `limit` elapses.
    pub async fn wait(&self, id: RequestId, limit: Duration) -> VideoPoll {
        let settled = tokio::time::timeout(limit, async {
            loop {
                if self.store.poll(id).await != PollResult::Pending {
                    return self.poll(id).await;
                }
                tokio::time::sleep(WAIT_INTERVAL).await;
            }
        })
        .await;
        match settled {
            Ok(poll) => poll,
            Err(_) => {
                tracing::warn!(request_id = %id, ?limit, "gave up waiting for video");
                VideoPoll::Pending
            }
        }
    }
}

/// Reads the file and deletes it.
async fn consume(path: &Path) -> Result<Vec<u8>, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::VideoUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), "failed to delete served video: {}", e);
    }
    Ok(bytes)
}
