//! Janitor - 定期的な掃除
//!
//! - `NoVideo` エントリを TTL 経過後にストアから退避
//! - 取りに来られなかった `Ready` エントリも TTL 後に退避し、動画ファイルを削除
//! - アップロードディレクトリに残った古いファイルを削除
//!
//! `watch` チャネルで停止する（WorkerGroup と同じ方式）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::JanitorConfig;
use crate::ports::{Clock, OutcomeStore};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub evicted: usize,
    pub videos_expired: usize,
    pub uploads_removed: usize,
}

pub struct Janitor {
    store: Arc<dyn OutcomeStore>,
    clock: Arc<dyn Clock>,
    upload_dir: PathBuf,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(
        store: Arc<dyn OutcomeStore>,
        clock: Arc<dyn Clock>,
        upload_dir: impl Into<PathBuf>,
        config: JanitorConfig,
    ) -> Self {
        Self {
            store,
            clock,
            upload_dir: upload_dir.into(),
            config,
        }
    }

    pub async fn sweep(&self) -> Sweep {
        let evicted = self
            .store
            .evict_no_video_older_than(self.cutoff(self.config.no_video_ttl))
            .await;
        let videos_expired = self.expire_videos().await;
        let uploads_removed = self.remove_old_uploads().await;
        if evicted > 0 || videos_expired > 0 || uploads_removed > 0 {
            tracing::info!(evicted, videos_expired, uploads_removed, "janitor sweep");
        }
        Sweep {
            evicted,
            videos_expired,
            uploads_removed,
        }
    }

    fn cutoff(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Unpolled videos: drop the entry, then the file.
    async fn expire_videos(&self) -> usize {
        let paths = self
            .store
            .evict_ready_older_than(self.cutoff(self.config.ready_ttl))
            .await;
        for path in &paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to delete expired video: {}", e)
                }
            }
        }
        paths.len()
    }

    async fn remove_old_uploads(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let max_age = self.config.upload_max_age;
        let now = SystemTime::now();
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or(Duration::ZERO);
            if age >= max_age {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        let path = entry.path();
                        tracing::warn!(path = %path.display(), "failed to remove upload: {}", e)
                    }
                }
            }
        }
        removed
    }

    /// Sweep every `interval` until shutdown is requested.
    pub fn spawn(self) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        // tokio panics on a zero period
        let interval = self.config.interval.max(Duration::from_millis(10));
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // handle dropped without shutdown_and_join
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        });
        JanitorHandle { shutdown_tx, join }
    }
}

pub struct JanitorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl JanitorHandle {
    pub async fn shutdown_and_join(self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
