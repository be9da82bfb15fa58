//! ExplanationStreamer - explanation text as a paced chunk stream.
//!
//! Body layout: `word1 word2 ... wordN \n[REQUEST_ID:<id>]\n`. The trailer is
//! the only place a client learns the id to poll with, so a failing producer
//! ends the body with a visible error chunk instead of a silent cut.

use std::fmt::Display;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::domain::RequestId;

const TRAILER_OPEN: &str = "\n[REQUEST_ID:";
const TRAILER_CLOSE: &str = "]\n";
const CHANNEL_CAPACITY: usize = 32;

pub fn trailer(request_id: impl Display) -> String {
    format!("{TRAILER_OPEN}{request_id}{TRAILER_CLOSE}")
}

pub fn error_chunk(message: impl Display) -> String {
    format!("\nError during streaming: {message}\n")
}

/// Recovers the request id from a complete streamed body.
pub fn parse_request_id(body: &str) -> Option<RequestId> {
    let start = body.rfind(TRAILER_OPEN)? + TRAILER_OPEN.len();
    let rest = &body[start..];
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

#[derive(Debug, Clone)]
pub struct ExplanationStreamer {
    delay: Duration,
}

impl ExplanationStreamer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Word-by-word stream of `explanation`, followed by the trailer for `request_id`.
    pub fn stream(
        &self,
        explanation: String,
        request_id: impl Display + Send + 'static,
    ) -> ReceiverStream<String> {
        let words: Vec<Result<String, std::convert::Infallible>> = explanation
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();
        self.stream_from(tokio_stream::iter(words), request_id)
    }

    /// Paces chunks from `source` and appends the trailer.
    ///
    /// An `Err` from the source (or a panic while producing) ends the body
    /// with an error chunk and no trailer. A dropped receiver stops production.
    pub fn stream_from<S, E>(
        &self,
        source: S,
        request_id: impl Display + Send + 'static,
    ) -> ReceiverStream<String>
    where
        S: Stream<Item = Result<String, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let delay = self.delay;

        let producer_tx = tx.clone();
        let producer = tokio::spawn(async move {
            let mut source = source;
            while let Some(item) = source.next().await {
                match item {
                    Ok(chunk) => {
                        if producer_tx.send(chunk).await.is_err() {
                            return;
                        }
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("explanation stream failed: {}", e);
                        let _ = producer_tx.send(error_chunk(e)).await;
                        return;
                    }
                }
            }
            let _ = producer_tx.send(trailer(request_id)).await;
        });

        tokio::spawn(async move {
            if let Err(e) = producer.await {
                tracing::error!("explanation stream aborted: {}", e);
                let _ = tx.send(error_chunk(e)).await;
            }
        });

        ReceiverStream::new(rx)
    }
}

impl Default for ExplanationStreamer {
    fn default() -> Self {
        Self::new(Duration::from_millis(30))
    }
}
