//! Outcome model: what the correlation store knows about a request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Terminal record kept per request identifier.
///
/// "Pending" is not a variant: it is the absence of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "video_path", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestOutcome {
    /// A video exists on disk and has not been served yet.
    Ready(PathBuf),

    /// No video will ever be produced for this request.
    NoVideo,
}

/// Answer to a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "video_path", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollResult {
    Pending,
    Ready(PathBuf),
    NoVideo,
}

impl From<Option<RequestOutcome>> for PollResult {
    fn from(outcome: Option<RequestOutcome>) -> Self {
        match outcome {
            None => PollResult::Pending,
            Some(RequestOutcome::Ready(path)) => PollResult::Ready(path),
            Some(RequestOutcome::NoVideo) => PollResult::NoVideo,
        }
    }
}
