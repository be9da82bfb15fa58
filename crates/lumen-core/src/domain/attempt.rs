//! Attempt history of one render pipeline run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::RequestId;
use super::state::RenderState;

/// A single render try. Superseded by the next attempt or by a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderAttempt {
    pub script: String,

    /// 0-based.
    pub index: u32,

    /// Engine output when the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RenderAttempt {
    pub fn new(index: u32, script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            index,
            failure: None,
        }
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }
}

/// What happened during one orchestrator run.
///
/// This is the foundation of "why is there no video" explanations in logs
/// and of the invocation-count assertions in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub request_id: RequestId,
    pub attempts: Vec<RenderAttempt>,
    pub repairs: u32,
    pub final_state: RenderState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,

    /// Why the run ended in `Exhausted` (last render error, repair error or fault).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RenderReport {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            attempts: Vec::new(),
            repairs: 0,
            final_state: RenderState::INITIAL,
            video: None,
            reason: None,
        }
    }

    pub fn renders(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == RenderState::Succeeded
    }
}
