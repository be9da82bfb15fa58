//! SceneRenderer port - one call to the external animation engine.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::RequestId;

/// Result of one render invocation.
///
/// Both variants carry the script that was actually rendered, so the repair
/// step always works on what the engine saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Rendered { video: PathBuf, script_used: String },
    Failed { error: String, script_used: String },
}

impl RenderOutput {
    pub fn script_used(&self) -> &str {
        match self {
            RenderOutput::Rendered { script_used, .. }
            | RenderOutput::Failed { script_used, .. } => script_used,
        }
    }

    pub fn video(&self) -> Option<&PathBuf> {
        match self {
            RenderOutput::Rendered { video, .. } => Some(video),
            RenderOutput::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RenderOutput::Rendered { .. } => None,
            RenderOutput::Failed { error, .. } => Some(error),
        }
    }
}

/// No retries at this layer; the orchestrator owns retrying.
///
/// The output file name must derive from `request_id`, not from the script,
/// so two requests with identical scripts never collide.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    async fn render(&self, script: &str, scene: &str, request_id: RequestId) -> RenderOutput;
}
