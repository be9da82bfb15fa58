//! Errors - エラー型と分類
//!
//! Every fallible seam of the core has its own enum so callers can match on
//! what actually went wrong instead of parsing strings.

use std::time::Duration;

use thiserror::Error;

use super::state::{RenderSignal, RenderState};

/// Failure of the explanation/script generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    RequestFailed(String),

    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("unexpected response from model provider: {0}")]
    MalformedResponse(String),
}

/// The repair collaborator could not produce a corrected script.
///
/// Always terminal for the render pipeline of the request.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("repair request failed: {0}")]
    RequestFailed(String),

    #[error("repair returned an empty script")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read video {path}: {reason}")]
    VideoUnreadable { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid render transition: {signal:?} in state {state:?}")]
pub struct TransitionError {
    pub state: RenderState,
    pub signal: RenderSignal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("malformed identifier: {0:?}")]
    Malformed(String),
}

/// Errors surfaced by the chat pipeline before any streaming begins.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Either text or image must be provided")]
    EmptyInput,

    #[error("Unsupported image format. Supported: JPG, PNG, BMP, TIFF")]
    UnsupportedImage,

    #[error("Invalid image data: {0}")]
    InvalidImageData(String),

    #[error("No readable text found in the image. Please add a question")]
    NoImageText,

    #[error("AI service unavailable: {0}")]
    GenerationUnavailable(GenerationError),

    #[error("failed to store upload: {0}")]
    Upload(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
