//! Domain model (IDs, outcomes, render state machine, errors).

pub mod attempt;
pub mod errors;
pub mod generation;
pub mod ids;
pub mod outcome;
pub mod state;

pub use attempt::{RenderAttempt, RenderReport};
pub use errors::{
    ChatError, ConfigError, GenerationError, IdError, RepairError, StoreError, TransitionError,
};
pub use generation::{DEFAULT_SCENE_NAME, Generation, declares_scene, scene_name};
pub use ids::{RequestId, UploadId};
pub use outcome::{PollResult, RequestOutcome};
pub use state::{MAX_ATTEMPTS, RenderSignal, RenderState};
