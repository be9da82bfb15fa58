//! Render state machine.
//!
//! State transitions:
//! - Attempting(n) --Rendered--> Succeeded
//! - Attempting(n) --RenderFailed--> AwaitingRepair(n)   (n + 1 < MAX_ATTEMPTS)
//! - Attempting(n) --RenderFailed--> Exhausted           (n + 1 == MAX_ATTEMPTS)
//! - AwaitingRepair(n) --Repaired--> Attempting(n + 1)
//! - AwaitingRepair(n) --RepairFailed--> Exhausted
//! - any --Fault--> Exhausted
//!
//! `transition` is pure: the orchestrator performs the I/O and feeds the
//! observed signal back in.

use serde::{Deserialize, Serialize};

use super::errors::TransitionError;

/// Upper bound on render invocations per request.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderState {
    /// Render attempt `n` (0-based) is due.
    Attempting(u32),

    /// Attempt `n` failed and a repair is due before attempt `n + 1`.
    AwaitingRepair(u32),

    /// A video was produced.
    Succeeded,

    /// No video will ever be produced.
    Exhausted,
}

/// What the orchestrator observed after its last I/O step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderSignal {
    Rendered,
    RenderFailed,
    Repaired,
    RepairFailed,
    Fault,
}

impl RenderState {
    pub const INITIAL: RenderState = RenderState::Attempting(0);

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Succeeded | RenderState::Exhausted)
    }

    pub fn transition(self, signal: RenderSignal) -> Result<RenderState, TransitionError> {
        self.transition_with_limit(signal, MAX_ATTEMPTS)
    }

    /// Same as [`transition`](Self::transition) with an explicit attempt ceiling.
    pub fn transition_with_limit(
        self,
        signal: RenderSignal,
        max_attempts: u32,
    ) -> Result<RenderState, TransitionError> {
        use RenderSignal::*;
        use RenderState::*;

        let next = match (self, signal) {
            (Succeeded | Exhausted, _) => self,
            (_, Fault) => Exhausted,
            (Attempting(_), Rendered) => Succeeded,
            (Attempting(n), RenderFailed) if n + 1 < max_attempts => AwaitingRepair(n),
            (Attempting(_), RenderFailed) => Exhausted,
            (AwaitingRepair(n), Repaired) => Attempting(n + 1),
            (AwaitingRepair(_), RepairFailed) => Exhausted,
            (state, signal) => return Err(TransitionError { state, signal }),
        };
        Ok(next)
    }
}
