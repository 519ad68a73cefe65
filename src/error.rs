use crate::services::ServiceError;
use thiserror::Error;

/// Fatal conditions for a running script.
///
/// Any of these leaves the interpreter FAULTED; the caller must discard or
/// reload the program. State writes committed before the fault stay applied.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("stream underflow at offset {offset}: wanted {wanted} byte(s), {remaining} left")]
    StreamUnderflow {
        offset: usize,
        wanted: usize,
        remaining: usize,
    },

    #[error("seek to {pos} is past end of stream (length {len})")]
    InvalidSeek { pos: usize, len: usize },

    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("no sequence marker with id {sequence} in stream")]
    MissingSequenceMarker { sequence: u16 },

    #[error("script call depth limit ({limit}) exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("script return with empty call stack")]
    CallStackUnderflow,

    #[error("interpreter already finished; reload a program before running again")]
    AlreadyFinished,

    #[error("instruction limit ({limit}) exceeded")]
    InstructionLimitExceeded { limit: u64 },

    #[error("external service failed: {0}")]
    Service(#[from] ServiceError),
}
