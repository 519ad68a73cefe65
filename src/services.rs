//! The boundary between the scripting core and the rest of the engine.
//!
//! Opcode handlers and rule actions never render, mix audio or touch files
//! themselves; they sequence `ServiceRequest`s out through a `ServiceHost`
//! supplied by the embedding game. The core only cares about ordering and
//! success/failure.

use crate::actions::ActionKind;
use log::debug;
use thiserror::Error;

/// A downstream call failed. Non-fatal to rule evaluation (the failing
/// rule's remaining actions are skipped); fatal to a bytecode run.
#[derive(Debug, Error)]
#[error("service request failed: {reason}")]
pub struct ServiceError {
    pub reason: String,
}

impl ServiceError {
    pub fn new(reason: impl Into<String>) -> Self {
        ServiceError {
            reason: reason.into(),
        }
    }
}

/// One side-effecting call into the embedding engine.
///
/// Bytecode opcodes issue the typed variants; rule actions issue
/// `RuleAction` with the kind/slot/args triple straight from the script
/// text. The host interprets the semantics, the core only sequences.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    ShowMessage { id: u16 },
    ChangeRoom { room: u8 },
    StartAnimation { id: u8 },
    DropLastAnimTimer,
    SoundCue { id: u8 },
    PreloadSound { id: u8 },
    FreeSound,
    PlotImage { x: u16, y: u16, object: u16, image: u16 },
    SelectDisplayBuffer,
    SetTimer { timer: u16, ticks: u16 },
    SetInventory { item: u8, count: u8 },
    SetPlayerVisible { visible: bool },
    FadeOut,
    ShowMainPanel,
    RuleAction {
        kind: ActionKind,
        slot: i32,
        args: String,
    },
}

/// Implemented by the embedding engine. The two query methods feed the
/// conditional opcodes; hosts that have no animation or player subsystem
/// can rely on the defaults.
pub trait ServiceHost {
    fn perform(&mut self, request: ServiceRequest) -> Result<(), ServiceError>;

    /// Whether animation `id` is still looping. `check_anim` jumps when the
    /// animation has finished.
    fn animation_running(&self, _id: u16) -> bool {
        false
    }

    /// Player position in scene coordinates, for bounding-box checks.
    fn player_position(&self) -> (i32, i32) {
        (0, 0)
    }
}

/// Host that acknowledges every request without doing anything. Used by the
/// CLI and as a base for tests.
#[derive(Default)]
pub struct NullHost;

impl ServiceHost for NullHost {
    fn perform(&mut self, request: ServiceRequest) -> Result<(), ServiceError> {
        debug!("service request (ignored): {request:?}");
        Ok(())
    }
}
