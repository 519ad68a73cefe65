//! The result-action vocabulary and its execution.
//!
//! Most kinds are opaque to the core and are sequenced straight out through
//! the `ServiceHost`. A small set (`assign`, `add`, `random`, `timer`)
//! manipulates the shared game state directly, matching the authored
//! content's expectations.

use crate::services::{ServiceError, ServiceHost, ServiceRequest};
use crate::state::GameState;
use indexmap::IndexMap;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Every action name the compiler recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Add,
    AnimPlay,
    AnimPreload,
    Assign,
    ChangeLocation,
    Crossfade,
    DisableControl,
    DisplayMessage,
    EnableControl,
    Inventory,
    Kill,
    Music,
    PanTrack,
    PlayPreload,
    Quit,
    Random,
    Region,
    SetPartialScreen,
    SetScreen,
    Stop,
    StreamVideo,
    SyncSound,
    Timer,
    TtyText,
    UniverseMusic,
}

lazy_static! {
    /// Action-name registry, keyed by the lowercase spelling used in script
    /// files. Iteration order is the authoring-documentation order.
    pub static ref ACTION_KINDS: IndexMap<&'static str, ActionKind> = {
        let mut m = IndexMap::new();
        m.insert("add", ActionKind::Add);
        m.insert("animplay", ActionKind::AnimPlay);
        m.insert("animpreload", ActionKind::AnimPreload);
        m.insert("assign", ActionKind::Assign);
        m.insert("change_location", ActionKind::ChangeLocation);
        m.insert("crossfade", ActionKind::Crossfade);
        m.insert("disable_control", ActionKind::DisableControl);
        m.insert("display_message", ActionKind::DisplayMessage);
        m.insert("enable_control", ActionKind::EnableControl);
        m.insert("inventory", ActionKind::Inventory);
        m.insert("kill", ActionKind::Kill);
        m.insert("music", ActionKind::Music);
        m.insert("pan_track", ActionKind::PanTrack);
        m.insert("playpreload", ActionKind::PlayPreload);
        m.insert("quit", ActionKind::Quit);
        m.insert("random", ActionKind::Random);
        m.insert("region", ActionKind::Region);
        m.insert("set_partial_screen", ActionKind::SetPartialScreen);
        m.insert("set_screen", ActionKind::SetScreen);
        m.insert("stop", ActionKind::Stop);
        m.insert("streamvideo", ActionKind::StreamVideo);
        m.insert("syncsound", ActionKind::SyncSound);
        m.insert("timer", ActionKind::Timer);
        m.insert("ttytext", ActionKind::TtyText);
        m.insert("universe_music", ActionKind::UniverseMusic);
        m
    };
}

impl ActionKind {
    /// Case-insensitive lookup; `None` for unauthored/unknown names.
    pub fn from_name(name: &str) -> Option<ActionKind> {
        ACTION_KINDS.get(name.to_ascii_lowercase().as_str()).copied()
    }
}

/// RandMode controls the `random` action's generator. Predictable for
/// tests, uniform for gameplay.
pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct ActionRng {
    rng: Box<dyn RngCore>,
    pub mode: RandMode,
}

impl ActionRng {
    pub fn new_uniform() -> Self {
        ActionRng {
            rng: Box::new(rand::thread_rng()),
            mode: RandMode::RandomUniform,
        }
    }

    pub fn new_predictable(seed: u64) -> Self {
        ActionRng {
            rng: Box::new(StdRng::seed_from_u64(seed)),
            mode: RandMode::Predictable,
        }
    }

    /// Roll an integer in `[0, max]` inclusive.
    pub fn roll(&mut self, max: i32) -> i32 {
        if max <= 0 {
            return 0;
        }
        self.rng.gen_range(0..=max)
    }
}

fn parse_key_value(kind: ActionKind, args: &str) -> Result<(u32, i32), ServiceError> {
    let mut parts = args.split(',').map(str::trim);
    let key = parts
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or_else(|| ServiceError::new(format!("{kind:?}: bad key in args '{args}'")))?;
    let value = parts
        .next()
        .and_then(|t| t.parse::<i32>().ok())
        .ok_or_else(|| ServiceError::new(format!("{kind:?}: bad value in args '{args}'")))?;
    Ok((key, value))
}

/// Execute one compiled action against the shared state and the host.
pub fn execute(
    action: &crate::puzzle::Action,
    state: &mut GameState,
    host: &mut dyn ServiceHost,
    rng: &mut ActionRng,
) -> Result<(), ServiceError> {
    match action.kind {
        ActionKind::Assign => {
            let (key, value) = parse_key_value(action.kind, &action.args)?;
            state.set(key, value);
            Ok(())
        }
        ActionKind::Add => {
            let (key, delta) = parse_key_value(action.kind, &action.args)?;
            state.set(key, state.get(key) + delta);
            Ok(())
        }
        ActionKind::Random => {
            let (key, max) = parse_key_value(action.kind, &action.args)?;
            state.set(key, rng.roll(max));
            Ok(())
        }
        ActionKind::Timer => {
            let (key, ticks) = parse_key_value(action.kind, &action.args)?;
            if ticks < 0 || ticks > u16::MAX as i32 || key > u16::MAX as u32 {
                warn!("timer action out of range: {}", action.args);
                return Err(ServiceError::new("timer out of range"));
            }
            state.set(key, ticks);
            host.perform(ServiceRequest::SetTimer {
                timer: key as u16,
                ticks: ticks as u16,
            })
        }
        kind => host.perform(ServiceRequest::RuleAction {
            kind,
            slot: action.slot,
            args: action.args.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::{Action, NO_SLOT};
    use crate::services::NullHost;

    fn act(kind: ActionKind, args: &str) -> Action {
        Action {
            kind,
            slot: NO_SLOT,
            args: args.to_string(),
        }
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        assert_eq!(ActionKind::from_name("AnimPlay"), Some(ActionKind::AnimPlay));
        assert_eq!(
            ActionKind::from_name("CHANGE_LOCATION"),
            Some(ActionKind::ChangeLocation)
        );
        assert_eq!(ActionKind::from_name("teleport"), None);
    }

    #[test]
    fn assign_and_add_mutate_state() {
        let mut state = GameState::new();
        let mut host = NullHost;
        let mut rng = ActionRng::new_predictable(1);
        execute(&act(ActionKind::Assign, "5, 10"), &mut state, &mut host, &mut rng).unwrap();
        assert_eq!(state.get(5), 10);
        execute(&act(ActionKind::Add, "5, -4"), &mut state, &mut host, &mut rng).unwrap();
        assert_eq!(state.get(5), 6);
    }

    #[test]
    fn random_stays_in_range() {
        let mut state = GameState::new();
        let mut host = NullHost;
        let mut rng = ActionRng::new_predictable(99);
        for _ in 0..32 {
            execute(&act(ActionKind::Random, "3, 6"), &mut state, &mut host, &mut rng).unwrap();
            let v = state.get(3);
            assert!((0..=6).contains(&v), "rolled {v}");
        }
    }

    #[test]
    fn bad_args_fail_without_touching_state() {
        let mut state = GameState::new();
        let mut host = NullHost;
        let mut rng = ActionRng::new_predictable(1);
        assert!(execute(&act(ActionKind::Assign, "pony"), &mut state, &mut host, &mut rng).is_err());
        assert!(state.is_empty());
    }
}
