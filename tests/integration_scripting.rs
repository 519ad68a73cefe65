//! End-to-end tests driving both halves of the scripting core against one
//! shared game state: a bytecode command program commits flag writes, and a
//! compiled puzzle rule-set reacts to them on the next evaluation pass,
//! the same handoff the engine performs every frame.

use macguffin::actions::{ActionKind, ActionRng};
use macguffin::interpreter::{Interpreter, RunState, ScriptContext};
use macguffin::rule_compiler::RuleCompiler;
use macguffin::rule_engine::RuleEngine;
use macguffin::services::{NullHost, ServiceError, ServiceHost, ServiceRequest};
use macguffin::state::GameState;

const SET_FLAG: u8 = 0x8c;
const CHECK_FLAG: u8 = 0x8d;
const SOUND: u8 = 0x96;
const RET_POS: u8 = 0x8a;
const RET_NEG: u8 = 0x97;
const SENTINEL: u8 = 0xe0;

#[derive(Default)]
struct RecordingHost {
    requests: Vec<ServiceRequest>,
}

impl ServiceHost for RecordingHost {
    fn perform(&mut self, request: ServiceRequest) -> Result<(), ServiceError> {
        self.requests.push(request);
        Ok(())
    }
}

#[test]
fn bytecode_writes_feed_the_rule_engine() {
    // the "use key on door" command script: remember the door is open,
    // cue a sound, exit cleanly
    let program = vec![SET_FLAG, 12, 1, SOUND, 3, RET_POS];

    let rules = "\
puzzle:200 {
    criteria {
        [12] = 1
    }
    results {
        action:display_message:2(The door creaks open.)
        action:assign(30, 5)
    }
}
";

    let mut state = GameState::new();
    let mut host = RecordingHost::default();

    let mut interp = Interpreter::new(program);
    let code = {
        let mut ctx = ScriptContext {
            state: &mut state,
            host: &mut host,
        };
        interp.run(&mut ctx).expect("script run failed")
    };
    assert_eq!(code, 0);
    assert_eq!(state.get(12), 1);

    let mut engine = RuleEngine::with_rng(ActionRng::new_predictable(1));
    let set = RuleCompiler::new().compile(rules);
    engine.install(set, &mut state, &mut host);
    let fired = engine.evaluate(&mut state, &mut host);

    assert_eq!(fired, 1);
    assert_eq!(state.get(30), 5);
    // sound cue from the bytecode side, then the rule's message
    assert!(matches!(
        host.requests[0],
        ServiceRequest::SoundCue { id: 3 }
    ));
    assert!(host.requests.iter().any(|r| matches!(
        r,
        ServiceRequest::RuleAction {
            kind: ActionKind::DisplayMessage,
            slot: 2,
            ..
        }
    )));
}

#[test]
fn false_then_true_conditional_pair_keeps_the_cursor_deterministic() {
    // identical conditionals on flag 7: the first falls through (skipping
    // exactly the jump operand), a set_flag flips the flag, the second
    // jumps to the sequence marker
    let program = vec![
        CHECK_FLAG, 7, 0, 1, 0, 0x63, 0, // false: must land on offset 7
        SET_FLAG, 7, 1,
        CHECK_FLAG, 7, 0, 1, 0, 2, 0, // true: goto seq 2
        RET_NEG,
        SENTINEL, 2, 0,
        RET_POS,
    ];

    let mut state = GameState::new();
    let mut host = NullHost;
    let mut interp = Interpreter::new(program);
    let code = {
        let mut ctx = ScriptContext {
            state: &mut state,
            host: &mut host,
        };
        interp.run(&mut ctx).expect("script run failed")
    };

    assert_eq!(code, 0);
    assert_eq!(interp.run_state(), RunState::Halted(0));
    assert_eq!(interp.cursor(), 22);
    assert_eq!(state.get(7), 1);
}

#[test]
fn faulted_script_leaves_committed_writes_in_place() {
    // the write lands, then the jump target is missing
    const GOTO: u8 = 0x8e;
    let program = vec![SET_FLAG, 4, 9, GOTO, 0xff, 0xff];

    let mut state = GameState::new();
    let mut host = NullHost;
    let mut interp = Interpreter::new(program);
    let result = {
        let mut ctx = ScriptContext {
            state: &mut state,
            host: &mut host,
        };
        interp.run(&mut ctx)
    };

    assert!(result.is_err());
    assert_eq!(interp.run_state(), RunState::Faulted);
    // no rollback: the flag write before the fault stays
    assert_eq!(state.get(4), 9);
}
