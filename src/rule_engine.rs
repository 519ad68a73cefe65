//! Registration-order evaluation of compiled puzzle rules.
//!
//! A rule that fires marks itself in the shared state under its own id, so
//! "already fired" survives the same save/dump path as everything else.
//! Installing a rule-set resets that mark for `ONCE_PER_INST` rules only.

use crate::actions::{self, ActionRng};
use crate::puzzle::{flag, CriteriaEntry, CriteriaOp, Rule};
use crate::rule_compiler::RuleSet;
use crate::services::ServiceHost;
use crate::state::GameState;
use log::{debug, warn};

fn entry_holds(entry: &CriteriaEntry, state: &GameState) -> bool {
    let lhs = state.get(entry.key);
    let rhs = if entry.operand_is_key {
        state.get(entry.operand as u32)
    } else {
        entry.operand
    };
    match entry.op {
        CriteriaOp::EqualTo => lhs == rhs,
        CriteriaOp::NotEqualTo => lhs != rhs,
        CriteriaOp::GreaterThan => lhs > rhs,
        CriteriaOp::LessThan => lhs < rhs,
    }
}

/// OR over the rule's AND-groups. An empty criteria list always matches.
fn criteria_match(rule: &Rule, state: &GameState) -> bool {
    if rule.criteria.is_empty() {
        return true;
    }
    rule.criteria
        .iter()
        .any(|group| group.iter().all(|entry| entry_holds(entry, state)))
}

/// Run a rule's action list in order. A failing action aborts the rest of
/// this rule's list only; the caller moves on to the next rule.
fn fire_rule(
    rule: &Rule,
    state: &mut GameState,
    host: &mut dyn ServiceHost,
    rng: &mut ActionRng,
) {
    debug!("rule {} fired ({} actions)", rule.id, rule.actions.len());
    for action in &rule.actions {
        if let Err(e) = actions::execute(action, state, host, rng) {
            warn!(
                "rule {}: action {:?} failed, dropping remainder of its list: {e}",
                rule.id, action.kind
            );
            break;
        }
    }
}

/// Holds the active rule-set and evaluates it against the game state.
pub struct RuleEngine {
    set: RuleSet,
    rng: ActionRng,
}

impl Default for RuleEngine {
    fn default() -> Self {
        RuleEngine::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        RuleEngine {
            set: RuleSet::default(),
            rng: ActionRng::new_uniform(),
        }
    }

    /// Engine with a seeded generator, for deterministic replay/tests.
    pub fn with_rng(rng: ActionRng) -> Self {
        RuleEngine {
            set: RuleSet::default(),
            rng,
        }
    }

    pub fn active_rules(&self) -> usize {
        self.set.len()
    }

    /// Make `set` the active rule-set (the previous one is released).
    ///
    /// `ONCE_PER_INST` rules get their fired-mark reset for this load
    /// instance; then rules flagged `DO_ME_NOW` are evaluated immediately,
    /// out of the normal cadence.
    pub fn install(
        &mut self,
        set: RuleSet,
        state: &mut GameState,
        host: &mut dyn ServiceHost,
    ) -> usize {
        self.set = set;
        for rule in self.set.rules.values() {
            if rule.has_flag(flag::ONCE_PER_INST) {
                state.set(rule.id, 0);
            }
        }
        debug!("installed rule-set with {} rule(s)", self.set.len());
        self.pass(state, host, true)
    }

    /// One evaluation pass over every eligible rule, in registration
    /// order. Returns how many rules fired.
    pub fn evaluate(&mut self, state: &mut GameState, host: &mut dyn ServiceHost) -> usize {
        self.pass(state, host, false)
    }

    fn pass(&mut self, state: &mut GameState, host: &mut dyn ServiceHost, only_do_me_now: bool) -> usize {
        let mut fired = 0;
        for rule in self.set.rules.values() {
            if only_do_me_now && !rule.has_flag(flag::DO_ME_NOW) {
                continue;
            }
            if rule.has_flag(flag::DISABLED) {
                continue;
            }
            if state.get(rule.id) == 1 {
                continue; // already fired this instance
            }
            if criteria_match(rule, state) {
                fire_rule(rule, state, host, &mut self.rng);
                state.set(rule.id, 1);
                fired += 1;
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;
    use crate::puzzle::{Action, NO_SLOT};
    use crate::rule_compiler::RuleCompiler;
    use crate::services::{NullHost, ServiceError, ServiceRequest};
    use test_log::test;

    /// Host that records every request and can be told to fail one kind.
    #[derive(Default)]
    struct RecordingHost {
        requests: Vec<ServiceRequest>,
        fail_kind: Option<ActionKind>,
    }

    impl ServiceHost for RecordingHost {
        fn perform(&mut self, request: ServiceRequest) -> Result<(), ServiceError> {
            if let ServiceRequest::RuleAction { kind, .. } = &request {
                if Some(*kind) == self.fail_kind {
                    return Err(ServiceError::new("injected failure"));
                }
            }
            self.requests.push(request);
            Ok(())
        }
    }

    fn engine() -> RuleEngine {
        RuleEngine::with_rng(ActionRng::new_predictable(7))
    }

    fn compile(src: &str) -> crate::rule_compiler::RuleSet {
        RuleCompiler::new().compile(src)
    }

    const OR_AND_SRC: &str = "\
puzzle:100 {
    criteria {
        [1] = 1
        [2] = 2
    }
    criteria {
        [3] = 3
    }
    results {
        action:display_message:5(hello)
    }
}
";

    #[test]
    fn or_of_and_groups() {
        // (A && B) || C over all eight A,B,C combinations
        for (a, b, c) in [
            (0, 0, 0),
            (1, 0, 0),
            (0, 2, 0),
            (1, 2, 0),
            (0, 0, 3),
            (1, 0, 3),
            (0, 2, 3),
            (1, 2, 3),
        ] {
            let expected = (a == 1 && b == 2) || c == 3;
            let mut eng = engine();
            let mut state = GameState::new();
            let mut host = NullHost;
            eng.install(compile(OR_AND_SRC), &mut state, &mut host);
            state.set(1, a);
            state.set(2, b);
            state.set(3, c);
            let fired = eng.evaluate(&mut state, &mut host);
            assert_eq!(fired == 1, expected, "a={a} b={b} c={c}");
        }
    }

    #[test]
    fn empty_criteria_always_fires() {
        let src = "puzzle:5 {\n results {\n action:quit(0)\n }\n}\n";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 1);
        assert_eq!(host.requests.len(), 1);
    }

    #[test]
    fn fired_rule_does_not_fire_again_until_reinstall() {
        let src = "\
puzzle:20 {
    criteria {
        [1] = 1
    }
    results {
        action:display_message(hi)
    }
    flags {
        ONCE_PER_INST
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        eng.install(compile(src), &mut state, &mut host);
        state.set(1, 1);

        assert_eq!(eng.evaluate(&mut state, &mut host), 1);
        // criteria still hold, but the rule is exhausted
        assert_eq!(eng.evaluate(&mut state, &mut host), 0);
        assert_eq!(host.requests.len(), 1);

        // reinstalling resets the fired mark for ONCE_PER_INST rules
        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 1);
        assert_eq!(host.requests.len(), 2);
    }

    #[test]
    fn rules_without_once_stay_fired_across_reinstall() {
        let src = "\
puzzle:21 {
    results {
        action:display_message(hi)
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 1);

        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 0);
    }

    #[test]
    fn disabled_rules_never_fire() {
        let src = "\
puzzle:30 {
    results {
        action:quit(0)
    }
    flags {
        DISABLED
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 0);
        assert!(host.requests.is_empty());
    }

    #[test]
    fn do_me_now_fires_during_install() {
        let src = "\
puzzle:40 {
    results {
        action:display_message(now)
    }
    flags {
        DO_ME_NOW
    }
}
puzzle:41 {
    results {
        action:display_message(later)
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        let fired_at_install = eng.install(compile(src), &mut state, &mut host);
        assert_eq!(fired_at_install, 1);
        assert_eq!(host.requests.len(), 1);
        // the normal pass picks up the other rule, not the spent one
        assert_eq!(eng.evaluate(&mut state, &mut host), 1);
        assert_eq!(host.requests.len(), 2);
    }

    #[test]
    fn failing_action_aborts_only_its_own_rule() {
        let src = "\
puzzle:50 {
    results {
        action:music(1)
        action:quit(0)
    }
}
puzzle:51 {
    results {
        action:display_message(still here)
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost {
            fail_kind: Some(ActionKind::Music),
            ..Default::default()
        };
        eng.install(compile(src), &mut state, &mut host);
        assert_eq!(eng.evaluate(&mut state, &mut host), 2);
        // rule 50's quit was dropped; rule 51's message still went out
        assert_eq!(host.requests.len(), 1);
        assert!(matches!(
            host.requests[0],
            ServiceRequest::RuleAction {
                kind: ActionKind::DisplayMessage,
                ..
            }
        ));
    }

    #[test]
    fn actions_run_in_listed_order() {
        let mut set = RuleSet::default();
        let mut rule = Rule::new(60);
        for slot in 1..=3 {
            rule.actions.push(Action {
                kind: ActionKind::Region,
                slot,
                args: String::new(),
            });
        }
        set.rules.insert(60, rule);

        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = RecordingHost::default();
        eng.install(set, &mut state, &mut host);
        eng.evaluate(&mut state, &mut host);

        let slots: Vec<i32> = host
            .requests
            .iter()
            .map(|r| match r {
                ServiceRequest::RuleAction { slot, .. } => *slot,
                _ => NO_SLOT,
            })
            .collect();
        assert_eq!(slots, vec![1, 2, 3]);
    }

    #[test]
    fn key_reference_operands_compare_two_state_values() {
        let src = "\
puzzle:70 {
    criteria {
        [1] = [2]
    }
}
";
        let mut eng = engine();
        let mut state = GameState::new();
        let mut host = NullHost;
        eng.install(compile(src), &mut state, &mut host);
        state.set(1, 5);
        state.set(2, 4);
        assert_eq!(eng.evaluate(&mut state, &mut host), 0);
        state.set(2, 5);
        assert_eq!(eng.evaluate(&mut state, &mut host), 1);
    }
}
