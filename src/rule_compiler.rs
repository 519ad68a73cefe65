//! Compiler for the line-oriented puzzle-rule grammar.
//!
//! The format is brace-delimited blocks of `key:value`-ish lines:
//!
//! ```text
//! puzzle:17 {
//!     criteria {
//!         [4] = 1
//!         [9] ! [4]
//!     }
//!     results {
//!         action:assign(5, 10)
//!         event:animplay:8(door_open.rlf)
//!     }
//!     flags {
//!         ONCE_PER_INST
//!     }
//! }
//! control:300 push_toggle {
//!     ...
//! }
//! ```
//!
//! Compilation is resilient: a malformed line is logged and dropped, a rule
//! missing its structural tokens is dropped whole, and the rest of the file
//! always compiles. Premature end-of-input closes every open block.

use crate::actions::ActionKind;
use crate::puzzle::{flag, Action, Control, CriteriaEntry, CriteriaOp, Rule, NO_SLOT};
use indexmap::IndexMap;
use log::{debug, warn};

/// Output of one compilation: rules in registration order plus the control
/// headers encountered. Control bodies belong to the UI layer and are not
/// interpreted here.
#[derive(Default)]
pub struct RuleSet {
    pub rules: IndexMap<u32, Rule>,
    pub controls: Vec<Control>,
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Comment-and-whitespace-stripping line cursor over the source text.
struct LineReader<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> LineReader<'a> {
    fn new(src: &'a str) -> Self {
        LineReader { lines: src.lines() }
    }

    /// Next line with `#` comments and surrounding whitespace removed.
    /// May be empty; `None` only at end of input.
    fn next_line(&mut self) -> Option<&'a str> {
        let raw = self.lines.next()?;
        let uncommented = match raw.find('#') {
            Some(hash) => &raw[..hash],
            None => raw,
        };
        Some(uncommented.trim())
    }
}

fn bracketed_u32(token: &str) -> Option<u32> {
    token
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
}

/// Parse the integer that opens `puzzle:<id>` / `control:<id>` headers,
/// tolerating a trailing `{` or type word.
fn leading_u32(s: &str) -> Option<(u32, &str)> {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok().map(|v| (v, s[end..].trim_start()))
}

enum CriteriaLineFail {
    /// Key or operator token unusable; the whole rule is structurally bad.
    Structural,
    /// Operand unusable; only this line is dropped.
    DropLine,
}

fn parse_criteria_line(line: &str) -> Result<CriteriaEntry, CriteriaLineFail> {
    let mut tokens = line.split_whitespace();

    let key = tokens
        .next()
        .and_then(bracketed_u32)
        .ok_or(CriteriaLineFail::Structural)?;

    let op = match tokens.next().and_then(|t| t.chars().next()) {
        Some('=') => CriteriaOp::EqualTo,
        Some('!') => CriteriaOp::NotEqualTo,
        Some('>') => CriteriaOp::GreaterThan,
        Some('<') => CriteriaOp::LessThan,
        _ => return Err(CriteriaLineFail::Structural),
    };

    let operand_token = tokens.next().ok_or(CriteriaLineFail::DropLine)?;
    let (operand, operand_is_key) = if operand_token.contains('[') {
        match bracketed_u32(operand_token) {
            Some(k) => (k as i32, true),
            None => return Err(CriteriaLineFail::DropLine),
        }
    } else {
        match operand_token.parse::<i32>() {
            Ok(v) => (v, false),
            Err(_) => return Err(CriteriaLineFail::DropLine),
        }
    };

    Ok(CriteriaEntry {
        key,
        op,
        operand,
        operand_is_key,
    })
}

/// Split a results line `<prefix>:<name>[:<slot>](<args>)` into its parts.
/// The prefix before the first colon is authoring commentary and ignored.
fn parse_result_line(line: &str) -> Option<(String, i32, String)> {
    let after_prefix = &line[line.find(':')? + 1..];

    let name_end = after_prefix.find(|c| c == ':' || c == '(')?;
    let name = after_prefix[..name_end].trim().to_ascii_lowercase();
    let mut rest = &after_prefix[name_end..];

    let mut slot = NO_SLOT;
    if let Some(stripped) = rest.strip_prefix(':') {
        let slot_end = stripped.find('(')?;
        slot = stripped[..slot_end].trim().parse().unwrap_or(NO_SLOT);
        rest = &stripped[slot_end..];
    }

    let args = rest
        .strip_prefix('(')
        .map(|r| r[..r.find(')').unwrap_or(r.len())].to_string())
        .unwrap_or_default();

    Some((name, slot, args))
}

/// The rule-text compiler. Tracks how many lines it had to drop so callers
/// (the CLI, tests) can surface a tally.
#[derive(Default)]
pub struct RuleCompiler {
    warnings: u32,
}

impl RuleCompiler {
    pub fn new() -> Self {
        RuleCompiler::default()
    }

    /// Count of dropped lines/rules/actions over all compilations.
    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    /// Compile a whole source text. Never fails; problems are logged,
    /// counted and skipped.
    pub fn compile(&mut self, src: &str) -> RuleSet {
        let mut set = RuleSet::default();
        let mut reader = LineReader::new(src);

        while let Some(line) = reader.next_line() {
            if line.is_empty() {
                continue;
            }

            let lower = line.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix("puzzle:") {
                match leading_u32(rest) {
                    Some((id, _)) => self.compile_puzzle(&mut reader, id, &mut set),
                    None => {
                        warn!("puzzle header without id: '{line}'");
                        self.warnings += 1;
                    }
                }
            } else if let Some(rest) = lower.strip_prefix("control:") {
                self.compile_control(&mut reader, rest, line, &mut set);
            } else {
                debug!("ignoring top-level line: '{line}'");
            }
        }
        set
    }

    fn compile_puzzle(&mut self, reader: &mut LineReader, id: u32, set: &mut RuleSet) {
        let mut rule = Rule::new(id);
        let mut structurally_bad = false;

        while let Some(line) = reader.next_line() {
            if line.contains('}') {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("criteria") && lower.contains('{') {
                match self.compile_criteria(reader) {
                    Ok(Some(group)) => rule.criteria.push(group),
                    Ok(None) => {} // empty block: no group, rule still valid
                    Err(()) => structurally_bad = true,
                }
            } else if lower.starts_with("results") && lower.contains('{') {
                self.compile_results(reader, &mut rule.actions);
            } else if lower.starts_with("flags") && lower.contains('{') {
                rule.flags |= self.compile_flags(reader);
            }
        }

        if structurally_bad {
            warn!("rule {id}: dropped (structurally invalid criteria)");
            self.warnings += 1;
            return;
        }
        if set.rules.contains_key(&id) {
            warn!("rule {id}: duplicate id, keeping first registration");
            self.warnings += 1;
            return;
        }
        set.rules.insert(id, rule);
    }

    /// One `criteria { }` block compiles to one AND-group. `Ok(None)` for
    /// an empty block, `Err` when a structural token is unusable (the block
    /// is still consumed so the reader stays in sync).
    fn compile_criteria(&mut self, reader: &mut LineReader) -> Result<Option<Vec<CriteriaEntry>>, ()> {
        let mut group = Vec::new();
        let mut bad = false;

        while let Some(line) = reader.next_line() {
            if line.contains('}') {
                break;
            }
            if line.is_empty() {
                continue;
            }
            match parse_criteria_line(line) {
                Ok(entry) => group.push(entry),
                Err(CriteriaLineFail::Structural) => {
                    warn!("criteria line missing key/operator: '{line}'");
                    self.warnings += 1;
                    bad = true;
                }
                Err(CriteriaLineFail::DropLine) => {
                    warn!("criteria line with bad operand dropped: '{line}'");
                    self.warnings += 1;
                }
            }
        }

        if bad {
            Err(())
        } else if group.is_empty() {
            Ok(None)
        } else {
            Ok(Some(group))
        }
    }

    fn compile_results(&mut self, reader: &mut LineReader, actions: &mut Vec<Action>) {
        while let Some(line) = reader.next_line() {
            if line.contains('}') {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let Some((name, slot, args)) = parse_result_line(line) else {
                debug!("unshaped results line skipped: '{line}'");
                continue;
            };
            match ActionKind::from_name(&name) {
                Some(kind) => actions.push(Action { kind, slot, args }),
                None => {
                    // forward-compat: unauthored action types are dropped,
                    // the rest of the block still compiles
                    warn!("unhandled result action type: '{name}'");
                    self.warnings += 1;
                }
            }
        }
    }

    fn compile_flags(&mut self, reader: &mut LineReader) -> u32 {
        let mut flags = 0;
        while let Some(line) = reader.next_line() {
            if line.contains('}') {
                break;
            }
            if line.eq_ignore_ascii_case("ONCE_PER_INST") {
                flags |= flag::ONCE_PER_INST;
            } else if line.eq_ignore_ascii_case("DO_ME_NOW") {
                flags |= flag::DO_ME_NOW;
            } else if line.eq_ignore_ascii_case("DISABLED") {
                flags |= flag::DISABLED;
            }
            // anything else is ignored
        }
        flags
    }

    /// Record a control header and consume its (uninterpreted) body,
    /// tracking brace depth so nested blocks stay balanced.
    fn compile_control(
        &mut self,
        reader: &mut LineReader,
        after_colon: &str,
        original: &str,
        set: &mut RuleSet,
    ) {
        let Some((key, rest)) = leading_u32(after_colon) else {
            warn!("control header without key: '{original}'");
            self.warnings += 1;
            return;
        };
        let kind = rest
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches('{')
            .to_string();

        let mut depth: i32 = original.matches('{').count() as i32
            - original.matches('}').count() as i32;
        if depth <= 0 {
            // single-line or malformed header; nothing more to consume
            set.controls.push(Control { key, kind });
            return;
        }
        while let Some(line) = reader.next_line() {
            depth += line.matches('{').count() as i32;
            depth -= line.matches('}').count() as i32;
            if depth <= 0 {
                break;
            }
        }
        set.controls.push(Control { key, kind });
    }
}
