use indexmap::IndexMap;
use log::debug;

/// Shared mutable game state: small integer keys mapped to integer values.
///
/// Flags, inventory counts, timers and puzzle bookkeeping all live in the
/// same key space; callers namespace keys by convention. Unset keys read 0.
/// One instance is shared (by &mut) between the bytecode interpreter and the
/// rule engine; there is no global back-reference.
pub struct GameState {
    values: IndexMap<u32, i32>,
    /// Currently selected verb/command, or -1 when nothing is selected.
    /// Consulted by the verb-jump opcode family.
    selected_command: i32,
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            values: IndexMap::new(),
            selected_command: -1,
        }
    }

    pub fn get(&self, key: u32) -> i32 {
        *self.values.get(&key).unwrap_or(&0)
    }

    pub fn set(&mut self, key: u32, value: i32) {
        self.values.insert(key, value);
    }

    pub fn selected_command(&self) -> i32 {
        self.selected_command
    }

    pub fn select_command(&mut self, command: i32) {
        self.selected_command = command;
    }

    /// Number of keys that have ever been written.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Log every written key in insertion order.
    pub fn dump(&self) {
        debug!("=== game state ({} keys) ===", self.values.len());
        for (key, value) in &self.values {
            debug!("  [{key}] = {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_keys_read_zero() {
        let state = GameState::new();
        assert_eq!(state.get(42), 0);
    }

    #[test]
    fn set_then_get() {
        let mut state = GameState::new();
        state.set(7, -3);
        state.set(7, 9);
        assert_eq!(state.get(7), 9);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn no_selection_by_default() {
        let mut state = GameState::new();
        assert_eq!(state.selected_command(), -1);
        state.select_command(4);
        assert_eq!(state.selected_command(), 4);
    }
}
