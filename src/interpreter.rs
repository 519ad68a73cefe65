use crate::error::ScriptError;
use crate::opcode_tables::{opcode_name, NUM_OPCODES, OPCODE_BIAS, SEQUENCE_SENTINEL};
use crate::services::{ServiceHost, ServiceRequest};
use crate::state::GameState;
use crate::stream::CommandStream;
use log::{debug, trace};

/// Default bound on gosub nesting. The stream format has no cycle guard, so
/// runaway self-calls are cut off here rather than by the OS stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 8;

/// Where a run stands. HALTED and FAULTED are terminal until a new program
/// is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Program loaded, cursor at 0, nothing executed yet.
    Ready,
    /// Inside the fetch/dispatch loop.
    Running,
    /// A return opcode fired; carries the script's return code.
    Halted(i32),
    /// A fatal error surfaced; the program must be discarded.
    Faulted,
}

/// Injected collaborators for one run: the shared game state and the
/// engine-side service host. The interpreter holds neither.
pub struct ScriptContext<'a> {
    pub state: &'a mut GameState,
    pub host: &'a mut dyn ServiceHost,
}

type CommandFn = fn(&mut Interpreter, &mut ScriptContext<'_>) -> Result<(), ScriptError>;

/// Fixed dispatch table, one entry per opcode slot. Unwired slots point at
/// the shared no-op handler; a missing entry would be a correctness bug, so
/// the table length is pinned to the metadata table's.
const COMMAND_LIST: [CommandFn; NUM_OPCODES] = [
    Interpreter::cmd_nop,              // object
    Interpreter::cmd_nop,              // end_object
    Interpreter::cmd_jump_look,        // jump_look
    Interpreter::cmd_jump_help,        // jump_help
    Interpreter::cmd_jump_get,         // jump_get
    Interpreter::cmd_jump_move,        // jump_move
    Interpreter::cmd_jump_use,         // jump_use
    Interpreter::cmd_jump_talk,        // jump_talk
    Interpreter::cmd_nop,              // null
    Interpreter::cmd_print,            // print
    Interpreter::cmd_ret_pos,          // ret_pos
    Interpreter::cmd_set_anim,         // set_anim
    Interpreter::cmd_set_flag,         // set_flag
    Interpreter::cmd_check_flag,       // check_flag
    Interpreter::cmd_goto,             // goto
    Interpreter::cmd_set_inventory,    // set_inventory
    Interpreter::cmd_set_inventory,    // set_inventory (second authored slot)
    Interpreter::cmd_check_inventory,  // check_inventory
    Interpreter::cmd_new_room,         // new_room
    Interpreter::cmd_nop,              // converse
    Interpreter::cmd_nop,              // check_frame
    Interpreter::cmd_check_anim,       // check_anim
    Interpreter::cmd_sound,            // sound
    Interpreter::cmd_ret_neg,          // ret_neg
    Interpreter::cmd_check_loc,        // check_loc
    Interpreter::cmd_nop,              // dead
    Interpreter::cmd_nop,              // display_inventory
    Interpreter::cmd_set_timer,        // set_timer
    Interpreter::cmd_check_timer,      // check_timer
    Interpreter::cmd_nop,              // set_travel
    Interpreter::cmd_nop,              // set_video
    Interpreter::cmd_nop,              // play_video
    Interpreter::cmd_plot_image,       // plot_image
    Interpreter::cmd_set_display,      // set_display
    Interpreter::cmd_nop,              // set_buffer
    Interpreter::cmd_nop,              // set_scroll
    Interpreter::cmd_nop,              // save_rect
    Interpreter::cmd_gosub,            // gosub
    Interpreter::cmd_gosub_ret,        // gosub_ret
    Interpreter::cmd_remove_last_anim, // remove_last_anim
    Interpreter::cmd_nop,              // special
    Interpreter::cmd_nop,              // clear_block
    Interpreter::cmd_load_sound,       // load_sound
    Interpreter::cmd_free_sound,       // free_sound
    Interpreter::cmd_player_off,       // player_off
    Interpreter::cmd_player_on,        // player_on
    Interpreter::cmd_fade_out,         // fade_out
    Interpreter::cmd_nop,              // help
    Interpreter::cmd_nop,              // chapter
    Interpreter::cmd_nop,              // center_panel
    Interpreter::cmd_main_panel,       // main_panel
    Interpreter::cmd_nop,              // ret_flash
];

/// The bytecode command interpreter.
///
/// Owns its command stream exclusively; game state and services are passed
/// in per run. One instance replays one program at a time; `load` swaps in
/// a new program and releases the old buffer.
pub struct Interpreter {
    stream: CommandStream,
    run_state: RunState,
    end_flag: bool,
    return_code: i32,
    /// Last sequence id jumped to, for tracing.
    sequence: u16,
    /// Resume positions for nested sub-programs (gosub/gosub_ret).
    call_stack: Vec<usize>,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(program: Vec<u8>) -> Self {
        Interpreter {
            stream: CommandStream::new(program),
            run_state: RunState::Ready,
            end_flag: false,
            return_code: 0,
            sequence: 0,
            call_stack: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Replace the program. The old buffer is released and the machine
    /// returns to READY.
    pub fn load(&mut self, program: Vec<u8>) {
        self.stream = CommandStream::new(program);
        self.run_state = RunState::Ready;
        self.end_flag = false;
        self.return_code = 0;
        self.sequence = 0;
        self.call_stack.clear();
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Sequence id of the most recent jump, for tracing.
    pub fn last_sequence(&self) -> u16 {
        self.sequence
    }

    /// Current cursor position in the command stream.
    pub fn cursor(&self) -> usize {
        self.stream.pos()
    }

    /// Run the fetch/dispatch loop until a return opcode halts it.
    /// Returns the script's return code (0 normal, -1 abort).
    pub fn run(&mut self, ctx: &mut ScriptContext) -> Result<i32, ScriptError> {
        self.run_with_limit(ctx, None)
    }

    /// As `run`, but faults after `limit` dispatches. Guards against
    /// authoring bugs such as a goto cycle with no return opcode.
    pub fn run_with_limit(
        &mut self,
        ctx: &mut ScriptContext,
        limit: Option<u64>,
    ) -> Result<i32, ScriptError> {
        match self.run_state {
            RunState::Halted(_) | RunState::Faulted => return Err(ScriptError::AlreadyFinished),
            RunState::Ready | RunState::Running => {}
        }
        self.run_state = RunState::Running;
        self.end_flag = false;
        self.return_code = 0;

        let mut dispatched: u64 = 0;
        loop {
            if let Some(max) = limit {
                if dispatched >= max {
                    self.run_state = RunState::Faulted;
                    return Err(ScriptError::InstructionLimitExceeded { limit: max });
                }
            }
            if let Err(e) = self.step(ctx) {
                self.run_state = RunState::Faulted;
                return Err(e);
            }
            dispatched += 1;
            if self.end_flag {
                debug!(
                    "script halted with code {} after {} command(s)",
                    self.return_code, dispatched
                );
                self.run_state = RunState::Halted(self.return_code);
                return Ok(self.return_code);
            }
        }
    }

    /// Fetch the next command byte (stepping over inert sequence markers)
    /// and dispatch it.
    fn step(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let mut command = self.stream.read_byte()?;
        while command == SEQUENCE_SENTINEL {
            // an embedded marker is only a jump target; skip its id
            self.stream.skip(2)?;
            command = self.stream.read_byte()?;
        }
        let offset = self.stream.pos() - 1;

        if command < OPCODE_BIAS {
            return Err(ScriptError::InvalidOpcode {
                opcode: command,
                offset,
            });
        }
        let index = (command - OPCODE_BIAS) as usize;
        if index >= NUM_OPCODES {
            return Err(ScriptError::InvalidOpcode {
                opcode: command,
                offset,
            });
        }

        trace!("[{offset:05x}] {}", opcode_name(index));
        COMMAND_LIST[index](self, ctx)
    }

    /// Linear scan from stream start for the first marker whose embedded id
    /// equals `sequence`; leaves the cursor just past the marker.
    fn search_for_sequence(&mut self, sequence: u16) -> Result<(), ScriptError> {
        self.stream.seek(0)?;
        loop {
            loop {
                if self.stream.at_end() {
                    return Err(ScriptError::MissingSequenceMarker { sequence });
                }
                if self.stream.read_byte()? == SEQUENCE_SENTINEL {
                    break;
                }
            }
            // a sentinel truncated by end-of-stream cannot be a marker
            if self.stream.len() - self.stream.pos() < 2 {
                return Err(ScriptError::MissingSequenceMarker { sequence });
            }
            if self.stream.read_u16_le()? == sequence {
                self.sequence = sequence;
                return Ok(());
            }
        }
    }

    fn cmd_nop(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    fn cmd_goto(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let sequence = self.stream.read_u16_le()?;
        self.search_for_sequence(sequence)
    }

    /// Shared body of the verb-jump family: jump when the selected command
    /// matches, otherwise skip the unread jump operand.
    fn jump_when_verb(&mut self, ctx: &mut ScriptContext, verb: i32) -> Result<(), ScriptError> {
        if ctx.state.selected_command() == verb {
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(2)
        }
    }

    fn cmd_jump_look(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 0)
    }

    fn cmd_jump_help(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 8)
    }

    fn cmd_jump_get(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 3)
    }

    fn cmd_jump_move(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 2)
    }

    fn cmd_jump_use(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 4)
    }

    fn cmd_jump_talk(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.jump_when_verb(ctx, 6)
    }

    fn cmd_print(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let id = self.stream.read_u16_le()?;
        ctx.host.perform(ServiceRequest::ShowMessage { id })?;
        Ok(())
    }

    fn cmd_ret_pos(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.end_flag = true;
        self.return_code = 0;
        Ok(())
    }

    fn cmd_ret_neg(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        self.end_flag = true;
        self.return_code = -1;
        Ok(())
    }

    fn cmd_set_flag(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let key = self.stream.read_byte()? as u32;
        let value = self.stream.read_byte()? as i32;
        ctx.state.set(key, value);
        Ok(())
    }

    fn cmd_check_flag(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let key = self.stream.read_u16_le()? as u32;
        let value = self.stream.read_u16_le()? as i32;
        if ctx.state.get(key) == value {
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(2)
        }
    }

    fn cmd_set_inventory(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let item = self.stream.read_byte()?;
        let count = self.stream.read_byte()?;
        ctx.state.set(item as u32, count as i32);
        ctx.host
            .perform(ServiceRequest::SetInventory { item, count })?;
        Ok(())
    }

    fn cmd_check_inventory(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let item = self.stream.read_u16_le()? as u32;
        let count = self.stream.read_u16_le()? as i32;
        if ctx.state.get(item) == count {
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(2)
        }
    }

    fn cmd_new_room(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let room = self.stream.read_byte()?;
        ctx.host.perform(ServiceRequest::ChangeRoom { room })?;
        Ok(())
    }

    /// Jump when the queried animation has finished. Note the asymmetric
    /// operand layout: [id:2][pad:2][seq:2]; the false branch skips the pad
    /// and the sequence id together.
    fn cmd_check_anim(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let id = self.stream.read_u16_le()?;
        if !ctx.host.animation_running(id) {
            self.stream.skip(2)?;
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(4)
        }
    }

    fn cmd_sound(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let id = self.stream.read_byte()?;
        ctx.host.perform(ServiceRequest::SoundCue { id })?;
        Ok(())
    }

    fn cmd_check_loc(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let min_x = self.stream.read_u16_le()? as i32;
        let min_y = self.stream.read_u16_le()? as i32;
        let max_x = self.stream.read_u16_le()? as i32;
        let max_y = self.stream.read_u16_le()? as i32;

        let (x, y) = ctx.host.player_position();
        if x >= min_x && x <= max_x && y >= min_y && y <= max_y {
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(2)
        }
    }

    fn cmd_set_anim(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let id = self.stream.read_byte()?;
        ctx.host.perform(ServiceRequest::StartAnimation { id })?;
        Ok(())
    }

    fn cmd_set_timer(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let timer = self.stream.read_u16_le()?;
        let ticks = self.stream.read_u16_le()?;
        ctx.state.set(timer as u32, ticks as i32);
        ctx.host
            .perform(ServiceRequest::SetTimer { timer, ticks })?;
        Ok(())
    }

    fn cmd_check_timer(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let timer = self.stream.read_u16_le()? as u32;
        let value = self.stream.read_u16_le()? as i32;
        if ctx.state.get(timer) == value {
            self.cmd_goto(ctx)
        } else {
            self.stream.skip(2)
        }
    }

    fn cmd_plot_image(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let x = self.stream.read_u16_le()?;
        let y = self.stream.read_u16_le()?;
        let object = self.stream.read_u16_le()?;
        let image = self.stream.read_u16_le()?;
        ctx.host
            .perform(ServiceRequest::PlotImage { x, y, object, image })?;
        Ok(())
    }

    fn cmd_set_display(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host.perform(ServiceRequest::SelectDisplayBuffer)?;
        Ok(())
    }

    /// Push the resume position and jump to a sequence. The one sanctioned
    /// form of recursion; bounded by `max_call_depth`.
    fn cmd_gosub(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let sequence = self.stream.read_u16_le()?;
        if self.call_stack.len() >= self.max_call_depth {
            return Err(ScriptError::CallDepthExceeded {
                limit: self.max_call_depth,
            });
        }
        self.call_stack.push(self.stream.pos());
        debug!(
            "gosub -> seq {sequence} (depth {})",
            self.call_stack.len()
        );
        self.search_for_sequence(sequence)
    }

    fn cmd_gosub_ret(&mut self, _ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let resume = self
            .call_stack
            .pop()
            .ok_or(ScriptError::CallStackUnderflow)?;
        self.stream.seek(resume)
    }

    fn cmd_remove_last_anim(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host.perform(ServiceRequest::DropLastAnimTimer)?;
        Ok(())
    }

    fn cmd_load_sound(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        let id = self.stream.read_byte()?;
        ctx.host.perform(ServiceRequest::PreloadSound { id })?;
        Ok(())
    }

    fn cmd_free_sound(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host.perform(ServiceRequest::FreeSound)?;
        Ok(())
    }

    fn cmd_player_off(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host
            .perform(ServiceRequest::SetPlayerVisible { visible: false })?;
        Ok(())
    }

    fn cmd_player_on(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host
            .perform(ServiceRequest::SetPlayerVisible { visible: true })?;
        Ok(())
    }

    fn cmd_fade_out(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host.perform(ServiceRequest::FadeOut)?;
        Ok(())
    }

    fn cmd_main_panel(&mut self, ctx: &mut ScriptContext) -> Result<(), ScriptError> {
        ctx.host.perform(ServiceRequest::ShowMainPanel)?;
        Ok(())
    }
}
