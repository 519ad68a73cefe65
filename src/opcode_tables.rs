//! Static metadata for the command opcode set: one row per dispatch slot.
//!
//! `arg_bytes` is the total operand width of the opcode, fixed per opcode.
//! Conditional commands consume the same total on both branches (the false
//! branch skips what the true branch would have read), so the disassembler
//! can walk a program with this table alone.

/// Command bytes are biased above this value; anything below it in command
/// position is not an opcode.
pub const OPCODE_BIAS: u8 = 0x80;

/// In-band sequence marker sentinel. Followed by a little-endian u16
/// sequence id. Shares the byte namespace with opcodes; inert when merely
/// stepped over during linear execution.
pub const SEQUENCE_SENTINEL: u8 = 0xE0;

/// Per-slot name and operand width.
pub struct OpcodeInfo {
    pub name: &'static str,
    pub arg_bytes: usize,
}

const fn op(name: &'static str, arg_bytes: usize) -> OpcodeInfo {
    OpcodeInfo { name, arg_bytes }
}

/// One row per dispatch-table slot, in slot order. Several slots are
/// deliberately unwired no-ops in this configuration; they still occupy
/// real entries.
pub const OPCODES: [OpcodeInfo; 52] = [
    op("object", 0),            // 0x80
    op("end_object", 0),        // 0x81
    op("jump_look", 2),         // 0x82
    op("jump_help", 2),         // 0x83
    op("jump_get", 2),          // 0x84
    op("jump_move", 2),         // 0x85
    op("jump_use", 2),          // 0x86
    op("jump_talk", 2),         // 0x87
    op("null", 0),              // 0x88
    op("print", 2),             // 0x89
    op("ret_pos", 0),           // 0x8a
    op("set_anim", 1),          // 0x8b
    op("set_flag", 2),          // 0x8c
    op("check_flag", 6),        // 0x8d
    op("goto", 2),              // 0x8e
    op("set_inventory", 2),     // 0x8f
    op("set_inventory", 2),     // 0x90
    op("check_inventory", 6),   // 0x91
    op("new_room", 1),          // 0x92
    op("converse", 0),          // 0x93
    op("check_frame", 0),       // 0x94
    op("check_anim", 6),        // 0x95
    op("sound", 1),             // 0x96
    op("ret_neg", 0),           // 0x97
    op("check_loc", 10),        // 0x98
    op("dead", 0),              // 0x99
    op("display_inventory", 0), // 0x9a
    op("set_timer", 4),         // 0x9b
    op("check_timer", 6),       // 0x9c
    op("set_travel", 0),        // 0x9d
    op("set_video", 0),         // 0x9e
    op("play_video", 0),        // 0x9f
    op("plot_image", 8),        // 0xa0
    op("set_display", 0),       // 0xa1
    op("set_buffer", 0),        // 0xa2
    op("set_scroll", 0),        // 0xa3
    op("save_rect", 0),         // 0xa4
    op("gosub", 2),             // 0xa5
    op("gosub_ret", 0),         // 0xa6
    op("remove_last_anim", 0),  // 0xa7
    op("special", 0),           // 0xa8
    op("clear_block", 0),       // 0xa9
    op("load_sound", 1),        // 0xaa
    op("free_sound", 0),        // 0xab
    op("player_off", 0),        // 0xac
    op("player_on", 0),         // 0xad
    op("fade_out", 0),          // 0xae
    op("help", 0),              // 0xaf
    op("chapter", 0),           // 0xb0
    op("center_panel", 0),      // 0xb1
    op("main_panel", 0),        // 0xb2
    op("ret_flash", 0),         // 0xb3
];

pub const NUM_OPCODES: usize = OPCODES.len();

/// Name of a dispatch slot, for tracing and listings.
pub fn opcode_name(index: usize) -> &'static str {
    match OPCODES.get(index) {
        Some(info) => info.name,
        None => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_fits_under_the_sentinel() {
        // the highest opcode byte must not collide with the marker sentinel
        assert!(OPCODE_BIAS as usize + NUM_OPCODES <= SEQUENCE_SENTINEL as usize);
    }

    #[test]
    fn conditionals_carry_their_jump_operand() {
        for name in ["check_flag", "check_inventory", "check_anim", "check_timer"] {
            let info = OPCODES.iter().find(|o| o.name == name).unwrap();
            assert_eq!(info.arg_bytes, 6, "{name}");
        }
        let loc = OPCODES.iter().find(|o| o.name == "check_loc").unwrap();
        assert_eq!(loc.arg_bytes, 10);
    }
}
