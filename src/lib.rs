#[macro_use]
extern crate lazy_static;

pub mod actions;
pub mod config;
pub mod disasm;
pub mod error;
pub mod interpreter;
pub mod opcode_tables;
pub mod puzzle;
pub mod rule_compiler;
pub mod rule_engine;
pub mod services;
pub mod state;
pub mod stream;
