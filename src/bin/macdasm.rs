//! Listing tool for bytecode command programs.

use macguffin::disasm::disassemble;
use std::env;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("macdasm - command program listing tool");
        println!();
        println!("Usage: {} <program.cmd>", args[0]);
        return;
    }

    let program = match std::fs::read(&args[1]) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {e}", args[1]);
            process::exit(1);
        }
    };

    for line in disassemble(&program) {
        println!("{line}");
    }
}
