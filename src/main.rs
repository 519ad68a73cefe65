use log::{debug, info};
use macguffin::config::EngineConfig;
use macguffin::interpreter::{Interpreter, ScriptContext};
use macguffin::rule_compiler::RuleCompiler;
use macguffin::rule_engine::RuleEngine;
use macguffin::services::NullHost;
use macguffin::state::GameState;
use std::env;
use std::path::Path;
use std::process;

fn usage(program: &str) {
    println!("macguffin - adventure-game scripting core (bytecode + puzzle rules)");
    println!();
    println!("Usage: {program} <script> [--config engine.toml] [--verb n]");
    println!();
    println!("  <script> ending in .scr is compiled as a puzzle-rule file,");
    println!("  installed, and run through one evaluation pass.");
    println!("  Anything else is executed as a bytecode command program;");
    println!("  the script's return code becomes the exit status detail.");
    println!();
    println!("  --config  engine tunables (TOML); defaults apply when absent");
    println!("  --verb    selected command id consulted by the verb-jump opcodes");
}

fn read_file(path: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: script file not found: {path}");
                    eprintln!();
                    eprintln!("Please check:");
                    eprintln!("• File path is correct");
                    eprintln!("• You're running from the right directory");
                }
                _ => {
                    eprintln!("Error: cannot read script file '{path}': {e}");
                }
            }
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return;
    }

    let script_path = &args[1];
    let mut config_path = "engine.toml".to_string();
    let mut verb: i32 = -1;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = args[i + 1].clone();
                i += 2;
            }
            "--verb" if i + 1 < args.len() => {
                verb = match args[i + 1].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        eprintln!("Error: invalid verb id: {}", args[i + 1]);
                        process::exit(1);
                    }
                };
                i += 2;
            }
            other => {
                eprintln!("Error: unknown option: {other}");
                process::exit(1);
            }
        }
    }

    let config = match EngineConfig::load_or_default(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    debug!("config: {config:?}");

    let mut state = GameState::new();
    state.select_command(verb);
    let mut host = NullHost;

    if script_path.ends_with(".scr") {
        let text = String::from_utf8_lossy(&read_file(script_path)).into_owned();
        let mut compiler = RuleCompiler::new();
        let set = compiler.compile(&text);
        info!(
            "compiled {} rule(s), {} control(s), {} warning(s)",
            set.len(),
            set.controls.len(),
            compiler.warnings()
        );

        let mut engine = RuleEngine::new();
        let at_install = engine.install(set, &mut state, &mut host);
        let fired = engine.evaluate(&mut state, &mut host);
        println!(
            "{} rule(s) fired ({} at install), {} state key(s) written",
            at_install + fired,
            at_install,
            state.len()
        );
        return;
    }

    let program = read_file(script_path);
    let mut interp = Interpreter::new(program);
    interp.set_max_call_depth(config.interpreter.max_call_depth);

    let result = {
        let mut ctx = ScriptContext {
            state: &mut state,
            host: &mut host,
        };
        interp.run_with_limit(&mut ctx, config.interpreter.instruction_limit)
    };

    match result {
        Ok(code) => {
            println!("script halted with code {code}");
            state.dump();
        }
        Err(e) => {
            eprintln!("Error during execution: {e}");
            process::exit(1);
        }
    }
}
