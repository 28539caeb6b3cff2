//! Tiny CLI
//!
//! The reference embedder: compiles a script, optionally disassembles it,
//! and runs it to completion.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use tiny_core::Value;
use tinyc::{CompilerConfig, State};
use tiny_runtime::{NativeTable, ThreadConfig, Vm};

#[derive(ClapParser)]
#[command(name = "tiny")]
#[command(about = "Run a Tiny script", long_about = None)]
struct Cli {
    /// Script to compile and run
    script: PathBuf,

    /// Print the compiled bytecode before running it
    #[arg(long)]
    dis: bool,
}

fn exit_native(_vm: &mut Vm, args: &[Value]) -> Value {
    let code = args.first().and_then(Value::as_int).unwrap_or(0);
    process::exit(code);
}

fn main() {
    let cli = Cli::parse();

    let mut state = State::new(CompilerConfig {
        default_file_name: cli.script.to_string_lossy().into_owned(),
        ..CompilerConfig::default()
    });

    let exit_idx = state
        .bind_function("exit(int): void")
        .expect("'exit' is a builtin signature, never rejected");

    if let Err(err) = state.compile_file(&cli.script) {
        eprintln!("{}", state.render_error(&err));
        process::exit(1);
    }

    if cli.dis {
        println!("{}", tinyc::disasm::disassemble(&state.image, &state.strings));
    }

    let mut natives = NativeTable::new(state.foreign_function_count());
    natives.register(exit_idx, exit_native);

    let program = Rc::new(state.export_program());
    let mut vm = Vm::new(program, Rc::new(natives), ThreadConfig::default());
    vm.start();

    loop {
        match vm.execute_cycle() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(err) => {
                let (file, line) = vm.current_file_line();
                eprintln!("runtime error at {}:{line}: {err}", file.unwrap_or("<unknown>"));
                process::exit(1);
            }
        }
    }
}
