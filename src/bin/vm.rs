//! the virtual machine binary. compiles a source file and executes it.
//!
//! run with `--help` for more info.

use std::process::ExitCode;

use babyduck::back::VirtualMachine;
use babyduck::front::parse;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let input = match std::fs::read_to_string(&args.file) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{}: {e}", args.file);
            return ExitCode::FAILURE;
        }
    };

    let program = match parse(&input) {
        Ok(program) => program,
        Err(error) => {
            if error.is_bug() {
                eprintln!("INTERNAL COMPILER ERROR: {error}");
            } else {
                eprintln!("{error}");
            }
            return ExitCode::FAILURE;
        }
    };

    let mut vm = match VirtualMachine::new(program) {
        Ok(vm) => vm,
        Err(error) => {
            eprintln!("INTERNAL COMPILER ERROR: {error}");
            return ExitCode::FAILURE;
        }
    };

    match vm.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if error.is_bug() {
                eprintln!("INTERNAL COMPILER ERROR: {error}");
            } else {
                eprintln!("{error}");
            }
            ExitCode::FAILURE
        }
    }
}
