//! the main compiler binary. takes a source file and an optional output
//! format, compiles it, and prints the requested dump.
//!
//! run with `--help` for more info.

use std::process::ExitCode;

use babyduck::front::lex::Lexer;
use babyduck::front::{parse, ParseError};

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Quads)]
    out: Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the list of tokens
    Tokens,
    /// the quadruple list
    Quads,
    /// the constants pool
    Constants,
    /// the function directory
    Functions,
}

fn compile_and_dump(input: &str, out: Output) -> Result<(), ParseError> {
    if out == Output::Tokens {
        let mut lexer = Lexer::new(input);
        while let Some(token) = lexer.next().map_err(ParseError::Lex)? {
            println!("{token}");
        }
        return Ok(());
    }

    let program = parse(input)?;
    match out {
        Output::Tokens => {}
        Output::Quads => print!("{}", program.quads),
        Output::Constants => println!("{}", program.consts),
        Output::Functions => println!("{}", program.dir),
    }
    Ok(())
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

    match compile_and_dump(&input, args.out) {
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
