//! The main compiler binary: takes a source file and an output stage, and
//! an optional `-O` flag that runs immediate folding and mem-to-reg before
//! emitting.
//!
//! Run with `--help` for more info.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::debug;

use cflat_ir::back::{interp, printer, graphviz};
use cflat_ir::front::{lex, parse, sem};
use cflat_ir::middle::{builder, fold, mem2reg};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input source file.
    file: String,
    /// The pipeline stage to print.
    #[arg(value_enum, short, long, default_value_t = Emit::Ir)]
    emit: Emit,
    /// Run immediate folding and mem-to-reg before emitting.
    #[arg(short = 'O', long, default_value_t = false)]
    optimize: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Emit {
    /// The raw token stream.
    Tokens,
    /// The typed AST, after semantic analysis.
    Ast,
    /// The IR, in this crate's deterministic textual format.
    Ir,
    /// The CFG, as a Graphviz `digraph`.
    Dot,
    /// Run the interpreter and print the returned value.
    Run,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let input = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", args.file);
            return ExitCode::FAILURE;
        }
    };

    if args.emit == Emit::Tokens {
        let mut lexer = lex::Lexer::new(&input);
        loop {
            match lexer.next() {
                Ok(tok) if tok.kind == lex::TokenKind::Eof => break,
                Ok(tok) => println!("{tok}"),
                Err(e) => {
                    eprintln!("{}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        return ExitCode::SUCCESS;
    }

    let program = match parse::parse(&input) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e.diagnostic(&input));
            return ExitCode::FAILURE;
        }
    };

    if args.emit == Emit::Ast {
        println!("{program:#?}");
        return ExitCode::SUCCESS;
    }

    let program = match sem::check(program) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", cflat_ir::error::CompileError::from(e).diagnostic(&input));
            return ExitCode::FAILURE;
        }
    };
    debug!("semantic analysis complete");

    let mut ir = builder::build(&program);
    debug!(blocks = ir.num_blocks(), slots = ir.num_slots(), "built CFG");

    if args.optimize {
        fold::fold_immediates(&mut ir);
        debug!(regs = ir.num_regs, "folded immediates");
        mem2reg::mem2reg(&mut ir);
        debug!("promoted stack slots to SSA registers");
    }

    match args.emit {
        Emit::Ir => print!("{}", printer::print_ir(&ir)),
        Emit::Dot => print!("{}", graphviz::to_dot(&ir)),
        Emit::Run => match interp::run(&ir) {
            Ok(v) => println!("{v}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        Emit::Tokens | Emit::Ast => unreachable!("handled above"),
    }

    ExitCode::SUCCESS
}
