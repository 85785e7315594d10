//! quadc - translates a quadruple stream into LLVM-flavored IR text
//!
//! Usage: quadc [OPTIONS] [input]

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;
use quad_backend::common::DiagnosticReporter;
use quad_backend::driver::{self, TranslateConfig};

#[derive(ClapParser, Debug)]
#[command(name = "quadc")]
#[command(about = "Quadruple-to-IR translation backend", long_about = None)]
struct Args {
    /// Input quadruple stream (defaults to standard input)
    input: Option<PathBuf>,

    /// Output file (defaults to standard output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dump each function's quadruples after block construction
    #[arg(long)]
    dump_quads: bool,

    /// Dump each function's block chain and edges
    #[arg(long)]
    dump_cfg: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let (name, source) = match &args.input {
        Some(path) => (path.display().to_string(), fs::read_to_string(path)?),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            ("<stdin>".to_string(), source)
        }
    };

    let mut reporter = DiagnosticReporter::new();
    let file_id = reporter.add_file(name, source.clone());

    let config = TranslateConfig {
        dump_quads: args.dump_quads,
        dump_cfg: args.dump_cfg,
        verbose: args.verbose,
    };

    let module = match driver::translate_with(&source, &config) {
        Ok(module) => module,
        Err(err) => {
            reporter.report_error(file_id, &err);
            process::exit(1);
        }
    };

    match &args.output {
        Some(path) => fs::write(path, module.to_string())?,
        None => io::stdout().write_all(module.to_string().as_bytes())?,
    }

    if args.verbose {
        eprintln!(
            "emitted {} function(s), {} global(s)",
            module.functions.len(),
            module.globals.len()
        );
    }

    Ok(())
}
