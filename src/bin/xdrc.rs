//! Thin CLI front-end: parses an `.x` file and writes generated Rust
//! source to stdout or `-o <path>`. The interesting work lives in
//! `xdrpc::compile`/`xdrpc::parser`/`xdrpc::codegen`; this binary just
//! wires argv to them.

use std::path::PathBuf;

use xdrpc::{codegen, parser};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => output = args.next().map(PathBuf::from),
            // -hh/-serverhh/-s/-p/-a are accepted for familiarity with the
            // original flag surface; this generator always emits one Rust
            // module covering types and RPC interface traits together.
            "-hh" | "-serverhh" | "-s" | "-p" | "-a" => {}
            "-D" => {
                args.next();
            }
            other if !other.starts_with('-') => input = Some(PathBuf::from(other)),
            other => {
                eprintln!("xdrc: ignoring unrecognized flag {other}");
            }
        }
    }

    let input = match input {
        Some(p) => p,
        None => {
            eprintln!("usage: xdrc [-o output.rs] input.x");
            std::process::exit(2);
        }
    };

    let source = match std::fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("xdrc: cannot read {}: {e}", input.display());
            std::process::exit(1);
        }
    };

    let (ast, errors) = parser::parse_file(&input.display().to_string(), &source);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("xdrc: {e}");
        }
        std::process::exit(1);
    }

    let generated = match codegen::generate(&ast) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("xdrc: code generation failed: {e}");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, generated) {
                eprintln!("xdrc: cannot write {}: {e}", path.display());
                std::process::exit(1);
            }
        }
        None => print!("{generated}"),
    }
}
