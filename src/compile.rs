//! Helper for driving the parser and code generator from a consumer's own
//! `build.rs`, the same way other crates in the wider ecosystem wrap a
//! codegen step (e.g. `bindgen::Builder::generate` called from `build.rs`).
//! This crate's own `xdrc` binary (`src/bin/xdrc.rs`) is a thin wrapper
//! over the same entry point for one-shot command-line use.

use std::path::Path;

use crate::error::{Error, Result};
use crate::{codegen, parser};

/// Reads `idl_path`, parses it, generates Rust source, and writes the
/// result to `out_path`. Returns an error listing every parse error found
/// (a build.rs should print these with `eprintln!` before failing; a
/// partial AST is not returned since a `build.rs` consumer needs
/// all-or-nothing generated code to `include!`).
pub fn compile_idl(idl_path: &Path, out_path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(idl_path)?;
    let file_name = idl_path.display().to_string();
    let (ast, errors) = parser::parse_file(&file_name, &source);
    if !errors.is_empty() {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::Parse {
            file: file_name,
            line: errors[0].line,
            message: joined,
        });
    }
    let generated = codegen::generate(&ast)?;
    std::fs::write(out_path, generated)?;
    Ok(())
}

/// Same as [`compile_idl`], but returns `anyhow::Error` — the error type a
/// `build.rs` typically propagates with `?` up to `fn main() -> anyhow::Result<()>`,
/// rather than this crate's own [`crate::error::Error`].
pub fn compile_idl_for_build_script(idl_path: &Path, out_path: &Path) -> anyhow::Result<()> {
    compile_idl(idl_path, out_path)?;
    Ok(())
}
