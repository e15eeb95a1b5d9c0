/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Bytecode code generator for the Carmine scripting language.
//!
//! The parser runs as a separate program and hands over its tree as a
//! JSON document; this crate turns that tree into an IREP — a
//! self-contained bytecode unit the Carmine VM executes. Compilation is
//! all-or-nothing: any error yields no output at all.

pub mod ast;
pub mod codegen;
pub mod disasm;
pub mod errors;
pub mod file_reader;
pub mod irep;
pub mod ops;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};

use file_reader::FileReader;
use irep::Irep;

/// Options for one compilation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenOptions {
    /// Force peephole rewriting off regardless of what the AST document
    /// requests.
    pub no_optimize: bool,
}

/// Loads an AST document and compiles it to the top-level IREP.
pub fn generate<F: FileReader>(source_path: &Path, options: GenOptions, reader: &F) -> Result<Irep> {
    let text = reader
        .read_to_string(source_path)
        .context("Failed to read AST document")?;

    let mut program: ast::ParsedProgram =
        serde_json::from_str(&text).context("Failed during AST decoding")?;
    if options.no_optimize {
        program.no_optimize = true;
    }

    let irep = codegen::generate(&program).context("Failed during code generation")?;

    Ok(irep)
}
