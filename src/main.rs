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

use anyhow::Result;
use carmgen::disasm::disassemble;
use carmgen::file_reader::AstFileReader;
use carmgen::{generate, GenOptions};
use clap::Parser as clap_parser;
use std::fs;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// AST document produced by the Carmine parser.
    #[clap(short, long)]
    input: PathBuf,
    /// Where to write the compiled IREP as JSON; stdout when omitted.
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Print a readable listing instead of JSON.
    #[clap(long)]
    dump: bool,
    /// Disable peephole rewriting.
    #[clap(long)]
    no_optimize: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts: Opts = Opts::parse();

    let reader = AstFileReader;
    let options = GenOptions { no_optimize: opts.no_optimize };
    let irep = generate(&opts.input, options, &reader)?;

    if opts.dump {
        print!("{}", disassemble(&irep));
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&irep)?;
    match &opts.output {
        Some(path) => {
            fs::write(path, json)?;
            println!(
                "Successfully compiled {} to {}",
                opts.input.display(),
                path.display()
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
