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

//! A readable listing of a compiled IREP tree, for the CLI and for test
//! diagnostics.

use std::fmt::Write;

use crate::irep::{Irep, PoolValue};
use crate::ops::OpFormat;

pub fn disassemble(irep: &Irep) -> String {
    let mut out = String::new();
    write_irep(&mut out, irep, 0);
    out
}

fn write_irep(out: &mut String, irep: &Irep, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{}irep nlocals={} nregs={} ilen={}{}",
        pad,
        irep.nlocals,
        irep.nregs,
        irep.ilen(),
        match &irep.filename {
            Some(f) => format!(" file={}", f),
            None => String::new(),
        }
    );
    for (pc, code) in irep.iseq.iter().enumerate() {
        let line = irep.lines.get(pc).copied();
        let _ = write!(out, "{}  {:04} ", pad, pc);
        match code.op() {
            Some(op) => {
                let _ = write!(out, "{:<10}", format!("{:?}", op).to_uppercase());
                match op.format() {
                    OpFormat::A => {
                        let _ = write!(out, " R{}", code.get_a());
                    }
                    OpFormat::AB => {
                        let _ = write!(out, " R{}\t{}", code.get_a(), code.get_b());
                    }
                    OpFormat::ABC => {
                        let _ = write!(
                            out,
                            " R{}\t{}\t{}",
                            code.get_a(),
                            code.get_b(),
                            code.get_c()
                        );
                    }
                    OpFormat::ABx => {
                        let _ = write!(out, " R{}\t:{}", code.get_a(), code.get_bx());
                    }
                    OpFormat::AsBx => {
                        let _ = write!(out, " R{}\t{:+}", code.get_a(), code.get_sbx());
                    }
                    OpFormat::Bx => {
                        let _ = write!(out, " :{}", code.get_bx());
                    }
                    OpFormat::SBx => {
                        let _ = write!(out, " {:+}", code.get_sbx());
                    }
                    OpFormat::Ax => {
                        let _ = write!(out, " 0x{:07x}", code.get_ax());
                    }
                    OpFormat::Abc => {
                        let _ = write!(
                            out,
                            " R{}\t{}\t{}",
                            code.get_a(),
                            code.get_b14(),
                            code.get_c2()
                        );
                    }
                }
            }
            None => {
                let _ = write!(out, ".unknown 0x{:08x}", code.0);
            }
        }
        match line {
            Some(l) => {
                let _ = writeln!(out, "\t; line {}", l);
            }
            None => {
                let _ = writeln!(out);
            }
        }
    }
    if !irep.pool.is_empty() {
        let _ = writeln!(out, "{}  pool:", pad);
        for (i, v) in irep.pool.iter().enumerate() {
            let _ = match v {
                PoolValue::Str(s) => writeln!(out, "{}    [{}] {:?}", pad, i, s),
                PoolValue::Int(n) => writeln!(out, "{}    [{}] {}", pad, i, n),
                PoolValue::Float(f) => writeln!(out, "{}    [{}] {}", pad, i, f),
            };
        }
    }
    if !irep.syms.is_empty() {
        let _ = writeln!(out, "{}  syms:", pad);
        for (i, s) in irep.syms.iter().enumerate() {
            let _ = match s {
                Some(s) => writeln!(out, "{}    [{}] :{}", pad, i, s),
                None => writeln!(out, "{}    [{}] -", pad, i),
            };
        }
    }
    for rep in &irep.reps {
        write_irep(out, rep, depth + 1);
    }
}
