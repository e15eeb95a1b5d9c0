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

//! Structural checks over a compiled IREP tree. Tests run these after
//! every compilation; embedders can run them on untrusted dumps.

use std::collections::HashSet;

use crate::errors::CodegenError;
use crate::irep::Irep;
use crate::ops::{Op, R_BREAK, R_NORMAL, R_RETURN};

/// Verifies one unit and all of its children.
pub fn verify(irep: &Irep) -> Result<(), CodegenError> {
    verify_unit(irep)?;
    for rep in &irep.reps {
        verify(rep)?;
    }
    Ok(())
}

fn fail(reason: String) -> CodegenError {
    CodegenError::Verify { reason }
}

fn verify_unit(irep: &Irep) -> Result<(), CodegenError> {
    if irep.nlocals > irep.nregs {
        return Err(fail(format!(
            "nlocals {} exceeds nregs {}",
            irep.nlocals, irep.nregs
        )));
    }
    if irep.nregs > 512 {
        return Err(fail(format!("nregs {} exceeds the register file", irep.nregs)));
    }
    if !irep.lines.is_empty() && irep.lines.len() != irep.iseq.len() {
        return Err(fail("line table length differs from instruction count".to_string()));
    }

    // Every jump must land inside the unit: a leftover linked-list field
    // would read as a wild offset here.
    let ilen = irep.iseq.len() as i64;
    for (pc, code) in irep.iseq.iter().enumerate() {
        let op = code
            .op()
            .ok_or_else(|| fail(format!("unknown opcode 0x{:02x} at {}", code.opcode(), pc)))?;
        match op {
            Op::Jmp | Op::JmpIf | Op::JmpNot | Op::OnErr => {
                let target = pc as i64 + code.get_sbx() as i64;
                if target < 0 || target >= ilen {
                    return Err(fail(format!(
                        "jump at {} lands outside [0, {}): {}",
                        pc, ilen, target
                    )));
                }
            }
            Op::Return => {
                let kind = code.get_b();
                if kind != R_NORMAL && kind != R_BREAK && kind != R_RETURN {
                    return Err(fail(format!("return at {} with unknown kind {}", pc, kind)));
                }
            }
            Op::EPush => {
                if code.get_bx() as usize >= irep.reps.len() {
                    return Err(fail(format!("EPush at {} references missing child", pc)));
                }
            }
            Op::Lambda | Op::Exec => {
                let child = if op == Op::Lambda { code.get_b14() } else { code.get_bx() };
                if child as usize >= irep.reps.len() {
                    return Err(fail(format!("{:?} at {} references missing child", op, pc)));
                }
            }
            _ => {}
        }
    }

    // Ensure-handler depth may never underflow in instruction order.
    let mut depth: i64 = 0;
    for (pc, code) in irep.iseq.iter().enumerate() {
        match code.op() {
            Some(Op::EPush) => depth += 1,
            Some(Op::EPop) => {
                depth -= code.get_a() as i64;
                if depth < 0 {
                    return Err(fail(format!("EPop at {} underflows handler depth", pc)));
                }
            }
            _ => {}
        }
    }

    // Pool entries are unique under structural equality.
    for (i, a) in irep.pool.iter().enumerate() {
        for b in irep.pool.iter().skip(i + 1) {
            if a == b {
                return Err(fail(format!("duplicate pool entry {:?}", a)));
            }
        }
    }

    // Symbols are unique; holes only appear in the padded method prefix.
    let mut seen: HashSet<&str> = HashSet::new();
    for (i, slot) in irep.syms.iter().enumerate() {
        match slot {
            Some(name) => {
                if !seen.insert(name) {
                    return Err(fail(format!("duplicate symbol :{}", name)));
                }
            }
            None => {
                if i >= 256 {
                    return Err(fail(format!("symbol hole at {} past the prefix", i)));
                }
            }
        }
    }
    Ok(())
}
