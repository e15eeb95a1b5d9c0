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

use log::debug;

use crate::errors::CodegenError;
use crate::irep::{Irep, Local, PoolValue};
use crate::ops::Code;

use super::Generator;

/// What a loop record was opened for. `Begin`/`Rescue` mark exception
/// regions that `break`/`retry` must unwind through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopKind {
    Normal,
    Block,
    For,
    Begin,
    Rescue,
}

/// One active structured construct. `pc1`..`pc3` are heads of pending
/// forward-jump chains (0 = empty); `acc` is where a `break` value lands.
#[derive(Debug)]
pub(crate) struct LoopInfo {
    pub kind: LoopKind,
    pub pc1: usize,
    pub pc2: usize,
    pub pc3: usize,
    pub acc: usize,
    pub ensure_level: usize,
}

/// Live code-generation state for one lexical unit. Registers `[0,
/// nlocals)` hold `self` and the declared locals; `[nlocals, sp)` is the
/// expression stack.
pub(crate) struct Scope {
    pub lv: Vec<Option<String>>,
    pub sp: usize,
    pub lastlabel: usize,
    pub ainfo: u16,
    pub mscope: bool,
    pub loops: Vec<LoopInfo>,
    pub ensure_level: usize,
    pub filename: Option<String>,
    pub filename_index: u16,
    pub lineno: u16,
    pub iseq: Vec<Code>,
    pub lines: Vec<u16>,
    pub pool: Vec<PoolValue>,
    pub syms: Vec<Option<String>>,
    pub reps: Vec<Irep>,
    pub nlocals: u16,
    pub nregs: u16,
}

impl Scope {
    pub fn new(lv: Vec<Option<String>>, filename: Option<String>, filename_index: u16, lineno: u16) -> Scope {
        let sp = lv.len() + 1; // register 0 is self
        Scope {
            lv,
            sp,
            lastlabel: 0,
            ainfo: 0,
            mscope: false,
            loops: Vec::new(),
            ensure_level: 0,
            filename,
            filename_index,
            lineno,
            iseq: Vec::new(),
            lines: Vec::new(),
            pool: Vec::new(),
            syms: Vec::new(),
            reps: Vec::new(),
            nlocals: sp as u16,
            nregs: sp as u16,
        }
    }

    pub fn pc(&self) -> usize {
        self.iseq.len()
    }

    /// Register index of a declared local, or 0 when absent. Index 0 can
    /// never name a local since it holds `self`.
    pub fn lv_idx(&self, name: &str) -> usize {
        for (i, n) in self.lv.iter().enumerate() {
            if n.as_deref() == Some(name) {
                return i + 1;
            }
        }
        0
    }

    /// Publishes the finished unit, shrinking every buffer to size.
    pub fn finish(self) -> Irep {
        let lv = self
            .lv
            .iter()
            .enumerate()
            .map(|(i, n)| Local {
                name: n.clone(),
                r: if n.is_some() { (i + 1) as u16 } else { 0 },
            })
            .collect();
        let mut irep = Irep {
            nlocals: self.nlocals,
            nregs: self.nregs,
            iseq: self.iseq,
            lines: if self.filename.is_some() { self.lines } else { Vec::new() },
            pool: self.pool,
            syms: self.syms,
            reps: self.reps,
            lv,
            filename: self.filename,
        };
        irep.iseq.shrink_to_fit();
        irep.lines.shrink_to_fit();
        irep.pool.shrink_to_fit();
        irep.syms.shrink_to_fit();
        debug!(
            "scope finish: ilen={} nlocals={} nregs={} plen={} slen={} rlen={}",
            irep.iseq.len(),
            irep.nlocals,
            irep.nregs,
            irep.pool.len(),
            irep.syms.len(),
            irep.reps.len()
        );
        irep
    }
}

impl Generator {
    pub(crate) fn scope_push(&mut self, lv: &[Option<String>], mscope: bool) {
        let (filename, findex, lineno) = match self.scopes.last() {
            Some(p) => (p.filename.clone(), p.filename_index, p.lineno),
            None => (self.default_filename.clone(), self.default_filename_index, 0),
        };
        let mut s = Scope::new(lv.to_vec(), filename, findex, lineno);
        s.mscope = mscope;
        self.scopes.push(s);
    }

    /// Closes the innermost scope and returns its published unit.
    pub(crate) fn scope_finish(&mut self) -> Irep {
        self.scopes.pop().expect("scope stack underflow").finish()
    }

    pub(crate) fn s(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("no open scope")
    }

    pub(crate) fn sr(&self) -> &Scope {
        self.scopes.last().expect("no open scope")
    }

    pub(crate) fn cursp(&self) -> u32 {
        self.sr().sp as u32
    }

    pub(crate) fn pc(&self) -> usize {
        self.sr().pc()
    }

    pub(crate) fn push(&mut self) -> Result<(), CodegenError> {
        if self.sr().sp > 511 {
            return Err(self.err_capacity("too complex expression"));
        }
        let s = self.s();
        s.sp += 1;
        if s.sp > s.nregs as usize {
            s.nregs = s.sp as u16;
        }
        Ok(())
    }

    pub(crate) fn push_n(&mut self, n: usize) -> Result<(), CodegenError> {
        if self.sr().sp + n > 511 {
            return Err(self.err_capacity("too complex expression"));
        }
        let s = self.s();
        s.sp += n;
        if s.sp > s.nregs as usize {
            s.nregs = s.sp as u16;
        }
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        self.s().sp -= 1;
    }

    pub(crate) fn pop_n(&mut self, n: usize) {
        self.s().sp -= n;
    }

    /// Interns a literal in the current unit's pool, reusing any
    /// structurally equal entry.
    pub(crate) fn new_lit(&mut self, val: PoolValue) -> u32 {
        let s = self.s();
        for (i, pv) in s.pool.iter().enumerate() {
            let hit = match (pv, &val) {
                (PoolValue::Str(a), PoolValue::Str(b)) => a == b,
                (PoolValue::Int(a), PoolValue::Int(b)) => a == b,
                (PoolValue::Float(a), PoolValue::Float(b)) => a == b,
                _ => false,
            };
            if hit {
                return i as u32;
            }
        }
        s.pool.push(val);
        (s.pool.len() - 1) as u32
    }

    /// Interns a method symbol into the 256-entry prefix, filling padding
    /// holes first. Opcode operands addressing methods are only 8 bits
    /// wide, hence the hard cap.
    pub(crate) fn new_msym(&mut self, name: &str) -> Result<u32, CodegenError> {
        let len = self.sr().syms.len().min(256);
        let mut i = 0;
        while i < len {
            match &self.sr().syms[i] {
                Some(s2) if s2 == name => return Ok(i as u32),
                None => break,
                _ => {}
            }
            i += 1;
        }
        if i == 256 {
            return Err(self.err_capacity("too many symbols (max 256)"));
        }
        let s = self.s();
        if i == s.syms.len() {
            s.syms.push(Some(name.to_string()));
        } else {
            s.syms[i] = Some(name.to_string());
        }
        Ok(i as u32)
    }

    /// Interns a general symbol anywhere in the table. When the table first
    /// grows past 125 entries the method prefix is padded out to 256 so the
    /// two index spaces stop competing.
    pub(crate) fn new_sym(&mut self, name: &str) -> u32 {
        let s = self.s();
        for (i, slot) in s.syms.iter().enumerate() {
            if slot.as_deref() == Some(name) {
                return i as u32;
            }
        }
        let len = s.syms.len();
        if len > 125 && len < 256 {
            while s.syms.len() < 256 {
                s.syms.push(None);
            }
        }
        s.syms.push(Some(name.to_string()));
        (s.syms.len() - 1) as u32
    }

    /// Opens a loop record on the innermost scope; returns its index.
    pub(crate) fn loop_push(&mut self, kind: LoopKind) -> usize {
        let acc = self.sr().sp;
        let ensure_level = self.sr().ensure_level;
        let s = self.s();
        s.loops.push(LoopInfo { kind, pc1: 0, pc2: 0, pc3: 0, acc, ensure_level });
        s.loops.len() - 1
    }

    /// Closes the innermost loop record, resolving its pending end-of-loop
    /// jumps. With `val` the loop contributes a nil fallthrough value.
    pub(crate) fn loop_pop(&mut self, val: bool) -> Result<(), CodegenError> {
        if val {
            let sp = self.cursp();
            self.genop(Code::a(crate::ops::Op::LoadNil, sp));
        }
        let pc3 = self.sr().loops.last().map(|l| l.pc3).unwrap_or(0);
        self.dispatch_linked(pc3)?;
        self.s().loops.pop();
        if val {
            self.push()?;
        }
        Ok(())
    }

    /// Discards the innermost loop record without the value protocol; used
    /// where a record only marked an exception region.
    pub(crate) fn loop_pop_record(&mut self) {
        self.s().loops.pop();
    }
}
