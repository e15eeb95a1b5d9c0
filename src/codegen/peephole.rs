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

//! Rewrites of the last emitted instruction.
//!
//! A rule may only fire when no label sits between the previous
//! instruction and the new one. With `val == VAL` the caller observes the
//! destination register of the new instruction, so rules that would
//! destroy it are suppressed.

use log::trace;

use crate::irep::PoolValue;
use crate::ops::{Code, Op, R_NORMAL};

use super::{Generator, NOVAL};

impl Generator {
    /// Emits `i`, possibly fusing it with (or dropping it into) the
    /// previous instruction. Returns the pc of the instruction that now
    /// carries the effect; callers that need a patchable jump site always
    /// get a valid one.
    pub(crate) fn genop_peep(&mut self, i: Code, val: bool) -> usize {
        if self.no_optimize || self.sr().lastlabel == self.pc() || self.pc() == 0 {
            return self.genop(i);
        }
        let i0 = *self.sr().iseq.last().expect("peephole with empty buffer");
        let (Some(c1), Some(c0)) = (i.op(), i0.op()) else {
            return self.genop(i);
        };
        let nlocals = self.sr().nlocals as u32;

        match c1 {
            Op::Move => {
                if i.get_a() == i.get_b() {
                    // useless move
                    return 0;
                }
                if val {
                    return self.genop(i);
                }
                match c0 {
                    Op::Move => {
                        if i.get_a() == i0.get_a() {
                            // the earlier move is dead
                            self.pop_last_op();
                            return self.genop(i);
                        }
                        if i.get_b() == i0.get_a()
                            && i.get_a() == i0.get_b()
                            && i.get_a() >= nlocals
                        {
                            // swapping move of a scratch register
                            return 0;
                        }
                        if i.get_b() == i0.get_a() && i0.get_a() >= nlocals {
                            self.pop_last_op();
                            return self.genop_peep(Code::ab(Op::Move, i.get_a(), i0.get_b()), val);
                        }
                        self.genop(i)
                    }
                    Op::LoadI => self.retarget(i, i0, |a| Code::asbx(Op::LoadI, a, i0.get_sbx())),
                    Op::Array | Op::Hash | Op::Range | Op::ARef | Op::GetUpvar => {
                        self.retarget(i, i0, |a| Code::abc(c0, a, i0.get_b(), i0.get_c()))
                    }
                    Op::LoadSym | Op::GetGlobal | Op::GetIv | Op::GetCv | Op::GetConst
                    | Op::GetSpecial | Op::LoadL | Op::String => {
                        self.retarget(i, i0, |a| Code::abx(c0, a, i0.get_bx()))
                    }
                    Op::SClass => self.retarget(i, i0, |a| Code::ab(c0, a, i0.get_b())),
                    Op::LoadNil | Op::LoadSelf | Op::LoadT | Op::LoadF | Op::OClass => {
                        self.retarget(i, i0, |a| Code::a(c0, a))
                    }
                    _ => self.genop(i),
                }
            }
            Op::SetIv | Op::SetCv | Op::SetConst | Op::SetMCnst | Op::SetGlobal => {
                if !val && c0 == Op::Move && i.get_a() == i0.get_a() {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::abx(c1, i0.get_b(), i.get_bx());
                    return 0;
                }
                self.genop(i)
            }
            Op::SetUpvar => {
                if !val && c0 == Op::Move && i.get_a() == i0.get_a() {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::abc(c1, i0.get_b(), i.get_b(), i.get_c());
                    return 0;
                }
                self.genop(i)
            }
            Op::EPop => {
                if c0 == Op::EPop {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::a(Op::EPop, i0.get_a() + i.get_a());
                    return 0;
                }
                self.genop(i)
            }
            Op::PopErr => {
                if c0 == Op::PopErr {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::a(Op::PopErr, i0.get_a() + i.get_a());
                    return 0;
                }
                self.genop(i)
            }
            Op::Return => match c0 {
                Op::Return => 0,
                Op::Move if i0.get_a() >= nlocals => {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::ab(Op::Return, i0.get_b(), R_NORMAL);
                    0
                }
                Op::SetIv | Op::SetCv | Op::SetConst | Op::SetMCnst | Op::SetUpvar
                | Op::SetGlobal => {
                    // give the setter its own peephole pass, then return
                    // whatever register it reads from
                    self.pop_last_op();
                    self.genop_peep(i0, NOVAL);
                    let i0 = *self.sr().iseq.last().expect("peephole with empty buffer");
                    self.genop(Code::ab(Op::Return, i0.get_a(), R_NORMAL))
                }
                _ => self.genop(i),
            },
            Op::Add | Op::Sub => {
                if c0 == Op::LoadI {
                    let mut k = i0.get_sbx();
                    if c1 == Op::Sub {
                        k = -k;
                    }
                    if (-127..=127).contains(&k) {
                        let fused = if k >= 0 {
                            Code::abc(Op::AddI, i.get_a(), i.get_b(), k as u32)
                        } else {
                            Code::abc(Op::SubI, i.get_a(), i.get_b(), (-k) as u32)
                        };
                        trace!("peephole: LoadI + {:?} -> {:?}", c1, fused.op());
                        let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                        *last = fused;
                        return 0;
                    }
                }
                self.genop(i)
            }
            Op::StrCat => {
                if c0 == Op::String {
                    let empty = matches!(
                        self.sr().pool.get(i0.get_bx() as usize),
                        Some(PoolValue::Str(s)) if s.is_empty()
                    );
                    if empty {
                        // concatenation with "" is the identity
                        self.pop_last_op();
                        return 0;
                    }
                }
                if c0 == Op::LoadNil && i.get_b() == i0.get_a() {
                    self.pop_last_op();
                    return 0;
                }
                self.genop(i)
            }
            Op::JmpIf | Op::JmpNot => {
                if c0 == Op::Move && i.get_a() == i0.get_a() {
                    let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
                    *last = Code::asbx(c1, i0.get_b(), i.get_sbx());
                    return self.pc() - 1;
                }
                self.genop(i)
            }
            _ => self.genop(i),
        }
    }

    /// `Move A, B` after a producer into B: point the producer at A and
    /// drop the move. Only legal for scratch registers.
    fn retarget(&mut self, i: Code, i0: Code, rebuild: impl FnOnce(u32) -> Code) -> usize {
        let nlocals = self.sr().nlocals as u32;
        if i.get_b() == i0.get_a() && i0.get_a() >= nlocals {
            let fused = rebuild(i.get_a());
            trace!("peephole: retarget {:?} -> r{}", i0.op(), i.get_a());
            let last = self.s().iseq.last_mut().expect("peephole with empty buffer");
            *last = fused;
            return 0;
        }
        self.genop(i)
    }
}
