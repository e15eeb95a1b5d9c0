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

//! The generic left-hand-side emitters shared by `=`, `op=`, multiple
//! assignment, `for` variables, and `rescue` bindings.

use crate::ast::{Lhs, MasgnPattern, Node, NodeKind};
use crate::errors::CodegenError;
use crate::ops::{Code, Op, CALL_MAXARGS};

use super::{Generator, LoopKind, NOVAL, VAL};

/// The attribute-writer name for an attribute read: `m` -> `m=`.
pub(crate) fn attrsym(name: &str) -> String {
    let mut s = String::with_capacity(name.len() + 1);
    s.push_str(name);
    s.push('=');
    s
}

impl Generator {
    /// Stores the value in register `src` into `lhs`. With `val` the value
    /// stays observable on the stack top afterwards.
    pub(crate) fn gen_assignment(&mut self, lhs: &Lhs, src: u32, val: bool) -> Result<(), CodegenError> {
        match lhs {
            Lhs::Gvar(name) => {
                let idx = self.new_sym(name);
                self.genop_peep(Code::abx(Op::SetGlobal, src, idx), val);
            }
            Lhs::Ivar(name) => {
                let idx = self.new_sym(name);
                self.genop_peep(Code::abx(Op::SetIv, src, idx), val);
            }
            Lhs::Cvar(name) => {
                let idx = self.new_sym(name);
                self.genop_peep(Code::abx(Op::SetCv, src, idx), val);
            }
            Lhs::Const(name) => {
                let idx = self.new_sym(name);
                self.genop_peep(Code::abx(Op::SetConst, src, idx), val);
            }
            Lhs::Lvar(name) => {
                let idx = self.sr().lv_idx(name);
                if idx > 0 {
                    if idx as u32 != src {
                        self.genop_peep(Code::ab(Op::Move, idx as u32, src), val);
                    }
                } else {
                    let mut lv = 0u32;
                    for up in (0..self.scopes.len() - 1).rev() {
                        let idx = self.scopes[up].lv_idx(name);
                        if idx > 0 {
                            self.genop_peep(Code::abc(Op::SetUpvar, src, idx as u32, lv), val);
                            break;
                        }
                        lv += 1;
                    }
                }
            }
            Lhs::MCnst { base, name } => {
                let idx = self.new_sym(name);
                let c = self.cursp();
                self.genop_peep(Code::ab(Op::Move, c, src), NOVAL);
                self.push()?;
                self.codegen(base, VAL)?;
                self.pop_n(2);
                let c = self.cursp();
                self.genop_peep(Code::abx(Op::SetMCnst, c, idx), val);
            }
            Lhs::Attr { recv, name, args } => {
                self.push()?;
                let setter = attrsym(name);
                self.gen_call(recv, &setter, args, None, Some(src), NOVAL, false)?;
                self.pop();
                if val {
                    let c = self.cursp();
                    self.genop_peep(Code::ab(Op::Move, c, src), val);
                }
            }
            Lhs::Masgn(pattern) => {
                self.gen_vmassignment(pattern, src, val)?;
            }
            Lhs::Discard => {}
        }
        if val {
            self.push()?;
        }
        Ok(())
    }

    /// Destructures the array in `rhs` into a pattern. Pre names read with
    /// `ARef`; the rest/post tail is split off with `APost`.
    pub(crate) fn gen_vmassignment(
        &mut self,
        pattern: &MasgnPattern,
        rhs: u32,
        val: bool,
    ) -> Result<(), CodegenError> {
        let mut n = 0u32;
        for lhs in &pattern.pre {
            let c = self.cursp();
            self.genop(Code::abc(Op::ARef, c, rhs, n));
            let c = self.cursp();
            self.gen_assignment(lhs, c, NOVAL)?;
            n += 1;
        }
        if pattern.rest.is_some() || !pattern.post.is_empty() {
            let post = pattern.post.len();
            if val {
                let c = self.cursp();
                self.genop(Code::ab(Op::Move, c, rhs));
            } else {
                self.pop();
            }
            self.push_n(post)?;
            self.pop_n(post);
            let c = self.cursp();
            self.genop(Code::abc(Op::APost, c, n, post as u32));
            if let Some(rest) = &pattern.rest {
                let c = self.cursp();
                self.gen_assignment(rest, c, NOVAL)?;
            }
            let mut k = 1u32;
            for lhs in &pattern.post {
                let c = self.cursp();
                self.gen_assignment(lhs, c + k, NOVAL)?;
                k += 1;
            }
            self.push()?;
        }
        Ok(())
    }

    /// `a, *b, c = rhs`. A splat-free array literal on the right is laid
    /// out in place without materializing the whole array first.
    pub(crate) fn gen_masgn(
        &mut self,
        pattern: &MasgnPattern,
        rhs: &Node,
        val: bool,
    ) -> Result<(), CodegenError> {
        let rhs_reg = self.cursp();
        let fixed = match &rhs.kind {
            NodeKind::Array(items) => {
                if items.iter().any(|it| matches!(it.kind, NodeKind::Splat(_))) {
                    None
                } else {
                    Some(items)
                }
            }
            _ => None,
        };
        match fixed {
            Some(items) => {
                let len = items.len() as u32;
                for item in items {
                    self.codegen(item, VAL)?;
                }
                let mut n = 0u32;
                for lhs in &pattern.pre {
                    self.gen_assignment(lhs, rhs_reg + n, NOVAL)?;
                    n += 1;
                }
                if pattern.rest.is_some() || !pattern.post.is_empty() {
                    let post = pattern.post.len() as u32;
                    if let Some(rest) = &pattern.rest {
                        let rn = if len < post + n { 0 } else { len - post - n };
                        let c = self.cursp();
                        self.genop(Code::abc(Op::Array, c, rhs_reg + n, rn));
                        let c = self.cursp();
                        self.gen_assignment(rest, c, NOVAL)?;
                        n += rn;
                    }
                    for lhs in &pattern.post {
                        if n >= len {
                            break;
                        }
                        self.gen_assignment(lhs, rhs_reg + n, NOVAL)?;
                        n += 1;
                    }
                }
                self.pop_n(len as usize);
                if val {
                    self.genop(Code::abc(Op::Array, rhs_reg, rhs_reg, len));
                    self.push()?;
                }
            }
            None => {
                self.codegen(rhs, VAL)?;
                self.gen_vmassignment(pattern, rhs_reg, val)?;
                if !val {
                    self.pop();
                }
            }
        }
        Ok(())
    }

    /// `lhs op= rhs`. `||=`/`&&=` short-circuit; attribute targets read
    /// through the getter and store through the setter.
    pub(crate) fn gen_op_asgn(
        &mut self,
        lhs: &Lhs,
        op: &str,
        rhs: &Node,
        val: bool,
    ) -> Result<(), CodegenError> {
        let mut callargs: Option<u32> = None;
        let mut vsp = 0u32;

        if op == "||" && matches!(lhs, Lhs::Const(_) | Lhs::Cvar(_)) {
            // reading an undefined constant raises; rescue it to false so
            // the `||=` takes the assignment branch
            let onerr = self.genop(Code::bx(Op::OnErr, 0));
            let li = self.loop_push(LoopKind::Begin);
            self.s().loops[li].pc1 = onerr;
            let exc = self.cursp();
            self.gen_lhs_value(lhs)?;
            self.s().loops[li].kind = LoopKind::Rescue;
            self.genop(Code::a(Op::PopErr, 1));
            let noexc = self.genop(Code::bx(Op::Jmp, 0));
            self.dispatch(onerr)?;
            self.genop(Code::a(Op::Rescue, exc));
            self.genop(Code::a(Op::LoadF, exc));
            self.dispatch(noexc)?;
            self.loop_pop_record();
        } else if let Lhs::Attr { recv, name, args } = lhs {
            if val {
                vsp = self.cursp();
                self.push()?;
            }
            self.codegen(recv, VAL)?;
            let idx = self.new_msym(name)?;
            if !args.is_empty() {
                if let Some(i) = self.gen_values(args, VAL)? {
                    self.pop_n(i);
                    let c = self.cursp();
                    self.genop(Code::abc(Op::Array, c, c, i as u32));
                }
                let c = self.cursp();
                self.genop(Code::ab(Op::Move, c + 1, c - 1));
                self.genop(Code::ab(Op::Move, c + 2, c));
                self.push()?;
                let c = self.cursp();
                self.genop(Code::abc(Op::Send, c, idx, CALL_MAXARGS));
                callargs = Some(CALL_MAXARGS);
            } else {
                let c = self.cursp();
                self.genop(Code::ab(Op::Move, c, c - 1));
                self.genop(Code::abc(Op::Send, c, idx, 0));
                callargs = Some(1);
            }
            self.push()?;
        } else {
            self.gen_lhs_value(lhs)?;
        }

        if op == "||" || op == "&&" {
            self.pop();
            let c = self.cursp();
            let jmp = if op == "||" { Op::JmpIf } else { Op::JmpNot };
            let pos = if val {
                self.genop(Code::asbx(jmp, c, 0))
            } else {
                self.genop_peep(Code::asbx(jmp, c, 0), NOVAL)
            };
            self.codegen(rhs, VAL)?;
            self.pop();
            let c = self.cursp();
            self.gen_assignment(lhs, c, val)?;
            return self.dispatch(pos);
        }

        self.codegen(rhs, VAL)?;
        self.push()?;
        self.pop();
        self.pop();
        self.pop();

        let idx = self.new_msym(op)?;
        let c = self.cursp();
        match op {
            "+" => {
                self.genop_peep(Code::abc(Op::Add, c, idx, 1), val);
            }
            "-" => {
                self.genop_peep(Code::abc(Op::Sub, c, idx, 1), val);
            }
            "*" => {
                self.genop(Code::abc(Op::Mul, c, idx, 1));
            }
            "/" => {
                self.genop(Code::abc(Op::Div, c, idx, 1));
            }
            "<" => {
                self.genop(Code::abc(Op::Lt, c, idx, 1));
            }
            "<=" => {
                self.genop(Code::abc(Op::Le, c, idx, 1));
            }
            ">" => {
                self.genop(Code::abc(Op::Gt, c, idx, 1));
            }
            ">=" => {
                self.genop(Code::abc(Op::Ge, c, idx, 1));
            }
            _ => {
                self.genop(Code::abc(Op::Send, c, idx, 1));
            }
        }

        match callargs {
            None => {
                let c = self.cursp();
                self.gen_assignment(lhs, c, val)?;
            }
            Some(callargs) => {
                if callargs == CALL_MAXARGS {
                    let c = self.cursp();
                    self.genop(Code::ab(Op::AryPush, c - 1, c));
                    if val {
                        let c = self.cursp();
                        self.genop(Code::ab(Op::Move, vsp, c));
                    }
                    self.pop();
                } else if val {
                    let c = self.cursp();
                    self.genop(Code::ab(Op::Move, vsp, c));
                }
                self.pop();
                let name = match lhs {
                    Lhs::Attr { name, .. } => name,
                    _ => {
                        return Err(CodegenError::Internal {
                            reason: "op-assign callargs without attribute target".to_string(),
                        });
                    }
                };
                let setter = attrsym(name);
                let idx = self.new_msym(&setter)?;
                let c = self.cursp();
                self.genop(Code::abc(Op::Send, c, idx, callargs));
            }
        }
        Ok(())
    }

    /// Compiles the current value of an assignment target, for `op=`.
    fn gen_lhs_value(&mut self, lhs: &Lhs) -> Result<(), CodegenError> {
        match lhs {
            Lhs::Lvar(name) => {
                let idx = self.sr().lv_idx(name);
                if idx > 0 {
                    let c = self.cursp();
                    self.genop_peep(Code::ab(Op::Move, c, idx as u32), NOVAL);
                } else {
                    let mut lv = 0u32;
                    for up in (0..self.scopes.len() - 1).rev() {
                        let idx = self.scopes[up].lv_idx(name);
                        if idx > 0 {
                            let c = self.cursp();
                            self.genop(Code::abc(Op::GetUpvar, c, idx as u32, lv));
                            break;
                        }
                        lv += 1;
                    }
                }
                self.push()
            }
            Lhs::Gvar(name) => {
                let sym = self.new_sym(name);
                let c = self.cursp();
                self.genop(Code::abx(Op::GetGlobal, c, sym));
                self.push()
            }
            Lhs::Ivar(name) => {
                let sym = self.new_sym(name);
                let c = self.cursp();
                self.genop(Code::abx(Op::GetIv, c, sym));
                self.push()
            }
            Lhs::Cvar(name) => {
                let sym = self.new_sym(name);
                let c = self.cursp();
                self.genop(Code::abx(Op::GetCv, c, sym));
                self.push()
            }
            Lhs::Const(name) => {
                let sym = self.new_sym(name);
                let c = self.cursp();
                self.genop(Code::abx(Op::GetConst, c, sym));
                self.push()
            }
            Lhs::MCnst { base, name } => {
                let sym = self.new_sym(name);
                self.codegen(base, VAL)?;
                self.pop();
                let c = self.cursp();
                self.genop(Code::abx(Op::GetMCnst, c, sym));
                self.push()
            }
            Lhs::Attr { .. } | Lhs::Masgn(_) | Lhs::Discard => Err(CodegenError::Internal {
                reason: "unreadable op-assign target".to_string(),
            }),
        }
    }
}
