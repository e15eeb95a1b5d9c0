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

//! Structured control flow: branches, loops, case dispatch, exception
//! regions, and the non-local exits that walk the loop-record stack.

use crate::ast::{MasgnPattern, Node, NodeKind, RescueClause, ScopeBody, WhenClause};
use crate::errors::CodegenError;
use crate::ops::{Code, Op, L_BLOCK, R_BREAK, R_NORMAL};

use super::{Generator, LoopKind, NOVAL, VAL};

impl Generator {
    pub(crate) fn gen_if(
        &mut self,
        cond: &Node,
        then_body: Option<&Node>,
        else_body: Option<&Node>,
        val: bool,
    ) -> Result<(), CodegenError> {
        // A literal condition selects its branch at compile time.
        match &cond.kind {
            NodeKind::True | NodeKind::Int { .. } | NodeKind::Str(_) => {
                return self.gen_opt(then_body, val);
            }
            NodeKind::False | NodeKind::Nil => {
                return self.gen_opt(else_body, val);
            }
            _ => {}
        }
        self.codegen(cond, VAL)?;
        self.pop();
        let sp = self.cursp();
        let pos1 = self.genop_peep(Code::asbx(Op::JmpNot, sp, 0), NOVAL);

        self.gen_opt(then_body, val)?;
        if let Some(e) = else_body {
            if val {
                self.pop();
            }
            let pos2 = self.genop(Code::sbx(Op::Jmp, 0));
            self.dispatch(pos1)?;
            self.codegen(e, val)?;
            self.dispatch(pos2)?;
        } else if val {
            self.pop();
            let pos2 = self.genop(Code::sbx(Op::Jmp, 0));
            self.dispatch(pos1)?;
            let sp = self.cursp();
            self.genop(Code::a(Op::LoadNil, sp));
            self.dispatch(pos2)?;
            self.push()?;
        } else {
            self.dispatch(pos1)?;
        }
        Ok(())
    }

    /// `and` jumps past the rhs when the lhs is falsy, `or` when truthy.
    pub(crate) fn gen_and_or(
        &mut self,
        l: &Node,
        r: &Node,
        jmp_op: Op,
        val: bool,
    ) -> Result<(), CodegenError> {
        self.codegen(l, VAL)?;
        self.pop();
        let sp = self.cursp();
        let pos = self.genop(Code::asbx(jmp_op, sp, 0));
        self.codegen(r, val)?;
        self.dispatch(pos)
    }

    /// `while` and `until` share one shape; only the bottom test differs.
    pub(crate) fn gen_while(
        &mut self,
        cond: &Node,
        body: &Node,
        jmp_op: Op,
        val: bool,
    ) -> Result<(), CodegenError> {
        let li = self.loop_push(LoopKind::Normal);
        let pc1 = self.genop(Code::sbx(Op::Jmp, 0));
        self.s().loops[li].pc1 = pc1;
        let pc2 = self.new_label();
        self.s().loops[li].pc2 = pc2;
        self.codegen(body, NOVAL)?;
        self.dispatch(pc1)?;
        self.codegen(cond, VAL)?;
        self.pop();
        let sp = self.cursp();
        let back = pc2 as i32 - self.pc() as i32;
        self.genop(Code::asbx(jmp_op, sp, back));
        self.loop_pop(val)
    }

    /// `for` desugars to `iter.each { |pattern| body }`; the loop variables
    /// live in the enclosing scope and are written through upvars.
    pub(crate) fn gen_for(
        &mut self,
        pattern: &MasgnPattern,
        iter: &Node,
        body: &Node,
    ) -> Result<(), CodegenError> {
        self.codegen(iter, VAL)?;

        self.scope_push(&[], false);
        self.push()?; // the block parameter
        let li = self.loop_push(LoopKind::For);
        let pc1 = self.new_label();
        self.s().loops[li].pc1 = pc1;

        self.genop(Code::ax(Op::Enter, 0x40000));
        if pattern.pre.len() == 1 && pattern.rest.is_none() && pattern.post.is_empty() {
            self.gen_assignment(&pattern.pre[0], 1, NOVAL)?;
        } else {
            self.gen_vmassignment(pattern, 1, VAL)?;
        }
        self.codegen(body, VAL)?;
        self.pop();
        if self.pc() > 0 {
            let last = *self.sr().iseq.last().expect("checked non-empty");
            let closed = last.op() == Some(Op::Return)
                && last.get_b() == R_NORMAL
                && self.pc() != self.sr().lastlabel;
            if !closed {
                let sp = self.cursp();
                self.genop_peep(Code::ab(Op::Return, sp, R_NORMAL), NOVAL);
            }
        }
        self.loop_pop(NOVAL)?;
        let irep = self.scope_finish();
        self.s().reps.push(irep);
        let idx = self.sr().reps.len() - 1;

        let sp = self.cursp();
        self.genop(Code::abc2(Op::Lambda, sp, idx as u32, L_BLOCK));
        self.pop();
        let sym = self.new_msym("each")?;
        let sp = self.cursp();
        self.genop(Code::abc(Op::SendB, sp, sym, 0));
        Ok(())
    }

    pub(crate) fn gen_case(
        &mut self,
        subject: Option<&Node>,
        whens: &[WhenClause],
        else_body: Option<&Node>,
        val: bool,
    ) -> Result<(), CodegenError> {
        let mut head = 0u32;
        if let Some(subject) = subject {
            head = self.cursp();
            self.codegen(subject, VAL)?;
        }
        let mut pos3 = 0usize;
        for when in whens {
            let mut pos2 = 0usize;
            for test in &when.tests {
                self.codegen(test, VAL)?;
                if head != 0 {
                    let sp = self.cursp();
                    self.genop(Code::ab(Op::Move, sp, head));
                    self.pop();
                    let sym = if matches!(test.kind, NodeKind::Splat(_)) {
                        self.new_msym("__case_eqq")?
                    } else {
                        self.new_msym("===")?
                    };
                    let sp = self.cursp();
                    self.genop(Code::abc(Op::Send, sp, sym, 1));
                } else {
                    self.pop();
                }
                let sp = self.cursp();
                pos2 = self.genop(Code::asbx(Op::JmpIf, sp, pos2 as i32));
            }
            let pos1 = self.genop(Code::sbx(Op::Jmp, 0));
            self.dispatch_linked(pos2)?;
            self.codegen(&when.body, val)?;
            if val {
                self.pop();
            }
            pos3 = self.genop(Code::sbx(Op::Jmp, pos3 as i32));
            self.dispatch(pos1)?;
        }
        if let Some(e) = else_body {
            self.codegen(e, val)?;
            if val {
                self.pop();
            }
            pos3 = self.genop(Code::sbx(Op::Jmp, pos3 as i32));
        }
        if val {
            let pos = self.cursp();
            self.genop(Code::a(Op::LoadNil, pos));
            if pos3 != 0 {
                self.dispatch_linked(pos3)?;
            }
            if head != 0 {
                self.pop();
            }
            let sp = self.cursp();
            self.genop(Code::ab(Op::Move, sp, pos));
            self.push()?;
        } else {
            if pos3 != 0 {
                self.dispatch_linked(pos3)?;
            }
            if head != 0 {
                self.pop();
            }
        }
        Ok(())
    }

    pub(crate) fn gen_rescue(
        &mut self,
        body: Option<&Node>,
        clauses: &[RescueClause],
        else_body: Option<&Node>,
        val: bool,
    ) -> Result<(), CodegenError> {
        let Some(body) = body else {
            return Ok(());
        };
        let onerr = self.genop(Code::bx(Op::OnErr, 0));
        let li = self.loop_push(LoopKind::Begin);
        self.s().loops[li].pc1 = onerr;
        self.codegen(body, VAL)?;
        self.pop();
        self.s().loops[li].kind = LoopKind::Rescue;
        let noexc = self.genop(Code::bx(Op::Jmp, 0));
        self.dispatch(onerr)?;
        let mut exend = 0usize;
        let mut pos1 = 0usize;
        if !clauses.is_empty() {
            let exc = self.cursp();
            self.genop(Code::a(Op::Rescue, exc));
            self.push()?;
            for clause in clauses {
                if pos1 != 0 {
                    self.dispatch(pos1)?;
                }
                let mut pos2 = 0usize;
                if clause.exceptions.is_empty() {
                    // bare `rescue` matches StandardError
                    let sym = self.new_msym("StandardError")?;
                    let sp = self.cursp();
                    self.genop(Code::abx(Op::GetConst, sp, sym));
                    self.push()?;
                    pos2 = self.gen_exc_test(exc, false, pos2)?;
                } else {
                    for test in &clause.exceptions {
                        self.codegen(test, VAL)?;
                        let splat = matches!(test.kind, NodeKind::Splat(_));
                        pos2 = self.gen_exc_test(exc, splat, pos2)?;
                    }
                }
                pos1 = self.genop(Code::sbx(Op::Jmp, 0));
                self.dispatch_linked(pos2)?;

                self.pop();
                if let Some(binding) = &clause.binding {
                    self.gen_assignment(binding, exc, NOVAL)?;
                }
                if let Some(cbody) = &clause.body {
                    self.codegen(cbody, val)?;
                    if val {
                        self.pop();
                    }
                }
                exend = self.genop(Code::sbx(Op::Jmp, exend as i32));
                self.push()?;
            }
            if pos1 != 0 {
                self.dispatch(pos1)?;
                self.genop(Code::a(Op::Raise, exc));
            }
        }
        self.pop();
        self.dispatch(noexc)?;
        self.genop(Code::a(Op::PopErr, 1));
        if let Some(e) = else_body {
            self.codegen(e, val)?;
        } else if val {
            self.push()?;
        }
        self.dispatch_linked(exend)?;
        self.loop_pop(NOVAL)
    }

    /// One `pattern === exc` test followed by a chained conditional jump.
    fn gen_exc_test(&mut self, exc: u32, splat: bool, pos2: usize) -> Result<usize, CodegenError> {
        let sp = self.cursp();
        self.genop(Code::ab(Op::Move, sp, exc));
        self.pop();
        let sym = if splat { self.new_msym("__case_eqq")? } else { self.new_msym("===")? };
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, sym, 1));
        let sp = self.cursp();
        Ok(self.genop(Code::asbx(Op::JmpIf, sp, pos2 as i32)))
    }

    pub(crate) fn gen_ensure(
        &mut self,
        body: &Node,
        guard: &ScopeBody,
        val: bool,
    ) -> Result<(), CodegenError> {
        let epush = self.genop(Code::bx(Op::EPush, 0));
        self.s().ensure_level += 1;
        self.codegen(body, val)?;
        let idx = self.scope_body(guard, NOVAL)?;
        self.s().iseq[epush] = Code::bx(Op::EPush, idx as u32);
        self.s().ensure_level -= 1;
        self.genop_peep(Code::a(Op::EPop, 1), NOVAL);
        Ok(())
    }

    // ---- non-local exits ----

    pub(crate) fn loop_break(&mut self, value: Option<&Node>) -> Result<(), CodegenError> {
        if self.sr().loops.is_empty() {
            if let Some(v) = value {
                self.codegen(v, NOVAL)?;
            }
            return Err(self.err_structural("unexpected break"));
        }
        if let Some(v) = value {
            self.codegen(v, VAL)?;
            self.pop();
        }

        // Unwind error handlers opened since the breakable construct.
        let mut idx = self.sr().loops.len();
        while idx > 0 && self.sr().loops[idx - 1].kind == LoopKind::Begin {
            self.genop_peep(Code::a(Op::PopErr, 1), NOVAL);
            idx -= 1;
        }
        while idx > 0 && self.sr().loops[idx - 1].kind == LoopKind::Rescue {
            idx -= 1;
        }
        if idx == 0 {
            return Err(self.err_structural("unexpected break"));
        }
        let idx = idx - 1;

        if self.sr().loops[idx].kind == LoopKind::Normal {
            let inner_level = self.sr().loops.last().expect("checked non-empty").ensure_level;
            if self.sr().ensure_level > inner_level {
                let n = self.sr().ensure_level - inner_level;
                self.genop_peep(Code::a(Op::EPop, n as u32), NOVAL);
            }
            if value.is_some() {
                let acc = self.sr().loops[idx].acc as u32;
                let sp = self.cursp();
                self.genop_peep(Code::ab(Op::Move, acc, sp), NOVAL);
            }
            let pc3 = self.sr().loops[idx].pc3;
            let tmp = self.genop(Code::sbx(Op::Jmp, pc3 as i32));
            self.s().loops[idx].pc3 = tmp;
        } else {
            let sp = self.cursp();
            self.genop(Code::ab(Op::Return, sp, R_BREAK));
        }
        Ok(())
    }

    pub(crate) fn gen_next(&mut self, value: Option<&Node>, val: bool) -> Result<(), CodegenError> {
        if self.sr().loops.is_empty() {
            return Err(self.err_structural("unexpected next"));
        }
        let last_kind = self.sr().loops.last().expect("checked non-empty").kind;
        if last_kind == LoopKind::Normal {
            let target_level = self.sr().loops.last().expect("checked non-empty").ensure_level;
            if self.sr().ensure_level > target_level {
                let n = self.sr().ensure_level - target_level;
                self.genop_peep(Code::a(Op::EPop, n as u32), NOVAL);
            }
            if let Some(v) = value {
                self.codegen(v, NOVAL)?;
            }
            let pc1 = self.sr().loops.last().expect("checked non-empty").pc1;
            let back = pc1 as i32 - self.pc() as i32;
            self.genop(Code::sbx(Op::Jmp, back));
        } else {
            // in a block `next` returns from the block invocation
            match value {
                Some(v) => {
                    self.codegen(v, VAL)?;
                    self.pop();
                }
                None => {
                    let sp = self.cursp();
                    self.genop(Code::a(Op::LoadNil, sp));
                }
            }
            let sp = self.cursp();
            self.genop_peep(Code::ab(Op::Return, sp, R_NORMAL), NOVAL);
        }
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_redo(&mut self) -> Result<(), CodegenError> {
        if self.sr().loops.is_empty() {
            return Err(self.err_structural("unexpected redo"));
        }
        let target_level = self.sr().loops.last().expect("checked non-empty").ensure_level;
        if self.sr().ensure_level > target_level {
            let n = self.sr().ensure_level - target_level;
            self.genop_peep(Code::a(Op::EPop, n as u32), NOVAL);
        }
        let pc2 = self.sr().loops.last().expect("checked non-empty").pc2;
        let back = pc2 as i32 - self.pc() as i32;
        self.genop(Code::sbx(Op::Jmp, back));
        Ok(())
    }

    pub(crate) fn gen_retry(&mut self) -> Result<(), CodegenError> {
        if self.sr().loops.is_empty() {
            return Err(self.err_structural("unexpected retry"));
        }
        let mut n = 0u32;
        let mut idx = self.sr().loops.len();
        while idx > 0 && self.sr().loops[idx - 1].kind != LoopKind::Rescue {
            if self.sr().loops[idx - 1].kind == LoopKind::Begin {
                n += 1;
            }
            idx -= 1;
        }
        if idx == 0 {
            return Err(self.err_structural("unexpected retry"));
        }
        let idx = idx - 1;
        for _ in 0..n {
            self.genop_peep(Code::a(Op::PopErr, 1), NOVAL);
        }
        let target_level = self.sr().loops[idx].ensure_level;
        if self.sr().ensure_level > target_level {
            let diff = self.sr().ensure_level - target_level;
            self.genop_peep(Code::a(Op::EPop, diff as u32), NOVAL);
        }
        let pc1 = self.sr().loops[idx].pc1;
        let back = pc1 as i32 - self.pc() as i32;
        self.genop(Code::sbx(Op::Jmp, back));
        Ok(())
    }
}
