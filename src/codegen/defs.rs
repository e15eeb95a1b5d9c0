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

//! Child-unit construction: method and closure bodies with their argument
//! prologue, plus class, module, and singleton definitions.

use crate::ast::{ClassPath, Node, Params, ScopeBody};
use crate::errors::CodegenError;
use crate::ops::{mk_aspec, Code, Op, L_METHOD, R_NORMAL};

use super::{Generator, LoopKind, NOVAL, VAL};

impl Generator {
    /// Compiles a method or block body into a child IREP and returns its
    /// index. Blocks get a `LoopKind::Block` record so `next`/`break`
    /// resolve against the invocation.
    pub(crate) fn lambda_body(
        &mut self,
        locals: &[Option<String>],
        params: Option<&Params>,
        body: &Node,
        blk: bool,
    ) -> Result<usize, CodegenError> {
        self.scope_push(locals, !blk);
        if blk {
            let li = self.loop_push(LoopKind::Block);
            let pc1 = self.new_label();
            self.s().loops[li].pc1 = pc1;
        }
        if let Some(p) = params {
            self.gen_argument_prologue(p)?;
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
        if blk {
            self.loop_pop(NOVAL)?;
        }
        let irep = self.scope_finish();
        let s = self.s();
        s.reps.push(irep);
        Ok(s.reps.len() - 1)
    }

    /// Emits `Enter` plus the optional-argument jump table: one forward
    /// jump per optional parameter and a terminal jump past the defaults,
    /// each landing in front of its default-value expression.
    fn gen_argument_prologue(&mut self, p: &Params) -> Result<(), CodegenError> {
        let ma = p.mandatory.len() as u32;
        let oa = p.optional.len() as u32;
        let ra = p.rest.is_some() as u32;
        let pa = p.post.len() as u32;
        let ba = p.block.is_some() as u32;
        let aspec = mk_aspec(ma, oa, ra, pa, 0, 0, ba);
        self.s().ainfo = ((((ma + oa) & 0x3f) << 6) | ((ra & 1) << 5) | (pa & 0x1f)) as u16;
        self.genop(Code::ax(Op::Enter, aspec));
        let pos = self.new_label();
        for _ in 0..oa {
            self.new_label();
            self.genop(Code::sbx(Op::Jmp, 0));
        }
        if oa > 0 {
            self.genop(Code::sbx(Op::Jmp, 0));
        }
        let mut i = 0usize;
        for (name, default) in &p.optional {
            self.dispatch(pos + i)?;
            self.codegen(default, VAL)?;
            let idx = self.sr().lv_idx(name);
            self.pop();
            let sp = self.cursp();
            self.genop_peep(Code::ab(Op::Move, idx as u32, sp), NOVAL);
            i += 1;
        }
        if oa > 0 {
            self.dispatch(pos + i)?;
        }
        Ok(())
    }

    fn gen_class_base(&mut self, path: &ClassPath) -> Result<(), CodegenError> {
        match path {
            ClassPath::Local(_) => {
                let sp = self.cursp();
                self.genop(Code::a(Op::LoadNil, sp));
                self.push()
            }
            ClassPath::Root(_) => {
                let sp = self.cursp();
                self.genop(Code::a(Op::OClass, sp));
                self.push()
            }
            ClassPath::Under(base, _) => self.codegen(base, VAL),
        }
    }

    pub(crate) fn gen_class(
        &mut self,
        path: &ClassPath,
        superclass: Option<&Node>,
        body: &ScopeBody,
        val: bool,
    ) -> Result<(), CodegenError> {
        self.gen_class_base(path)?;
        match superclass {
            Some(sc) => self.codegen(sc, VAL)?,
            None => {
                let sp = self.cursp();
                self.genop(Code::a(Op::LoadNil, sp));
                self.push()?;
            }
        }
        self.pop();
        self.pop();
        let idx = self.new_msym(path.name())?;
        let sp = self.cursp();
        self.genop(Code::ab(Op::Class, sp, idx));
        let body_idx = self.scope_body(body, val)?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::Exec, sp, body_idx as u32));
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_module(
        &mut self,
        path: &ClassPath,
        body: &ScopeBody,
        val: bool,
    ) -> Result<(), CodegenError> {
        self.gen_class_base(path)?;
        self.pop();
        let idx = self.new_msym(path.name())?;
        let sp = self.cursp();
        self.genop(Code::ab(Op::Module, sp, idx));
        let body_idx = self.scope_body(body, val)?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::Exec, sp, body_idx as u32));
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_sclass(
        &mut self,
        expr: &Node,
        body: &ScopeBody,
        val: bool,
    ) -> Result<(), CodegenError> {
        self.codegen(expr, VAL)?;
        self.pop();
        let sp = self.cursp();
        self.genop(Code::ab(Op::SClass, sp, sp));
        let body_idx = self.scope_body(body, val)?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::Exec, sp, body_idx as u32));
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_def(
        &mut self,
        name: &str,
        locals: &[Option<String>],
        params: Option<&Params>,
        body: &Node,
        val: bool,
    ) -> Result<(), CodegenError> {
        let sym = self.new_msym(name)?;
        let idx = self.lambda_body(locals, params, body, false)?;

        let sp = self.cursp();
        self.genop(Code::a(Op::TClass, sp));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abc2(Op::Lambda, sp, idx as u32, L_METHOD));
        self.push()?;
        self.pop();
        self.pop();
        let sp = self.cursp();
        self.genop(Code::ab(Op::Method, sp, sym));
        if val {
            let sp = self.cursp();
            self.genop(Code::abx(Op::LoadSym, sp, sym));
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_sdef(
        &mut self,
        recv: &Node,
        name: &str,
        locals: &[Option<String>],
        params: Option<&Params>,
        body: &Node,
        val: bool,
    ) -> Result<(), CodegenError> {
        let sym = self.new_msym(name)?;
        let idx = self.lambda_body(locals, params, body, false)?;

        self.codegen(recv, VAL)?;
        self.pop();
        let sp = self.cursp();
        self.genop(Code::ab(Op::SClass, sp, sp));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abc2(Op::Lambda, sp, idx as u32, L_METHOD));
        self.pop();
        let sp = self.cursp();
        self.genop(Code::ab(Op::Method, sp, sym));
        if val {
            let sp = self.cursp();
            self.genop(Code::abx(Op::LoadSym, sp, sym));
            self.push()?;
        }
        Ok(())
    }

    /// `alias new old` is a compile-time send of `alias_method`.
    pub(crate) fn gen_alias(&mut self, new_name: &str, old_name: &str, val: bool) -> Result<(), CodegenError> {
        let a = self.new_msym(new_name)?;
        let b = self.new_msym(old_name)?;
        let c = self.new_msym("alias_method")?;
        let sp = self.cursp();
        self.genop(Code::a(Op::TClass, sp));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::LoadSym, sp, a));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::LoadSym, sp, b));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::a(Op::LoadNil, sp));
        self.pop_n(3);
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, c, 2));
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_undef(&mut self, names: &[String], val: bool) -> Result<(), CodegenError> {
        let undef = self.new_msym("undef_method")?;
        let sp = self.cursp();
        self.genop(Code::a(Op::TClass, sp));
        self.push()?;
        let mut num = 0usize;
        for name in names {
            let sym = self.new_msym(name)?;
            let sp = self.cursp();
            self.genop(Code::abx(Op::LoadSym, sp, sym));
            self.push()?;
            num += 1;
        }
        self.pop_n(num + 1);
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, undef, num as u32));
        if val {
            self.push()?;
        }
        Ok(())
    }
}
