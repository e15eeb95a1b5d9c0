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

//! The recursive tree walker that turns an AST into an IREP tree.
//!
//! Every expression is compiled under a value protocol: with `VAL` the
//! result lands in the top register and `sp` grows by one; with `NOVAL`
//! only side effects are emitted and `sp` is unchanged. Forward jumps are
//! threaded through their own `sBx` fields until `dispatch` resolves them.

mod assign;
mod call;
mod defs;
mod flow;
mod literal;
mod peephole;
mod scope;

use log::trace;

use crate::ast::{Node, NodeKind, ParsedProgram, ScopeBody};
use crate::errors::CodegenError;
use crate::irep::{Irep, PoolValue};
use crate::ops::{Code, Op, R_NORMAL, R_RETURN};

pub(crate) use scope::{LoopKind, Scope};

pub(crate) const VAL: bool = true;
pub(crate) const NOVAL: bool = false;

/// Compiles a parsed program into its top-level IREP. There is no partial
/// success: any error aborts the whole compilation.
pub fn generate(program: &ParsedProgram) -> Result<Irep, CodegenError> {
    let mut g = Generator {
        scopes: Vec::new(),
        filenames: program.filenames.clone(),
        no_optimize: program.no_optimize,
        default_filename: program.filenames.get(program.filename_index).cloned(),
        default_filename_index: program.filename_index as u16,
    };
    match &program.root.kind {
        NodeKind::Scope(body) => g.gen_main(&body.locals, &body.body),
        _ => g.gen_main(&[], &program.root),
    }
}

pub(crate) struct Generator {
    pub(crate) scopes: Vec<Scope>,
    filenames: Vec<String>,
    pub(crate) no_optimize: bool,
    default_filename: Option<String>,
    default_filename_index: u16,
}

impl Generator {
    fn gen_main(&mut self, locals: &[Option<String>], body: &Node) -> Result<Irep, CodegenError> {
        self.scope_push(locals, false);
        self.codegen(body, VAL)?;
        let sp = self.cursp() - 1;
        self.genop_peep(Code::ab(Op::Return, sp, R_NORMAL), NOVAL);
        Ok(self.scope_finish())
    }

    /// Compiles a nested lexical unit (class body, ensure clause) as a
    /// child IREP and returns its index in the parent.
    pub(crate) fn scope_body(&mut self, sb: &ScopeBody, val: bool) -> Result<usize, CodegenError> {
        self.scope_push(&sb.locals, false);
        self.codegen(&sb.body, VAL)?;
        if !val {
            self.genop(Code::ab(Op::Return, 0, R_NORMAL));
        } else {
            let sp = self.cursp() - 1;
            self.genop_peep(Code::ab(Op::Return, sp, R_NORMAL), NOVAL);
        }
        let irep = self.scope_finish();
        let s = self.s();
        s.reps.push(irep);
        Ok(s.reps.len() - 1)
    }

    // ---- emission ----

    pub(crate) fn genop(&mut self, i: Code) -> usize {
        let track = self.sr().filename.is_some();
        let line = self.sr().lineno;
        let s = self.s();
        s.iseq.push(i);
        if track {
            s.lines.push(line);
        }
        s.iseq.len() - 1
    }

    /// Removes the most recent instruction (a peephole rewrite dropped it).
    pub(crate) fn pop_last_op(&mut self) {
        let track = self.sr().filename.is_some();
        let s = self.s();
        s.iseq.pop();
        if track {
            s.lines.pop();
        }
    }

    pub(crate) fn new_label(&mut self) -> usize {
        let pc = self.pc();
        self.s().lastlabel = pc;
        pc
    }

    /// Backpatches the forward jump at `pc` to land on the current pc.
    /// Until now its `sBx` held a link to the previous jump on the same
    /// label; from here on it is a real relative offset.
    pub(crate) fn dispatch(&mut self, pc: usize) -> Result<(), CodegenError> {
        let diff = self.pc() - pc;
        let i = self.sr().iseq[pc];
        let here = self.pc();
        self.s().lastlabel = here;
        let op = match i.op() {
            Some(op @ (Op::Jmp | Op::JmpIf | Op::JmpNot | Op::OnErr)) => op,
            _ => {
                return Err(CodegenError::Internal {
                    reason: "dispatch on a non-jump instruction".to_string(),
                });
            }
        };
        self.s().iseq[pc] = Code::asbx(op, i.get_a(), diff as i32);
        trace!("dispatch: pc={} -> +{}", pc, diff);
        Ok(())
    }

    /// Resolves a whole chain of pending jumps (0 terminates the chain).
    pub(crate) fn dispatch_linked(&mut self, mut pc: usize) -> Result<(), CodegenError> {
        if pc == 0 {
            return Ok(());
        }
        loop {
            let i = self.sr().iseq[pc];
            let pos = i.get_sbx();
            self.dispatch(pc)?;
            if pos == 0 {
                break;
            }
            pc = pos as usize;
        }
        Ok(())
    }

    // ---- diagnostics ----

    fn err_file_line(&self) -> (String, u16) {
        match self.scopes.last() {
            Some(s) => (s.filename.clone().unwrap_or_else(|| "-".to_string()), s.lineno),
            None => ("-".to_string(), 0),
        }
    }

    pub(crate) fn err_capacity(&self, reason: &str) -> CodegenError {
        let (file, line) = self.err_file_line();
        CodegenError::Capacity { file, line, reason: reason.to_string() }
    }

    pub(crate) fn err_structural(&self, reason: &str) -> CodegenError {
        let (file, line) = self.err_file_line();
        CodegenError::Structural { file, line, reason: reason.to_string() }
    }

    pub(crate) fn err_input(&self, reason: &str) -> CodegenError {
        let (file, line) = self.err_file_line();
        CodegenError::Input { file, line, reason: reason.to_string() }
    }

    fn switch_file(&mut self, index: u16) {
        if self.sr().filename_index != index {
            let name = self.filenames.get(index as usize).cloned();
            let s = self.s();
            s.filename_index = index;
            if name.is_some() {
                s.filename = name;
            }
        }
    }

    /// Walks outward to the nearest method scope, as `super` and `yield`
    /// addressing does. Returns that scope's argument info and the frame
    /// distance.
    pub(crate) fn nearest_method_scope(&self) -> (u32, u32) {
        let mut lv = 0u32;
        let mut idx = self.scopes.len() - 1;
        loop {
            if self.scopes[idx].mscope {
                return (self.scopes[idx].ainfo as u32, lv);
            }
            lv += 1;
            if idx == 0 {
                return (0, lv);
            }
            idx -= 1;
        }
    }

    /// Compiles an optional subtree; a missing tree contributes nil when a
    /// value is wanted.
    pub(crate) fn gen_opt(&mut self, node: Option<&Node>, val: bool) -> Result<(), CodegenError> {
        match node {
            Some(n) => self.codegen(n, val),
            None => {
                if val {
                    let sp = self.cursp();
                    self.genop(Code::a(Op::LoadNil, sp));
                    self.push()?;
                }
                Ok(())
            }
        }
    }

    // ---- the big dispatch ----

    pub(crate) fn codegen(&mut self, node: &Node, val: bool) -> Result<(), CodegenError> {
        if let Some(fi) = node.file {
            self.switch_file(fi);
        }
        if node.line != 0 {
            self.s().lineno = node.line;
        }
        match &node.kind {
            NodeKind::Begin(stmts) => {
                if val && stmts.is_empty() {
                    let sp = self.cursp();
                    self.genop(Code::a(Op::LoadNil, sp));
                    self.push()?;
                }
                for (i, stmt) in stmts.iter().enumerate() {
                    let last = i + 1 == stmts.len();
                    self.codegen(stmt, if last { val } else { NOVAL })?;
                }
                Ok(())
            }
            NodeKind::Scope(sb) => {
                self.scope_body(sb, NOVAL)?;
                Ok(())
            }

            NodeKind::If { cond, then_body, else_body } => {
                self.gen_if(cond, then_body.as_deref(), else_body.as_deref(), val)
            }
            NodeKind::And(l, r) => self.gen_and_or(l, r, Op::JmpNot, val),
            NodeKind::Or(l, r) => self.gen_and_or(l, r, Op::JmpIf, val),
            NodeKind::While { cond, body } => self.gen_while(cond, body, Op::JmpIf, val),
            NodeKind::Until { cond, body } => self.gen_while(cond, body, Op::JmpNot, val),
            NodeKind::For { pattern, iter, body } => {
                self.gen_for(pattern, iter, body)?;
                if val {
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::Case { subject, whens, else_body } => {
                self.gen_case(subject.as_deref(), whens, else_body.as_deref(), val)
            }
            NodeKind::Rescue { body, clauses, else_body } => {
                self.gen_rescue(body.as_deref(), clauses, else_body.as_deref(), val)
            }
            NodeKind::Ensure { body, guard } => self.gen_ensure(body, guard, val),
            NodeKind::Return(value) => self.gen_return(value.as_deref(), val),
            NodeKind::Break(value) => {
                self.loop_break(value.as_deref())?;
                if val {
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::Next(value) => self.gen_next(value.as_deref(), val),
            NodeKind::Redo => self.gen_redo(),
            NodeKind::Retry => self.gen_retry(),

            NodeKind::Call { recv, method, args, block } => {
                self.gen_call(recv, method, args, block.as_deref(), None, val, false)
            }
            NodeKind::SCall { recv, method, args, block } => {
                self.gen_call(recv, method, args, block.as_deref(), None, val, true)
            }
            NodeKind::Super { args, block } => self.gen_super(args, block.as_deref(), val),
            NodeKind::ZSuper { block } => self.gen_zsuper(block.as_deref(), val),
            NodeKind::Yield(args) => self.gen_yield(args, val),
            NodeKind::BlockPass(inner) => self.codegen(inner, VAL),

            NodeKind::Lambda { locals, params, body } => {
                let idx = self.lambda_body(locals, params.as_ref(), body, true)?;
                let sp = self.cursp();
                self.genop(Code::abc2(Op::Lambda, sp, idx as u32, crate::ops::L_LAMBDA));
                self.push()?;
                Ok(())
            }
            NodeKind::Block { locals, params, body } => {
                let idx = self.lambda_body(locals, params.as_ref(), body, true)?;
                let sp = self.cursp();
                self.genop(Code::abc2(Op::Lambda, sp, idx as u32, crate::ops::L_BLOCK));
                self.push()?;
                Ok(())
            }

            NodeKind::Asgn { lhs, rhs } => {
                self.codegen(rhs, VAL)?;
                self.pop();
                let sp = self.cursp();
                self.gen_assignment(lhs, sp, val)
            }
            NodeKind::Masgn { pattern, rhs } => self.gen_masgn(pattern, rhs, val),
            NodeKind::OpAsgn { lhs, op, rhs } => self.gen_op_asgn(lhs, op, rhs, val),

            NodeKind::Lvar(name) => {
                if val {
                    let idx = self.sr().lv_idx(name);
                    if idx > 0 {
                        let sp = self.cursp();
                        self.genop_peep(Code::ab(Op::Move, sp, idx as u32), NOVAL);
                    } else {
                        let mut lv = 0u32;
                        for up in (0..self.scopes.len() - 1).rev() {
                            let idx = self.scopes[up].lv_idx(name);
                            if idx > 0 {
                                let sp = self.cursp();
                                self.genop(Code::abc(Op::GetUpvar, sp, idx as u32, lv));
                                break;
                            }
                            lv += 1;
                        }
                    }
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::Gvar(name) => self.gen_named_get(Op::GetGlobal, name, val),
            NodeKind::Ivar(name) => self.gen_named_get(Op::GetIv, name, val),
            NodeKind::Cvar(name) => self.gen_named_get(Op::GetCv, name, val),
            NodeKind::Const(name) => {
                let sym = self.new_sym(name);
                let sp = self.cursp();
                self.genop(Code::abx(Op::GetConst, sp, sym));
                if val {
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::Colon2 { base, name } => {
                let sym = self.new_sym(name);
                self.codegen(base, VAL)?;
                self.pop();
                let sp = self.cursp();
                self.genop(Code::abx(Op::GetMCnst, sp, sym));
                if val {
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::Colon3(name) => {
                let sym = self.new_sym(name);
                let sp = self.cursp();
                self.genop(Code::a(Op::OClass, sp));
                self.genop(Code::abx(Op::GetMCnst, sp, sym));
                if val {
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::BackRef(c) => {
                if val {
                    let name = format!("${}", c);
                    self.gen_named_get(Op::GetGlobal, &name, VAL)?;
                }
                Ok(())
            }
            NodeKind::NthRef(n) => {
                if val {
                    let name = format!("${}", n);
                    self.gen_named_get(Op::GetGlobal, &name, VAL)?;
                }
                Ok(())
            }

            NodeKind::Int { digits, base } => {
                if val {
                    self.gen_int(digits, *base, false)?;
                }
                Ok(())
            }
            NodeKind::Float(digits) => {
                if val {
                    self.gen_float(digits, false)?;
                }
                Ok(())
            }
            NodeKind::Negate(inner) => self.gen_negate(inner, val),
            NodeKind::Str(s) => {
                if val {
                    self.gen_str(s)?;
                }
                Ok(())
            }
            NodeKind::DStr(frags) => self.gen_dstr(frags, val),
            NodeKind::XStr(s) => self.gen_xstr(s, val),
            NodeKind::DXStr(frags) => self.gen_dxstr(frags, val),
            NodeKind::Regx { pattern, flags, encoding } => {
                if val {
                    self.gen_regx(pattern, flags.as_deref(), encoding.as_deref())?;
                }
                Ok(())
            }
            NodeKind::DRegx { fragments, flags } => self.gen_dregx(fragments, flags.as_deref(), val),
            NodeKind::Sym(name) => {
                if val {
                    let sym = self.new_sym(name);
                    let sp = self.cursp();
                    self.genop(Code::abx(Op::LoadSym, sp, sym));
                    self.push()?;
                }
                Ok(())
            }
            NodeKind::DSym(frags) => {
                self.gen_dstr(frags, val)?;
                if val {
                    self.gen_send_intern()?;
                }
                Ok(())
            }
            NodeKind::Words(groups) => self.gen_literal_array(groups, false, val),
            NodeKind::Symbols(groups) => self.gen_literal_array(groups, true, val),
            NodeKind::Array(items) => {
                let n = self.gen_values(items, val)?;
                match n {
                    Some(n) => {
                        if val {
                            self.pop_n(n);
                            let sp = self.cursp();
                            self.genop(Code::abc(Op::Array, sp, sp, n as u32));
                            self.push()?;
                        }
                    }
                    None => {
                        if val {
                            self.push()?;
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Splat(inner) => self.codegen(inner, VAL),
            NodeKind::Hash(pairs) => self.gen_hash(pairs, val),
            NodeKind::Dot2(l, r) => self.gen_range(l, r, false, val),
            NodeKind::Dot3(l, r) => self.gen_range(l, r, true, val),
            NodeKind::SelfRef => self.gen_nullary(Op::LoadSelf, val),
            NodeKind::Nil => self.gen_nullary(Op::LoadNil, val),
            NodeKind::True => self.gen_nullary(Op::LoadT, val),
            NodeKind::False => self.gen_nullary(Op::LoadF, val),

            NodeKind::Class { path, superclass, body } => {
                self.gen_class(path, superclass.as_deref(), body, val)
            }
            NodeKind::Module { path, body } => self.gen_module(path, body, val),
            NodeKind::SClass { expr, body } => self.gen_sclass(expr, body, val),
            NodeKind::Def { name, locals, params, body } => {
                self.gen_def(name, locals, params.as_ref(), body, val)
            }
            NodeKind::SDef { recv, name, locals, params, body } => {
                self.gen_sdef(recv, name, locals, params.as_ref(), body, val)
            }
            NodeKind::Alias { new_name, old_name } => self.gen_alias(new_name, old_name, val),
            NodeKind::Undef(names) => self.gen_undef(names, val),
        }
    }

    // ---- small shared emitters ----

    fn gen_named_get(&mut self, op: Op, name: &str, val: bool) -> Result<(), CodegenError> {
        if val {
            let sym = self.new_sym(name);
            let sp = self.cursp();
            self.genop(Code::abx(op, sp, sym));
            self.push()?;
        }
        Ok(())
    }

    fn gen_nullary(&mut self, op: Op, val: bool) -> Result<(), CodegenError> {
        if val {
            let sp = self.cursp();
            self.genop(Code::a(op, sp));
            self.push()?;
        }
        Ok(())
    }

    fn gen_range(&mut self, l: &Node, r: &Node, exclusive: bool, val: bool) -> Result<(), CodegenError> {
        self.codegen(l, val)?;
        self.codegen(r, val)?;
        if val {
            self.pop();
            self.pop();
            let sp = self.cursp();
            self.genop(Code::abc(Op::Range, sp, sp, exclusive as u32));
            self.push()?;
        }
        Ok(())
    }

    fn gen_hash(&mut self, pairs: &[(Node, Node)], val: bool) -> Result<(), CodegenError> {
        let mut len = 0usize;
        let mut update = false;
        for (k, v) in pairs {
            self.codegen(k, val)?;
            self.codegen(v, val)?;
            len += 1;
            // The C operand of Hash holds at most 126 pairs; longer
            // literals are built in chunks and merged.
            if val && len == 126 {
                self.gen_hash_chunk(len, update)?;
                update = true;
                len = 0;
            }
        }
        if val {
            self.gen_hash_chunk(len, update)?;
        }
        Ok(())
    }

    fn gen_hash_chunk(&mut self, len: usize, update: bool) -> Result<(), CodegenError> {
        self.pop_n(len * 2);
        let sp = self.cursp();
        self.genop(Code::abc(Op::Hash, sp, sp, len as u32));
        if update {
            self.pop();
            let sym = self.new_msym("__update")?;
            let sp = self.cursp();
            self.genop(Code::abc(Op::Send, sp, sym, 1));
        }
        self.push()
    }

    fn gen_return(&mut self, value: Option<&Node>, val: bool) -> Result<(), CodegenError> {
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
        if !self.sr().loops.is_empty() {
            // Inside a block the VM must unwind to the defining method.
            self.genop(Code::ab(Op::Return, sp, R_RETURN));
        } else {
            self.genop_peep(Code::ab(Op::Return, sp, R_NORMAL), NOVAL);
        }
        if val {
            self.push()?;
        }
        Ok(())
    }

    /// Appends `sp.intern` on the string sitting on the stack top.
    pub(crate) fn gen_send_intern(&mut self) -> Result<(), CodegenError> {
        self.pop();
        let sym = self.new_msym("intern")?;
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, sym, 0));
        self.push()
    }

    /// Interns a new pool string, for emitters that already hold one.
    pub(crate) fn new_str_lit(&mut self, s: &str) -> u32 {
        self.new_lit(PoolValue::Str(s.to_string()))
    }
}

#[cfg(test)]
mod tests;
