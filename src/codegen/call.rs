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

//! Method dispatch: receivers, argument evaluation, block arguments, the
//! specialized operator opcodes, and the send-vector fallback for splats
//! and oversized argument lists.

use crate::ast::{Node, NodeKind};
use crate::errors::CodegenError;
use crate::ops::{Code, Op, CALL_MAXARGS};

use super::{Generator, NOVAL, VAL};

impl Generator {
    /// Compiles `recv.method(args, &block)`. `sp` carries a precomputed
    /// extra argument register (attribute assignment passes the stored
    /// value this way). `safe` inserts the `&.` nil guard.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn gen_call(
        &mut self,
        recv: &Node,
        method: &str,
        args: &[Node],
        block: Option<&Node>,
        sp: Option<u32>,
        val: bool,
        safe: bool,
    ) -> Result<(), CodegenError> {
        let mut n = 0usize;
        let mut noop = false;
        let mut sendv = false;

        self.codegen(recv, VAL)?;
        let skip = if safe {
            let recv_reg = self.cursp() - 1;
            let c = self.cursp();
            self.genop(Code::a(Op::LoadNil, c));
            self.push()?;
            let c = self.cursp();
            self.genop(Code::ab(Op::Move, c, recv_reg));
            self.pop();
            let eq = self.new_msym("==")?;
            let c = self.cursp();
            self.genop(Code::abc(Op::Eq, c, eq, 1));
            Some(self.genop(Code::asbx(Op::JmpIf, c, 0)))
        } else {
            None
        };
        let idx = self.new_msym(method)?;
        if !args.is_empty() {
            match self.gen_values(args, VAL)? {
                Some(k) => n = k,
                None => {
                    n = 1;
                    noop = true;
                    sendv = true;
                    self.push()?;
                }
            }
        }
        if let Some(spr) = sp {
            if sendv {
                self.pop();
                let c = self.cursp();
                self.genop(Code::ab(Op::AryPush, c, spr));
                self.push()?;
            } else {
                let c = self.cursp();
                self.genop(Code::ab(Op::Move, c, spr));
                self.push()?;
                n += 1;
            }
        }
        let mut have_block = false;
        if let Some(b) = block {
            noop = true;
            have_block = true;
            self.codegen(b, VAL)?;
            self.pop();
        }
        self.push()?; // keep the block slot inside the frame
        self.pop();
        self.pop_n(n + 1);

        let c = self.cursp();
        let specialized = if noop || n != 1 {
            None
        } else {
            match method {
                "+" => Some((Op::Add, true)),
                "-" => Some((Op::Sub, true)),
                "*" => Some((Op::Mul, false)),
                "/" => Some((Op::Div, false)),
                "<" => Some((Op::Lt, false)),
                "<=" => Some((Op::Le, false)),
                ">" => Some((Op::Gt, false)),
                ">=" => Some((Op::Ge, false)),
                "==" => Some((Op::Eq, false)),
                _ => None,
            }
        };
        match specialized {
            Some((op, peep)) => {
                let i = Code::abc(op, c, idx, n as u32);
                if peep {
                    self.genop_peep(i, val);
                } else {
                    self.genop(i);
                }
            }
            None => {
                let argc = if sendv { CALL_MAXARGS } else { n as u32 };
                if have_block {
                    self.genop(Code::abc(Op::SendB, c, idx, argc));
                } else {
                    self.genop(Code::abc(Op::Send, c, idx, argc));
                }
            }
        }
        if let Some(skip) = skip {
            self.dispatch(skip)?;
        }
        if val {
            self.push()?;
        }
        Ok(())
    }

    /// Evaluates an argument list onto the stack. Returns the pushed count,
    /// or `None` after switching to send-vector mode: the arguments were
    /// collected into a single array (splat present, or more than 127).
    pub(crate) fn gen_values(
        &mut self,
        items: &[Node],
        val: bool,
    ) -> Result<Option<usize>, CodegenError> {
        let mut n = 0usize;
        for (i, t) in items.iter().enumerate() {
            let is_splat = matches!(t.kind, NodeKind::Splat(_));
            if n >= CALL_MAXARGS as usize || is_splat {
                if val {
                    let splat_of_array = match &t.kind {
                        NodeKind::Splat(inner) => {
                            n == 0 && matches!(inner.kind, NodeKind::Array(_))
                        }
                        _ => false,
                    };
                    if splat_of_array {
                        // `f(*[a, b])` degenerates to the plain array
                        if let NodeKind::Splat(inner) = &t.kind {
                            self.codegen(inner, VAL)?;
                        }
                        self.pop();
                    } else {
                        self.pop_n(n);
                        let c = self.cursp();
                        self.genop(Code::abc(Op::Array, c, c, n as u32));
                        self.push()?;
                        self.codegen(t, VAL)?;
                        self.pop();
                        self.pop();
                        let c = self.cursp();
                        if is_splat {
                            self.genop(Code::ab(Op::AryCat, c, c + 1));
                        } else {
                            self.genop(Code::ab(Op::AryPush, c, c + 1));
                        }
                    }
                    for t2 in &items[i + 1..] {
                        self.push()?;
                        self.codegen(t2, VAL)?;
                        self.pop();
                        self.pop();
                        let c = self.cursp();
                        if matches!(t2.kind, NodeKind::Splat(_)) {
                            self.genop(Code::ab(Op::AryCat, c, c + 1));
                        } else {
                            self.genop(Code::ab(Op::AryPush, c, c + 1));
                        }
                    }
                } else {
                    match &t.kind {
                        NodeKind::Splat(inner) => self.codegen(inner, NOVAL)?,
                        _ => self.codegen(t, NOVAL)?,
                    }
                    for t2 in &items[i + 1..] {
                        self.codegen(t2, NOVAL)?;
                    }
                }
                return Ok(None);
            }
            self.codegen(t, val)?;
            n += 1;
        }
        Ok(Some(n))
    }

    pub(crate) fn gen_super(
        &mut self,
        args: &[Node],
        block: Option<&Node>,
        val: bool,
    ) -> Result<(), CodegenError> {
        let mut n = 0usize;
        let mut sendv = false;
        self.push()?; // room for the receiver
        if !args.is_empty() {
            match self.gen_values(args, VAL)? {
                Some(k) => n = k,
                None => {
                    n = 1;
                    sendv = true;
                    self.push()?;
                }
            }
        }
        match block {
            Some(b) => {
                self.codegen(b, VAL)?;
                self.pop();
            }
            None => {
                let c = self.cursp();
                self.genop(Code::a(Op::LoadNil, c));
                self.push()?;
                self.pop();
            }
        }
        self.pop_n(n + 1);
        let argc = if sendv { CALL_MAXARGS } else { n as u32 };
        let c = self.cursp();
        self.genop(Code::abc(Op::Super, c, 0, argc));
        if val {
            self.push()?;
        }
        Ok(())
    }

    /// `super` without arguments: re-sends the enclosing method's argument
    /// array, fetched through `lv` frames with `ArgAry`.
    pub(crate) fn gen_zsuper(&mut self, block: Option<&Node>, val: bool) -> Result<(), CodegenError> {
        let (ainfo, lv) = self.nearest_method_scope();
        self.push()?; // room for the receiver
        let c = self.cursp();
        self.genop(Code::abx(Op::ArgAry, c, (ainfo << 4) | (lv & 0xf)));
        self.push()?;
        self.push()?;
        self.pop(); // ArgAry pushes two values
        if let Some(b) = block {
            self.codegen(b, VAL)?;
            self.pop();
        }
        self.pop();
        self.pop();
        let c = self.cursp();
        self.genop(Code::abc(Op::Super, c, 0, CALL_MAXARGS));
        if val {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_yield(&mut self, args: &[Node], val: bool) -> Result<(), CodegenError> {
        let (ainfo, lv) = self.nearest_method_scope();
        let c = self.cursp();
        self.genop(Code::abx(Op::BlkPush, c, (ainfo << 4) | (lv & 0xf)));
        self.push()?;
        let mut n = 0usize;
        let mut sendv = false;
        if !args.is_empty() {
            match self.gen_values(args, VAL)? {
                Some(k) => n = k,
                None => {
                    n = 1;
                    sendv = true;
                    self.push()?;
                }
            }
        }
        self.pop_n(n + 1);
        let argc = if sendv { CALL_MAXARGS } else { n as u32 };
        let sym = self.new_msym("call")?;
        let c = self.cursp();
        self.genop(Code::abc(Op::Send, c, sym, argc));
        if val {
            self.push()?;
        }
        Ok(())
    }
}
