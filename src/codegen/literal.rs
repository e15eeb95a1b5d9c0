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

//! Literal emission: numeric reading with overflow-to-float, string
//! composition, word/symbol lists, and the library-backed regex and
//! backtick forms.

use crate::ast::{Node, NodeKind};
use crate::errors::CodegenError;
use crate::irep::PoolValue;
use crate::ops::{Code, Op, MAXARG_SBX};

use super::{Generator, NOVAL, VAL};

/// Value of an ASCII digit under `base`, or `None` when the character is
/// not a digit of that base. Letters are case-insensitive.
pub fn digit_value(c: char, base: u32) -> Option<i64> {
    let v = match c.to_ascii_lowercase() {
        d @ '0'..='9' => d as i64 - '0' as i64,
        l @ 'a'..='z' => l as i64 - 'a' as i64 + 10,
        _ => return None,
    };
    if v < base as i64 { Some(v) } else { None }
}

impl Generator {
    /// Reads an integer literal. Accepts a leading `+`; a leading `-`
    /// belongs to the surrounding negate node. Returns `None` when the
    /// value does not fit a machine integer.
    fn readint(&self, digits: &str, base: u32, neg: bool) -> Result<Option<i64>, CodegenError> {
        debug_assert!((2..=36).contains(&base));
        let mut p = digits;
        if let Some(rest) = p.strip_prefix('+') {
            p = rest;
        }
        let mut result: i64 = 0;
        for c in p.chars() {
            let n = match digit_value(c, base) {
                Some(n) => n,
                None => return Err(self.err_input("malformed readint input")),
            };
            let next = if neg {
                result.checked_mul(base as i64).and_then(|r| r.checked_sub(n))
            } else {
                result.checked_mul(base as i64).and_then(|r| r.checked_add(n))
            };
            match next {
                Some(r) => result = r,
                None => return Ok(None),
            }
        }
        Ok(Some(result))
    }

    /// The overflow fallback: the same digits accumulated into a double.
    fn readint_float(&self, digits: &str, base: u32) -> Result<f64, CodegenError> {
        let mut p = digits;
        if let Some(rest) = p.strip_prefix('+') {
            p = rest;
        }
        let mut f = 0.0f64;
        for c in p.chars() {
            match digit_value(c, base) {
                Some(n) => f = f * base as f64 + n as f64,
                None => return Err(self.err_input("malformed readint input")),
            }
        }
        Ok(f)
    }

    pub(crate) fn gen_int(&mut self, digits: &str, base: u32, neg: bool) -> Result<(), CodegenError> {
        match self.readint(digits, base, neg)? {
            Some(i) if i < MAXARG_SBX && i > -MAXARG_SBX => {
                let sp = self.cursp();
                self.genop(Code::asbx(Op::LoadI, sp, i as i32));
            }
            Some(i) => {
                let off = self.new_lit(PoolValue::Int(i));
                let sp = self.cursp();
                self.genop(Code::abx(Op::LoadL, sp, off));
            }
            None => {
                // too wide for a machine integer: silently widen to float
                let f = self.readint_float(digits, base)?;
                let f = if neg { -f } else { f };
                let off = self.new_lit(PoolValue::Float(f));
                let sp = self.cursp();
                self.genop(Code::abx(Op::LoadL, sp, off));
            }
        }
        self.push()
    }

    pub(crate) fn gen_float(&mut self, digits: &str, neg: bool) -> Result<(), CodegenError> {
        let f: f64 = digits
            .parse()
            .map_err(|_| self.err_input("malformed float literal"))?;
        let f = if neg { -f } else { f };
        let off = self.new_lit(PoolValue::Float(f));
        let sp = self.cursp();
        self.genop(Code::abx(Op::LoadL, sp, off));
        self.push()
    }

    /// Negation folds into numeric literals; anything else compiles as
    /// `0 - expr`.
    pub(crate) fn gen_negate(&mut self, inner: &Node, val: bool) -> Result<(), CodegenError> {
        match &inner.kind {
            NodeKind::Int { digits, base } => {
                if val {
                    self.gen_int(digits, *base, true)?;
                }
                Ok(())
            }
            NodeKind::Float(digits) => {
                if val {
                    self.gen_float(digits, true)?;
                }
                Ok(())
            }
            _ => {
                let sym = self.new_msym("-")?;
                let sp = self.cursp();
                self.genop(Code::asbx(Op::LoadI, sp, 0));
                self.push()?;
                self.codegen(inner, VAL)?;
                self.pop();
                self.pop();
                let sp = self.cursp();
                self.genop(Code::abc(Op::Sub, sp, sym, 2));
                if val {
                    self.push()?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn gen_str(&mut self, s: &str) -> Result<(), CodegenError> {
        let off = self.new_str_lit(s);
        let sp = self.cursp();
        self.genop(Code::abx(Op::String, sp, off));
        self.push()
    }

    /// Interpolated string: fragments concatenated pairwise with `StrCat`.
    pub(crate) fn gen_dstr(&mut self, frags: &[Node], val: bool) -> Result<(), CodegenError> {
        if val {
            let Some((first, rest)) = frags.split_first() else {
                return Ok(());
            };
            self.codegen(first, VAL)?;
            for frag in rest {
                self.codegen(frag, VAL)?;
                self.pop();
                self.pop();
                let sp = self.cursp();
                self.genop_peep(Code::ab(Op::StrCat, sp, sp + 1), VAL);
                self.push()?;
            }
        } else {
            for frag in frags {
                if !matches!(frag.kind, NodeKind::Str(_)) {
                    self.codegen(frag, NOVAL)?;
                }
            }
        }
        Ok(())
    }

    /// `%w`/`%i` lists: every word is a fragment group; `%i` interns each
    /// finished word.
    pub(crate) fn gen_literal_array(
        &mut self,
        groups: &[Vec<Node>],
        sym: bool,
        val: bool,
    ) -> Result<(), CodegenError> {
        if val {
            let mut count = 0u32;
            for group in groups {
                let mut j = 0;
                for frag in group {
                    self.codegen(frag, VAL)?;
                    j += 1;
                    if j >= 2 {
                        self.pop();
                        self.pop();
                        let sp = self.cursp();
                        self.genop_peep(Code::ab(Op::StrCat, sp, sp + 1), VAL);
                        self.push()?;
                        j = 1;
                    }
                }
                if j > 0 {
                    count += 1;
                    if sym {
                        self.gen_send_intern()?;
                    }
                }
            }
            self.pop_n(count as usize);
            let sp = self.cursp();
            self.genop(Code::abc(Op::Array, sp, sp, count));
            self.push()
        } else {
            for group in groups {
                for frag in group {
                    if !matches!(frag.kind, NodeKind::Str(_)) {
                        self.codegen(frag, NOVAL)?;
                    }
                }
            }
            Ok(())
        }
    }

    /// Backtick literal: `Kernel.`(str)`.
    pub(crate) fn gen_xstr(&mut self, s: &str, val: bool) -> Result<(), CodegenError> {
        let sym = self.new_sym("Kernel");
        let off = self.new_str_lit(s);
        if !val {
            self.push()?;
        }
        let sp = self.cursp();
        self.genop(Code::a(Op::OClass, sp));
        self.genop(Code::abx(Op::GetMCnst, sp, sym));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::String, sp, off));
        self.pop();
        let tick = self.new_sym("`");
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, tick, 1));
        if !val {
            self.pop();
        } else {
            self.push()?;
        }
        Ok(())
    }

    pub(crate) fn gen_dxstr(&mut self, frags: &[Node], val: bool) -> Result<(), CodegenError> {
        let sym = self.new_sym("Kernel");
        if !val {
            self.push()?;
        }
        let sp = self.cursp();
        self.genop(Code::a(Op::OClass, sp));
        self.genop(Code::abx(Op::GetMCnst, sp, sym));
        self.push()?;
        let Some((first, rest)) = frags.split_first() else {
            return Err(self.err_input("empty backtick interpolation"));
        };
        self.codegen(first, VAL)?;
        for frag in rest {
            self.codegen(frag, VAL)?;
            self.pop();
            self.pop();
            let sp = self.cursp();
            self.genop_peep(Code::ab(Op::StrCat, sp, sp + 1), VAL);
            self.push()?;
        }
        self.pop();
        self.pop();
        let tick = self.new_sym("`");
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, tick, 1));
        if !val {
            self.pop();
        } else {
            self.push()?;
        }
        Ok(())
    }

    /// Regex literal: `Regexp.compile(pattern[, flags[, encoding]])`.
    pub(crate) fn gen_regx(
        &mut self,
        pattern: &str,
        flags: Option<&str>,
        encoding: Option<&str>,
    ) -> Result<(), CodegenError> {
        let sym = self.new_sym("Regexp");
        let off = self.new_str_lit(pattern);
        let mut argc = 1u32;
        let sp = self.cursp();
        self.genop(Code::a(Op::OClass, sp));
        self.genop(Code::abx(Op::GetMCnst, sp, sym));
        self.push()?;
        let sp = self.cursp();
        self.genop(Code::abx(Op::String, sp, off));
        if flags.is_some() || encoding.is_some() {
            self.push()?;
            let sp = self.cursp();
            match flags {
                Some(f) => {
                    let off = self.new_str_lit(f);
                    self.genop(Code::abx(Op::String, sp, off));
                }
                None => {
                    self.genop(Code::a(Op::LoadNil, sp));
                }
            }
            argc += 1;
            if let Some(e) = encoding {
                self.push()?;
                let off = self.new_str_lit(e);
                let sp = self.cursp();
                self.genop(Code::abx(Op::String, sp, off));
                argc += 1;
                self.pop();
            }
            self.pop();
        }
        self.pop();
        let compile = self.new_sym("compile");
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, compile, argc));
        self.push()
    }

    pub(crate) fn gen_dregx(
        &mut self,
        frags: &[Node],
        flags: Option<&str>,
        val: bool,
    ) -> Result<(), CodegenError> {
        if !val {
            for frag in frags {
                if !matches!(frag.kind, NodeKind::Str(_)) {
                    self.codegen(frag, NOVAL)?;
                }
            }
            return Ok(());
        }
        let sym = self.new_sym("Regexp");
        let mut argc = 1u32;
        let sp = self.cursp();
        self.genop(Code::a(Op::OClass, sp));
        self.genop(Code::abx(Op::GetMCnst, sp, sym));
        self.push()?;
        let Some((first, rest)) = frags.split_first() else {
            return Err(self.err_input("empty regex interpolation"));
        };
        self.codegen(first, VAL)?;
        for frag in rest {
            self.codegen(frag, VAL)?;
            self.pop();
            self.pop();
            let sp = self.cursp();
            self.genop_peep(Code::ab(Op::StrCat, sp, sp + 1), VAL);
            self.push()?;
        }
        if let Some(f) = flags {
            self.push()?;
            let off = self.new_str_lit(f);
            let sp = self.cursp();
            self.genop(Code::abx(Op::String, sp, off));
            argc += 1;
            self.pop();
        }
        self.pop();
        let compile = self.new_sym("compile");
        let sp = self.cursp();
        self.genop(Code::abc(Op::Send, sp, compile, argc));
        self.push()
    }
}
