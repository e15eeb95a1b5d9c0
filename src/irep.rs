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

//! The compiled unit record handed to the virtual machine.

use serde::{Deserialize, Serialize};

use crate::ops::Code;

/// A pooled literal. The pool deduplicates by structural equality: byte
/// equality for strings, numeric equality for integers and floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolValue {
    Str(String),
    Int(i64),
    Float(f64),
}

/// A local-variable debug record: declared name (unnamed slots belong to
/// destructured parameters) and the register it occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub name: Option<String>,
    pub r: u16,
}

/// One compiled lexical unit.
///
/// `syms` may contain `None` holes: when the symbol table first grows past
/// the 256-entry method-symbol prefix, the prefix is padded so that general
/// symbols start at index 256, and later method symbols fill the holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Irep {
    pub nlocals: u16,
    pub nregs: u16,
    pub iseq: Vec<Code>,
    /// Per-instruction source lines; empty unless a filename is known.
    pub lines: Vec<u16>,
    pub pool: Vec<PoolValue>,
    pub syms: Vec<Option<String>>,
    pub reps: Vec<Irep>,
    pub lv: Vec<Local>,
    pub filename: Option<String>,
}

impl Irep {
    pub fn ilen(&self) -> usize {
        self.iseq.len()
    }
}
