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

//! The 32-bit instruction word and its operand layouts.
//!
//! Bit layout, low to high: 7-bit opcode, then `A` (9 bits), `B` (9 bits),
//! `C` (7 bits). `Bx` overlays `B`+`C` as one 16-bit field, `Ax` overlays
//! everything past the opcode as 25 bits, and `Abc` splits the `Bx` area
//! into a 14-bit `b` and a 2-bit `c` (used by `Lambda`). `sBx` is `Bx`
//! biased by 0x7FFF so it can hold signed jump offsets.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Maximum magnitude of an `sBx` immediate; integer literals outside
/// `(-MAXARG_SBX, MAXARG_SBX)` go to the constant pool instead.
pub const MAXARG_SBX: i64 = 0x7FFF;

/// Argument-count sentinel meaning "arguments were packed into one array".
pub const CALL_MAXARGS: u32 = 127;

/// `Lambda` kind operands (the 2-bit `c` field).
pub const L_METHOD: u32 = 1;
pub const L_BLOCK: u32 = 2;
pub const L_LAMBDA: u32 = 3;

/// `Return` kind operands (the `B` field).
pub const R_NORMAL: u32 = 0;
pub const R_BREAK: u32 = 1;
pub const R_RETURN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Op {
    Nop = 0,
    Move,
    LoadL,
    LoadI,
    LoadSym,
    LoadNil,
    LoadSelf,
    LoadT,
    LoadF,
    GetGlobal,
    SetGlobal,
    GetSpecial,
    SetSpecial,
    GetIv,
    SetIv,
    GetCv,
    SetCv,
    GetConst,
    SetConst,
    GetMCnst,
    SetMCnst,
    GetUpvar,
    SetUpvar,
    Jmp,
    JmpIf,
    JmpNot,
    OnErr,
    Rescue,
    PopErr,
    Raise,
    EPush,
    EPop,
    Send,
    SendB,
    Super,
    ArgAry,
    Enter,
    Return,
    BlkPush,
    Add,
    AddI,
    Sub,
    SubI,
    Mul,
    Div,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Array,
    AryCat,
    AryPush,
    ARef,
    APost,
    String,
    StrCat,
    Hash,
    Lambda,
    Range,
    OClass,
    Class,
    Module,
    Exec,
    Method,
    SClass,
    TClass,
    Stop,
    // Runtime-error opcode kept for VM ABI compatibility; the generator
    // reports structural violations at compile time instead of emitting it.
    Err,
}

/// Operand layout of an opcode, used by the disassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFormat {
    A,
    AB,
    ABC,
    ABx,
    AsBx,
    Bx,
    SBx,
    Ax,
    Abc,
}

impl Op {
    pub fn format(self) -> OpFormat {
        use Op::*;
        match self {
            Nop | Stop | LoadNil | LoadSelf | LoadT | LoadF | OClass | TClass | Rescue
            | Raise | PopErr | EPop => OpFormat::A,
            Move | Class | Module | Method | SClass | AryCat | AryPush | StrCat | Return => {
                OpFormat::AB
            }
            LoadL | LoadSym | GetGlobal | SetGlobal | GetSpecial | SetSpecial | GetIv
            | SetIv | GetCv | SetCv | GetConst | SetConst | GetMCnst | SetMCnst | String
            | ArgAry | BlkPush | Exec | Err => OpFormat::ABx,
            GetUpvar | SetUpvar | Send | SendB | Super | Add | AddI | Sub | SubI | Mul
            | Div | Eq | Lt | Le | Gt | Ge | Array | ARef | APost | Hash | Range => {
                OpFormat::ABC
            }
            LoadI => OpFormat::AsBx,
            Jmp | JmpIf | JmpNot | OnErr => OpFormat::SBx,
            EPush => OpFormat::Bx,
            Enter => OpFormat::Ax,
            Lambda => OpFormat::Abc,
        }
    }
}

/// One encoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code(pub u32);

impl Code {
    pub fn a(op: Op, a: u32) -> Code {
        Code(u8::from(op) as u32 | ((a & 0x1ff) << 7))
    }

    pub fn ab(op: Op, a: u32, b: u32) -> Code {
        Code(u8::from(op) as u32 | ((a & 0x1ff) << 7) | ((b & 0x1ff) << 16))
    }

    pub fn abc(op: Op, a: u32, b: u32, c: u32) -> Code {
        Code(u8::from(op) as u32 | ((a & 0x1ff) << 7) | ((b & 0x1ff) << 16) | ((c & 0x7f) << 25))
    }

    pub fn abx(op: Op, a: u32, bx: u32) -> Code {
        Code(u8::from(op) as u32 | ((a & 0x1ff) << 7) | ((bx & 0xffff) << 16))
    }

    pub fn asbx(op: Op, a: u32, sbx: i32) -> Code {
        Code::abx(op, a, (sbx + MAXARG_SBX as i32) as u32)
    }

    pub fn bx(op: Op, bx: u32) -> Code {
        Code::abx(op, 0, bx)
    }

    pub fn sbx(op: Op, sbx: i32) -> Code {
        Code::asbx(op, 0, sbx)
    }

    pub fn ax(op: Op, ax: u32) -> Code {
        Code(u8::from(op) as u32 | ((ax & 0x1ff_ffff) << 7))
    }

    /// The `Abc` layout: 9-bit `a`, 14-bit `b`, 2-bit `c`.
    pub fn abc2(op: Op, a: u32, b: u32, c: u32) -> Code {
        Code(u8::from(op) as u32 | ((a & 0x1ff) << 7) | ((b & 0x3fff) << 16) | ((c & 0x3) << 30))
    }

    pub fn opcode(self) -> u8 {
        (self.0 & 0x7f) as u8
    }

    pub fn op(self) -> Option<Op> {
        Op::try_from(self.opcode()).ok()
    }

    pub fn get_a(self) -> u32 {
        (self.0 >> 7) & 0x1ff
    }

    pub fn get_b(self) -> u32 {
        (self.0 >> 16) & 0x1ff
    }

    pub fn get_c(self) -> u32 {
        (self.0 >> 25) & 0x7f
    }

    pub fn get_bx(self) -> u32 {
        (self.0 >> 16) & 0xffff
    }

    pub fn get_sbx(self) -> i32 {
        self.get_bx() as i32 - MAXARG_SBX as i32
    }

    pub fn get_ax(self) -> u32 {
        (self.0 >> 7) & 0x1ff_ffff
    }

    pub fn get_b14(self) -> u32 {
        (self.0 >> 16) & 0x3fff
    }

    pub fn get_c2(self) -> u32 {
        (self.0 >> 30) & 0x3
    }
}

/// Packs the `Enter` argument-spec word:
/// `(ma<<18)|(oa<<13)|(ra<<12)|(pa<<7)|(ka<<2)|(kd<<1)|ba`.
/// `ka` and `kd` are carried for ABI compatibility and always zero here.
pub fn mk_aspec(ma: u32, oa: u32, ra: u32, pa: u32, ka: u32, kd: u32, ba: u32) -> u32 {
    ((ma & 0x1f) << 18)
        | ((oa & 0x1f) << 13)
        | ((ra & 1) << 12)
        | ((pa & 0x1f) << 7)
        | ((ka & 0x1f) << 2)
        | ((kd & 1) << 1)
        | (ba & 1)
}
