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

//! The abstract syntax tree handed over by the parser.
//!
//! The parser ships the tree as a JSON document (`ParsedProgram`); every
//! node carries its source line and an optional file-name index into the
//! program's filename table. Heredocs arrive pre-lowered as `DStr`,
//! function-style calls as `Call` with a `SelfRef` receiver.

use serde::{Deserialize, Serialize};

/// The whole unit the parser hands over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProgram {
    #[serde(default)]
    pub filenames: Vec<String>,
    #[serde(default)]
    pub filename_index: usize,
    /// Disables peephole rewriting for this compilation.
    #[serde(default)]
    pub no_optimize: bool,
    pub root: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub line: u16,
    /// Index into the filename table; present only where the source file
    /// changes mid-tree.
    #[serde(default)]
    pub file: Option<u16>,
    pub kind: NodeKind,
}

impl From<NodeKind> for Node {
    fn from(kind: NodeKind) -> Node {
        Node { line: 0, file: None, kind }
    }
}

/// A lexical compilation unit: the local-variable list in declaration
/// order (unnamed slots belong to destructured parameters) plus the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeBody {
    #[serde(default)]
    pub locals: Vec<Option<String>>,
    pub body: Box<Node>,
}

/// Formal parameters of a method or block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub optional: Vec<(String, Node)>,
    #[serde(default)]
    pub rest: Option<RestParam>,
    #[serde(default)]
    pub post: Vec<String>,
    #[serde(default)]
    pub block: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RestParam {
    /// A bare `*`.
    Anon,
    Named(String),
}

/// One `rescue` clause: exception class list (empty means StandardError),
/// optional binding target, body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueClause {
    #[serde(default)]
    pub exceptions: Vec<Node>,
    #[serde(default)]
    pub binding: Option<Lhs>,
    #[serde(default)]
    pub body: Option<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenClause {
    pub tests: Vec<Node>,
    pub body: Node,
}

/// The base a class or module path hangs off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassPath {
    /// `class Foo` — resolved against the enclosing cref.
    Local(String),
    /// `class ::Foo` — resolved against Object.
    Root(String),
    /// `class Expr::Foo`.
    Under(Box<Node>, String),
}

impl ClassPath {
    pub fn name(&self) -> &str {
        match self {
            ClassPath::Local(n) | ClassPath::Root(n) | ClassPath::Under(_, n) => n,
        }
    }
}

/// An assignment target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Lhs {
    Lvar(String),
    Gvar(String),
    Ivar(String),
    Cvar(String),
    Const(String),
    /// `Expr::CONST = v`
    MCnst { base: Box<Node>, name: String },
    /// `recv.attr = v` or `recv[args] = v` — compiled as a setter call.
    Attr {
        recv: Box<Node>,
        name: String,
        #[serde(default)]
        args: Vec<Node>,
    },
    /// Nested destructuring target.
    Masgn(Box<MasgnPattern>),
    /// A splat with no target (`a, * = xs`); assigning to it is a no-op.
    Discard,
}

/// A destructuring pattern: `pre..., *rest, post...`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasgnPattern {
    #[serde(default)]
    pub pre: Vec<Lhs>,
    #[serde(default)]
    pub rest: Option<Lhs>,
    #[serde(default)]
    pub post: Vec<Lhs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    /// Statement sequence; the value of the last statement is the value
    /// of the whole.
    Begin(Vec<Node>),
    Scope(ScopeBody),

    // Control flow.
    If {
        cond: Box<Node>,
        #[serde(default)]
        then_body: Option<Box<Node>>,
        #[serde(default)]
        else_body: Option<Box<Node>>,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    While { cond: Box<Node>, body: Box<Node> },
    Until { cond: Box<Node>, body: Box<Node> },
    For {
        pattern: MasgnPattern,
        iter: Box<Node>,
        body: Box<Node>,
    },
    Case {
        #[serde(default)]
        subject: Option<Box<Node>>,
        whens: Vec<WhenClause>,
        #[serde(default)]
        else_body: Option<Box<Node>>,
    },
    Rescue {
        #[serde(default)]
        body: Option<Box<Node>>,
        #[serde(default)]
        clauses: Vec<RescueClause>,
        #[serde(default)]
        else_body: Option<Box<Node>>,
    },
    Ensure { body: Box<Node>, guard: ScopeBody },
    Return(Option<Box<Node>>),
    Break(Option<Box<Node>>),
    Next(Option<Box<Node>>),
    Redo,
    Retry,

    // Calls.
    Call {
        recv: Box<Node>,
        method: String,
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        block: Option<Box<Node>>,
    },
    /// Safe navigation: `recv&.method(args)`.
    SCall {
        recv: Box<Node>,
        method: String,
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        block: Option<Box<Node>>,
    },
    Super {
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        block: Option<Box<Node>>,
    },
    /// `super` without an argument list: forwards the enclosing method's
    /// arguments.
    ZSuper {
        #[serde(default)]
        block: Option<Box<Node>>,
    },
    Yield(Vec<Node>),
    /// A `&blk` argument in a call's block slot.
    BlockPass(Box<Node>),

    // Closures.
    Lambda {
        #[serde(default)]
        locals: Vec<Option<String>>,
        #[serde(default)]
        params: Option<Params>,
        body: Box<Node>,
    },
    Block {
        #[serde(default)]
        locals: Vec<Option<String>>,
        #[serde(default)]
        params: Option<Params>,
        body: Box<Node>,
    },

    // Assignment.
    Asgn { lhs: Lhs, rhs: Box<Node> },
    Masgn { pattern: MasgnPattern, rhs: Box<Node> },
    OpAsgn { lhs: Lhs, op: String, rhs: Box<Node> },

    // Variables.
    Lvar(String),
    Gvar(String),
    Ivar(String),
    Cvar(String),
    Const(String),
    /// `base::NAME`
    Colon2 { base: Box<Node>, name: String },
    /// `::NAME`
    Colon3(String),
    /// `$&`, `$'` and friends.
    BackRef(char),
    /// `$1`, `$2`, ...
    NthRef(u8),

    // Literals.
    Int { digits: String, base: u32 },
    Float(String),
    Negate(Box<Node>),
    Str(String),
    DStr(Vec<Node>),
    XStr(String),
    DXStr(Vec<Node>),
    Regx {
        pattern: String,
        #[serde(default)]
        flags: Option<String>,
        #[serde(default)]
        encoding: Option<String>,
    },
    DRegx {
        fragments: Vec<Node>,
        #[serde(default)]
        flags: Option<String>,
    },
    Sym(String),
    DSym(Vec<Node>),
    /// `%w(...)`: each word is a list of fragments concatenated at runtime.
    Words(Vec<Vec<Node>>),
    /// `%i(...)`: like `Words` but every word is interned.
    Symbols(Vec<Vec<Node>>),
    Array(Vec<Node>),
    Splat(Box<Node>),
    Hash(Vec<(Node, Node)>),
    Dot2(Box<Node>, Box<Node>),
    Dot3(Box<Node>, Box<Node>),
    SelfRef,
    Nil,
    True,
    False,

    // Definitions.
    Class {
        path: ClassPath,
        #[serde(default)]
        superclass: Option<Box<Node>>,
        body: ScopeBody,
    },
    Module { path: ClassPath, body: ScopeBody },
    SClass { expr: Box<Node>, body: ScopeBody },
    Def {
        name: String,
        #[serde(default)]
        locals: Vec<Option<String>>,
        #[serde(default)]
        params: Option<Params>,
        body: Box<Node>,
    },
    SDef {
        recv: Box<Node>,
        name: String,
        #[serde(default)]
        locals: Vec<Option<String>>,
        #[serde(default)]
        params: Option<Params>,
        body: Box<Node>,
    },
    Alias { new_name: String, old_name: String },
    Undef(Vec<String>),
}
