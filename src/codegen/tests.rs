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

use super::*;
use crate::ast::{
    ClassPath, Lhs, MasgnPattern, Node, NodeKind, Params, ParsedProgram, RescueClause, ScopeBody,
    WhenClause,
};
use crate::errors::CodegenError;
use crate::irep::{Irep, PoolValue};
use crate::ops::{Code, Op, L_LAMBDA, L_METHOD, R_NORMAL};
use crate::verify::verify;

fn n(kind: NodeKind) -> Node {
    Node::from(kind)
}

fn bx(kind: NodeKind) -> Box<Node> {
    Box::new(n(kind))
}

fn int(digits: &str) -> Node {
    n(NodeKind::Int { digits: digits.to_string(), base: 10 })
}

fn lvar(name: &str) -> Node {
    n(NodeKind::Lvar(name.to_string()))
}

fn string(s: &str) -> Node {
    n(NodeKind::Str(s.to_string()))
}

fn fcall(method: &str) -> Node {
    n(NodeKind::Call {
        recv: bx(NodeKind::SelfRef),
        method: method.to_string(),
        args: vec![],
        block: None,
    })
}

fn binop(l: Node, op: &str, r: Node) -> Node {
    n(NodeKind::Call {
        recv: Box::new(l),
        method: op.to_string(),
        args: vec![r],
        block: None,
    })
}

fn locals(names: &[&str]) -> Vec<Option<String>> {
    names.iter().map(|s| Some(s.to_string())).collect()
}

fn program(root: Node) -> ParsedProgram {
    ParsedProgram { filenames: vec![], filename_index: 0, no_optimize: false, root }
}

fn compile(root: Node) -> Irep {
    let irep = generate(&program(root)).unwrap();
    verify(&irep).unwrap();
    irep
}

fn compile_with_locals(names: &[&str], body: Node) -> Irep {
    compile(n(NodeKind::Scope(ScopeBody { locals: locals(names), body: Box::new(body) })))
}

fn compile_err(root: Node) -> CodegenError {
    generate(&program(root)).unwrap_err()
}

fn ops_of(irep: &Irep) -> Vec<Op> {
    irep.iseq.iter().map(|c| c.op().unwrap()).collect()
}

#[test]
fn test_literal_int_loads_immediate() {
    let irep = compile(int("42"));
    assert_eq!(
        irep.iseq,
        vec![Code::asbx(Op::LoadI, 1, 42), Code::ab(Op::Return, 1, R_NORMAL)]
    );
    assert_eq!(irep.nlocals, 1);
    assert_eq!(irep.nregs, 2);
    assert!(irep.pool.is_empty());
}

#[test]
fn test_large_int_goes_to_pool() {
    let irep = compile(int("40000"));
    assert_eq!(irep.iseq[0], Code::abx(Op::LoadL, 1, 0));
    assert_eq!(irep.pool, vec![PoolValue::Int(40000)]);
}

#[test]
fn test_int_overflow_widens_to_float() {
    let irep = compile(int("99999999999999999999999"));
    assert_eq!(irep.iseq[0], Code::abx(Op::LoadL, 1, 0));
    match &irep.pool[0] {
        PoolValue::Float(f) => assert!((f / 1e23 - 1.0).abs() < 1e-12, "pool float {}", f),
        other => panic!("expected float pool entry, got {:?}", other),
    }
}

#[test]
fn test_negative_int_folds_at_compile_time() {
    let irep = compile(n(NodeKind::Negate(Box::new(int("5")))));
    assert_eq!(irep.iseq[0], Code::asbx(Op::LoadI, 1, -5));
}

#[test]
fn test_generic_negate_compiles_zero_minus() {
    let irep = compile(n(NodeKind::Negate(Box::new(fcall("x")))));
    assert_eq!(
        irep.iseq,
        vec![
            Code::asbx(Op::LoadI, 1, 0),
            Code::a(Op::LoadSelf, 2),
            Code::abc(Op::Send, 2, 1, 0),
            Code::abc(Op::Sub, 1, 0, 2),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("-"));
    assert_eq!(irep.syms[1].as_deref(), Some("x"));
}

#[test]
fn test_closure_reads_upvar() {
    // def f; x = 1; -> { x } end
    let lambda = n(NodeKind::Lambda { locals: vec![], params: None, body: Box::new(lvar("x")) });
    let def = n(NodeKind::Def {
        name: "f".to_string(),
        locals: locals(&["x"]),
        params: Some(Params::default()),
        body: bx(NodeKind::Begin(vec![
            n(NodeKind::Asgn { lhs: Lhs::Lvar("x".to_string()), rhs: Box::new(int("1")) }),
            lambda,
        ])),
    });
    let irep = compile(def);

    let method = &irep.reps[0];
    assert_eq!(
        method.iseq,
        vec![
            Code::ax(Op::Enter, 0),
            Code::asbx(Op::LoadI, 1, 1),
            Code::abc2(Op::Lambda, 2, 0, L_LAMBDA),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
    let closure = &method.reps[0];
    assert_eq!(
        closure.iseq,
        vec![Code::abc(Op::GetUpvar, 1, 1, 0), Code::ab(Op::Return, 1, R_NORMAL)]
    );
}

#[test]
fn test_def_registers_method() {
    let def = n(NodeKind::Def {
        name: "f".to_string(),
        locals: vec![],
        params: Some(Params::default()),
        body: bx(NodeKind::Nil),
    });
    let irep = compile(def);
    assert_eq!(
        irep.iseq,
        vec![
            Code::a(Op::TClass, 1),
            Code::abc2(Op::Lambda, 2, 0, L_METHOD),
            Code::ab(Op::Method, 1, 0),
            Code::abx(Op::LoadSym, 1, 0),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("f"));
}

#[test]
fn test_optional_params_build_jump_table() {
    // def g(a, b = 1); end
    let def = n(NodeKind::Def {
        name: "g".to_string(),
        locals: locals(&["a", "b"]),
        params: Some(Params {
            mandatory: vec!["a".to_string()],
            optional: vec![("b".to_string(), int("1"))],
            ..Params::default()
        }),
        body: bx(NodeKind::Nil),
    });
    let irep = compile(def);
    let method = &irep.reps[0];
    assert_eq!(
        method.iseq,
        vec![
            Code::ax(Op::Enter, (1 << 18) | (1 << 13)),
            Code::sbx(Op::Jmp, 2),
            Code::sbx(Op::Jmp, 2),
            Code::asbx(Op::LoadI, 2, 1),
            Code::a(Op::LoadNil, 3),
            Code::ab(Op::Return, 3, R_NORMAL),
        ]
    );
}

#[test]
fn test_masgn_static_array_rhs() {
    // a, *b, c = [1, 2, 3, 4]
    let masgn = n(NodeKind::Masgn {
        pattern: MasgnPattern {
            pre: vec![Lhs::Lvar("a".to_string())],
            rest: Some(Lhs::Lvar("b".to_string())),
            post: vec![Lhs::Lvar("c".to_string())],
        },
        rhs: bx(NodeKind::Array(vec![int("1"), int("2"), int("3"), int("4")])),
    });
    let irep = compile_with_locals(&["a", "b", "c"], masgn);
    assert_eq!(
        irep.iseq,
        vec![
            Code::asbx(Op::LoadI, 4, 1),
            Code::asbx(Op::LoadI, 5, 2),
            Code::asbx(Op::LoadI, 6, 3),
            Code::asbx(Op::LoadI, 7, 4),
            Code::ab(Op::Move, 1, 4),
            Code::abc(Op::Array, 2, 5, 2),
            Code::ab(Op::Move, 3, 7),
            Code::abc(Op::Array, 4, 4, 4),
            Code::ab(Op::Return, 4, R_NORMAL),
        ]
    );
}

#[test]
fn test_masgn_dynamic_rhs_uses_apost() {
    // a, *b, c = xs
    let masgn = n(NodeKind::Masgn {
        pattern: MasgnPattern {
            pre: vec![Lhs::Lvar("a".to_string())],
            rest: Some(Lhs::Lvar("b".to_string())),
            post: vec![Lhs::Lvar("c".to_string())],
        },
        rhs: Box::new(lvar("xs")),
    });
    let irep = compile_with_locals(&["a", "b", "c", "xs"], masgn);
    assert_eq!(
        irep.iseq,
        vec![
            Code::ab(Op::Move, 5, 4),
            Code::abc(Op::ARef, 1, 5, 0),
            Code::ab(Op::Move, 6, 5),
            Code::abc(Op::APost, 6, 1, 1),
            Code::ab(Op::Move, 2, 6),
            Code::ab(Op::Move, 3, 7),
            Code::ab(Op::Return, 6, R_NORMAL),
        ]
    );
}

#[test]
fn test_peephole_keeps_addi_operand_intact() {
    // x = 1 + 2 fuses the immediate but not the move: the A field of an
    // arithmetic opcode is also its left operand.
    let asgn = n(NodeKind::Asgn {
        lhs: Lhs::Lvar("x".to_string()),
        rhs: Box::new(binop(int("1"), "+", int("2"))),
    });
    let irep = compile_with_locals(&["x"], asgn);
    assert_eq!(
        irep.iseq,
        vec![
            Code::asbx(Op::LoadI, 2, 1),
            Code::abc(Op::AddI, 2, 0, 2),
            Code::ab(Op::Move, 1, 2),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("+"));
}

#[test]
fn test_addi_range_boundary() {
    let fused = compile(binop(int("1"), "+", int("127")));
    assert_eq!(fused.iseq[1], Code::abc(Op::AddI, 1, 0, 127));

    let unfused = compile(binop(int("1"), "+", int("128")));
    assert_eq!(
        unfused.iseq,
        vec![
            Code::asbx(Op::LoadI, 1, 1),
            Code::asbx(Op::LoadI, 2, 128),
            Code::abc(Op::Add, 1, 0, 1),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_subtraction_fuses_to_subi() {
    let irep = compile(binop(int("10"), "-", int("5")));
    assert_eq!(irep.iseq[1], Code::abc(Op::SubI, 1, 0, 5));
}

#[test]
fn test_safe_navigation_guard() {
    let scall = n(NodeKind::SCall {
        recv: Box::new(lvar("obj")),
        method: "m".to_string(),
        args: vec![],
        block: None,
    });
    let irep = compile_with_locals(&["obj"], scall);
    assert_eq!(
        irep.iseq,
        vec![
            Code::ab(Op::Move, 2, 1),
            Code::a(Op::LoadNil, 3),
            Code::ab(Op::Move, 4, 2),
            Code::abc(Op::Eq, 3, 0, 1),
            Code::asbx(Op::JmpIf, 3, 2),
            Code::abc(Op::Send, 2, 1, 0),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("=="));
    assert_eq!(irep.syms[1].as_deref(), Some("m"));
}

#[test]
fn test_if_literal_condition_folds() {
    let folded = compile(n(NodeKind::If {
        cond: bx(NodeKind::True),
        then_body: Some(Box::new(string("X"))),
        else_body: Some(Box::new(string("Y"))),
    }));
    assert_eq!(folded, compile(string("X")));
}

#[test]
fn test_if_else_value() {
    let irep = compile(n(NodeKind::If {
        cond: Box::new(fcall("p")),
        then_body: Some(Box::new(int("1"))),
        else_body: Some(Box::new(int("2"))),
    }));
    assert_eq!(
        irep.iseq,
        vec![
            Code::a(Op::LoadSelf, 1),
            Code::abc(Op::Send, 1, 0, 0),
            Code::asbx(Op::JmpNot, 1, 3),
            Code::asbx(Op::LoadI, 1, 1),
            Code::sbx(Op::Jmp, 2),
            Code::asbx(Op::LoadI, 1, 2),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_and_shortcircuits() {
    let irep = compile(n(NodeKind::And(Box::new(fcall("a")), Box::new(fcall("b")))));
    assert_eq!(
        ops_of(&irep),
        vec![Op::LoadSelf, Op::Send, Op::JmpNot, Op::LoadSelf, Op::Send, Op::Return]
    );
    assert_eq!(irep.iseq[2].get_sbx(), 3);
}

#[test]
fn test_while_loop_shape() {
    let irep = compile(n(NodeKind::While {
        cond: bx(NodeKind::True),
        body: Box::new(fcall("work")),
    }));
    assert_eq!(
        irep.iseq,
        vec![
            Code::sbx(Op::Jmp, 3),
            Code::a(Op::LoadSelf, 1),
            Code::abc(Op::Send, 1, 0, 0),
            Code::a(Op::LoadT, 1),
            Code::asbx(Op::JmpIf, 1, -3),
            Code::a(Op::LoadNil, 1),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_for_desugars_to_each() {
    let forloop = n(NodeKind::For {
        pattern: MasgnPattern {
            pre: vec![Lhs::Lvar("i".to_string())],
            rest: None,
            post: vec![],
        },
        iter: Box::new(lvar("xs")),
        body: Box::new(fcall("work")),
    });
    let irep = compile_with_locals(&["i", "xs"], forloop);
    assert_eq!(
        ops_of(&irep),
        vec![Op::Move, Op::Lambda, Op::SendB, Op::Return]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("each"));
    let block = &irep.reps[0];
    // Enter, write the loop variable upward, call work, return.
    assert_eq!(block.iseq[0], Code::ax(Op::Enter, 0x40000));
    assert_eq!(block.iseq[1], Code::abc(Op::SetUpvar, 1, 1, 0));
    assert_eq!(ops_of(block), vec![Op::Enter, Op::SetUpvar, Op::LoadSelf, Op::Send, Op::Return]);
}

#[test]
fn test_case_dispatch() {
    let case = n(NodeKind::Case {
        subject: Some(Box::new(lvar("x"))),
        whens: vec![WhenClause { tests: vec![int("1")], body: string("one") }],
        else_body: Some(Box::new(string("other"))),
    });
    let irep = compile_with_locals(&["x"], case);
    assert_eq!(
        irep.iseq,
        vec![
            Code::ab(Op::Move, 2, 1),
            Code::asbx(Op::LoadI, 3, 1),
            Code::ab(Op::Move, 4, 2),
            Code::abc(Op::Send, 3, 0, 1),
            Code::asbx(Op::JmpIf, 3, 2),
            Code::sbx(Op::Jmp, 3),
            Code::abx(Op::String, 3, 0),
            Code::sbx(Op::Jmp, 4),
            Code::abx(Op::String, 3, 1),
            Code::sbx(Op::Jmp, 2),
            Code::a(Op::LoadNil, 3),
            Code::ab(Op::Return, 3, R_NORMAL),
        ]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("==="));
}

#[test]
fn test_rescue_shape() {
    let rescue = n(NodeKind::Rescue {
        body: Some(Box::new(fcall("risky"))),
        clauses: vec![RescueClause {
            exceptions: vec![n(NodeKind::Const("SomeError".to_string()))],
            binding: Some(Lhs::Lvar("e".to_string())),
            body: Some(fcall("handler")),
        }],
        else_body: None,
    });
    let irep = compile_with_locals(&["e"], rescue);
    assert_eq!(
        ops_of(&irep),
        vec![
            Op::OnErr,
            Op::LoadSelf,
            Op::Send,
            Op::Jmp,
            Op::Rescue,
            Op::GetConst,
            Op::Move,
            Op::Send,
            Op::JmpIf,
            Op::Jmp,
            Op::Move,
            Op::LoadSelf,
            Op::Send,
            Op::Jmp,
            Op::Raise,
            Op::PopErr,
            Op::Return,
        ]
    );
    // the error handler entry point sits right after the body's exit jump
    assert_eq!(irep.iseq[0].get_sbx(), 4);
    // exception binding
    assert_eq!(irep.iseq[10], Code::ab(Op::Move, 1, 2));
}

#[test]
fn test_ensure_balances_epush_epop() {
    let ensure = n(NodeKind::Ensure {
        body: Box::new(fcall("work")),
        guard: ScopeBody { locals: vec![], body: Box::new(fcall("cleanup")) },
    });
    let irep = compile(ensure);
    assert_eq!(
        ops_of(&irep),
        vec![Op::EPush, Op::LoadSelf, Op::Send, Op::EPop, Op::Return]
    );
    assert_eq!(irep.iseq[0].get_bx(), 0);
    let guard = &irep.reps[0];
    assert_eq!(*guard.iseq.last().unwrap(), Code::ab(Op::Return, 0, R_NORMAL));
}

#[test]
fn test_break_outside_loop_errors() {
    let err = compile_err(n(NodeKind::Break(None)));
    assert!(matches!(
        err,
        CodegenError::Structural { ref reason, .. } if reason == "unexpected break"
    ));
}

#[test]
fn test_next_outside_loop_errors() {
    let err = compile_err(n(NodeKind::Next(None)));
    assert!(matches!(
        err,
        CodegenError::Structural { ref reason, .. } if reason == "unexpected next"
    ));
}

#[test]
fn test_retry_requires_rescue() {
    let body = n(NodeKind::While { cond: bx(NodeKind::True), body: bx(NodeKind::Retry) });
    let err = compile_err(body);
    assert!(matches!(
        err,
        CodegenError::Structural { ref reason, .. } if reason == "unexpected retry"
    ));
}

#[test]
fn test_break_in_while_threads_forward() {
    let irep = compile(n(NodeKind::While {
        cond: bx(NodeKind::True),
        body: bx(NodeKind::Break(None)),
    }));
    // the body is one pending jump, threaded to the loop exit past the
    // fallthrough nil
    assert_eq!(
        irep.iseq,
        vec![
            Code::sbx(Op::Jmp, 2),
            Code::sbx(Op::Jmp, 4),
            Code::a(Op::LoadT, 1),
            Code::asbx(Op::JmpIf, 1, -2),
            Code::a(Op::LoadNil, 1),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_return_inside_block_is_nonlocal() {
    // def f; g { return 1 }; end
    let block = n(NodeKind::Block {
        locals: vec![],
        params: None,
        body: bx(NodeKind::Return(Some(Box::new(int("1"))))),
    });
    let def = n(NodeKind::Def {
        name: "f".to_string(),
        locals: vec![],
        params: Some(Params::default()),
        body: Box::new(n(NodeKind::Call {
            recv: bx(NodeKind::SelfRef),
            method: "g".to_string(),
            args: vec![],
            block: Some(Box::new(block)),
        })),
    });
    let irep = compile(def);
    let blk = &irep.reps[0].reps[0];
    assert_eq!(blk.iseq[0], Code::asbx(Op::LoadI, 1, 1));
    assert_eq!(blk.iseq[1], Code::ab(Op::Return, 1, crate::ops::R_RETURN));
}

#[test]
fn test_yield_emits_blkpush() {
    let def = n(NodeKind::Def {
        name: "f".to_string(),
        locals: vec![],
        params: Some(Params::default()),
        body: bx(NodeKind::Yield(vec![])),
    });
    let irep = compile(def);
    let method = &irep.reps[0];
    assert_eq!(
        method.iseq,
        vec![
            Code::ax(Op::Enter, 0),
            Code::abx(Op::BlkPush, 1, 0),
            Code::abc(Op::Send, 1, 0, 0),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
    assert_eq!(method.syms[0].as_deref(), Some("call"));
}

#[test]
fn test_op_asgn_or_shortcircuits() {
    let opasgn = n(NodeKind::OpAsgn {
        lhs: Lhs::Lvar("x".to_string()),
        op: "||".to_string(),
        rhs: Box::new(int("1")),
    });
    let irep = compile_with_locals(&["x"], opasgn);
    assert_eq!(
        irep.iseq,
        vec![
            Code::ab(Op::Move, 2, 1),
            Code::asbx(Op::JmpIf, 2, 3),
            Code::asbx(Op::LoadI, 2, 1),
            Code::ab(Op::Move, 1, 2),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
}

#[test]
fn test_attr_op_asgn_reads_then_writes() {
    // o.x += 1
    let opasgn = n(NodeKind::OpAsgn {
        lhs: Lhs::Attr { recv: Box::new(lvar("o")), name: "x".to_string(), args: vec![] },
        op: "+".to_string(),
        rhs: Box::new(int("1")),
    });
    let irep = compile_with_locals(&["o"], n(NodeKind::Begin(vec![opasgn, n(NodeKind::Nil)])));
    let syms: Vec<_> = irep.syms.iter().map(|s| s.as_deref().unwrap()).collect();
    assert_eq!(syms, vec!["x", "+", "x="]);
    assert!(ops_of(&irep).contains(&Op::AddI));
}

#[test]
fn test_array_literal() {
    let irep = compile(n(NodeKind::Array(vec![int("1"), int("2"), int("3")])));
    assert_eq!(
        irep.iseq,
        vec![
            Code::asbx(Op::LoadI, 1, 1),
            Code::asbx(Op::LoadI, 2, 2),
            Code::asbx(Op::LoadI, 3, 3),
            Code::abc(Op::Array, 1, 1, 3),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_splat_switches_to_send_vector() {
    let call = n(NodeKind::Call {
        recv: bx(NodeKind::SelfRef),
        method: "f".to_string(),
        args: vec![int("1"), n(NodeKind::Splat(Box::new(lvar("xs"))))],
        block: None,
    });
    let irep = compile_with_locals(&["xs"], call);
    let ops = ops_of(&irep);
    assert!(ops.contains(&Op::AryCat));
    let send = irep.iseq[ops.iter().position(|o| *o == Op::Send).unwrap()];
    assert_eq!(send.get_c(), crate::ops::CALL_MAXARGS);
}

#[test]
fn test_hash_literal() {
    let irep = compile(n(NodeKind::Hash(vec![(
        n(NodeKind::Sym("a".to_string())),
        int("1"),
    )])));
    assert_eq!(
        irep.iseq,
        vec![
            Code::abx(Op::LoadSym, 1, 0),
            Code::asbx(Op::LoadI, 2, 1),
            Code::abc(Op::Hash, 1, 1, 1),
            Code::ab(Op::Return, 1, R_NORMAL),
        ]
    );
}

#[test]
fn test_range_literal() {
    let irep = compile(n(NodeKind::Dot3(Box::new(int("1")), Box::new(int("9")))));
    assert_eq!(irep.iseq[2], Code::abc(Op::Range, 1, 1, 1));
}

#[test]
fn test_dstr_drops_empty_fragment() {
    let irep = compile(n(NodeKind::DStr(vec![string("a"), string("")])));
    assert_eq!(
        irep.iseq,
        vec![Code::abx(Op::String, 1, 0), Code::ab(Op::Return, 1, R_NORMAL)]
    );
}

#[test]
fn test_dstr_concatenates() {
    let irep = compile(n(NodeKind::DStr(vec![string("a"), fcall("b")])));
    assert_eq!(
        ops_of(&irep),
        vec![Op::String, Op::LoadSelf, Op::Send, Op::StrCat, Op::Return]
    );
}

#[test]
fn test_words_and_symbols() {
    let words = compile(n(NodeKind::Words(vec![vec![string("a")], vec![string("b")]])));
    assert_eq!(ops_of(&words), vec![Op::String, Op::String, Op::Array, Op::Return]);
    assert_eq!(words.iseq[2], Code::abc(Op::Array, 1, 1, 2));

    let symbols = compile(n(NodeKind::Symbols(vec![vec![string("a")], vec![string("b")]])));
    assert_eq!(
        ops_of(&symbols),
        vec![Op::String, Op::Send, Op::String, Op::Send, Op::Array, Op::Return]
    );
    assert_eq!(symbols.syms[0].as_deref(), Some("intern"));
}

#[test]
fn test_class_definition() {
    let class = n(NodeKind::Class {
        path: ClassPath::Local("Foo".to_string()),
        superclass: None,
        body: ScopeBody { locals: vec![], body: bx(NodeKind::Nil) },
    });
    let irep = compile(class);
    assert_eq!(
        ops_of(&irep),
        vec![Op::LoadNil, Op::LoadNil, Op::Class, Op::Exec, Op::Return]
    );
    assert_eq!(irep.syms[0].as_deref(), Some("Foo"));
    // value-position class body returns its last expression
    let body = &irep.reps[0];
    assert_eq!(*body.iseq.last().unwrap(), Code::ab(Op::Return, 1, R_NORMAL));
}

#[test]
fn test_singleton_class_and_sdef() {
    let sdef = n(NodeKind::SDef {
        recv: Box::new(lvar("o")),
        name: "m".to_string(),
        locals: vec![],
        params: Some(Params::default()),
        body: bx(NodeKind::Nil),
    });
    let irep = compile_with_locals(&["o"], sdef);
    assert_eq!(
        ops_of(&irep),
        vec![Op::Move, Op::SClass, Op::Lambda, Op::Method, Op::LoadSym, Op::Return]
    );
}

#[test]
fn test_alias_sends_alias_method() {
    let irep = compile(n(NodeKind::Alias {
        new_name: "a".to_string(),
        old_name: "b".to_string(),
    }));
    assert_eq!(
        ops_of(&irep),
        vec![Op::TClass, Op::LoadSym, Op::LoadSym, Op::LoadNil, Op::Send, Op::Return]
    );
    let send = irep.iseq[4];
    assert_eq!(send.get_c(), 2);
    assert_eq!(irep.syms[2].as_deref(), Some("alias_method"));
}

#[test]
fn test_super_and_zsuper() {
    let zsuper = n(NodeKind::Def {
        name: "f".to_string(),
        locals: vec![],
        params: Some(Params::default()),
        body: bx(NodeKind::ZSuper { block: None }),
    });
    let irep = compile(zsuper);
    let method = &irep.reps[0];
    assert_eq!(
        ops_of(method),
        vec![Op::Enter, Op::ArgAry, Op::Super, Op::Return]
    );
    let sup = method.iseq[2];
    assert_eq!(sup.get_c(), crate::ops::CALL_MAXARGS);
}

#[test]
fn test_gvar_ivar_cvar_const() {
    let irep = compile(n(NodeKind::Begin(vec![
        n(NodeKind::Asgn { lhs: Lhs::Gvar("$g".to_string()), rhs: Box::new(int("1")) }),
        n(NodeKind::Ivar("@i".to_string())),
        n(NodeKind::Cvar("@@c".to_string())),
        n(NodeKind::Const("K".to_string())),
    ])));
    let ops = ops_of(&irep);
    assert_eq!(ops[1], Op::SetGlobal);
    // mid-sequence reads in statement position are value-free except the
    // constant, whose lookup may raise
    assert!(ops.contains(&Op::GetConst));
    assert!(!ops.contains(&Op::GetIv));
}

#[test]
fn test_nth_ref_reads_global() {
    let irep = compile(n(NodeKind::NthRef(1)));
    assert_eq!(irep.iseq[0], Code::abx(Op::GetGlobal, 1, 0));
    assert_eq!(irep.syms[0].as_deref(), Some("$1"));
}

#[test]
fn test_compile_twice_is_bit_identical() {
    let make = || {
        n(NodeKind::Begin(vec![
            n(NodeKind::Asgn {
                lhs: Lhs::Lvar("x".to_string()),
                rhs: Box::new(binop(int("1"), "+", int("2"))),
            }),
            n(NodeKind::If {
                cond: Box::new(lvar("x")),
                then_body: Some(Box::new(fcall("y"))),
                else_body: None,
            }),
        ]))
    };
    let a = compile_with_locals(&["x"], make());
    let b = compile_with_locals(&["x"], make());
    assert_eq!(a, b);
}

#[test]
fn test_no_optimize_disables_peephole() {
    let make = || {
        n(NodeKind::Scope(ScopeBody {
            locals: locals(&["x"]),
            body: bx(NodeKind::Begin(vec![
                n(NodeKind::Asgn { lhs: Lhs::Lvar("x".to_string()), rhs: Box::new(int("1")) }),
                n(NodeKind::True),
            ])),
        }))
    };
    let optimized = generate(&program(make())).unwrap();
    let mut raw = program(make());
    raw.no_optimize = true;
    let unoptimized = generate(&raw).unwrap();

    assert_eq!(
        optimized.iseq,
        vec![
            Code::asbx(Op::LoadI, 1, 1),
            Code::a(Op::LoadT, 2),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
    assert_eq!(
        unoptimized.iseq,
        vec![
            Code::asbx(Op::LoadI, 2, 1),
            Code::ab(Op::Move, 1, 2),
            Code::a(Op::LoadT, 2),
            Code::ab(Op::Return, 2, R_NORMAL),
        ]
    );
    verify(&unoptimized).unwrap();
}

#[test]
fn test_too_complex_expression() {
    let mut node = int("1");
    for _ in 0..600 {
        node = n(NodeKind::Array(vec![node]));
    }
    let err = compile_err(node);
    assert!(matches!(
        err,
        CodegenError::Capacity { ref reason, .. } if reason == "too complex expression"
    ));
}

#[test]
fn test_too_many_method_symbols() {
    let stmts: Vec<Node> = (0..257).map(|i| fcall(&format!("m{}", i))).collect();
    let err = compile_err(n(NodeKind::Begin(stmts)));
    assert!(matches!(
        err,
        CodegenError::Capacity { ref reason, .. } if reason == "too many symbols (max 256)"
    ));
}

#[test]
fn test_malformed_int_digits() {
    let err = compile_err(int("12x"));
    assert!(matches!(
        err,
        CodegenError::Input { ref reason, .. } if reason == "malformed readint input"
    ));
}

#[test]
fn test_symbol_table_prefix_padding() {
    let mut g = Generator {
        scopes: vec![],
        filenames: vec![],
        no_optimize: false,
        default_filename: None,
        default_filename_index: 0,
    };
    g.scope_push(&[], false);
    for i in 0..127 {
        g.new_sym(&format!("s{}", i));
    }
    // the 127th general symbol jumped past the method prefix
    assert_eq!(g.new_sym("s126"), 256);
    // method symbols fill the padding holes
    assert_eq!(g.new_msym("m").unwrap(), 126);
    // dedup still sees entries on both sides of the padding
    assert_eq!(g.new_sym("s5"), 5);
    assert_eq!(g.new_sym("s126"), 256);
}

#[test]
fn test_dispatch_rejects_non_jump() {
    let mut g = Generator {
        scopes: vec![],
        filenames: vec![],
        no_optimize: false,
        default_filename: None,
        default_filename_index: 0,
    };
    g.scope_push(&[], false);
    let pc = g.genop(Code::a(Op::LoadNil, 1));
    assert!(matches!(
        g.dispatch(pc),
        Err(CodegenError::Internal { .. })
    ));
}
