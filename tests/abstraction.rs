// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

#![allow(clippy::too_many_lines)]

use rstest::{fixture, rstest};

use shape_helper::diag::VecSink;
use shape_helper::ir::{
    AcyclicCfg, Block, BlockLabel, Function, Operator, OperatorDef, Register, SourceInfo,
    Terminator, TerminatorDef, Type, TypeEnvironment,
};
use shape_helper::{
    abstract_function, BoolExpr, CmpOp, Expr, FreshVarSource, IntBinOp, IntExpr, Origin,
    RawConstraint,
};

const ASSERT: &str = "$ss6assert__4file4lineySbyXK_SSyXKs12StaticStringVSutF";
const INT_LITERAL_CTOR: &str = "$sSi22_builtinIntegerLiteralSiBI_tcfC";
const INT_ADD: &str = "$sSi1poiyS2i_SitFZ";
const RANK_GETTER: &str = "$s10TensorFlow0A0V4rankSivg";

fn int_ty() -> Type {
    Type::Named("Int".to_string())
}

fn bool_ty() -> Type {
    Type::Named("Bool".to_string())
}

fn tensor_ty() -> Type {
    Type::Specialized {
        base: "Tensor".to_string(),
        args: vec![Type::Named("Float".to_string())],
    }
}

fn unit_ty() -> Type {
    Type::Tuple(vec![])
}

fn fn_ty() -> Type {
    Type::Function {
        params: vec![],
        result: unit_ty().into(),
    }
}

fn regs(names: &[&str]) -> Vec<Register> {
    names.iter().map(|n| Register::from(*n)).collect()
}

fn op(results: Vec<(&str, Type)>, operator: Operator, line: u32) -> OperatorDef {
    OperatorDef {
        results: results
            .into_iter()
            .map(|(name, ty)| (Register::from(name), ty))
            .collect(),
        operator,
        source: Some(SourceInfo {
            path: "model.lang".to_string(),
            line,
        }),
    }
}

fn function_ref(reg: &str, name: &str, line: u32) -> OperatorDef {
    op(
        vec![(reg, fn_ty())],
        Operator::FunctionRef {
            name: name.to_string(),
        },
        line,
    )
}

fn block(
    label: &str,
    arguments: Vec<(&str, Type)>,
    operators: Vec<OperatorDef>,
    terminator: Terminator,
) -> Block {
    Block {
        label: BlockLabel::from(label),
        arguments: arguments
            .into_iter()
            .map(|(name, ty)| (Register::from(name), ty))
            .collect(),
        operators,
        terminator: TerminatorDef {
            terminator,
            source: Some(SourceInfo {
                path: "model.lang".to_string(),
                line: 99,
            }),
        },
    }
}

#[fixture]
fn sink() -> VecSink {
    VecSink::default()
}

fn abstracted(
    function: &Function,
    sink: &mut VecSink,
) -> Option<shape_helper::FunctionSummary> {
    let env = TypeEnvironment::new();
    let mut fresh = FreshVarSource::new();
    abstract_function(function, &env, &AcyclicCfg, sink, &mut fresh)
        .expect("no structural errors")
}

/// `fn bump(x: Int) -> Int { x + 1 }` through the builtin table.
fn bump_function() -> Function {
    Function {
        name: "bump".to_string(),
        result: int_ty(),
        blocks: vec![block(
            "bb0",
            vec![("x", int_ty())],
            vec![
                op(
                    vec![("lit", Type::Builtin("IntLiteral".to_string()))],
                    Operator::IntegerLiteral {
                        ty: Type::Builtin("IntLiteral".to_string()),
                        value: 1,
                    },
                    2,
                ),
                function_ref("ctor", INT_LITERAL_CTOR, 2),
                op(
                    vec![("one", int_ty())],
                    Operator::Apply {
                        callee: "ctor".into(),
                        args: regs(&["lit"]),
                    },
                    2,
                ),
                function_ref("plus", INT_ADD, 3),
                op(
                    vec![("sum", int_ty())],
                    Operator::Apply {
                        callee: "plus".into(),
                        args: regs(&["x", "one"]),
                    },
                    3,
                ),
            ],
            Terminator::Return {
                operand: "sum".into(),
            },
        )],
    }
}

#[rstest]
fn test_arithmetic_flows_to_return(mut sink: VecSink) {
    let summary = abstracted(&bump_function(), &mut sink).expect("summary produced");
    assert!(sink.warnings.is_empty());

    let Some(Expr::Int(ret)) = &summary.ret_expr else {
        panic!("integer return slot expected");
    };
    let Some(Expr::Int(arg)) = &summary.arg_exprs[0] else {
        panic!("integer argument expected");
    };
    let expected = BoolExpr::int_eq(
        ret.clone(),
        IntExpr::binary(IntBinOp::Add, arg.clone(), IntExpr::Literal(1)),
    );
    assert!(summary.constraints.iter().any(|c| matches!(
        c,
        RawConstraint::Expr { pred, assuming: BoolExpr::True, origin: Origin::Implied, .. }
            if *pred == expected
    )));
}

#[rstest]
fn test_assert_emits_call_and_asserted_pair(mut sink: VecSink) {
    let function = Function {
        name: "main".to_string(),
        result: unit_ty(),
        blocks: vec![block(
            "bb0",
            vec![("t", tensor_ty())],
            vec![
                function_ref("cond", "shape_ok", 4),
                op(
                    vec![("clo", fn_ty())],
                    Operator::PartialApply {
                        callee: "cond".into(),
                        args: regs(&["t"]),
                        arg_types: vec![tensor_ty()],
                    },
                    4,
                ),
                function_ref("assert_fn", ASSERT, 4),
                op(
                    vec![("done", unit_ty())],
                    Operator::Apply {
                        callee: "assert_fn".into(),
                        args: regs(&["clo"]),
                    },
                    4,
                ),
            ],
            Terminator::Return {
                operand: "done".into(),
            },
        )],
    };
    let summary = abstracted(&function, &mut sink).expect("summary produced");

    let mut asserted_var = None;
    let mut call_result = None;
    for c in &summary.constraints {
        match c {
            RawConstraint::Call {
                callee,
                args,
                result,
                ..
            } if callee == "shape_ok" => {
                // The closure's captured tensor argument crosses the call
                // boundary as its shape.
                assert!(matches!(args[0], Some(Expr::List(_))));
                call_result = result.clone();
            }
            RawConstraint::Expr {
                pred,
                origin: Origin::Asserted,
                ..
            } => asserted_var = Some(pred.clone()),
            _ => {}
        }
    }
    let Some(Expr::Bool(bound)) = call_result else {
        panic!("assert must bind the callee's boolean result");
    };
    assert_eq!(Some(bound), asserted_var);
}

#[rstest]
fn test_diamond_path_conditions(mut sink: VecSink) {
    let function = Function {
        name: "pick".to_string(),
        result: int_ty(),
        blocks: vec![
            block(
                "bb0",
                vec![("c", bool_ty()), ("x", int_ty()), ("y", int_ty())],
                vec![],
                Terminator::CondBr {
                    condition: "c".into(),
                    true_dest: "bb1".into(),
                    true_operands: vec![],
                    false_dest: "bb2".into(),
                    false_operands: vec![],
                },
            ),
            block(
                "bb1",
                vec![],
                vec![],
                Terminator::Br {
                    dest: "bb3".into(),
                    operands: regs(&["x"]),
                },
            ),
            block(
                "bb2",
                vec![],
                vec![],
                Terminator::Br {
                    dest: "bb3".into(),
                    operands: regs(&["y"]),
                },
            ),
            block(
                "bb3",
                vec![("z", int_ty())],
                vec![],
                Terminator::Return {
                    operand: "z".into(),
                },
            ),
        ],
    };
    let summary = abstracted(&function, &mut sink).expect("summary produced");

    let Some(Expr::Bool(cond)) = &summary.arg_exprs[0] else {
        panic!("boolean condition argument expected");
    };
    let Some(Expr::Int(x)) = &summary.arg_exprs[1] else {
        panic!("integer argument expected");
    };
    let Some(Expr::Int(y)) = &summary.arg_exprs[2] else {
        panic!("integer argument expected");
    };

    // z == x under c, z == y under !c.
    let under_true = summary.constraints.iter().find_map(|c| match c {
        RawConstraint::Expr { pred, assuming, .. }
            if assuming == cond =>
        {
            Some(pred.clone())
        }
        _ => None,
    });
    let under_false = summary.constraints.iter().find_map(|c| match c {
        RawConstraint::Expr { pred, assuming, .. }
            if *assuming == BoolExpr::new_not(cond.clone()) =>
        {
            Some(pred.clone())
        }
        _ => None,
    });
    let is_eq_to = |pred: &Option<BoolExpr>, rhs: &IntExpr| {
        matches!(
            pred,
            Some(BoolExpr::IntCmp(CmpOp::Eq, _, r)) if r.as_ref() == rhs
        )
    };
    assert!(is_eq_to(&under_true, x));
    assert!(is_eq_to(&under_false, y));

    // The join block's return equation holds under the sorted disjunction
    // of both arms.
    let join = summary.constraints.iter().find_map(|c| match c {
        RawConstraint::Expr { pred, assuming, .. }
            if matches!(assuming, BoolExpr::Or(_)) =>
        {
            Some((pred.clone(), assuming.clone()))
        }
        _ => None,
    });
    assert!(join.is_some());
}

#[rstest]
fn test_rank_getter_via_begin_apply(mut sink: VecSink) {
    let function = Function {
        name: "rank_of".to_string(),
        result: int_ty(),
        blocks: vec![block(
            "bb0",
            vec![("t", tensor_ty())],
            vec![
                function_ref("rank_fn", RANK_GETTER, 7),
                op(
                    vec![("r", int_ty()), ("token", unit_ty())],
                    Operator::BeginApply {
                        callee: "rank_fn".into(),
                        args: regs(&["t"]),
                    },
                    7,
                ),
                op(
                    vec![("done", unit_ty())],
                    Operator::EndApply {
                        token: "token".into(),
                    },
                    7,
                ),
            ],
            Terminator::Return {
                operand: "r".into(),
            },
        )],
    };
    let summary = abstracted(&function, &mut sink).expect("summary produced");

    let Some(Expr::List(shape)) = &summary.arg_exprs[0] else {
        panic!("tensor argument crosses the boundary as its shape");
    };
    let expected_rhs = IntExpr::length(shape.clone());
    assert!(summary.constraints.iter().any(|c| matches!(
        c,
        RawConstraint::Expr { pred: BoolExpr::IntCmp(CmpOp::Eq, _, rhs), .. }
            if rhs.as_ref() == &expected_rhs
    )));
}

#[rstest]
fn test_unknown_terminator_skips_with_warning(mut sink: VecSink) {
    let function = Function {
        name: "odd".to_string(),
        result: unit_ty(),
        blocks: vec![block(
            "bb0",
            vec![],
            vec![],
            Terminator::Unknown {
                name: "throw".to_string(),
            },
        )],
    };
    assert!(abstracted(&function, &mut sink).is_none());
    assert_eq!(sink.warnings.len(), 1);
    assert!(sink.warnings[0].0.contains("throw"));
}

#[rstest]
fn test_irreducible_cfg_skips_with_warning(mut sink: VecSink) {
    let function = Function {
        name: "spin".to_string(),
        result: unit_ty(),
        blocks: vec![
            block(
                "bb0",
                vec![],
                vec![],
                Terminator::Br {
                    dest: "bb1".into(),
                    operands: vec![],
                },
            ),
            block(
                "bb1",
                vec![],
                vec![],
                Terminator::Br {
                    dest: "bb0".into(),
                    operands: vec![],
                },
            ),
        ],
    };
    assert!(abstracted(&function, &mut sink).is_none());
    assert_eq!(sink.warnings.len(), 1);
    assert!(sink.warnings[0].0.contains("not reducible"));
}

#[rstest]
fn test_abstraction_is_deterministic(mut sink: VecSink) {
    let function = bump_function();
    let first = abstracted(&function, &mut sink).expect("summary produced");
    let second = abstracted(&function, &mut sink).expect("summary produced");
    assert_eq!(first, second);
}

#[rstest]
fn test_ownership_noops_share_value_identity(mut sink: VecSink) {
    let function = Function {
        name: "borrowed".to_string(),
        result: int_ty(),
        blocks: vec![block(
            "bb0",
            vec![("x", int_ty())],
            vec![op(
                vec![("b", int_ty())],
                Operator::BeginBorrow {
                    operand: "x".into(),
                },
                1,
            )],
            Terminator::Return { operand: "b".into() },
        )],
    };
    let summary = abstracted(&function, &mut sink).expect("summary produced");
    let Some(Expr::Int(arg)) = &summary.arg_exprs[0] else {
        panic!("integer argument expected");
    };
    // The return equation talks about the original argument variable.
    assert!(summary.constraints.iter().any(|c| matches!(
        c,
        RawConstraint::Expr { pred: BoolExpr::IntCmp(CmpOp::Eq, _, rhs), .. }
            if rhs.as_ref() == arg
    )));
}

#[rstest]
fn test_global_int_load_becomes_hole(mut sink: VecSink) {
    let function = Function {
        name: "config".to_string(),
        result: int_ty(),
        blocks: vec![block(
            "bb0",
            vec![],
            vec![
                op(
                    vec![("addr", Type::Address(int_ty().into()))],
                    Operator::GlobalAddr {
                        symbol: "$s5model9batchSizeSivp".to_string(),
                    },
                    12,
                ),
                op(
                    vec![("v", int_ty())],
                    Operator::Load {
                        address: "addr".into(),
                    },
                    13,
                ),
            ],
            Terminator::Return { operand: "v".into() },
        )],
    };
    let summary = abstracted(&function, &mut sink).expect("summary produced");
    assert!(summary.constraints.iter().any(|c| matches!(
        c,
        RawConstraint::Expr { pred: BoolExpr::IntCmp(CmpOp::Eq, _, rhs), .. }
            if matches!(rhs.as_ref(), IntExpr::Hole(loc) if loc.line == 13)
    )));
}
