// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! Expansion of `call`-form constraints.

When the checker sees a call, it applies the constraints from the callee's
summary: every variable in the summary is renamed fresh, the caller's
argument and result expressions are equated positionally with the callee's,
the call site's path condition is conjoined onto every inlined constraint,
and the inlined constraints' call stacks are extended with the site.

The summary graph must be acyclic; recursion is reported as a
[`StructuralError::RecursiveCall`]. A callee with no summary is opaque: the
call constraint is dropped with a warning.
*/

use crate::diag::DiagnosticSink;
use crate::interp::equate;
use crate::subst::{Substitution, VarSet};
use crate::{
    BoolExpr, CallStack, Constraint, FastHashMap, FreshVarSource, FunctionSummary, IntExpr,
    ListExpr, Origin, RawConstraint, StructuralError,
};

/// Expand the named function's raw constraints into final constraints,
/// inlining callee summaries from `summaries`.
///
/// # Errors
/// Returns a [`StructuralError`] on summary-graph recursion, call arity
/// mismatches, or a sort mismatch between an argument and its formal.
pub fn expand_function(
    name: &str,
    summaries: &FastHashMap<String, FunctionSummary>,
    fresh: &mut FreshVarSource,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<Constraint>, StructuralError> {
    let Some(summary) = summaries.get(name) else {
        return Ok(Vec::new());
    };
    let mut active = vec![summary.name.clone()];
    expand_constraints(&summary.constraints, summaries, fresh, sink, &mut active)
}

/// Rename every variable mentioned by the summary to a fresh one. Variables
/// are renamed in id order so the output is reproducible.
fn renaming_for(summary: &FunctionSummary, fresh: &mut FreshVarSource) -> Substitution {
    let mut vars = VarSet::default();
    vars.visit_summary(summary);
    let mut subst = Substitution::new();

    let mut ints: Vec<_> = vars.ints.into_iter().collect();
    ints.sort_unstable();
    for v in ints {
        subst.bind_int(v, IntExpr::Var(fresh.fresh_int()));
    }
    let mut lists: Vec<_> = vars.lists.into_iter().collect();
    lists.sort_unstable();
    for v in lists {
        subst.bind_list(v, ListExpr::Var(fresh.fresh_list()));
    }
    let mut bools: Vec<_> = vars.bools.into_iter().collect();
    bools.sort_unstable();
    for v in bools {
        subst.bind_bool(v, BoolExpr::Var(fresh.fresh_bool()));
    }
    subst
}

fn expand_constraints(
    raw: &[RawConstraint],
    summaries: &FastHashMap<String, FunctionSummary>,
    fresh: &mut FreshVarSource,
    sink: &mut dyn DiagnosticSink,
    active: &mut Vec<String>,
) -> Result<Vec<Constraint>, StructuralError> {
    let mut out = Vec::new();
    for rc in raw {
        match rc {
            RawConstraint::Expr {
                pred,
                assuming,
                origin,
                loc,
            } => out.push(Constraint {
                pred: pred.clone(),
                assuming: assuming.clone(),
                origin: *origin,
                stack: CallStack::leaf(loc.clone()),
            }),
            RawConstraint::Call {
                callee,
                args,
                result,
                assuming,
                loc,
            } => {
                if active.iter().any(|n| n == callee) {
                    return Err(StructuralError::RecursiveCall(callee.clone()));
                }
                let Some(callee_summary) = summaries.get(callee) else {
                    sink.warn(
                        &format!("no summary for `{callee}`; treating the call as opaque"),
                        loc.as_ref(),
                    );
                    continue;
                };
                let renamed = renaming_for(callee_summary, fresh).summary(callee_summary);

                if args.len() != renamed.arg_exprs.len() {
                    return Err(StructuralError::CallArity {
                        callee: callee.clone(),
                        expected: renamed.arg_exprs.len(),
                        have: args.len(),
                    });
                }
                let mut equations = Vec::new();
                for (actual, formal) in args.iter().zip(&renamed.arg_exprs) {
                    if let (Some(actual), Some(formal)) = (actual, formal) {
                        equations.extend(equate(actual, formal)?);
                    }
                }
                if let (Some(result), Some(ret)) = (result, &renamed.ret_expr) {
                    equations.extend(equate(result, ret)?);
                }
                for pred in equations {
                    out.push(Constraint {
                        pred,
                        assuming: assuming.clone(),
                        origin: Origin::Implied,
                        stack: CallStack::leaf(loc.clone()),
                    });
                }

                active.push(callee.clone());
                let inner =
                    expand_constraints(&renamed.constraints, summaries, fresh, sink, active)?;
                active.pop();
                for c in inner {
                    out.push(Constraint {
                        pred: c.pred,
                        assuming: BoolExpr::new_and(assuming.clone(), c.assuming),
                        origin: c.origin,
                        stack: c.stack.through(loc.clone()),
                    });
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::VecSink;
    use crate::{BoolVar, CmpOp, Expr, IntVar, SourceLocation};
    use rstest::rstest;

    fn loc(line: u32) -> Option<SourceLocation> {
        Some(SourceLocation {
            path: "model.lang".to_string(),
            line,
        })
    }

    fn summaries_of(items: Vec<FunctionSummary>) -> FastHashMap<String, FunctionSummary> {
        items.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    /// A callee that asserts its single int argument is positive and
    /// returns it.
    fn positive_summary() -> FunctionSummary {
        FunctionSummary {
            name: "positive".to_string(),
            arg_exprs: vec![Some(Expr::Int(IntExpr::Var(IntVar(0))))],
            ret_expr: Some(Expr::Int(IntExpr::Var(IntVar(0)))),
            constraints: vec![RawConstraint::Expr {
                pred: BoolExpr::int_cmp(CmpOp::Gt, IntExpr::Var(IntVar(0)), IntExpr::Literal(0)),
                assuming: BoolExpr::True,
                origin: Origin::Asserted,
                loc: loc(3),
            }],
        }
    }

    #[rstest]
    fn test_expand_equates_and_extends_stack() {
        let caller = FunctionSummary {
            name: "caller".to_string(),
            arg_exprs: vec![],
            ret_expr: None,
            constraints: vec![RawConstraint::Call {
                callee: "positive".to_string(),
                args: vec![Some(Expr::Int(IntExpr::Literal(4)))],
                result: Some(Expr::Int(IntExpr::Var(IntVar(7)))),
                assuming: BoolExpr::Var(BoolVar(8)),
                loc: loc(11),
            }],
        };
        let summaries = summaries_of(vec![caller, positive_summary()]);
        let mut fresh = FreshVarSource::new();
        // Ids below the callee's renamed range.
        for _ in 0..20 {
            fresh.fresh_int();
        }
        let mut sink = VecSink::default();
        let out = expand_function("caller", &summaries, &mut fresh, &mut sink)
            .expect("expansion succeeds");

        assert_eq!(out.len(), 3);
        // Argument and result equations at the call site.
        assert_eq!(
            out[0].pred,
            BoolExpr::int_eq(IntExpr::Literal(4), IntExpr::Var(IntVar(20)))
        );
        assert_eq!(
            out[1].pred,
            BoolExpr::int_eq(IntExpr::Var(IntVar(7)), IntExpr::Var(IntVar(20)))
        );
        assert_eq!(out[1].stack, CallStack::leaf(loc(11)));
        // The inlined assertion keeps its origin, picks up the caller's
        // guard, and records the call site in its stack.
        assert_eq!(
            out[2].pred,
            BoolExpr::int_cmp(CmpOp::Gt, IntExpr::Var(IntVar(20)), IntExpr::Literal(0))
        );
        assert_eq!(out[2].origin, Origin::Asserted);
        assert_eq!(out[2].assuming, BoolExpr::Var(BoolVar(8)));
        assert_eq!(out[2].stack, CallStack::leaf(loc(3)).through(loc(11)));
    }

    #[rstest]
    fn test_missing_summary_is_opaque() {
        let caller = FunctionSummary {
            name: "caller".to_string(),
            arg_exprs: vec![],
            ret_expr: None,
            constraints: vec![RawConstraint::Call {
                callee: "mystery".to_string(),
                args: vec![],
                result: None,
                assuming: BoolExpr::True,
                loc: loc(2),
            }],
        };
        let summaries = summaries_of(vec![caller]);
        let mut fresh = FreshVarSource::new();
        let mut sink = VecSink::default();
        let out = expand_function("caller", &summaries, &mut fresh, &mut sink)
            .expect("opaque call is dropped");
        assert!(out.is_empty());
        assert_eq!(sink.warnings.len(), 1);
        assert!(sink.warnings[0].0.contains("mystery"));
    }

    #[rstest]
    fn test_recursion_is_reported() {
        let looping = FunctionSummary {
            name: "looping".to_string(),
            arg_exprs: vec![],
            ret_expr: None,
            constraints: vec![RawConstraint::Call {
                callee: "looping".to_string(),
                args: vec![],
                result: None,
                assuming: BoolExpr::True,
                loc: None,
            }],
        };
        let summaries = summaries_of(vec![looping]);
        let mut fresh = FreshVarSource::new();
        let mut sink = VecSink::default();
        let err = expand_function("looping", &summaries, &mut fresh, &mut sink)
            .expect_err("cycle must be detected");
        assert!(matches!(err, StructuralError::RecursiveCall(name) if name == "looping"));
    }

    #[rstest]
    fn test_call_arity_mismatch_is_fatal() {
        let caller = FunctionSummary {
            name: "caller".to_string(),
            arg_exprs: vec![],
            ret_expr: None,
            constraints: vec![RawConstraint::Call {
                callee: "positive".to_string(),
                args: vec![],
                result: None,
                assuming: BoolExpr::True,
                loc: None,
            }],
        };
        let summaries = summaries_of(vec![caller, positive_summary()]);
        let mut fresh = FreshVarSource::new();
        let mut sink = VecSink::default();
        let err = expand_function("caller", &summaries, &mut fresh, &mut sink)
            .expect_err("arity mismatch must be fatal");
        assert!(matches!(err, StructuralError::CallArity { .. }));
    }
}
