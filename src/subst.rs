// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! Sort-preserving substitution over symbolic terms.

A [`Substitution`] carries one map per sort, so applying it can never change
a term's sort. Application is simultaneous: a replacement term is inserted
as-is and is not itself rewritten, which is what makes
[`Substitution::compose`] satisfy

```text
apply(apply(t, s1), s2) == apply(t, compose(s1, s2))
```
*/

use crate::{
    BoolExpr, BoolVar, Constraint, Expr, FastHashMap, FastHashSet, FunctionSummary, Handle,
    IntExpr, IntVar, ListExpr, ListVar, RawConstraint,
};

#[derive(Clone, Debug, Default)]
pub struct Substitution {
    ints: FastHashMap<IntVar, IntExpr>,
    lists: FastHashMap<ListVar, ListExpr>,
    bools: FastHashMap<BoolVar, BoolExpr>,
}

impl Substitution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.lists.is_empty() && self.bools.is_empty()
    }

    pub fn bind_int(&mut self, var: IntVar, expr: IntExpr) {
        self.ints.insert(var, expr);
    }

    pub fn bind_list(&mut self, var: ListVar, expr: ListExpr) {
        self.lists.insert(var, expr);
    }

    pub fn bind_bool(&mut self, var: BoolVar, expr: BoolExpr) {
        self.bools.insert(var, expr);
    }

    #[must_use]
    pub fn int_expr(&self, expr: &IntExpr) -> IntExpr {
        match expr {
            IntExpr::Var(v) => self.ints.get(v).cloned().unwrap_or(IntExpr::Var(*v)),
            IntExpr::Literal(_) | IntExpr::Hole(_) => expr.clone(),
            IntExpr::Length(l) => IntExpr::Length(Handle::new(self.list_expr(l))),
            IntExpr::Element(k, l) => IntExpr::Element(*k, Handle::new(self.list_expr(l))),
            IntExpr::Binary(op, lhs, rhs) => IntExpr::Binary(
                *op,
                Handle::new(self.int_expr(lhs)),
                Handle::new(self.int_expr(rhs)),
            ),
        }
    }

    #[must_use]
    pub fn list_expr(&self, expr: &ListExpr) -> ListExpr {
        match expr {
            ListExpr::Var(v) => self.lists.get(v).cloned().unwrap_or(ListExpr::Var(*v)),
            ListExpr::Literal(dims) => ListExpr::Literal(
                dims.iter()
                    .map(|dim| dim.as_ref().map(|e| self.int_expr(e)))
                    .collect(),
            ),
            ListExpr::Broadcast(lhs, rhs) => ListExpr::Broadcast(
                Handle::new(self.list_expr(lhs)),
                Handle::new(self.list_expr(rhs)),
            ),
        }
    }

    #[must_use]
    pub fn bool_expr(&self, expr: &BoolExpr) -> BoolExpr {
        match expr {
            BoolExpr::True | BoolExpr::False => expr.clone(),
            BoolExpr::Var(v) => self.bools.get(v).cloned().unwrap_or(BoolExpr::Var(*v)),
            BoolExpr::Not(p) => BoolExpr::new_not(self.bool_expr(p)),
            BoolExpr::And(ps) => BoolExpr::and_all(ps.iter().map(|p| self.bool_expr(p))),
            BoolExpr::Or(ps) => BoolExpr::or_all(ps.iter().map(|p| self.bool_expr(p))),
            BoolExpr::IntCmp(op, lhs, rhs) => BoolExpr::IntCmp(
                *op,
                Handle::new(self.int_expr(lhs)),
                Handle::new(self.int_expr(rhs)),
            ),
            BoolExpr::ListEq(lhs, rhs) => BoolExpr::ListEq(
                Handle::new(self.list_expr(lhs)),
                Handle::new(self.list_expr(rhs)),
            ),
            BoolExpr::BoolEq(lhs, rhs) => BoolExpr::BoolEq(
                Handle::new(self.bool_expr(lhs)),
                Handle::new(self.bool_expr(rhs)),
            ),
        }
    }

    #[must_use]
    pub fn expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Int(e) => Expr::Int(self.int_expr(e)),
            Expr::List(e) => Expr::List(self.list_expr(e)),
            Expr::Bool(e) => Expr::Bool(self.bool_expr(e)),
            Expr::Tuple(es) => Expr::Tuple(
                es.iter()
                    .map(|e| e.as_ref().map(|e| self.expr(e)))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn raw_constraint(&self, constraint: &RawConstraint) -> RawConstraint {
        match constraint {
            RawConstraint::Expr {
                pred,
                assuming,
                origin,
                loc,
            } => RawConstraint::Expr {
                pred: self.bool_expr(pred),
                assuming: self.bool_expr(assuming),
                origin: *origin,
                loc: loc.clone(),
            },
            RawConstraint::Call {
                callee,
                args,
                result,
                assuming,
                loc,
            } => RawConstraint::Call {
                callee: callee.clone(),
                args: args
                    .iter()
                    .map(|a| a.as_ref().map(|a| self.expr(a)))
                    .collect(),
                result: result.as_ref().map(|r| self.expr(r)),
                assuming: self.bool_expr(assuming),
                loc: loc.clone(),
            },
        }
    }

    #[must_use]
    pub fn constraint(&self, constraint: &Constraint) -> Constraint {
        Constraint {
            pred: self.bool_expr(&constraint.pred),
            assuming: self.bool_expr(&constraint.assuming),
            origin: constraint.origin,
            stack: constraint.stack.clone(),
        }
    }

    #[must_use]
    pub fn summary(&self, summary: &FunctionSummary) -> FunctionSummary {
        FunctionSummary {
            name: summary.name.clone(),
            arg_exprs: summary
                .arg_exprs
                .iter()
                .map(|a| a.as_ref().map(|a| self.expr(a)))
                .collect(),
            ret_expr: summary.ret_expr.as_ref().map(|r| self.expr(r)),
            constraints: summary
                .constraints
                .iter()
                .map(|c| self.raw_constraint(c))
                .collect(),
        }
    }

    /// The substitution equivalent to applying `self`, then `later`.
    #[must_use]
    pub fn compose(&self, later: &Substitution) -> Substitution {
        let mut out = Substitution::new();
        for (v, e) in &self.ints {
            out.ints.insert(*v, later.int_expr(e));
        }
        for (v, e) in &self.lists {
            out.lists.insert(*v, later.list_expr(e));
        }
        for (v, e) in &self.bools {
            out.bools.insert(*v, later.bool_expr(e));
        }
        for (v, e) in &later.ints {
            out.ints.entry(*v).or_insert_with(|| e.clone());
        }
        for (v, e) in &later.lists {
            out.lists.entry(*v).or_insert_with(|| e.clone());
        }
        for (v, e) in &later.bools {
            out.bools.entry(*v).or_insert_with(|| e.clone());
        }
        out
    }
}

/// The free variables of a set of terms, per sort.
#[derive(Clone, Debug, Default)]
pub struct VarSet {
    pub ints: FastHashSet<IntVar>,
    pub lists: FastHashSet<ListVar>,
    pub bools: FastHashSet<BoolVar>,
}

impl VarSet {
    pub fn visit_int_expr(&mut self, expr: &IntExpr) {
        match expr {
            IntExpr::Var(v) => {
                self.ints.insert(*v);
            }
            IntExpr::Literal(_) | IntExpr::Hole(_) => {}
            IntExpr::Length(l) => self.visit_list_expr(l),
            IntExpr::Element(_, l) => self.visit_list_expr(l),
            IntExpr::Binary(_, lhs, rhs) => {
                self.visit_int_expr(lhs);
                self.visit_int_expr(rhs);
            }
        }
    }

    pub fn visit_list_expr(&mut self, expr: &ListExpr) {
        match expr {
            ListExpr::Var(v) => {
                self.lists.insert(*v);
            }
            ListExpr::Literal(dims) => {
                for dim in dims.iter().flatten() {
                    self.visit_int_expr(dim);
                }
            }
            ListExpr::Broadcast(lhs, rhs) => {
                self.visit_list_expr(lhs);
                self.visit_list_expr(rhs);
            }
        }
    }

    pub fn visit_bool_expr(&mut self, expr: &BoolExpr) {
        match expr {
            BoolExpr::True | BoolExpr::False => {}
            BoolExpr::Var(v) => {
                self.bools.insert(*v);
            }
            BoolExpr::Not(p) => self.visit_bool_expr(p),
            BoolExpr::And(ps) | BoolExpr::Or(ps) => {
                for p in ps {
                    self.visit_bool_expr(p);
                }
            }
            BoolExpr::IntCmp(_, lhs, rhs) => {
                self.visit_int_expr(lhs);
                self.visit_int_expr(rhs);
            }
            BoolExpr::ListEq(lhs, rhs) => {
                self.visit_list_expr(lhs);
                self.visit_list_expr(rhs);
            }
            BoolExpr::BoolEq(lhs, rhs) => {
                self.visit_bool_expr(lhs);
                self.visit_bool_expr(rhs);
            }
        }
    }

    pub fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Int(e) => self.visit_int_expr(e),
            Expr::List(e) => self.visit_list_expr(e),
            Expr::Bool(e) => self.visit_bool_expr(e),
            Expr::Tuple(es) => {
                for e in es.iter().flatten() {
                    self.visit_expr(e);
                }
            }
        }
    }

    pub fn visit_raw_constraint(&mut self, constraint: &RawConstraint) {
        match constraint {
            RawConstraint::Expr { pred, assuming, .. } => {
                self.visit_bool_expr(pred);
                self.visit_bool_expr(assuming);
            }
            RawConstraint::Call {
                args,
                result,
                assuming,
                ..
            } => {
                for arg in args.iter().flatten() {
                    self.visit_expr(arg);
                }
                if let Some(result) = result {
                    self.visit_expr(result);
                }
                self.visit_bool_expr(assuming);
            }
        }
    }

    pub fn visit_constraint(&mut self, constraint: &Constraint) {
        self.visit_bool_expr(&constraint.pred);
        self.visit_bool_expr(&constraint.assuming);
    }

    pub fn visit_summary(&mut self, summary: &FunctionSummary) {
        for arg in summary.arg_exprs.iter().flatten() {
            self.visit_expr(arg);
        }
        if let Some(ret) = &summary.ret_expr {
            self.visit_expr(ret);
        }
        for c in &summary.constraints {
            self.visit_raw_constraint(c);
        }
    }
}
