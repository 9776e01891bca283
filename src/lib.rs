// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! Tensor Shape Checking Helper

The crate extracts and simplifies the tensor-shape constraint system implied
by the low-level SSA IR of a numerical program.

The central entry point is [`check_module`], which corresponds to one compiled
module. It runs three stages:

- the [abstract interpreter](crate::interp) walks each function's blocks and
  produces a [`FunctionSummary`]: symbolic argument expressions, a symbolic
  return expression, and the [`RawConstraint`]s relating them;
- [call expansion](crate::calls) replaces `call`-form constraints with the
  callee's summary, yielding final [`Constraint`]s tagged with a [`CallStack`];
- the [transform pipeline](crate::transforms) rewrites the constraint list to
  a fixpoint before it is handed to a downstream solver.

## Symbolic terms

Terms come in three sorts: integers ([`IntExpr`]), shapes ([`ListExpr`]) and
booleans ([`BoolExpr`]). Each sort has its own variable namespace, but all
three draw ids from one shared [`FreshVarSource`] counter, so a variable's
printed name (`d3`, `s3`, `b3`) never collides across sorts within a run.

## Constraints

A constraint is a boolean predicate that must hold whenever its `assuming`
guard (the path condition at the emitting program point) holds. Constraints
remember whether the user wrote them (`asserted`) or the interpreter derived
them (`implied`); transforms are free to rewrite or drop implied constraints
but must preserve asserted ones.
*/

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared handle for recursive term children.
pub type Handle<T> = Arc<T>;

pub(crate) type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub(crate) type FastHashSet<K> = rustc_hash::FxHashSet<K>;

pub mod calls;
pub mod diag;
pub mod entail;
pub mod interp;
pub mod ir;
mod macros;
pub mod subst;
pub mod transforms;

pub use calls::expand_function;
pub use diag::{DiagnosticSink, LogSink};
pub use entail::implies;
pub use interp::abstract_function;
pub use transforms::{
    deduplicate, inline, inline_bool_vars, pipeline, resolve_equalities, simplify, Strength,
};

/// A source position attached to constraints and diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// Integer-sorted variable, printed `d{n}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntVar(pub u32);

/// Shape-sorted variable, printed `s{n}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListVar(pub u32);

/// Boolean-sorted variable, printed `b{n}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoolVar(pub u32);

impl std::fmt::Display for IntVar {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl std::fmt::Display for ListVar {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl std::fmt::Display for BoolVar {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// The shared counter all three variable namespaces draw from.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FreshVarSource {
    next: u32,
}

impl FreshVarSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn fresh_int(&mut self) -> IntVar {
        IntVar(self.next_id())
    }

    pub fn fresh_list(&mut self) -> ListVar {
        ListVar(self.next_id())
    }

    pub fn fresh_bool(&mut self) -> BoolVar {
        BoolVar(self.next_id())
    }
}

#[derive(
    strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum IntBinOp {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mul,
    /// Integer division, truncating toward zero.
    #[strum(to_string = "/")]
    Div,
}

#[derive(
    strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum CmpOp {
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
}

impl CmpOp {
    /// The comparison that holds exactly when `self` does not, if one exists.
    #[must_use]
    pub fn negation(self) -> Option<Self> {
        match self {
            CmpOp::Eq => None,
            CmpOp::Gt => Some(CmpOp::Le),
            CmpOp::Ge => Some(CmpOp::Lt),
            CmpOp::Lt => Some(CmpOp::Ge),
            CmpOp::Le => Some(CmpOp::Gt),
        }
    }
}

/// Integer-sorted term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntExpr {
    Var(IntVar),
    Literal(i64),
    /// An opaque integer keyed by its use site. Two holes at the same
    /// location are the same symbolic value; holes at different locations
    /// are never merged.
    Hole(SourceLocation),
    /// The rank of a shape.
    Length(Handle<ListExpr>),
    /// The `k`-th dimension of a shape; negative `k` counts from the right.
    Element(i64, Handle<ListExpr>),
    Binary(IntBinOp, Handle<IntExpr>, Handle<IntExpr>),
}

impl IntExpr {
    pub fn binary<L, R>(op: IntBinOp, lhs: L, rhs: R) -> Self
    where
        L: Into<Handle<IntExpr>>,
        R: Into<Handle<IntExpr>>,
    {
        IntExpr::Binary(op, lhs.into(), rhs.into())
    }

    pub fn length<T: Into<Handle<ListExpr>>>(of: T) -> Self {
        IntExpr::Length(of.into())
    }

    pub fn element<T: Into<Handle<ListExpr>>>(index: i64, of: T) -> Self {
        IntExpr::Element(index, of.into())
    }
}

impl std::fmt::Display for IntExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            IntExpr::Var(v) => write!(f, "{v}"),
            IntExpr::Literal(n) => write!(f, "{n}"),
            IntExpr::Hole(loc) => write!(f, "hole({loc})"),
            IntExpr::Length(l) => write!(f, "rank({l})"),
            IntExpr::Element(k, l) => write!(f, "{l}[{k}]"),
            IntExpr::Binary(op, lhs, rhs) => write!(f, "({lhs} {op} {rhs})"),
        }
    }
}

/// Shape-sorted term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListExpr {
    Var(ListVar),
    /// A fixed-rank shape; `None` slots are dimensions of unknown size.
    Literal(Vec<Option<IntExpr>>),
    /// Elementwise NumPy-style broadcast of two shapes.
    Broadcast(Handle<ListExpr>, Handle<ListExpr>),
}

impl ListExpr {
    pub fn broadcast<L, R>(lhs: L, rhs: R) -> Self
    where
        L: Into<Handle<ListExpr>>,
        R: Into<Handle<ListExpr>>,
    {
        ListExpr::Broadcast(lhs.into(), rhs.into())
    }

    /// Shape literal with every dimension known.
    pub fn known(dims: impl IntoIterator<Item = i64>) -> Self {
        ListExpr::Literal(dims.into_iter().map(|d| Some(IntExpr::Literal(d))).collect())
    }
}

impl std::fmt::Display for ListExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ListExpr::Var(v) => write!(f, "{v}"),
            ListExpr::Literal(dims) => {
                write!(f, "[")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match dim {
                        Some(e) => write!(f, "{e}")?,
                        None => write!(f, "*")?,
                    }
                }
                write!(f, "]")
            }
            ListExpr::Broadcast(lhs, rhs) => write!(f, "broadcast({lhs}, {rhs})"),
        }
    }
}

/// Boolean-sorted term.
///
/// The [`BoolExpr::new_and`] / [`BoolExpr::new_or`] / [`BoolExpr::new_not`]
/// constructors normalize as they build: literals are absorbed and n-ary
/// connectives are flattened, so no `True`/`False` appears inside a compound
/// predicate and no `And` nests directly inside an `And`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolExpr {
    True,
    False,
    Var(BoolVar),
    Not(Handle<BoolExpr>),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
    IntCmp(CmpOp, Handle<IntExpr>, Handle<IntExpr>),
    ListEq(Handle<ListExpr>, Handle<ListExpr>),
    BoolEq(Handle<BoolExpr>, Handle<BoolExpr>),
}

impl BoolExpr {
    #[must_use]
    pub fn new_and(lhs: BoolExpr, rhs: BoolExpr) -> BoolExpr {
        match (lhs, rhs) {
            (BoolExpr::True, x) | (x, BoolExpr::True) => x,
            (BoolExpr::False, _) | (_, BoolExpr::False) => BoolExpr::False,
            (BoolExpr::And(mut xs), BoolExpr::And(ys)) => {
                xs.extend(ys);
                BoolExpr::And(xs)
            }
            (BoolExpr::And(mut xs), y) => {
                xs.push(y);
                BoolExpr::And(xs)
            }
            (x, BoolExpr::And(ys)) => {
                let mut xs = Vec::with_capacity(ys.len() + 1);
                xs.push(x);
                xs.extend(ys);
                BoolExpr::And(xs)
            }
            (x, y) => BoolExpr::And(vec![x, y]),
        }
    }

    #[must_use]
    pub fn new_or(lhs: BoolExpr, rhs: BoolExpr) -> BoolExpr {
        match (lhs, rhs) {
            (BoolExpr::False, x) | (x, BoolExpr::False) => x,
            (BoolExpr::True, _) | (_, BoolExpr::True) => BoolExpr::True,
            (BoolExpr::Or(mut xs), BoolExpr::Or(ys)) => {
                xs.extend(ys);
                BoolExpr::Or(xs)
            }
            (BoolExpr::Or(mut xs), y) => {
                xs.push(y);
                BoolExpr::Or(xs)
            }
            (x, BoolExpr::Or(ys)) => {
                let mut xs = Vec::with_capacity(ys.len() + 1);
                xs.push(x);
                xs.extend(ys);
                BoolExpr::Or(xs)
            }
            (x, y) => BoolExpr::Or(vec![x, y]),
        }
    }

    #[must_use]
    pub fn new_not(pred: BoolExpr) -> BoolExpr {
        match pred {
            BoolExpr::True => BoolExpr::False,
            BoolExpr::False => BoolExpr::True,
            BoolExpr::Not(inner) => inner.as_ref().clone(),
            BoolExpr::IntCmp(op, lhs, rhs) => match op.negation() {
                Some(neg) => BoolExpr::IntCmp(neg, lhs, rhs),
                None => BoolExpr::Not(BoolExpr::IntCmp(op, lhs, rhs).into()),
            },
            other => BoolExpr::Not(other.into()),
        }
    }

    /// Conjunction of arbitrarily many predicates, normalized.
    pub fn and_all(preds: impl IntoIterator<Item = BoolExpr>) -> BoolExpr {
        preds.into_iter().fold(BoolExpr::True, BoolExpr::new_and)
    }

    /// Disjunction of arbitrarily many predicates, normalized.
    pub fn or_all(preds: impl IntoIterator<Item = BoolExpr>) -> BoolExpr {
        preds.into_iter().fold(BoolExpr::False, BoolExpr::new_or)
    }

    pub fn int_cmp<L, R>(op: CmpOp, lhs: L, rhs: R) -> BoolExpr
    where
        L: Into<Handle<IntExpr>>,
        R: Into<Handle<IntExpr>>,
    {
        BoolExpr::IntCmp(op, lhs.into(), rhs.into())
    }

    pub fn int_eq<L, R>(lhs: L, rhs: R) -> BoolExpr
    where
        L: Into<Handle<IntExpr>>,
        R: Into<Handle<IntExpr>>,
    {
        BoolExpr::IntCmp(CmpOp::Eq, lhs.into(), rhs.into())
    }

    pub fn list_eq<L, R>(lhs: L, rhs: R) -> BoolExpr
    where
        L: Into<Handle<ListExpr>>,
        R: Into<Handle<ListExpr>>,
    {
        BoolExpr::ListEq(lhs.into(), rhs.into())
    }

    pub fn bool_eq<L, R>(lhs: L, rhs: R) -> BoolExpr
    where
        L: Into<Handle<BoolExpr>>,
        R: Into<Handle<BoolExpr>>,
    {
        BoolExpr::BoolEq(lhs.into(), rhs.into())
    }
}

impl std::fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BoolExpr::True => f.write_str("true"),
            BoolExpr::False => f.write_str("false"),
            BoolExpr::Var(v) => write!(f, "{v}"),
            BoolExpr::Not(p) => write!(f, "!({p})"),
            BoolExpr::And(ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            BoolExpr::Or(ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            BoolExpr::IntCmp(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            BoolExpr::ListEq(lhs, rhs) => write!(f, "{lhs} == {rhs}"),
            BoolExpr::BoolEq(lhs, rhs) => write!(f, "{lhs} == {rhs}"),
        }
    }
}

/// The tagged union of the three sorts, plus the compound tuple used only at
/// the call-site boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Int(IntExpr),
    List(ListExpr),
    Bool(BoolExpr),
    Tuple(Vec<Option<Expr>>),
}

impl Expr {
    #[must_use]
    pub fn sort_name(&self) -> &'static str {
        match self {
            Expr::Int(_) => "int",
            Expr::List(_) => "list",
            Expr::Bool(_) => "bool",
            Expr::Tuple(_) => "tuple",
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Expr::Int(e) => write!(f, "{e}"),
            Expr::List(e) => write!(f, "{e}"),
            Expr::Bool(e) => write!(f, "{e}"),
            Expr::Tuple(es) => {
                write!(f, "(")?;
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match e {
                        Some(e) => write!(f, "{e}")?,
                        None => write!(f, "_")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// Whether a constraint was written by the user or derived by the interpreter.
#[derive(
    strum_macros::Display, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum Origin {
    #[strum(to_string = "asserted")]
    Asserted,
    #[strum(to_string = "implied")]
    Implied,
}

/// A constraint produced by the abstract interpreter, before call expansion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawConstraint {
    /// `pred` must hold whenever the path condition `assuming` holds.
    Expr {
        pred: BoolExpr,
        assuming: BoolExpr,
        origin: Origin,
        loc: Option<SourceLocation>,
    },
    /// An unresolved call site: stands for the callee's constraints with
    /// arguments and result substituted.
    Call {
        callee: String,
        args: Vec<Option<Expr>>,
        result: Option<Expr>,
        assuming: BoolExpr,
        loc: Option<SourceLocation>,
    },
}

impl RawConstraint {
    #[must_use]
    pub fn assuming(&self) -> &BoolExpr {
        match self {
            RawConstraint::Expr { assuming, .. } | RawConstraint::Call { assuming, .. } => assuming,
        }
    }
}

impl std::fmt::Display for RawConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if !matches!(self.assuming(), BoolExpr::True) {
            write!(f, "{{{}}} ", self.assuming())?;
        }
        match self {
            RawConstraint::Expr { pred, .. } => write!(f, "{pred}"),
            RawConstraint::Call {
                callee,
                args,
                result,
                ..
            } => {
                if let Some(result) = result {
                    write!(f, "{result} = ")?;
                }
                write!(f, "{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match arg {
                        Some(arg) => write!(f, "{arg}")?,
                        None => write!(f, "_")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// A cons list of inlined call sites, innermost first.
///
/// The head `loc` is the location the constraint itself was emitted at; each
/// `parent` frame is a call site it was inlined through, innermost outward.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallStack {
    pub loc: Option<SourceLocation>,
    pub parent: Option<Handle<CallStack>>,
}

impl CallStack {
    #[must_use]
    pub fn leaf(loc: Option<SourceLocation>) -> Self {
        CallStack { loc, parent: None }
    }

    /// Extend the stack with the call site the constraint was inlined through.
    #[must_use]
    pub fn through(&self, call_site: Option<SourceLocation>) -> Self {
        match &self.parent {
            None => CallStack {
                loc: self.loc.clone(),
                parent: Some(Handle::new(CallStack::leaf(call_site))),
            },
            Some(parent) => CallStack {
                loc: self.loc.clone(),
                parent: Some(Handle::new(parent.through(call_site))),
            },
        }
    }
}

impl std::fmt::Display for CallStack {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{loc}")?,
            None => write!(f, "?")?,
        }
        if let Some(parent) = &self.parent {
            write!(f, " <- {parent}")?;
        }
        Ok(())
    }
}

/// A fully resolved constraint: call-free, tagged with the chain of call
/// sites it was inlined through.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub pred: BoolExpr,
    pub assuming: BoolExpr,
    pub origin: Origin,
    pub stack: CallStack,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if !matches!(self.assuming, BoolExpr::True) {
            write!(f, "{{{}}} ", self.assuming)?;
        }
        write!(f, "{}", self.pred)
    }
}

/// A function's abstracted signature: symbolic argument expressions, a
/// symbolic return expression, and the constraints relating them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub arg_exprs: Vec<Option<Expr>>,
    pub ret_expr: Option<Expr>,
    pub constraints: Vec<RawConstraint>,
}

impl std::fmt::Display for FunctionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.arg_exprs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Some(arg) => write!(f, "{arg}")?,
                None => write!(f, "_")?,
            }
        }
        write!(f, ")")?;
        if let Some(ret) = &self.ret_expr {
            write!(f, " -> {ret}")?;
        }
        for c in &self.constraints {
            write!(f, "\n  {c}")?;
        }
        Ok(())
    }
}

/// A fatal IR inconsistency or internal contract violation.
///
/// These abort the whole run; per-function recoverable conditions go through
/// [`DiagnosticSink::warn`] instead.
#[derive(Clone, Debug, thiserror::Error, Serialize)]
pub enum StructuralError {
    #[error("[file: {file}, line: {line}] sort mismatch: expected {expected}, have {have}")]
    SortMismatch {
        expected: &'static str,
        have: &'static str,
        file: &'static str,
        line: u32,
    },
    #[error("operator `{operator}` expects {expected} operands, have {have}")]
    OperandArity {
        operator: &'static str,
        expected: usize,
        have: usize,
    },
    #[error("operator `{operator}` expects {expected} results, have {have}")]
    ResultArity {
        operator: &'static str,
        expected: usize,
        have: usize,
    },
    #[error("cannot equate tuples of arity {lhs} and {rhs}")]
    TupleArity { lhs: usize, rhs: usize },
    #[error("call to `{callee}` passes {have} arguments, summary expects {expected}")]
    CallArity {
        callee: String,
        expected: usize,
        have: usize,
    },
    #[error("recursive call through `{0}` in the summary graph")]
    RecursiveCall(String),
}

/// Abstract every function of `module`, expand call summaries, and run the
/// transform pipeline, returning the final constraints per function name.
///
/// Functions whose abstraction is skipped (reported through `sink`) are
/// treated as opaque by their callers.
///
/// # Errors
/// Returns a [`StructuralError`] on an IR inconsistency or a recursive
/// summary graph.
pub fn check_module(
    module: &ir::Module,
    cfg: &dyn ir::CfgPreprocessor,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<(String, Vec<Constraint>)>, StructuralError> {
    let mut fresh = FreshVarSource::new();
    let mut summaries: FastHashMap<String, FunctionSummary> = FastHashMap::default();
    for function in &module.functions {
        if let Some(summary) = abstract_function(function, &module.types, cfg, sink, &mut fresh)? {
            summaries.insert(function.name.clone(), summary);
        }
    }

    let mut checked = Vec::with_capacity(module.functions.len());
    for function in &module.functions {
        if !summaries.contains_key(&function.name) {
            continue;
        }
        let expanded = expand_function(&function.name, &summaries, &mut fresh, sink)?;
        let simplified = pipeline(expanded, &Strength::Implied);
        checked.push((function.name.clone(), simplified));
    }
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn b(n: u32) -> BoolExpr {
        BoolExpr::Var(BoolVar(n))
    }

    #[rstest]
    fn test_and_absorbs_literals() {
        assert_eq!(BoolExpr::new_and(BoolExpr::True, b(0)), b(0));
        assert_eq!(BoolExpr::new_and(b(0), BoolExpr::False), BoolExpr::False);
    }

    #[rstest]
    fn test_and_flattens() {
        let nested = BoolExpr::new_and(BoolExpr::new_and(b(0), b(1)), b(2));
        assert_eq!(nested, BoolExpr::And(vec![b(0), b(1), b(2)]));
    }

    #[rstest]
    fn test_or_flattens() {
        let nested = BoolExpr::new_or(b(0), BoolExpr::new_or(b(1), b(2)));
        assert_eq!(nested, BoolExpr::Or(vec![b(0), b(1), b(2)]));
    }

    #[rstest]
    fn test_not_not() {
        assert_eq!(BoolExpr::new_not(BoolExpr::new_not(b(0))), b(0));
    }

    #[rstest]
    fn test_not_flips_comparison() {
        let gt = BoolExpr::int_cmp(CmpOp::Gt, IntExpr::Var(IntVar(0)), IntExpr::Literal(2));
        let le = BoolExpr::int_cmp(CmpOp::Le, IntExpr::Var(IntVar(0)), IntExpr::Literal(2));
        assert_eq!(BoolExpr::new_not(gt), le);
    }

    #[rstest]
    fn test_not_keeps_equality() {
        let eq = BoolExpr::int_eq(IntExpr::Var(IntVar(0)), IntExpr::Literal(2));
        assert!(matches!(BoolExpr::new_not(eq), BoolExpr::Not(_)));
    }

    #[rstest]
    fn test_display_constraint() {
        let c = Constraint {
            pred: BoolExpr::int_cmp(CmpOp::Gt, IntExpr::Var(IntVar(0)), IntExpr::Literal(2)),
            assuming: b(1),
            origin: Origin::Asserted,
            stack: CallStack::leaf(None),
        };
        assert_eq!(c.to_string(), "{b1} d0 > 2");
    }

    #[rstest]
    fn test_display_shape_literal() {
        let l = ListExpr::Literal(vec![Some(IntExpr::Literal(8)), None]);
        assert_eq!(l.to_string(), "[8, *]");
    }

    #[rstest]
    fn test_shared_counter_spans_sorts() {
        let mut fresh = FreshVarSource::new();
        let d = fresh.fresh_int();
        let s = fresh.fresh_list();
        let bb = fresh.fresh_bool();
        assert_eq!((d.0, s.0, bb.0), (0, 1, 2));
    }
}
