// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! The abstract interpreter.

[`abstract_function`] walks one function's unlooped CFG in topological
order, tracking a symbolic [`AbstractValue`] per register and a path
condition per block, and emits the [`RawConstraint`]s that make up the
function's [`FunctionSummary`].

Recoverable conditions (irreducible graph, unknown terminator, an `assert`
whose condition cannot be resolved) abandon the function with a warning on
the injected sink; the caller then treats the function as opaque. Arity or
sort inconsistencies in operators the interpreter claims to understand are
IR bugs and abort the run.
*/

mod builtins;

use log::trace as log_trace;

use builtins::{Builtin, BUILTINS};

use crate::diag::DiagnosticSink;
use crate::ir::{
    Block, BlockLabel, CfgPreprocessor, Function, Operator, OperatorDef, Register, SourceInfo,
    Terminator, TerminatorDef, Type, TypeEnvironment,
};
use crate::macros::sort_mismatch;
use crate::{
    BoolExpr, Expr, FastHashMap, FastHashSet, FreshVarSource, FunctionSummary, Handle, IntExpr,
    ListExpr, Origin, RawConstraint, SourceLocation, StructuralError,
};

/// The mangling suffix of addressed `Int` globals; loads through such
/// addresses become location-keyed holes.
const INT_GLOBAL_SUFFIX: &str = "Sivp";

/// What the interpreter knows about a register.
#[derive(Clone, Debug)]
pub enum AbstractValue {
    Int(IntExpr),
    List(ListExpr),
    Bool(BoolExpr),
    /// A tensor, tracked by its shape.
    Tensor(ListExpr),
    Tuple(Vec<Option<AbstractValue>>),
    /// A reference to a named function.
    Function(String),
    /// A function with some of its final arguments already bound.
    PartialApplication {
        callee: Handle<AbstractValue>,
        args: Vec<Option<AbstractValue>>,
        arg_types: Vec<Type>,
    },
    /// The address of an opaque integer global.
    GlobalIntAddress,
}

impl AbstractValue {
    fn sort_name(&self) -> &'static str {
        match self {
            AbstractValue::Int(_) => "int",
            AbstractValue::List(_) => "list",
            AbstractValue::Bool(_) => "bool",
            AbstractValue::Tensor(_) => "tensor",
            AbstractValue::Tuple(_) => "tuple",
            AbstractValue::Function(_) => "function",
            AbstractValue::PartialApplication { .. } => "partial application",
            AbstractValue::GlobalIntAddress => "global address",
        }
    }

    /// The constraint-level expression for this value, if it has one.
    /// Tensors cross the boundary as their shapes.
    #[must_use]
    pub fn as_expr(&self) -> Option<Expr> {
        match self {
            AbstractValue::Int(e) => Some(Expr::Int(e.clone())),
            AbstractValue::List(e) | AbstractValue::Tensor(e) => Some(Expr::List(e.clone())),
            AbstractValue::Bool(e) => Some(Expr::Bool(e.clone())),
            AbstractValue::Tuple(items) => Some(Expr::Tuple(
                items
                    .iter()
                    .map(|item| item.as_ref().and_then(AbstractValue::as_expr))
                    .collect(),
            )),
            AbstractValue::Function(_)
            | AbstractValue::PartialApplication { .. }
            | AbstractValue::GlobalIntAddress => None,
        }
    }
}

/// Why a function's abstraction was abandoned.
#[derive(Clone, Debug, thiserror::Error)]
enum SkipReason {
    #[error("control-flow graph is not reducible")]
    NonReducibleCfg,
    #[error("unknown terminator `{0}`")]
    UnknownTerminator(String),
    #[error("assert condition does not resolve to a function")]
    UnresolvableAssert,
    #[error("branch to unknown block `{0}`")]
    UnknownBlockTarget(String),
}

enum Failure {
    Skip(SkipReason, Option<SourceLocation>),
    Fatal(StructuralError),
}

impl From<StructuralError> for Failure {
    fn from(e: StructuralError) -> Self {
        Failure::Fatal(e)
    }
}

/// Equate two constraint-level expressions, producing one equality per
/// scalar leaf. Sorts must line up; tuples are equated componentwise.
pub(crate) fn equate(lhs: &Expr, rhs: &Expr) -> Result<Vec<BoolExpr>, StructuralError> {
    match (lhs, rhs) {
        (Expr::Int(a), Expr::Int(b)) => Ok(vec![BoolExpr::int_eq(a.clone(), b.clone())]),
        (Expr::List(a), Expr::List(b)) => Ok(vec![BoolExpr::list_eq(a.clone(), b.clone())]),
        (Expr::Bool(a), Expr::Bool(b)) => Ok(vec![BoolExpr::bool_eq(a.clone(), b.clone())]),
        (Expr::Tuple(xs), Expr::Tuple(ys)) => {
            if xs.len() != ys.len() {
                return Err(StructuralError::TupleArity {
                    lhs: xs.len(),
                    rhs: ys.len(),
                });
            }
            let mut out = Vec::new();
            for (x, y) in xs.iter().zip(ys) {
                if let (Some(x), Some(y)) = (x, y) {
                    out.extend(equate(x, y)?);
                }
            }
            Ok(out)
        }
        (a, b) => Err(sort_mismatch!(a.sort_name(), b.sort_name())),
    }
}

/// Abstract one function into its constraint summary.
///
/// Returns `Ok(None)` (after a warning on `sink`) when the function must be
/// skipped; callers then treat it as opaque.
///
/// # Errors
/// Returns a [`StructuralError`] when the IR violates the interpreter's
/// structural expectations.
pub fn abstract_function(
    function: &Function,
    env: &TypeEnvironment,
    cfg: &dyn CfgPreprocessor,
    sink: &mut dyn DiagnosticSink,
    fresh: &mut FreshVarSource,
) -> Result<Option<FunctionSummary>, StructuralError> {
    if !cfg.induces_reducible_cfg(&function.blocks) {
        warn_skip(sink, function, &SkipReason::NonReducibleCfg, None);
        return Ok(None);
    }
    let blocks = cfg.unloop(function.blocks.clone());
    let Some(order) = topological_order(&blocks) else {
        // The preprocessor promised an acyclic graph; be conservative.
        warn_skip(sink, function, &SkipReason::NonReducibleCfg, None);
        return Ok(None);
    };

    let mut interp = Interpreter::new(function, env, fresh, &blocks);
    match interp.run(&blocks, &order) {
        Ok(()) => {
            log_trace!(
                "abstracted `{}`: {} constraints",
                function.name,
                interp.constraints.len()
            );
            Ok(Some(interp.into_summary(function, &blocks)))
        }
        Err(Failure::Skip(reason, loc)) => {
            warn_skip(sink, function, &reason, loc.as_ref());
            Ok(None)
        }
        Err(Failure::Fatal(e)) => Err(e),
    }
}

fn warn_skip(
    sink: &mut dyn DiagnosticSink,
    function: &Function,
    reason: &SkipReason,
    loc: Option<&SourceLocation>,
) {
    sink.warn(&format!("skipping `{}`: {reason}", function.name), loc);
}

/// Topological order of the blocks reachable from the entry, or `None` when
/// the graph still has a cycle. Edges to unknown labels are ignored here and
/// diagnosed when the branch is interpreted.
fn topological_order(blocks: &[Block]) -> Option<Vec<usize>> {
    if blocks.is_empty() {
        return Some(Vec::new());
    }
    let index: FastHashMap<&BlockLabel, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (&b.label, i))
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }
    let mut colors = vec![Color::White; blocks.len()];
    let mut postorder = Vec::with_capacity(blocks.len());
    let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
    colors[0] = Color::Grey;
    while let Some(entry) = stack.last_mut() {
        let (node, edge) = *entry;
        let succs = blocks[node].terminator.terminator.successors();
        if edge >= succs.len() {
            colors[node] = Color::Black;
            postorder.push(node);
            stack.pop();
            continue;
        }
        entry.1 += 1;
        let Some(&next) = index.get(succs[edge]) else {
            continue;
        };
        match colors[next] {
            Color::Grey => return None,
            Color::White => {
                colors[next] = Color::Grey;
                stack.push((next, 0));
            }
            Color::Black => {}
        }
    }
    postorder.reverse();
    Some(postorder)
}

struct Interpreter<'a> {
    env: &'a TypeEnvironment,
    fresh: &'a mut FreshVarSource,
    registers: FastHashMap<Register, AbstractValue>,
    path_conditions: FastHashMap<BlockLabel, FastHashSet<BoolExpr>>,
    constraints: Vec<RawConstraint>,
    ret_expr: Option<Expr>,
}

impl<'a> Interpreter<'a> {
    fn new(
        function: &Function,
        env: &'a TypeEnvironment,
        fresh: &'a mut FreshVarSource,
        blocks: &[Block],
    ) -> Self {
        let mut interp = Interpreter {
            env,
            fresh,
            registers: FastHashMap::default(),
            path_conditions: FastHashMap::default(),
            constraints: Vec::new(),
            ret_expr: None,
        };
        // Fresh symbolic values for every block argument and the return
        // slot, allocated up front in block order so variable numbering is
        // reproducible.
        for block in blocks {
            for (reg, ty) in &block.arguments {
                if let Some(value) = interp.fresh_value(ty) {
                    interp.registers.insert(reg.clone(), value);
                }
            }
        }
        interp.ret_expr = interp
            .fresh_value(&function.result)
            .as_ref()
            .and_then(AbstractValue::as_expr);
        if let Some(entry) = blocks.first() {
            interp
                .path_conditions
                .entry(entry.label.clone())
                .or_default()
                .insert(BoolExpr::True);
        }
        interp
    }

    fn value(&self, reg: &Register) -> Option<&AbstractValue> {
        self.registers.get(reg)
    }

    fn set(&mut self, reg: &Register, value: AbstractValue) {
        self.registers.insert(reg.clone(), value);
    }

    /// Fresh symbolic value for a register of the given type, or `None` when
    /// the type's structure is unknown (the register stays untracked).
    fn fresh_value(&mut self, ty: &Type) -> Option<AbstractValue> {
        self.fresh_value_guarded(ty, &mut Vec::new())
    }

    fn fresh_value_guarded(&mut self, ty: &Type, visiting: &mut Vec<String>) -> Option<AbstractValue> {
        let env = self.env;
        match ty.simplified() {
            Type::Named(name) => match name.as_str() {
                "Int" => Some(AbstractValue::Int(IntExpr::Var(self.fresh.fresh_int()))),
                "Bool" => Some(AbstractValue::Bool(BoolExpr::Var(self.fresh.fresh_bool()))),
                "TensorShape" => Some(AbstractValue::List(ListExpr::Var(self.fresh.fresh_list()))),
                other => {
                    let fields = env.fields(other)?;
                    if visiting.iter().any(|n| n == other) {
                        return None;
                    }
                    visiting.push(other.to_string());
                    let values = fields
                        .iter()
                        .map(|f| self.fresh_value_guarded(&f.ty, visiting))
                        .collect();
                    visiting.pop();
                    Some(AbstractValue::Tuple(values))
                }
            },
            Type::Specialized { base, .. } if base == "Tensor" => {
                Some(AbstractValue::Tensor(ListExpr::Var(self.fresh.fresh_list())))
            }
            Type::Tuple(tys) => Some(AbstractValue::Tuple(
                tys.iter()
                    .map(|ty| self.fresh_value_guarded(ty, visiting))
                    .collect(),
            )),
            Type::Builtin(name) if name == "Int1" => {
                Some(AbstractValue::Bool(BoolExpr::Var(self.fresh.fresh_bool())))
            }
            Type::Builtin(name) if name.starts_with("Int") || name.starts_with("Word") => {
                Some(AbstractValue::Int(IntExpr::Var(self.fresh.fresh_int())))
            }
            _ => None,
        }
    }

    fn run(&mut self, blocks: &[Block], order: &[usize]) -> Result<(), Failure> {
        let index: FastHashMap<&BlockLabel, usize> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (&b.label, i))
            .collect();
        for &bi in order {
            let block = &blocks[bi];
            let Some(pc) = self.effective_path_condition(&block.label) else {
                continue;
            };
            for op in &block.operators {
                self.interpret_operator(op, &pc)?;
            }
            self.interpret_terminator(blocks, &index, block, &pc)?;
        }
        Ok(())
    }

    /// The deterministic disjunction of the conditions that reach `label`:
    /// disjuncts are sorted by textual form before folding, so identical
    /// inputs always produce identical summaries.
    fn effective_path_condition(&self, label: &BlockLabel) -> Option<BoolExpr> {
        let set = self.path_conditions.get(label)?;
        let mut disjuncts: Vec<&BoolExpr> = set.iter().collect();
        disjuncts.sort_by_cached_key(|p| p.to_string());
        Some(BoolExpr::or_all(disjuncts.into_iter().cloned()))
    }

    fn single_result<'d>(
        &self,
        def: &'d OperatorDef,
    ) -> Result<&'d (Register, Type), StructuralError> {
        match def.results.as_slice() {
            [result] => Ok(result),
            other => Err(StructuralError::ResultArity {
                operator: def.operator.name(),
                expected: 1,
                have: other.len(),
            }),
        }
    }

    fn interpret_operator(&mut self, def: &OperatorDef, pc: &BoolExpr) -> Result<(), Failure> {
        match &def.operator {
            // Ownership bookkeeping shares the operand's symbolic value, so
            // constraints about the copy constrain the original.
            Operator::BeginBorrow { operand }
            | Operator::CopyValue { operand }
            | Operator::ConvertFunction { operand }
            | Operator::ConvertEscapeToNoescape { operand }
            | Operator::ThinToThickFunction { operand }
            | Operator::MarkDependence { value: operand, .. } => {
                let (reg, _) = self.single_result(def)?;
                if let Some(value) = self.value(operand).cloned() {
                    let reg = reg.clone();
                    self.set(&reg, value);
                }
            }
            Operator::IntegerLiteral { value, .. } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                self.set(&reg, AbstractValue::Int(IntExpr::Literal(*value)));
            }
            Operator::ArrayLiteral { elements, .. } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                let dims = elements
                    .iter()
                    .map(|r| match self.value(r) {
                        Some(AbstractValue::Int(e)) => Some(e.clone()),
                        _ => None,
                    })
                    .collect();
                self.set(&reg, AbstractValue::List(ListExpr::Literal(dims)));
            }
            Operator::Builtin { name, operands } if name == "literal_equal" => {
                if operands.len() < 2 {
                    return Err(StructuralError::OperandArity {
                        operator: "literal_equal",
                        expected: 2,
                        have: operands.len(),
                    }
                    .into());
                }
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                let lhs = match self.value(&operands[0]) {
                    Some(AbstractValue::Int(e)) => Some(e.clone()),
                    _ => None,
                };
                let rhs = match self.value(&operands[1]) {
                    Some(AbstractValue::Int(e)) => Some(e.clone()),
                    _ => None,
                };
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    self.set(&reg, AbstractValue::Bool(BoolExpr::int_eq(lhs, rhs)));
                }
            }
            Operator::Builtin { .. } => {}
            Operator::FunctionRef { name } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                self.set(&reg, AbstractValue::Function(name.clone()));
            }
            Operator::PartialApply {
                callee,
                args,
                arg_types,
            } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                if let Some(callee) = self.value(callee).cloned() {
                    let args = args.iter().map(|r| self.value(r).cloned()).collect();
                    self.set(
                        &reg,
                        AbstractValue::PartialApplication {
                            callee: Handle::new(callee),
                            args,
                            arg_types: arg_types.clone(),
                        },
                    );
                }
            }
            Operator::Struct { operands, .. } | Operator::Tuple { operands } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                let items = operands.iter().map(|r| self.value(r).cloned()).collect();
                self.set(&reg, AbstractValue::Tuple(items));
            }
            Operator::DestructureTuple { operand } => {
                if let Some(AbstractValue::Tuple(items)) = self.value(operand).cloned() {
                    if items.len() != def.results.len() {
                        return Err(StructuralError::ResultArity {
                            operator: "destructure_tuple",
                            expected: items.len(),
                            have: def.results.len(),
                        }
                        .into());
                    }
                    for ((reg, _), item) in def.results.iter().zip(items) {
                        if let Some(item) = item {
                            self.set(reg, item);
                        }
                    }
                }
            }
            Operator::StructExtract {
                operand,
                ty_name,
                field,
            } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                if let Some(AbstractValue::Tuple(items)) = self.value(operand).cloned() {
                    if let Some(index) = self.env.field_index(ty_name, field) {
                        if index >= items.len() {
                            return Err(StructuralError::OperandArity {
                                operator: "struct_extract",
                                expected: index + 1,
                                have: items.len(),
                            }
                            .into());
                        }
                        if let Some(item) = items.into_iter().nth(index).flatten() {
                            self.set(&reg, item);
                        }
                    }
                }
            }
            Operator::TupleExtract { operand, index } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                if let Some(AbstractValue::Tuple(items)) = self.value(operand).cloned() {
                    if *index >= items.len() {
                        return Err(StructuralError::OperandArity {
                            operator: "tuple_extract",
                            expected: index + 1,
                            have: items.len(),
                        }
                        .into());
                    }
                    if let Some(item) = items.into_iter().nth(*index).flatten() {
                        self.set(&reg, item);
                    }
                }
            }
            Operator::GlobalAddr { symbol } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                if symbol.ends_with(INT_GLOBAL_SUFFIX) {
                    self.set(&reg, AbstractValue::GlobalIntAddress);
                }
            }
            Operator::Load { address } => {
                let (reg, _) = self.single_result(def)?;
                let reg = reg.clone();
                if matches!(self.value(address), Some(AbstractValue::GlobalIntAddress)) {
                    // The hole is keyed by the load's location; without one
                    // the value stays untracked.
                    if let Some(source) = &def.source {
                        self.set(&reg, AbstractValue::Int(IntExpr::Hole(source.location())));
                    }
                }
            }
            Operator::Apply { callee, args } => {
                self.apply(def, callee, args, &def.results, pc)?;
            }
            Operator::BeginApply { callee, args } => {
                // The last result is the continuation token; the rest are
                // the coroutine's yields.
                let results = match def.results.split_last() {
                    Some((_token, yields)) => yields,
                    None => &[],
                };
                self.apply(def, callee, args, results, pc)?;
            }
            Operator::EndApply { .. } | Operator::Unknown { .. } => {}
        }
        Ok(())
    }

    /// Chase partial-application chains to a terminal function reference,
    /// collecting the already-bound arguments.
    fn chase_function(
        &self,
        value: &AbstractValue,
    ) -> Option<(String, Vec<Option<AbstractValue>>)> {
        let mut value = value;
        let mut extra: Vec<Option<AbstractValue>> = Vec::new();
        loop {
            match value {
                AbstractValue::Function(name) => return Some((name.clone(), extra)),
                AbstractValue::PartialApplication { callee, args, .. } => {
                    extra.extend(args.iter().cloned());
                    value = callee.as_ref();
                }
                _ => return None,
            }
        }
    }

    fn apply(
        &mut self,
        def: &OperatorDef,
        callee: &Register,
        arg_regs: &[Register],
        results: &[(Register, Type)],
        pc: &BoolExpr,
    ) -> Result<(), Failure> {
        let Some((name, extra)) = self.value(callee).and_then(|v| self.chase_function(v)) else {
            // Untracked callee; the results stay untracked.
            return Ok(());
        };
        let args: Vec<Option<AbstractValue>> = arg_regs
            .iter()
            .map(|r| self.value(r).cloned())
            .chain(extra)
            .collect();
        match BUILTINS.get(name.as_str()) {
            Some(&builtin) => self.apply_builtin(builtin, def, &args, results, pc),
            None => self.apply_opaque(name, def, &args, results, pc),
        }
    }

    /// Emit a `.call` constraint binding fresh result values to an opaque
    /// callee.
    fn apply_opaque(
        &mut self,
        name: String,
        def: &OperatorDef,
        args: &[Option<AbstractValue>],
        results: &[(Register, Type)],
        pc: &BoolExpr,
    ) -> Result<(), Failure> {
        let result = match results {
            [] => None,
            [(reg, ty)] => {
                let reg = reg.clone();
                let value = self.fresh_value(ty);
                if let Some(value) = &value {
                    self.set(&reg, value.clone());
                }
                value.as_ref().and_then(AbstractValue::as_expr)
            }
            many => {
                let mut items = Vec::with_capacity(many.len());
                for (reg, ty) in many {
                    let reg = reg.clone();
                    let value = self.fresh_value(ty);
                    if let Some(value) = &value {
                        self.set(&reg, value.clone());
                    }
                    items.push(value.as_ref().and_then(AbstractValue::as_expr));
                }
                Some(Expr::Tuple(items))
            }
        };
        self.constraints.push(RawConstraint::Call {
            callee: name,
            args: args
                .iter()
                .map(|a| a.as_ref().and_then(AbstractValue::as_expr))
                .collect(),
            result,
            assuming: pc.clone(),
            loc: def.source.as_ref().map(SourceInfo::location),
        });
        Ok(())
    }

    fn int_arg(
        &self,
        operator: &'static str,
        args: &[Option<AbstractValue>],
        index: usize,
    ) -> Result<Option<IntExpr>, Failure> {
        match args.get(index) {
            None => Err(StructuralError::OperandArity {
                operator,
                expected: index + 1,
                have: args.len(),
            }
            .into()),
            Some(None) => Ok(None),
            Some(Some(AbstractValue::Int(e))) => Ok(Some(e.clone())),
            Some(Some(other)) => Err(sort_mismatch!("int", other.sort_name()).into()),
        }
    }

    /// A shape argument: either a `TensorShape` value or a tensor, which
    /// contributes its shape.
    fn shape_arg(
        &self,
        operator: &'static str,
        args: &[Option<AbstractValue>],
        index: usize,
    ) -> Result<Option<ListExpr>, Failure> {
        match args.get(index) {
            None => Err(StructuralError::OperandArity {
                operator,
                expected: index + 1,
                have: args.len(),
            }
            .into()),
            Some(None) => Ok(None),
            Some(Some(AbstractValue::List(e) | AbstractValue::Tensor(e))) => Ok(Some(e.clone())),
            Some(Some(other)) => Err(sort_mismatch!("list", other.sort_name()).into()),
        }
    }

    /// Bind a builtin's value to its one result register. `results` is the
    /// effective result list (token-stripped for coroutine applies).
    fn bind_single(
        &mut self,
        operator: &'static str,
        results: &[(Register, Type)],
        value: AbstractValue,
    ) -> Result<(), Failure> {
        match results {
            [(reg, _)] => {
                let reg = reg.clone();
                self.set(&reg, value);
                Ok(())
            }
            other => Err(StructuralError::ResultArity {
                operator,
                expected: 1,
                have: other.len(),
            }
            .into()),
        }
    }

    fn apply_builtin(
        &mut self,
        builtin: Builtin,
        def: &OperatorDef,
        args: &[Option<AbstractValue>],
        results: &[(Register, Type)],
        pc: &BoolExpr,
    ) -> Result<(), Failure> {
        let loc = def.source.as_ref().map(SourceInfo::location);
        match builtin {
            Builtin::IntCmp(op) => {
                let lhs = self.int_arg("int comparison", args, 0)?;
                let rhs = self.int_arg("int comparison", args, 1)?;
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    self.bind_single("int comparison", results, AbstractValue::Bool(BoolExpr::int_cmp(op, lhs, rhs)))?;
                }
            }
            Builtin::IntArith(op) => {
                let lhs = self.int_arg("int arithmetic", args, 0)?;
                let rhs = self.int_arg("int arithmetic", args, 1)?;
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    self.bind_single("int arithmetic", results, AbstractValue::Int(IntExpr::binary(op, lhs, rhs)))?;
                }
            }
            Builtin::IntLiteralCtor => {
                if let Some(e) = self.int_arg("integer-literal init", args, 0)? {
                    self.bind_single("integer-literal init", results, AbstractValue::Int(e))?;
                }
            }
            Builtin::ShapeCtor => {
                if let Some(shape) = self.shape_arg("shape literal init", args, 0)? {
                    self.bind_single("shape literal init", results, AbstractValue::List(shape))?;
                }
            }
            Builtin::ShapeGetter => {
                if let Some(shape) = self.shape_arg("shape getter", args, 0)? {
                    self.bind_single("shape getter", results, AbstractValue::List(shape))?;
                }
            }
            Builtin::ShapeSubscript => {
                // The read accessor's arguments are (index, shape). Only a
                // literal index can be addressed symbolically, so fold the
                // index first.
                let index = self
                    .int_arg("shape subscript", args, 0)?
                    .map(|e| crate::transforms::simplify_int(&e));
                let shape = self.shape_arg("shape subscript", args, 1)?;
                if let (Some(IntExpr::Literal(k)), Some(shape)) = (index, shape) {
                    self.bind_single("shape subscript", results, AbstractValue::Int(IntExpr::element(k, shape)))?;
                }
            }
            Builtin::RankGetter => {
                if let Some(shape) = self.shape_arg("rank getter", args, 0)? {
                    self.bind_single("rank getter", results, AbstractValue::Int(IntExpr::length(shape)))?;
                }
            }
            Builtin::ShapeEq => {
                let lhs = self.shape_arg("shape equality", args, 0)?;
                let rhs = self.shape_arg("shape equality", args, 1)?;
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    self.bind_single("shape equality", results, AbstractValue::Bool(BoolExpr::list_eq(lhs, rhs)))?;
                }
            }
            Builtin::Broadcast => {
                let lhs = self.shape_arg("broadcast", args, 0)?;
                let rhs = self.shape_arg("broadcast", args, 1)?;
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    let shape = ListExpr::broadcast(lhs, rhs);
                    let value = match results {
                        [(_, ty)] if is_tensor(ty) => AbstractValue::Tensor(shape),
                        _ => AbstractValue::List(shape),
                    };
                    self.bind_single("broadcast", results, value)?;
                }
            }
            Builtin::Assert => {
                if args.is_empty() {
                    return Err(StructuralError::OperandArity {
                        operator: "assert",
                        expected: 1,
                        have: 0,
                    }
                    .into());
                }
                // The condition is an autoclosure; it must chase to a
                // function reference whose summary yields the asserted bool.
                let resolved = args[0].as_ref().and_then(|v| self.chase_function(v));
                let Some((callee, extra)) = resolved else {
                    return Err(Failure::Skip(SkipReason::UnresolvableAssert, loc));
                };
                let var = self.fresh.fresh_bool();
                self.constraints.push(RawConstraint::Call {
                    callee,
                    args: extra
                        .iter()
                        .map(|a| a.as_ref().and_then(AbstractValue::as_expr))
                        .collect(),
                    result: Some(Expr::Bool(BoolExpr::Var(var))),
                    assuming: pc.clone(),
                    loc: loc.clone(),
                });
                self.constraints.push(RawConstraint::Expr {
                    pred: BoolExpr::Var(var),
                    assuming: pc.clone(),
                    origin: Origin::Asserted,
                    loc,
                });
            }
        }
        Ok(())
    }

    fn interpret_terminator(
        &mut self,
        blocks: &[Block],
        index: &FastHashMap<&BlockLabel, usize>,
        block: &Block,
        pc: &BoolExpr,
    ) -> Result<(), Failure> {
        let def: &TerminatorDef = &block.terminator;
        let loc = def.source.as_ref().map(SourceInfo::location);
        match &def.terminator {
            Terminator::Br { dest, operands } => {
                self.branch_edge(blocks, index, dest, operands, pc.clone(), &loc)?;
            }
            Terminator::CondBr {
                condition,
                true_dest,
                true_operands,
                false_dest,
                false_operands,
            } => {
                let cond = match self.value(condition).cloned() {
                    Some(AbstractValue::Bool(b)) => b,
                    Some(other) => {
                        return Err(sort_mismatch!("bool", other.sort_name()).into());
                    }
                    // Untracked condition: guard both sides with a fresh
                    // boolean so the fork stays sound.
                    None => BoolExpr::Var(self.fresh.fresh_bool()),
                };
                self.branch_edge(
                    blocks,
                    index,
                    true_dest,
                    true_operands,
                    BoolExpr::new_and(pc.clone(), cond.clone()),
                    &loc,
                )?;
                self.branch_edge(
                    blocks,
                    index,
                    false_dest,
                    false_operands,
                    BoolExpr::new_and(pc.clone(), BoolExpr::new_not(cond)),
                    &loc,
                )?;
            }
            Terminator::Return { operand } => {
                let value = self.value(operand).and_then(AbstractValue::as_expr);
                if let (Some(ret), Some(value)) = (&self.ret_expr, value) {
                    for pred in equate(ret, &value).map_err(Failure::Fatal)? {
                        self.constraints.push(RawConstraint::Expr {
                            pred,
                            assuming: pc.clone(),
                            origin: Origin::Implied,
                            loc: loc.clone(),
                        });
                    }
                }
            }
            Terminator::SwitchEnum { cases, default, .. } => {
                // Enum payloads are not modeled; each case is reached under
                // an opaque fresh condition.
                let targets = cases
                    .iter()
                    .map(|(_, dest)| dest)
                    .chain(default.as_ref())
                    .cloned()
                    .collect::<Vec<_>>();
                for dest in targets {
                    if !index.contains_key(&dest) {
                        return Err(Failure::Skip(
                            SkipReason::UnknownBlockTarget(dest.0.clone()),
                            loc,
                        ));
                    }
                    let guard = BoolExpr::new_and(
                        pc.clone(),
                        BoolExpr::Var(self.fresh.fresh_bool()),
                    );
                    self.path_conditions
                        .entry(dest)
                        .or_default()
                        .insert(guard);
                }
            }
            Terminator::Unreachable => {}
            Terminator::Unknown { name } => {
                return Err(Failure::Skip(
                    SkipReason::UnknownTerminator(name.clone()),
                    loc,
                ));
            }
        }
        Ok(())
    }

    /// Propagate a path condition along one edge and equate the target's
    /// block arguments with the branch operands under it.
    fn branch_edge(
        &mut self,
        blocks: &[Block],
        index: &FastHashMap<&BlockLabel, usize>,
        dest: &BlockLabel,
        operands: &[Register],
        edge_pc: BoolExpr,
        loc: &Option<SourceLocation>,
    ) -> Result<(), Failure> {
        let Some(&bi) = index.get(dest) else {
            return Err(Failure::Skip(
                SkipReason::UnknownBlockTarget(dest.0.clone()),
                loc.clone(),
            ));
        };
        let target = &blocks[bi];
        if operands.len() != target.arguments.len() {
            return Err(StructuralError::OperandArity {
                operator: "br",
                expected: target.arguments.len(),
                have: operands.len(),
            }
            .into());
        }
        let mut equations = Vec::new();
        for ((arg_reg, _), op_reg) in target.arguments.iter().zip(operands) {
            let arg = self.value(arg_reg).and_then(AbstractValue::as_expr);
            let operand = self.value(op_reg).and_then(AbstractValue::as_expr);
            if let (Some(arg), Some(operand)) = (arg, operand) {
                equations.extend(equate(&arg, &operand).map_err(Failure::Fatal)?);
            }
        }
        for pred in equations {
            self.constraints.push(RawConstraint::Expr {
                pred,
                assuming: edge_pc.clone(),
                origin: Origin::Implied,
                loc: loc.clone(),
            });
        }
        self.path_conditions
            .entry(dest.clone())
            .or_default()
            .insert(edge_pc);
        Ok(())
    }

    fn into_summary(self, function: &Function, blocks: &[Block]) -> FunctionSummary {
        let arg_exprs = blocks
            .first()
            .map(|entry| {
                entry
                    .arguments
                    .iter()
                    .map(|(reg, _)| self.value(reg).and_then(AbstractValue::as_expr))
                    .collect()
            })
            .unwrap_or_default();
        FunctionSummary {
            name: function.name.clone(),
            arg_exprs,
            ret_expr: self.ret_expr,
            constraints: self.constraints,
        }
    }
}

fn is_tensor(ty: &Type) -> bool {
    matches!(ty.simplified(), Type::Specialized { base, .. } if base == "Tensor")
}
