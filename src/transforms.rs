// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! Rewrites over ordered constraint lists.

Every transform here is total and shape-preserving: it never invents a
constraint that was not implied by its input, and it preserves asserted
constraints (modulo substitution by equalities it has resolved). Order in
the list matters: [`inline`] only substitutes definitions forward into later
uses, and [`resolve_equalities`] rewrites the whole list under equalities it
collects in a single scan.

[`pipeline`] chains the transforms and reruns them until the list stops
changing, bounded by [`PIPELINE_CYCLE_LIMIT`].
*/

use crate::subst::{Substitution, VarSet};
use crate::{
    BoolExpr, BoolVar, Constraint, FastHashMap, FastHashSet, Handle, IntBinOp, IntExpr, IntVar,
    ListExpr, ListVar, Origin,
};

/// The maximum number of times the pipeline will rerun before stopping.
pub const PIPELINE_CYCLE_LIMIT: u32 = 20;

/// Which equalities [`resolve_equalities`] may consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strength {
    /// Equalities between two shape variables, regardless of origin.
    Shape,
    /// Equalities from `implied` constraints, regardless of sort.
    Implied,
    /// Every variable-to-variable equality.
    Everything,
    /// The union of the contained strengths.
    All(Vec<Strength>),
}

impl Strength {
    fn admits_int(&self, origin: Origin) -> bool {
        match self {
            Strength::Shape => false,
            Strength::Implied => origin == Origin::Implied,
            Strength::Everything => true,
            Strength::All(these) => these.iter().any(|s| s.admits_int(origin)),
        }
    }

    fn admits_list(&self, origin: Origin) -> bool {
        match self {
            Strength::Shape => true,
            Strength::Implied => origin == Origin::Implied,
            Strength::Everything => true,
            Strength::All(these) => these.iter().any(|s| s.admits_list(origin)),
        }
    }
}

/// Simplify an integer term, bottom-up.
///
/// Folds arithmetic over two literals, applies the unit laws for
/// `+ 0` / `- 0` / `* 1` / `* 0`, and resolves `element` indexing into shape
/// literals. Nothing else.
#[must_use]
pub fn simplify_int(expr: &IntExpr) -> IntExpr {
    match expr {
        IntExpr::Var(_) | IntExpr::Literal(_) | IntExpr::Hole(_) => expr.clone(),
        IntExpr::Length(l) => {
            let l = simplify_list(l);
            match &l {
                ListExpr::Literal(dims) => IntExpr::Literal(dims.len() as i64),
                _ => IntExpr::Length(Handle::new(l)),
            }
        }
        IntExpr::Element(k, l) => {
            let l = simplify_list(l);
            if let ListExpr::Literal(dims) = &l {
                let index = if *k < 0 { dims.len() as i64 + k } else { *k };
                if (0..dims.len() as i64).contains(&index) {
                    if let Some(dim) = &dims[index as usize] {
                        return dim.clone();
                    }
                }
            }
            IntExpr::Element(*k, Handle::new(l))
        }
        IntExpr::Binary(op, lhs, rhs) => {
            let lhs = simplify_int(lhs);
            let rhs = simplify_int(rhs);
            match (op, &lhs, &rhs) {
                (_, IntExpr::Literal(x), IntExpr::Literal(y)) => {
                    let folded = match op {
                        IntBinOp::Add => x.checked_add(*y),
                        IntBinOp::Sub => x.checked_sub(*y),
                        IntBinOp::Mul => x.checked_mul(*y),
                        IntBinOp::Div => x.checked_div(*y),
                    };
                    match folded {
                        Some(n) => IntExpr::Literal(n),
                        None => IntExpr::binary(*op, lhs.clone(), rhs.clone()),
                    }
                }
                (IntBinOp::Add, IntExpr::Literal(0), other)
                | (IntBinOp::Add, other, IntExpr::Literal(0))
                | (IntBinOp::Sub, other, IntExpr::Literal(0))
                | (IntBinOp::Mul, IntExpr::Literal(1), other)
                | (IntBinOp::Mul, other, IntExpr::Literal(1)) => other.clone(),
                (IntBinOp::Mul, IntExpr::Literal(0), _) | (IntBinOp::Mul, _, IntExpr::Literal(0)) => {
                    IntExpr::Literal(0)
                }
                _ => IntExpr::binary(*op, lhs, rhs),
            }
        }
    }
}

/// Simplify a shape term, bottom-up.
///
/// Resolves `broadcast` over two shape literals dimension by dimension. An
/// incompatible pair (both known, unequal, neither 1) leaves the whole
/// `broadcast` in place for a downstream solver to report.
#[must_use]
pub fn simplify_list(expr: &ListExpr) -> ListExpr {
    match expr {
        ListExpr::Var(_) => expr.clone(),
        ListExpr::Literal(dims) => ListExpr::Literal(
            dims.iter()
                .map(|dim| dim.as_ref().map(simplify_int))
                .collect(),
        ),
        ListExpr::Broadcast(lhs, rhs) => {
            let lhs = simplify_list(lhs);
            let rhs = simplify_list(rhs);
            if let (ListExpr::Literal(xs), ListExpr::Literal(ys)) = (&lhs, &rhs) {
                if let Some(dims) = broadcast_literals(xs, ys) {
                    return ListExpr::Literal(dims);
                }
            }
            ListExpr::Broadcast(Handle::new(lhs), Handle::new(rhs))
        }
    }
}

/// Pair up two shape literals right-aligned; `None` when some pair is two
/// known, unequal, non-unit dimensions.
fn broadcast_literals(
    xs: &[Option<IntExpr>],
    ys: &[Option<IntExpr>],
) -> Option<Vec<Option<IntExpr>>> {
    let rank = xs.len().max(ys.len());
    // The shorter shape is padded with 1s on the left, so its missing
    // dimensions always take the other side's value.
    let pad = Some(IntExpr::Literal(1));
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let x = i.checked_sub(rank - xs.len()).map_or(&pad, |j| &xs[j]);
        let y = i.checked_sub(rank - ys.len()).map_or(&pad, |j| &ys[j]);
        out.push(broadcast_dim(x, y)?);
    }
    Some(out)
}

fn broadcast_dim(x: &Option<IntExpr>, y: &Option<IntExpr>) -> Option<Option<IntExpr>> {
    match (x, y) {
        (Some(IntExpr::Literal(1)), other) | (other, Some(IntExpr::Literal(1))) => {
            Some(other.clone())
        }
        (Some(IntExpr::Literal(a)), Some(IntExpr::Literal(b))) => {
            if a == b {
                Some(x.clone())
            } else {
                // Unsatisfiable broadcast; left for the solver.
                None
            }
        }
        (Some(a), Some(b)) if a == b => Some(x.clone()),
        (None, Some(IntExpr::Literal(n))) | (Some(IntExpr::Literal(n)), None) => {
            Some(Some(IntExpr::Literal(*n)))
        }
        // At least one side is unknown or symbolic; the result dimension is
        // not determined.
        _ => Some(None),
    }
}

/// Simplify a boolean term by simplifying the integer and shape terms inside
/// it. Equalities themselves are never rewritten here.
#[must_use]
pub fn simplify_bool(expr: &BoolExpr) -> BoolExpr {
    match expr {
        BoolExpr::True | BoolExpr::False | BoolExpr::Var(_) => expr.clone(),
        BoolExpr::Not(p) => BoolExpr::new_not(simplify_bool(p)),
        BoolExpr::And(ps) => BoolExpr::and_all(ps.iter().map(simplify_bool)),
        BoolExpr::Or(ps) => BoolExpr::or_all(ps.iter().map(simplify_bool)),
        BoolExpr::IntCmp(op, lhs, rhs) => BoolExpr::IntCmp(
            *op,
            Handle::new(simplify_int(lhs)),
            Handle::new(simplify_int(rhs)),
        ),
        BoolExpr::ListEq(lhs, rhs) => BoolExpr::ListEq(
            Handle::new(simplify_list(lhs)),
            Handle::new(simplify_list(rhs)),
        ),
        BoolExpr::BoolEq(lhs, rhs) => BoolExpr::BoolEq(
            Handle::new(simplify_bool(lhs)),
            Handle::new(simplify_bool(rhs)),
        ),
    }
}

fn simplify_constraint(c: &Constraint) -> Constraint {
    Constraint {
        pred: simplify_bool(&c.pred),
        assuming: simplify_bool(&c.assuming),
        origin: c.origin,
        stack: c.stack.clone(),
    }
}

/// Simplify every constraint in the list.
#[must_use]
pub fn simplify(constraints: Vec<Constraint>) -> Vec<Constraint> {
    constraints.iter().map(simplify_constraint).collect()
}

/// Keep the first occurrence of each constraint, by structural equality.
#[must_use]
pub fn deduplicate(constraints: Vec<Constraint>) -> Vec<Constraint> {
    let mut seen: FastHashSet<Constraint> = FastHashSet::default();
    constraints
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// An unconditional `d = rhs` definition usable by [`inline`].
fn as_int_definition(c: &Constraint) -> Option<(IntVar, &IntExpr)> {
    if !matches!(c.assuming, BoolExpr::True) {
        return None;
    }
    match &c.pred {
        BoolExpr::IntCmp(crate::CmpOp::Eq, lhs, rhs) => match lhs.as_ref() {
            IntExpr::Var(v) => Some((*v, rhs.as_ref())),
            _ => None,
        },
        _ => None,
    }
}

/// Integer let-binding inlining.
///
/// A variable with exactly one unconditional `d = rhs` definition, whose uses
/// all come later in the list, is substituted into those uses and its
/// definition dropped; rewritten constraints are re-simplified so literal
/// chains collapse. A use before the definition, a second definition, or a
/// self-referential right-hand side disqualifies the variable.
#[must_use]
pub fn inline(constraints: Vec<Constraint>) -> Vec<Constraint> {
    let mut def_sites: FastHashMap<IntVar, Vec<usize>> = FastHashMap::default();
    let mut use_sites: FastHashMap<IntVar, Vec<usize>> = FastHashMap::default();
    for (i, c) in constraints.iter().enumerate() {
        match as_int_definition(c) {
            Some((v, rhs)) => {
                def_sites.entry(v).or_default().push(i);
                let mut vars = VarSet::default();
                vars.visit_int_expr(rhs);
                vars.visit_bool_expr(&c.assuming);
                for u in vars.ints {
                    use_sites.entry(u).or_default().push(i);
                }
            }
            None => {
                let mut vars = VarSet::default();
                vars.visit_constraint(c);
                for u in vars.ints {
                    use_sites.entry(u).or_default().push(i);
                }
            }
        }
    }

    let eliminable = |v: IntVar, at: usize| -> bool {
        let Some(defs) = def_sites.get(&v) else {
            return false;
        };
        if defs.len() != 1 || defs[0] != at {
            return false;
        }
        match use_sites.get(&v) {
            // An unused definition is left alone.
            None => false,
            Some(uses) => !uses.is_empty() && uses.iter().all(|&u| u > at),
        }
    };

    let mut subst = Substitution::new();
    let mut out = Vec::with_capacity(constraints.len());
    for (i, c) in constraints.iter().enumerate() {
        let rewritten = if subst.is_empty() {
            c.clone()
        } else {
            simplify_constraint(&subst.constraint(c))
        };
        let usable = as_int_definition(&rewritten)
            .filter(|(v, _)| eliminable(*v, i))
            .map(|(v, rhs)| (v, rhs.clone()));
        match usable {
            // Definitions seen earlier are already folded into `rhs`, so
            // later uses of `v` expand to a fully substituted term.
            Some((v, rhs)) => subst.bind_int(v, rhs),
            None => out.push(rewritten),
        }
    }
    out
}

/// Union-find over variables, restricted by `strength`.
///
/// A single scan collects every unconditional variable-to-variable equality
/// the strength admits, unioning the two sides (the lower-numbered variable
/// becomes the representative) and dropping the equality. The remaining
/// constraints — including variable-to-compound equalities, which are kept —
/// are then rewritten under the accumulated substitution.
#[must_use]
pub fn resolve_equalities(constraints: Vec<Constraint>, strength: &Strength) -> Vec<Constraint> {
    let mut int_classes: UnionFind<IntVar> = UnionFind::default();
    let mut list_classes: UnionFind<ListVar> = UnionFind::default();
    let mut consumed = vec![false; constraints.len()];

    for (i, c) in constraints.iter().enumerate() {
        if !matches!(c.assuming, BoolExpr::True) {
            continue;
        }
        match &c.pred {
            BoolExpr::IntCmp(crate::CmpOp::Eq, lhs, rhs) if strength.admits_int(c.origin) => {
                if let (IntExpr::Var(a), IntExpr::Var(b)) = (lhs.as_ref(), rhs.as_ref()) {
                    int_classes.union(*a, *b);
                    consumed[i] = true;
                }
            }
            BoolExpr::ListEq(lhs, rhs) if strength.admits_list(c.origin) => {
                if let (ListExpr::Var(a), ListExpr::Var(b)) = (lhs.as_ref(), rhs.as_ref()) {
                    list_classes.union(*a, *b);
                    consumed[i] = true;
                }
            }
            _ => {}
        }
    }

    let mut subst = Substitution::new();
    for (v, rep) in int_classes.bindings() {
        subst.bind_int(v, IntExpr::Var(rep));
    }
    for (v, rep) in list_classes.bindings() {
        subst.bind_list(v, ListExpr::Var(rep));
    }

    constraints
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .map(|(_, c)| if subst.is_empty() { c } else { subst.constraint(&c) })
        .collect()
}

/// If a boolean variable is asserted at top level and has exactly one
/// unconditional `b = rhs` definition — and appears nowhere else — replace
/// the assertion with `rhs` and drop the definition. Anything more tangled
/// is left untouched.
#[must_use]
pub fn inline_bool_vars(constraints: Vec<Constraint>) -> Vec<Constraint> {
    let mut asserted_at: FastHashMap<BoolVar, Vec<usize>> = FastHashMap::default();
    let mut defined_at: FastHashMap<BoolVar, Vec<usize>> = FastHashMap::default();
    let mut other_mentions: FastHashMap<BoolVar, usize> = FastHashMap::default();

    for (i, c) in constraints.iter().enumerate() {
        let unconditional = matches!(c.assuming, BoolExpr::True);
        match &c.pred {
            BoolExpr::Var(b) if unconditional => {
                asserted_at.entry(*b).or_default().push(i);
            }
            BoolExpr::BoolEq(lhs, rhs) if unconditional => {
                if let BoolExpr::Var(b) = lhs.as_ref() {
                    defined_at.entry(*b).or_default().push(i);
                    // The right-hand side still counts as a mention for
                    // every variable it contains, including `b` itself.
                    let mut vars = VarSet::default();
                    vars.visit_bool_expr(rhs);
                    for v in vars.bools {
                        *other_mentions.entry(v).or_default() += 1;
                    }
                } else {
                    let mut vars = VarSet::default();
                    vars.visit_constraint(c);
                    for v in vars.bools {
                        *other_mentions.entry(v).or_default() += 1;
                    }
                }
            }
            _ => {
                let mut vars = VarSet::default();
                vars.visit_constraint(c);
                for v in vars.bools {
                    *other_mentions.entry(v).or_default() += 1;
                }
            }
        }
    }

    let mut replace_with: FastHashMap<usize, usize> = FastHashMap::default();
    let mut dropped: FastHashSet<usize> = FastHashSet::default();
    for (b, asserts) in &asserted_at {
        let Some(defs) = defined_at.get(b) else {
            continue;
        };
        if asserts.len() != 1 || defs.len() != 1 {
            continue;
        }
        if other_mentions.get(b).copied().unwrap_or(0) != 0 {
            continue;
        }
        replace_with.insert(asserts[0], defs[0]);
        dropped.insert(defs[0]);
    }

    if replace_with.is_empty() {
        return constraints;
    }

    let mut out = Vec::with_capacity(constraints.len());
    for (i, c) in constraints.iter().enumerate() {
        if dropped.contains(&i) {
            continue;
        }
        match replace_with.get(&i) {
            Some(&def) => {
                let BoolExpr::BoolEq(_, rhs) = &constraints[def].pred else {
                    // The candidate table only ever points at BoolEq preds.
                    continue;
                };
                out.push(Constraint {
                    pred: rhs.as_ref().clone(),
                    assuming: c.assuming.clone(),
                    origin: c.origin,
                    stack: c.stack.clone(),
                });
            }
            None => out.push(c.clone()),
        }
    }
    out
}

/// Run the transform chain to a fixpoint.
#[must_use]
pub fn pipeline(mut constraints: Vec<Constraint>, strength: &Strength) -> Vec<Constraint> {
    for _ in 0..PIPELINE_CYCLE_LIMIT {
        let before = constraints.clone();
        constraints = simplify(constraints);
        constraints = deduplicate(constraints);
        constraints = inline(constraints);
        constraints = resolve_equalities(constraints, strength);
        constraints = inline_bool_vars(constraints);
        if constraints == before {
            break;
        }
    }
    constraints
}

/// Minimal union-find keyed by variable id; the representative of a class is
/// its smallest member, so resolution output is stable across runs.
struct UnionFind<V> {
    parents: FastHashMap<V, V>,
}

impl<V> Default for UnionFind<V> {
    fn default() -> Self {
        UnionFind {
            parents: FastHashMap::default(),
        }
    }
}

impl<V: Copy + Eq + std::hash::Hash + Ord> UnionFind<V> {
    fn find(&self, v: V) -> V {
        let mut v = v;
        while let Some(&p) = self.parents.get(&v) {
            if p == v {
                break;
            }
            v = p;
        }
        v
    }

    fn union(&mut self, a: V, b: V) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (rep, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parents.insert(child, rep);
    }

    /// Every non-representative member paired with its representative.
    fn bindings(&self) -> Vec<(V, V)> {
        self.parents
            .keys()
            .map(|&v| (v, self.find(v)))
            .filter(|(v, rep)| v != rep)
            .collect()
    }
}
