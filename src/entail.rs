// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! A cheap syntactic entailment check on boolean terms.

`implies(a, b)` answers whether `a` provably entails `b` using only literal
rules and and/or decomposition. It performs no distributive or negation
reasoning, so callers must tolerate false negatives. Worst case it is
quadratic in the size of the two terms.
*/

use crate::BoolExpr;

/// Return `true` only when `lhs => rhs` is provable by the decomposition
/// rules; `false` means "unknown".
#[must_use]
pub fn implies(lhs: &BoolExpr, rhs: &BoolExpr) -> bool {
    if matches!(rhs, BoolExpr::True) || matches!(lhs, BoolExpr::False) || lhs == rhs {
        return true;
    }
    // a => and(cs) iff a => c for every c.
    if let BoolExpr::And(cs) = rhs {
        if cs.iter().all(|c| implies(lhs, c)) {
            return true;
        }
    }
    // a => or(cs) if a => c for some c.
    if let BoolExpr::Or(cs) = rhs {
        if cs.iter().any(|c| implies(lhs, c)) {
            return true;
        }
    }
    // and(cs) => b if c => b for some c.
    if let BoolExpr::And(cs) = lhs {
        if cs.iter().any(|c| implies(c, rhs)) {
            return true;
        }
    }
    // or(cs) => b iff c => b for every c.
    if let BoolExpr::Or(cs) = lhs {
        if cs.iter().all(|c| implies(c, rhs)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoolVar;
    use rstest::rstest;

    fn b(n: u32) -> BoolExpr {
        BoolExpr::Var(BoolVar(n))
    }

    #[rstest]
    fn test_literal_rules() {
        assert!(implies(&b(0), &BoolExpr::True));
        assert!(implies(&BoolExpr::False, &b(0)));
        assert!(implies(&b(0), &b(0)));
        assert!(!implies(&b(0), &b(1)));
    }

    #[rstest]
    fn test_conjunction_on_the_left() {
        let both = BoolExpr::new_and(b(0), b(1));
        assert!(implies(&both, &b(0)));
        assert!(implies(&both, &b(1)));
        assert!(!implies(&b(0), &both));
    }

    #[rstest]
    fn test_conjunction_on_the_right() {
        let both = BoolExpr::new_and(b(0), b(1));
        let wider = BoolExpr::and_all([b(1), b(2), b(0)]);
        assert!(implies(&wider, &both));
    }

    #[rstest]
    fn test_disjunction_rules() {
        let either = BoolExpr::new_or(b(0), b(1));
        assert!(implies(&b(0), &either));
        assert!(!implies(&either, &b(0)));
        let reordered = BoolExpr::new_or(b(1), b(0));
        assert!(implies(&either, &reordered));
    }

    #[rstest]
    fn test_mixed_nesting() {
        // (b0 && b1) => (b2 || b1)
        let lhs = BoolExpr::new_and(b(0), b(1));
        let rhs = BoolExpr::new_or(b(2), b(1));
        assert!(implies(&lhs, &rhs));
    }

    #[rstest]
    fn test_no_distributive_reasoning() {
        // (b0 || b1) && (b0 || b2) => b0 || (b1 && b2) holds semantically
        // but is out of reach for the syntactic rules.
        let lhs = BoolExpr::new_and(
            BoolExpr::new_or(b(0), b(1)),
            BoolExpr::new_or(b(0), b(2)),
        );
        let rhs = BoolExpr::new_or(b(0), BoolExpr::new_and(b(1), b(2)));
        assert!(!implies(&lhs, &rhs));
    }
}
