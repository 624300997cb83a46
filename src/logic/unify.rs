//! Substitution sets and the unification algorithm.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::term::{Predicate, Term};

/// Bindings from variable id to term.
///
/// Extension follows a copy-on-write discipline: [`unify`] clones the
/// incoming set and returns the extended clone on success. On failure the
/// caller's set is untouched, so a failed unification never leaves partial
/// bindings behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionSet {
    bindings: HashMap<usize, Term>,
}

impl SubstitutionSet {
    pub fn new() -> Self {
        SubstitutionSet::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bind(&mut self, var_id: usize, term: Term) {
        self.bindings.insert(var_id, term);
    }

    pub fn get(&self, var_id: usize) -> Option<&Term> {
        self.bindings.get(&var_id)
    }

    /// Follow bindings transitively until a constant or an unbound variable.
    pub fn resolve(&self, term: &Term) -> Term {
        let mut current = term.clone();
        while let Term::Variable(v) = &current {
            match self.bindings.get(&v.id) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    /// Ground a predicate as far as the bindings allow.
    pub fn apply(&self, predicate: &Predicate) -> Predicate {
        Predicate::new(
            predicate.name.clone(),
            predicate.terms.iter().map(|t| self.resolve(t)).collect(),
        )
    }
}

impl fmt::Display for SubstitutionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .bindings
            .iter()
            .sorted_by_key(|(id, _)| **id)
            .map(|(id, term)| format!("?{} -> {}", id, term))
            .join(", ");
        write!(f, "{{{}}}", entries)
    }
}

/// Unify two predicates under `s`, returning the extended substitution set
/// or `None` on incompatibility. Failure is the expected "no" answer of the
/// search, not an error.
pub fn unify(a: &Predicate, b: &Predicate, s: &SubstitutionSet) -> Option<SubstitutionSet> {
    if a.name != b.name || a.arity() != b.arity() {
        return None;
    }
    let mut working = s.clone();
    for (ta, tb) in a.terms.iter().zip(&b.terms) {
        working = unify_terms_into(ta, tb, working)?;
    }
    Some(working)
}

fn unify_terms_into(a: &Term, b: &Term, mut s: SubstitutionSet) -> Option<SubstitutionSet> {
    let ra = s.resolve(a);
    let rb = s.resolve(b);
    match (ra, rb) {
        (Term::Constant(ca), Term::Constant(cb)) => (ca == cb).then_some(s),
        (Term::Variable(v), other) | (other, Term::Variable(v)) => {
            if let Term::Variable(ov) = &other {
                if ov.id == v.id {
                    return Some(s);
                }
            }
            s.bind(v.id, other);
            Some(s)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pred(name: &str, terms: Vec<Term>) -> Predicate {
        Predicate::new(name, terms)
    }

    #[test]
    fn ground_unification_is_structural_identity() {
        let empty = SubstitutionSet::new();
        let p = pred("on", vec![Term::constant("a"), Term::constant("b")]);
        let q = pred("on", vec![Term::constant("a"), Term::constant("b")]);
        let r = pred("on", vec![Term::constant("a"), Term::constant("c")]);

        assert!(unify(&p, &q, &empty).is_some());
        assert!(unify(&p, &r, &empty).is_none());
    }

    #[test]
    fn name_or_arity_mismatch_fails() {
        let empty = SubstitutionSet::new();
        let p = pred("on", vec![Term::constant("a")]);
        assert!(unify(&p, &pred("at", vec![Term::constant("a")]), &empty).is_none());
        assert!(unify(&p, &pred("on", vec![]), &empty).is_none());
    }

    #[test]
    fn unification_is_symmetric() {
        let empty = SubstitutionSet::new();
        let cases = vec![
            (
                pred("likes", vec![Term::var("X", 0), Term::constant("john")]),
                pred("likes", vec![Term::constant("mary"), Term::constant("john")]),
            ),
            (
                pred("likes", vec![Term::var("X", 0), Term::var("Y", 1)]),
                pred("likes", vec![Term::var("Z", 2), Term::constant("ann")]),
            ),
            (
                pred("likes", vec![Term::constant("a"), Term::constant("b")]),
                pred("likes", vec![Term::constant("b"), Term::constant("a")]),
            ),
        ];
        for (p, q) in cases {
            assert_eq!(
                unify(&p, &q, &empty).is_some(),
                unify(&q, &p, &empty).is_some(),
                "symmetry broken for {} / {}",
                p,
                q
            );
        }
    }

    #[test]
    fn variable_binds_and_resolves_transitively() {
        let empty = SubstitutionSet::new();
        let p = pred("likes", vec![Term::var("X", 0)]);
        let q = pred("likes", vec![Term::var("Y", 1)]);
        let s = unify(&p, &q, &empty).unwrap();

        // one of the two is bound to the other; extend with Y -> mary
        let r = pred("likes", vec![Term::constant("mary")]);
        let s = unify(&q, &r, &s).unwrap();
        assert_eq!(s.resolve(&Term::var("X", 0)), Term::constant("mary"));
        assert_eq!(s.resolve(&Term::var("Y", 1)), Term::constant("mary"));
    }

    #[test]
    fn conflicting_binding_fails_without_side_effects() {
        let mut s = SubstitutionSet::new();
        s.bind(0, Term::constant("a"));
        let before = s.clone();

        let p = pred("p", vec![Term::var("X", 0), Term::var("X", 0)]);
        let q = pred("p", vec![Term::constant("b"), Term::constant("b")]);
        assert!(unify(&p, &q, &s).is_none());
        assert_eq!(s, before);
    }

    #[test]
    fn partial_argument_match_leaves_input_unmodified() {
        // first argument binds, second clashes; the caller's set must not
        // pick up the first binding
        let s = SubstitutionSet::new();
        let p = pred("p", vec![Term::var("X", 0), Term::constant("a")]);
        let q = pred("p", vec![Term::constant("c"), Term::constant("b")]);
        assert!(unify(&p, &q, &s).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn apply_grounds_through_chains() {
        let mut s = SubstitutionSet::new();
        s.bind(0, Term::var("Y", 1));
        s.bind(1, Term::constant("table"));
        let p = pred("on", vec![Term::constant("a"), Term::var("X", 0)]);
        assert_eq!(
            s.apply(&p),
            pred("on", vec![Term::constant("a"), Term::constant("table")])
        );
    }
}
