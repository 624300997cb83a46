//! The clause language: terms, substitutions, unification, clauses, and the
//! insertion-ordered rule store.

mod clause;
mod term;
mod unify;

pub use clause::{Clause, Rule, RuleSet};
pub use term::{Predicate, Term, VarGen, Variable};
pub use unify::{unify, SubstitutionSet};
