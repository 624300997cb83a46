//! Terms and atomic sentences of the clause language.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A logical variable. Identity is the pair of `name` and the stable `id`;
/// two occurrences denote the same variable only when both match. Fresh
/// copies produced while standardizing a rule apart keep the name and get a
/// new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub id: usize,
}

impl Variable {
    pub fn new(name: impl Into<String>, id: usize) -> Self {
        Variable {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.id)
    }
}

/// A term: a bound constant or a logical variable. Variables are meaningful
/// only relative to a [`SubstitutionSet`](crate::logic::SubstitutionSet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Constant(String),
    Variable(Variable),
}

impl Term {
    pub fn constant(name: impl Into<String>) -> Self {
        Term::Constant(name.into())
    }

    pub fn var(name: impl Into<String>, id: usize) -> Self {
        Term::Variable(Variable::new(name, id))
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Constant(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(name) => write!(f, "{}", name),
            Term::Variable(v) => write!(f, "{}", v),
        }
    }
}

/// An atomic sentence: a predicate name applied to an ordered, fixed-length
/// argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        Predicate {
            name: name.into(),
            terms,
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    /// Largest variable id occurring in the arguments, if any.
    pub fn max_var_id(&self) -> Option<usize> {
        self.terms
            .iter()
            .filter_map(|t| match t {
                Term::Variable(v) => Some(v.id),
                Term::Constant(_) => None,
            })
            .max()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.terms.iter().join(", "))
        }
    }
}

/// Source of fresh variable ids, used when standardizing rules apart. Each
/// proof tree owns one, seeded past every id visible in its rule set and
/// goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarGen {
    next: usize,
}

impl VarGen {
    pub fn new() -> Self {
        VarGen::default()
    }

    /// Make sure future fresh variables do not collide with `id`.
    pub fn seed_past(&mut self, id: usize) {
        self.next = self.next.max(id + 1);
    }

    pub fn fresh(&mut self, name: &str) -> Variable {
        let id = self.next;
        self.next += 1;
        Variable::new(name, id)
    }
}
