//! Clauses, rules, and the insertion-ordered rule store.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::term::{Predicate, Term, VarGen, Variable};
use super::unify::{unify, SubstitutionSet};

/// A rule `head :- body`. A rule without a body is a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Predicate,
    pub body: Option<Box<Clause>>,
}

impl Rule {
    pub fn fact(head: Predicate) -> Self {
        Rule { head, body: None }
    }

    pub fn new(head: Predicate, body: Clause) -> Self {
        Rule {
            head,
            body: Some(Box::new(body)),
        }
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_none()
    }

    pub fn max_var_id(&self) -> Option<usize> {
        let head = self.head.max_var_id();
        let body = self.body.as_ref().and_then(|b| b.max_var_id());
        head.max(body)
    }

    /// Fresh-variable copy for use in a proof. Variables shared between the
    /// head and the body stay shared; ids are renamed consistently so the
    /// rule cannot clash with variables already in play.
    pub fn standardized_apart(&self, vars: &mut VarGen) -> Rule {
        let mut renames = HashMap::new();
        Rule {
            head: rename_predicate(&self.head, &mut renames, vars),
            body: self
                .body
                .as_ref()
                .map(|b| Box::new(rename_clause(b, &mut renames, vars))),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            None => write!(f, "{}.", self.head),
            Some(body) => write!(f, "{} :- {}.", self.head, body),
        }
    }
}

fn rename_predicate(
    p: &Predicate,
    renames: &mut HashMap<usize, Variable>,
    vars: &mut VarGen,
) -> Predicate {
    let terms = p
        .terms
        .iter()
        .map(|t| match t {
            Term::Variable(v) => {
                let fresh = renames
                    .entry(v.id)
                    .or_insert_with(|| vars.fresh(&v.name))
                    .clone();
                Term::Variable(fresh)
            }
            Term::Constant(_) => t.clone(),
        })
        .collect();
    Predicate::new(p.name.clone(), terms)
}

fn rename_clause(c: &Clause, renames: &mut HashMap<usize, Variable>, vars: &mut VarGen) -> Clause {
    match c {
        Clause::Fact(p) => Clause::Fact(rename_predicate(p, renames, vars)),
        Clause::And(h, t) => Clause::And(
            Box::new(rename_clause(h, renames, vars)),
            Box::new(rename_clause(t, renames, vars)),
        ),
        Clause::Or(l, r) => Clause::Or(
            Box::new(rename_clause(l, renames, vars)),
            Box::new(rename_clause(r, renames, vars)),
        ),
        Clause::Rule(rule) => Clause::Rule(Rule {
            head: rename_predicate(&rule.head, renames, vars),
            body: rule
                .body
                .as_ref()
                .map(|b| Box::new(rename_clause(b, renames, vars))),
        }),
    }
}

/// The closed set of clause shapes the solver knows how to prove.
///
/// `And` is an ordered pair whose tail may itself be an `And`, forming a
/// right-leaning conjunction list; `Or` is an ordered pair of alternatives
/// tried left first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Fact(Predicate),
    And(Box<Clause>, Box<Clause>),
    Or(Box<Clause>, Box<Clause>),
    Rule(Rule),
}

impl Clause {
    pub fn and(head: Clause, tail: Clause) -> Self {
        Clause::And(Box::new(head), Box::new(tail))
    }

    pub fn or(left: Clause, right: Clause) -> Self {
        Clause::Or(Box::new(left), Box::new(right))
    }

    pub fn max_var_id(&self) -> Option<usize> {
        match self {
            Clause::Fact(p) => p.max_var_id(),
            Clause::And(h, t) => h.max_var_id().max(t.max_var_id()),
            Clause::Or(l, r) => l.max_var_id().max(r.max_var_id()),
            Clause::Rule(rule) => rule.max_var_id(),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Fact(p) => write!(f, "{}", p),
            Clause::And(h, t) => write!(f, "{}, {}", h, t),
            Clause::Or(l, r) => write!(f, "{}; {}", l, r),
            Clause::Rule(rule) => write!(f, "{} :- {}", rule.head, body_display(rule)),
        }
    }
}

fn body_display(rule: &Rule) -> String {
    match &rule.body {
        None => "true".to_string(),
        Some(body) => body.to_string(),
    }
}

/// Insertion-ordered store of rules. Order is observable: the solver scans
/// alternatives strictly in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        RuleSet { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Append unless an equivalent fact is already present. Rules with a body
    /// are always appended; facts are deduplicated by unifiability.
    pub fn add_rule_if_new(&mut self, rule: Rule) -> bool {
        if rule.is_fact() && self.contains_unifying_fact(&rule.head) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn extend(&mut self, other: &RuleSet) {
        self.rules.extend(other.rules.iter().cloned());
    }

    /// Whether any stored fact unifies with `predicate`. Comparison is
    /// predicate-against-fact-head, never against rule bodies.
    pub fn contains_unifying_fact(&self, predicate: &Predicate) -> bool {
        let empty = SubstitutionSet::new();
        self.rules
            .iter()
            .any(|r| r.is_fact() && unify(predicate, &r.head, &empty).is_some())
    }

    /// Remove every fact unifiable with `predicate`. Two-phase: matching
    /// indices are collected during the scan and removed afterwards, so the
    /// scan never iterates a structure it is mutating.
    pub fn remove_unifying_facts(&mut self, predicate: &Predicate) -> usize {
        let empty = SubstitutionSet::new();
        let doomed = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_fact() && unify(predicate, &r.head, &empty).is_some())
            .map(|(i, _)| i)
            .collect_vec();
        for i in doomed.iter().rev() {
            self.rules.remove(*i);
        }
        doomed.len()
    }

    pub fn max_var_id(&self) -> Option<usize> {
        self.rules.iter().filter_map(Rule::max_var_id).max()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
