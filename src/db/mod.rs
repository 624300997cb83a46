//! The fact/rule database and its event-driven update algorithm.
//!
//! Facts here are fluents: they come into existence when an event with a
//! matching initiator occurs and cease to exist when an event with a
//! matching terminator occurs. `updates` applies one cycle's events to the
//! fact store, terminating before initiating per event so an event that both
//! removes and re-adds a fluent nets to "re-added".

mod error;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub use error::DbError;
use log::debug;
use serde::Serialize;

use crate::logic::{Predicate, Rule, RuleSet};

/// Declares that an event brings a fluent into existence (initiator) or out
/// of existence (terminator).
///
/// `linked_variables[i]` is the fluent argument position that receives event
/// argument `i` when the fluent pattern is grounded against a concrete
/// event. Entries are applied in order, so a later link may overwrite an
/// earlier one, and trailing event arguments without a link are ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDeclaration {
    event: Predicate,
    fluent: Predicate,
    linked_variables: Vec<usize>,
}

pub type Initiator = PostDeclaration;
pub type Terminator = PostDeclaration;

impl PostDeclaration {
    /// Validates the link table: at most one link per event argument, each
    /// landing inside the fluent's argument array.
    pub fn new(
        event: Predicate,
        fluent: Predicate,
        linked_variables: Vec<usize>,
    ) -> Result<Self, DbError> {
        if linked_variables.len() > event.arity() {
            return Err(DbError::LinkedVariableArity(
                event.clone(),
                linked_variables.len(),
                event.arity(),
            ));
        }
        if let Some(&bad) = linked_variables.iter().find(|&&j| j >= fluent.arity()) {
            return Err(DbError::LinkedVariableRange(event, bad, fluent.arity()));
        }
        Ok(PostDeclaration {
            event,
            fluent,
            linked_variables,
        })
    }

    pub fn event(&self) -> &Predicate {
        &self.event
    }

    pub fn fluent(&self) -> &Predicate {
        &self.fluent
    }

    /// Substitute the concrete event's argument values into the fluent
    /// pattern at the linked positions.
    pub fn ground_fluent(&self, event: &Predicate) -> Predicate {
        let mut fluent = self.fluent.clone();
        for (term, &j) in event.terms.iter().zip(&self.linked_variables) {
            fluent.terms[j] = term.clone();
        }
        fluent
    }
}

impl fmt::Display for PostDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~> {}", self.event, self.fluent)
    }
}

/// Admissibility oracle for an atomic sentence that is achieved by acting
/// rather than derived from rules. Implementations decide against the rule
/// set in force and the events already queued for the next cycle.
pub trait Action {
    fn name(&self) -> &str;

    fn is_admissible(
        &self,
        candidate: &Predicate,
        rules: &RuleSet,
        queued_next_events: &RuleSet,
    ) -> bool;
}

/// The fact/rule store plus the two event-keyed effect indices.
///
/// One logical instance exists per process; it is owned by the
/// [`Engine`](crate::engine::Engine) context object and mutated only by
/// [`updates`](Database::updates) between goal-resolution passes.
#[derive(Default)]
pub struct Database {
    facts: RuleSet,
    rules: RuleSet,
    initiators: HashMap<String, Vec<Initiator>>,
    terminators: HashMap<String, Vec<Terminator>>,
    actions: HashMap<String, Box<dyn Action>>,
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    pub fn with_initial(
        facts: RuleSet,
        rules: RuleSet,
        initiators: HashMap<String, Vec<Initiator>>,
        terminators: HashMap<String, Vec<Terminator>>,
    ) -> Self {
        Database {
            facts,
            rules,
            initiators,
            terminators,
            actions: HashMap::new(),
        }
    }

    pub fn facts(&self) -> &RuleSet {
        &self.facts
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Add a fact unless an equivalent one is already present.
    pub fn add_fact(&mut self, fact: Predicate) -> bool {
        self.facts.add_rule_if_new(Rule::fact(fact))
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.add_rule(rule);
    }

    pub fn add_initiator(&mut self, initiator: Initiator) {
        self.initiators
            .entry(initiator.event.name.clone())
            .or_default()
            .push(initiator);
    }

    pub fn add_terminator(&mut self, terminator: Terminator) {
        self.terminators
            .entry(terminator.event.name.clone())
            .or_default()
            .push(terminator);
    }

    pub fn register_action(&mut self, action: Box<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn lookup_action(&self, name: &str) -> Option<&dyn Action> {
        self.actions.get(name).map(|a| a.as_ref())
    }

    /// The merged view goal resolution runs against: facts first, rules
    /// after, both in insertion order.
    pub fn rule_set(&self) -> RuleSet {
        let mut merged = self.facts.clone();
        merged.extend(&self.rules);
        merged
    }

    /// Apply one cycle's events to the fact store, strictly in the order
    /// given. Per event: every terminator fires before any initiator, and
    /// initiators skip fluents that already hold, so replaying an event is a
    /// no-op.
    pub fn updates(&mut self, events: &[Predicate]) {
        for event in events {
            let terminators = self.terminators.get(&event.name).cloned().unwrap_or_default();
            for terminator in &terminators {
                let fluent = terminator.ground_fluent(event);
                let removed = self.facts.remove_unifying_facts(&fluent);
                if removed > 0 {
                    debug!("event {} terminated {} ({} fact(s))", event, fluent, removed);
                }
            }

            let initiators = self.initiators.get(&event.name).cloned().unwrap_or_default();
            for initiator in &initiators {
                let fluent = initiator.ground_fluent(event);
                if !self.facts.contains_unifying_fact(&fluent) {
                    debug!("event {} initiated {}", event, fluent);
                    self.facts.add_rule(Rule::fact(fluent));
                }
            }
        }
    }

    pub fn snapshot(&self) -> DatabaseState {
        DatabaseState {
            facts: self.facts.iter().map(|r| r.head.clone()).collect(),
            rules: self.rules.iter().cloned().collect(),
            initiators: self
                .initiators
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            terminators: self
                .terminators
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "facts:")?;
        write!(f, "{}", self.facts)?;
        writeln!(f, "rules:")?;
        write!(f, "{}", self.rules)
    }
}

/// Serializable database state for fixtures and snapshot comparison.
/// BTreeMap keys keep the rendering deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseState {
    pub facts: Vec<Predicate>,
    pub rules: Vec<Rule>,
    pub initiators: BTreeMap<String, Vec<PostDeclaration>>,
    pub terminators: BTreeMap<String, Vec<PostDeclaration>>,
}
