//! Goal-directed Horn-clause inference over an event-calculus fact store.
//!
//! The crate couples four pieces into one engine for simulated agents that
//! keep re-attempting unsolved goals as new facts arrive:
//!
//! - [`logic`]: terms, substitution sets, unification, clauses, and the
//!   insertion-ordered rule store;
//! - [`solver`]: the solution-node proof tree performing lazy, restartable
//!   SLD search with a "deepest leaf" resumption checkpoint;
//! - [`db`]: the fact database advanced cycle-by-cycle by initiator and
//!   terminator event effects (terminate before initiate, idempotent
//!   insertion);
//! - [`goals`]: the persistence layer that checkpoints partially explored
//!   proof trees across cycles and parks goals on pending actions.
//!
//! [`engine::Engine`] ties the database and goals list together into the
//! per-cycle entry point the simulation driver calls.

pub mod db;
pub mod engine;
mod error;
pub mod goals;
pub mod logic;
pub mod solver;

pub use db::{Action, Database, DatabaseState, DbError, Initiator, PostDeclaration, Terminator};
pub use engine::{CycleHandler, Engine};
pub use error::{Error, Result};
pub use goals::{Goal, GoalError, GoalSet, GoalTemplate, GoalsList, GoalsState};
pub use logic::{unify, Clause, Predicate, Rule, RuleSet, SubstitutionSet, Term, VarGen, Variable};
pub use solver::{NodeId, SolutionTree};
