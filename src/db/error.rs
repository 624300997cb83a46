//! database errors

use crate::logic::Predicate;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("declaration for event {0} links {1} variables, event arity is {2}")]
    LinkedVariableArity(Predicate, usize, usize),
    #[error("declaration for event {0} links into fluent position {1}, fluent arity is {2}")]
    LinkedVariableRange(Predicate, usize, usize),
}
