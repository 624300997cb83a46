pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Top-level error wrapping the subsystem errors. Unification failure and
/// exhausted search are deliberately not here: both are expected "no"
/// answers and travel as `None`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] crate::db::DbError),
    #[error(transparent)]
    Goal(#[from] crate::goals::GoalError),
}
