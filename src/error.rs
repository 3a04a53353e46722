use std::io;

/// The three error kinds the core ever surfaces, per the operator-facing
/// contract: a deadlock/interrupt abort, a semantic failure, or an I/O
/// failure. `Aborted` is kept distinct from everything else because it is
/// the only one with its own recovery path (the caller must roll the
/// transaction back).
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("transaction aborted")]
    Aborted,

    #[error("{0}")]
    DbException(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn exception(msg: impl Into<String>) -> Self {
        DbError::DbException(msg.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, DbError::Aborted)
    }
}
