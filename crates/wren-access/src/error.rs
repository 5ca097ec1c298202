use sea_orm::{DbErr, SqlErr};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the access core.
///
/// Authentication paths never say which check failed; they all surface as
/// [`Error::InvalidCredential`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown email, password mismatch, disabled account, unknown or expired
    /// session, or an API key that failed any verification step.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Duplicate slug, email, membership, property name, or a second accept of
    /// the same invitation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write would break an invariant the schema cannot express, such as
    /// leaving an organization without an owner.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{what} has expired")]
    Expired { what: &'static str },

    #[error("{what} has been revoked")]
    Revoked { what: &'static str },

    /// The caller is authenticated but the operation targets something it may
    /// not act on.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Row-level security resolution found required properties without values.
    /// Carries every missing name, in definition order.
    #[error("missing required session properties: {}", .missing.join(", "))]
    MissingRequiredContext { missing: Vec<String> },

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] DbErr),
}

/// Coarse classification for transports that map errors onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    NotFound,
    Conflict,
    InvariantViolation,
    Expired,
    Revoked,
    Forbidden,
    Validation,
    MissingRequiredContext,
    Internal,
}

impl Error {
    pub fn not_found(entity: &'static str) -> Self {
        Error::NotFound { entity }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidCredential => ErrorKind::Unauthenticated,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Error::Expired { .. } => ErrorKind::Expired,
            Error::Revoked { .. } => ErrorKind::Revoked,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Validation(_) => ErrorKind::Validation,
            Error::MissingRequiredContext { .. } => ErrorKind::MissingRequiredContext,
            Error::Hashing(_) | Error::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::InvalidCredential)
    }
}

/// True when the store rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Map a unique violation onto [`Error::Conflict`], pass anything else through.
pub(crate) fn conflict_on_unique(err: DbErr, what: impl Into<String>) -> Error {
    if is_unique_violation(&err) {
        Error::Conflict(what.into())
    } else {
        Error::Store(err)
    }
}
