use rusqlite::ErrorCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("bookmark with url {0} already exists")]
    DuplicateKey(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("store is busy ({op}): {message}")]
    TransientStore { op: &'static str, message: String },

    #[error("failed to {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    JobState(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientStore { .. })
    }
}

/// Attaches the name of the failed store operation to SQL errors.
pub trait ResultExt<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|source| classify(op, source))
    }
}

/// Lock contention becomes `TransientStore` so the retry loop can pick it up.
pub(crate) fn classify(op: &'static str, source: rusqlite::Error) -> Error {
    match source.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            Error::TransientStore {
                op,
                message: source.to_string(),
            }
        }
        _ => Error::Store { op, source },
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_is_transient() {
        let err = classify("store content", sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        assert!(err.is_transient());

        let err = classify("store content", sqlite_failure(rusqlite::ffi::SQLITE_LOCKED));
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_failures_keep_context() {
        let err = classify("get bookmark", sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT));
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("failed to get bookmark"));
    }

    #[test]
    fn test_unique_violation_detected() {
        let err = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE);
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&sqlite_failure(rusqlite::ffi::SQLITE_BUSY)));
    }
}
