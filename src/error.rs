//! implementation for [`SRCError`]
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// The kind of failure, so callers can tell a broken schema from a flaky network or from bytes
/// that were never meant for this registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The schema text could not be parsed, or its type is not supported.
    SchemaParse,
    /// The registry or the change log could not be reached, or answered with an error status.
    Network,
    /// The registry answered, but the response misses data that is needed.
    Response,
    /// The bytes are too short, or don't start with the magic byte.
    Envelope,
    /// The subject, version or schema id is not known to the cache.
    NotRegistered,
    /// The value or target type does not fit the format of the schema.
    TypeMismatch,
    /// The data could not be serialized or deserialized using a valid schema.
    Codec,
    /// A setting has a value that can't be used.
    Config,
}

/// Error struct which makes it easy to know what kind of error happened, and whether trying it
/// again might not cause an error.
#[derive(Debug, PartialEq)]
pub struct SRCError {
    pub error: String,
    pub cause: Option<String>,
    pub kind: ErrorKind,
    pub retriable: bool,
}

/// Implements standard error so error handling can be simplified
impl Error for SRCError {}

/// Implements clone so a shared result can be handed to every waiting caller
impl Clone for SRCError {
    fn clone(&self) -> SRCError {
        SRCError {
            error: self.error.clone(),
            cause: self.cause.as_ref().cloned(),
            kind: self.kind,
            retriable: self.retriable,
        }
    }
}

/// Gives the information from the error in a readable format.
impl fmt::Display for SRCError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(
                f,
                "{:?} error: {}, was cause by {}, it's retriable: {}",
                self.kind, self.error, &cause, self.retriable
            ),
            None => write!(
                f,
                "{:?} error: {} had no other cause, it's retriable: {}",
                self.kind, self.error, self.retriable
            ),
        }
    }
}

impl SRCError {
    pub fn new(kind: ErrorKind, error: &str, cause: Option<String>, retriable: bool) -> SRCError {
        SRCError {
            error: error.to_owned(),
            cause,
            kind,
            retriable,
        }
    }
    pub fn retryable_with_cause<T: Display>(cause: T, error: &str) -> SRCError {
        SRCError::new(ErrorKind::Network, error, Some(format!("{}", cause)), true)
    }
    pub fn non_retryable_with_cause<T: Display>(cause: T, error: &str) -> SRCError {
        SRCError::new(ErrorKind::Network, error, Some(format!("{}", cause)), false)
    }
    pub fn response(error: &str) -> SRCError {
        SRCError::new(ErrorKind::Response, error, None, false)
    }
    pub fn schema_parse<T: Display>(cause: Option<T>, error: &str) -> SRCError {
        SRCError::new(
            ErrorKind::SchemaParse,
            error,
            cause.map(|c| format!("{}", c)),
            false,
        )
    }
    pub fn envelope(error: &str) -> SRCError {
        SRCError::new(ErrorKind::Envelope, error, None, false)
    }
    pub fn not_registered(error: &str) -> SRCError {
        SRCError::new(ErrorKind::NotRegistered, error, None, false)
    }
    /// Wraps a failed refresh, the cause keeps the original error so it's still visible whether it
    /// was worth retrying.
    pub fn not_registered_with_cause(cause: SRCError, error: &str) -> SRCError {
        let retriable = cause.retriable;
        SRCError::new(
            ErrorKind::NotRegistered,
            error,
            Some(format!("{}", cause)),
            retriable,
        )
    }
    pub fn type_mismatch(error: &str) -> SRCError {
        SRCError::new(ErrorKind::TypeMismatch, error, None, false)
    }
    pub fn codec<T: Display>(cause: T, error: &str) -> SRCError {
        SRCError::new(ErrorKind::Codec, error, Some(format!("{}", cause)), false)
    }
    pub fn config(error: &str) -> SRCError {
        SRCError::new(ErrorKind::Config, error, None, false)
    }
}
