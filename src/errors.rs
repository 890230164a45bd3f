//! typed error markers carried inside `anyhow::Error` chains

use std::fmt;
use std::io;

use anyhow::Error;
use fil_clock::ChainEpoch;

use crate::metadb::MetaError;

/// classification of a failure, recovered from the error chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// the target record, instance or location is absent
    NotFound,
    /// the request conflicts with the current state
    Precondition,
    /// the request should be retried later
    Retryable,
    /// file system failure
    FatalIO,
    /// an internal invariant has been broken
    Invariant,
    /// anything else
    Other,
}

/// something required by the request is absent
#[derive(Debug)]
pub struct NotFound(pub String);

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not found: {}", self.0)
    }
}

impl std::error::Error for NotFound {}

/// the request conflicts with the current state
#[derive(Debug)]
pub struct Precondition(pub String);

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Precondition {}

/// the request should be retried once the chain reaches `until`
#[derive(Debug)]
pub struct WaitRetry {
    pub until: ChainEpoch,
    pub reason: String,
}

impl fmt::Display for WaitRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, wait until height {}", self.reason, self.until)
    }
}

impl std::error::Error for WaitRetry {}

/// an internal invariant has been broken, should abort loudly
#[derive(Debug)]
pub struct Invariant(pub String);

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.0)
    }
}

impl std::error::Error for Invariant {}

/// walks through the error chain and returns the first recognized kind
pub fn kind(err: &Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(me) = cause.downcast_ref::<MetaError>() {
            if let MetaError::NotFound = me {
                return ErrorKind::NotFound;
            }
            continue;
        }

        if cause.is::<NotFound>() {
            return ErrorKind::NotFound;
        }

        if cause.is::<Precondition>() {
            return ErrorKind::Precondition;
        }

        if cause.is::<WaitRetry>() {
            return ErrorKind::Retryable;
        }

        if cause.is::<Invariant>() {
            return ErrorKind::Invariant;
        }

        if cause.is::<io::Error>() {
            return ErrorKind::FatalIO;
        }
    }

    ErrorKind::Other
}

/// shortcut for `kind(err) == ErrorKind::NotFound`
pub fn is_not_found(err: &Error) -> bool {
    kind(err) == ErrorKind::NotFound
}
