use thiserror::Error;

/// Unified error taxonomy for the codec, transport and compiler layers.
///
/// `WrongUnion` is deliberately distinct from the runtime/unmarshal errors:
/// it signals a caller asked for an arm that isn't the union's active arm,
/// which is a programming mistake, not a malformed-input condition.
#[derive(Error, Debug)]
pub enum Error {
    #[error("value overflows its bound: {0}")]
    Overflow(String),

    #[error("bad message size: {0}")]
    BadMessageSize(String),

    #[error("bad union discriminant: {0}")]
    BadDiscriminant(String),

    #[error("field that should be zero/void was not: {0}")]
    ShouldBeZero(String),

    #[error("invariant failed: {0}")]
    InvariantFailed(String),

    #[error("wrong union arm accessed: {0}")]
    WrongUnion(String),

    #[error("rpc call rejected: {0}")]
    CallError(String),

    #[error("system error ({label}): {source}")]
    SystemError {
        label: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error at {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn overflow(what: impl Into<String>) -> Self {
        Error::Overflow(what.into())
    }

    pub fn bad_discriminant(what: impl Into<String>) -> Self {
        Error::BadDiscriminant(what.into())
    }

    pub fn system(label: &'static str, source: std::io::Error) -> Self {
        Error::SystemError { label, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
