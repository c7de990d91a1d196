//! Runtime error types.

use derive_more::{Display, Error};

use crate::Value;

/// An error raised while running a lowered chunk.
#[derive(Debug, Display, Error)]
pub enum RuntimeError {
    /// A value raised with `error(..)`. Never stringified on the way up.
    #[display("uncaught error: {_0}")]
    Thrown(#[error(not(source))] Value),

    #[display("attempt to call a {_0} value")]
    NotCallable(#[error(not(source))] &'static str),

    #[display("attempt to index a {_0} value")]
    NotIndexable(#[error(not(source))] &'static str),

    #[display("bad argument to '{function}': {message}")]
    BadArgument {
        function: &'static str,
        message: String,
    },

    /// The chunk waits on a promise that can never settle: no queued job
    /// remains.
    #[display("awaited promise can never settle")]
    Deadlock,
}

impl RuntimeError {
    pub fn bad_argument(function: &'static str, message: impl Into<String>) -> Self {
        RuntimeError::BadArgument {
            function,
            message: message.into(),
        }
    }

    /// The value a protected call observes for this error, if it can be
    /// caught at all.
    pub fn into_caught_value(self) -> Result<Value, RuntimeError> {
        match self {
            RuntimeError::Thrown(value) => Ok(value),
            RuntimeError::Deadlock => Err(RuntimeError::Deadlock),
            other => Ok(Value::str(&other.to_string())),
        }
    }
}
