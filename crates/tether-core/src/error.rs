use std::time::Duration;

use thiserror::Error;

use crate::domain::ExitReason;

/// Failure of an isolated invocation.
///
/// Two tiers: `Raised` is the task's own error and is meant to be handled
/// like any other `Err`. `Exit` and `Timeout` mean the computation never
/// produced a result at all; see [`InvokeError::escalate`].
#[derive(Debug, Error)]
pub enum InvokeError<E> {
    #[error("task raised: {0}")]
    Raised(E),

    #[error("task exited: {0}")]
    Exit(ExitReason),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),
}

impl<E> InvokeError<E> {
    /// `true` for the termination tier (`Exit`, `Timeout`).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Raised(_))
    }

    /// The reason the caller should terminate with, if this is fatal.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            Self::Raised(_) => None,
            Self::Exit(reason) => Some(reason.clone()),
            Self::Timeout(after) => Some(ExitReason::Timeout(*after)),
        }
    }

    /// Hand back the catchable error; terminate the current unit otherwise.
    ///
    /// The fatal tiers unwind through [`exit`](crate::exit) with the
    /// [`ExitReason`] as payload. Inside a worker or a linked subordinate
    /// that unwind is read back as the same reason, so nested invocations
    /// report the original cause.
    pub fn escalate(self) -> E {
        match self {
            Self::Raised(err) => err,
            Self::Exit(reason) => crate::exit(reason),
            Self::Timeout(after) => crate::exit(ExitReason::Timeout(after)),
        }
    }

    pub fn map_raised<F, G: FnOnce(E) -> F>(self, f: G) -> InvokeError<F> {
        match self {
            Self::Raised(err) => InvokeError::Raised(f(err)),
            Self::Exit(reason) => InvokeError::Exit(reason),
            Self::Timeout(after) => InvokeError::Timeout(after),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AwaitError {
    #[error("condition not met within {waited:?}")]
    Timeout { waited: Duration },
}

/// Errors reported by the pool/server collaborators.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{kind} '{name}' is already running")]
    AlreadyRunning { kind: &'static str, name: String },

    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("server not ready: {0}")]
    NotReady(#[from] AwaitError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers() {
        let raised: InvokeError<&str> = InvokeError::Raised("nope");
        assert!(!raised.is_fatal());
        assert_eq!(raised.exit_reason(), None);

        let timeout: InvokeError<&str> = InvokeError::Timeout(Duration::from_millis(5));
        assert!(timeout.is_fatal());
        assert_eq!(
            timeout.exit_reason(),
            Some(ExitReason::Timeout(Duration::from_millis(5)))
        );
    }

    #[test]
    fn escalate_returns_catchable_error() {
        let err: InvokeError<&str> = InvokeError::Raised("nope");
        assert_eq!(err.escalate(), "nope");
    }

    #[test]
    fn escalate_panics_with_exit_reason() {
        let err: InvokeError<&str> = InvokeError::Exit(ExitReason::custom("shutdown"));
        let payload = std::panic::catch_unwind(move || err.escalate()).unwrap_err();
        assert_eq!(
            ExitReason::from_panic(payload),
            ExitReason::custom("shutdown")
        );
    }
}
