//! Exit reasons: why a unit terminated without returning normally.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reason carried by an abnormal termination.
///
/// A unit that ends through its normal return path (value or error) never
/// produces one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExitReason {
    /// The unit panicked. Carries the panic message when it was a string.
    Panic(String),

    /// The unit was aborted from outside before it finished.
    Killed,

    /// The unit terminated itself through [`exit`](crate::exit).
    Custom(String),

    /// An invocation the unit was waiting on ran out of time.
    Timeout(Duration),
}

impl ExitReason {
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }

    /// Recover the reason from a panic payload.
    ///
    /// `exit()` と `InvokeError::escalate()` は `ExitReason` そのものを
    /// payload にして unwind するので、入れ子の invocation でも reason が保たれる。
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<ExitReason>() {
            Ok(reason) => *reason,
            Err(payload) => {
                if let Some(s) = payload.downcast_ref::<&str>() {
                    Self::Panic(s.to_string())
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    Self::Panic(s.clone())
                } else {
                    Self::Panic("unknown panic".to_string())
                }
            }
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
            Self::Killed => f.write_str("killed"),
            Self::Custom(reason) => f.write_str(reason),
            Self::Timeout(after) => write!(f, "timed out after {after:?}"),
        }
    }
}
