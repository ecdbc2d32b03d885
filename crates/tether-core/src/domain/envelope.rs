//! Result Envelope - invocation の結果を運ぶタグ付きの値

use serde::{Deserialize, Serialize};

use super::exit::ExitReason;
use super::ids::CorrelationToken;

/// Outcome of one invocation, produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Envelope<T, E> {
    /// The task returned normally.
    Success(T),

    /// The task returned an error through its normal return path.
    Raised(E),

    /// The worker unit terminated without returning.
    Exit(ExitReason),
}

impl<T, E> Envelope<T, E> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Raised(_) => "raised",
            Self::Exit(_) => "exit",
        }
    }
}

impl<T, E> From<Result<T, E>> for Envelope<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Raised(err),
        }
    }
}

/// An envelope addressed to the caller holding `token`.
#[derive(Debug)]
pub struct Reply<T, E> {
    pub token: CorrelationToken,
    pub envelope: Envelope<T, E>,
}

impl<T, E> Reply<T, E> {
    pub fn new(token: CorrelationToken, envelope: Envelope<T, E>) -> Self {
        Self { token, envelope }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_maps_onto_envelope() {
        let ok: Envelope<u32, String> = Ok(7).into();
        assert_eq!(ok, Envelope::Success(7));

        let err: Envelope<u32, String> = Err("nope".to_string()).into();
        assert_eq!(err.kind(), "raised");
    }

    #[test]
    fn envelope_is_tagged_enum() {
        let e: Envelope<u32, String> = Envelope::Exit(ExitReason::Killed);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "exit");
        assert_eq!(v["value"]["kind"], "killed");
    }
}
