//! Exception - task が返す構造化エラー
//!
//! Tasks may fail with any error type; this is the one the crate ships for
//! harness code that does not want to define its own. It carries a class
//! for pattern matching, a JSON payload and the originating trace, all of
//! which survive the trip from the worker back to the caller untouched.

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（接続断など）
/// - Permanent: 恒久的なエラー（不正な設定など）
/// - Infrastructure: インフラエラー（サーバーが起動しない など）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Where an exception was raised, plus the context frames added while it
/// travelled outwards (innermost first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<String>,
}

impl Trace {
    #[track_caller]
    pub fn here() -> Self {
        Self::from_location(Location::caller())
    }

    fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            frames: Vec::new(),
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)?;
        for frame in &self.frames {
            write!(f, " <- {frame}")?;
        }
        Ok(())
    }
}

/// A classified error raised by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{class:?} exception: {payload} (at {trace})")]
pub struct Exception {
    pub class: ErrorKind,
    pub payload: serde_json::Value,
    pub trace: Trace,
}

impl Exception {
    /// Raise a new exception; the trace origin is the caller's location.
    #[track_caller]
    pub fn new(class: ErrorKind, payload: impl Into<serde_json::Value>) -> Self {
        Self {
            class,
            payload: payload.into(),
            trace: Trace::here(),
        }
    }

    #[track_caller]
    pub fn transient(payload: impl Into<serde_json::Value>) -> Self {
        Self::new(ErrorKind::Transient, payload)
    }

    #[track_caller]
    pub fn permanent(payload: impl Into<serde_json::Value>) -> Self {
        Self::new(ErrorKind::Permanent, payload)
    }

    #[track_caller]
    pub fn infrastructure(payload: impl Into<serde_json::Value>) -> Self {
        Self::new(ErrorKind::Infrastructure, payload)
    }

    /// Push a context frame without touching the origin.
    pub fn context(mut self, frame: impl Into<String>) -> Self {
        self.trace.frames.push(frame.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_points_at_raise_site() {
        let line = line!() + 1;
        let e = Exception::permanent(json!({"reason": "bad_port"}));

        assert_eq!(e.class, ErrorKind::Permanent);
        assert_eq!(e.trace.file, file!());
        assert_eq!(e.trace.line, line);
    }

    #[test]
    fn context_frames_keep_origin() {
        let e = Exception::transient("closed")
            .context("checkout")
            .context("request");
        let origin = (e.trace.file.clone(), e.trace.line);

        assert_eq!(
            e.trace.frames,
            vec!["checkout".to_string(), "request".to_string()]
        );
        assert_eq!(origin.0, file!());
        assert!(e.to_string().contains("<- checkout <- request"));
    }

    #[test]
    fn exception_roundtrip_json() {
        let e = Exception::infrastructure(json!({"port": 6379})).context("start_server");
        let s = serde_json::to_string(&e).unwrap();
        let back: Exception = serde_json::from_str(&s).unwrap();
        assert_eq!(back, e);
    }
}
