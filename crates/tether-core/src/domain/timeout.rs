//! Timeout Duration: a finite bound or no bound at all.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    Bounded(Duration),
    #[default]
    Unbounded,
}

impl Timeout {
    pub fn millis(ms: u64) -> Self {
        Self::Bounded(Duration::from_millis(ms))
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Bounded(d) => Some(*d),
            Self::Unbounded => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Bounded(d)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Unbounded, Self::Bounded)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(d) => write!(f, "{d:?}"),
            Self::Unbounded => f.write_str("infinity"),
        }
    }
}
