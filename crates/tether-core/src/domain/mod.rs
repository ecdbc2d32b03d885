//! Domain model: identifiers, envelopes, exit reasons, exceptions and the
//! pool configuration record. Nothing here spawns or awaits.

pub mod config;
pub mod envelope;
pub mod exception;
pub mod exit;
pub mod ids;
pub mod timeout;

pub use self::config::{PoolConfig, PoolConfigBuilder, SelectionStrategy, ServerConfig};
pub use self::envelope::{Envelope, Reply};
pub use self::exception::{ErrorKind, Exception, Trace};
pub use self::exit::ExitReason;
pub use self::ids::{CorrelationToken, Id, IdMarker, UnitId};
pub use self::timeout::Timeout;
