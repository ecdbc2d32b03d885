//! Harness - プール / サーバーの collaborator まわりの接着剤
//!
//! Readiness polling, start/run/stop helpers and an in-memory pool
//! collaborator for tests.

pub mod memory;
pub mod readiness;
pub mod scoped;

pub use self::memory::{InMemoryPools, PoolHandle};
pub use self::readiness::{WaitPolicy, await_condition, await_condition_async};
pub use self::scoped::{with_pool, with_server};
