//! tether-core
//!
//! Isolated concurrent invocation for connection-pool test harnesses.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, envelope, exit, exception, timeout, config）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, Pool/Server lifecycle）
//! - **isolate**: 隔離実行（invoke, spawn_linked, parallel_map）
//! - **harness**: collaborator まわりの接着剤（await_condition, with_pool, with_server）
//! - **error**: エラー型
//!
//! ```ignore
//! use tether_core::{Timeout, invoke, parallel_map};
//!
//! let pong = invoke(|| async { client.ping().await }, Timeout::millis(500)).await?;
//! let lens = parallel_map(|key: String| async move { key.len() }, keys).await?;
//! ```

pub mod domain;
pub mod error;
pub mod harness;
pub mod isolate;
pub mod ports;

pub use crate::domain::{
    Envelope, ErrorKind, Exception, ExitReason, PoolConfig, ServerConfig, Timeout,
};
pub use crate::error::{AwaitError, ConfigError, InvokeError, LifecycleError};
pub use crate::isolate::{
    Invoker, LinkedHandle, exit, invoke, parallel_map, parallel_map_with_timeout, spawn_linked,
    try_parallel_map,
};
