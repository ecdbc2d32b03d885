//! Lifecycle ports - プール / サーバーの起動と停止
//!
//! The harness only ever starts a resource, uses it and stops it; how a
//! pool is supervised or a server process is launched stays behind these
//! traits.

use async_trait::async_trait;

use crate::domain::{PoolConfig, ServerConfig};
use crate::error::LifecycleError;

#[async_trait]
pub trait PoolLifecycle: Send + Sync {
    type Handle: Send + Sync;

    async fn start_pool(
        &self,
        name: &str,
        config: &PoolConfig,
    ) -> Result<Self::Handle, LifecycleError>;

    async fn stop_pool(&self, handle: Self::Handle) -> Result<(), LifecycleError>;
}

#[async_trait]
pub trait ServerLifecycle: Send + Sync {
    type Handle: Send + Sync;

    async fn start_server(&self, config: &ServerConfig) -> Result<Self::Handle, LifecycleError>;

    async fn stop_server(&self, handle: Self::Handle) -> Result<(), LifecycleError>;
}
