//! Scoped helpers: start a resource, run the body, always stop it.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use super::readiness::{WaitPolicy, await_condition_async};
use crate::domain::{PoolConfig, ServerConfig};
use crate::error::LifecycleError;
use crate::ports::{PoolLifecycle, ServerLifecycle};

/// Start pool `name`, run `body`, stop the pool.
///
/// The pool is stopped even if `body` panics; the panic is resumed after.
pub async fn with_pool<P, F, Fut, T>(
    pools: &P,
    name: &str,
    config: &PoolConfig,
    body: F,
) -> Result<T, LifecycleError>
where
    P: PoolLifecycle,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let handle = pools.start_pool(name, config).await?;
    tracing::info!(pool = name, host = %config.host, port = config.port, "pool started");

    let outcome = AssertUnwindSafe(body()).catch_unwind().await;

    let stopped = pools.stop_pool(handle).await;
    match &stopped {
        Ok(()) => tracing::info!(pool = name, "pool stopped"),
        Err(err) => tracing::warn!(pool = name, %err, "pool failed to stop"),
    }
    settle(outcome, stopped)
}

/// Start a server, wait until `probe` reports it ready, run `body`, stop
/// the server.
pub async fn with_server<S, R, RFut, F, Fut, T>(
    servers: &S,
    config: &ServerConfig,
    probe: R,
    wait: WaitPolicy,
    body: F,
) -> Result<T, LifecycleError>
where
    S: ServerLifecycle,
    R: FnMut() -> RFut,
    RFut: Future<Output = bool>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let handle = servers.start_server(config).await?;
    tracing::info!(addr = %config.addr(), "server started; waiting for readiness");

    if let Err(err) = await_condition_async(probe, wait.poll_interval, wait.overall).await {
        tracing::warn!(addr = %config.addr(), %err, "server never became ready");
        if let Err(stop_err) = servers.stop_server(handle).await {
            tracing::warn!(addr = %config.addr(), err = %stop_err, "server failed to stop");
        }
        return Err(err.into());
    }

    let outcome = AssertUnwindSafe(body()).catch_unwind().await;

    let stopped = servers.stop_server(handle).await;
    match &stopped {
        Ok(()) => tracing::info!(addr = %config.addr(), "server stopped"),
        Err(err) => tracing::warn!(addr = %config.addr(), %err, "server failed to stop"),
    }
    settle(outcome, stopped)
}

/// A panic in the body wins over a failed stop. The stop error surfaces
/// only when the body returned.
fn settle<T>(
    outcome: std::thread::Result<T>,
    stopped: Result<(), LifecycleError>,
) -> Result<T, LifecycleError> {
    match outcome {
        Ok(value) => stopped.map(|()| value),
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
