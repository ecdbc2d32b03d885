//! Concurrent map with input order preserved.
//!
//! Each element gets its own linked subordinate, so one element crashing
//! takes the whole map down. The orchestrator awaits the handles in spawn
//! order: completion order never leaks into the result.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;

use super::invoke::Invoker;
use super::link::{LinkedHandle, spawn_linked};
use crate::domain::Timeout;
use crate::error::InvokeError;
use crate::ports::IdGenerator;

impl<G: IdGenerator> Invoker<G> {
    /// Apply `f` to every element concurrently, inside one isolated
    /// invocation bounded by `timeout`.
    ///
    /// The first `Err` in *input* order is returned as `Raised`; a crash in
    /// any element is returned as `Exit`. Either way no partial result is
    /// produced and the remaining subordinates are torn down.
    pub async fn try_parallel_map<I, F, Fut, R, X>(
        &self,
        f: F,
        elements: I,
        timeout: impl Into<Timeout>,
    ) -> Result<Vec<R>, InvokeError<X>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, X>> + Send + 'static,
        R: Send + 'static,
        X: Send + 'static,
    {
        let elements: Vec<I::Item> = elements.into_iter().collect();
        let count = elements.len();
        tracing::debug!(count, "parallel map");

        self.invoke(
            move || async move {
                let f = Arc::new(f);
                let handles: Vec<LinkedHandle<Result<R, X>>> = elements
                    .into_iter()
                    .map(|element| {
                        let f = Arc::clone(&f);
                        spawn_linked(async move { (*f)(element).await })
                    })
                    .collect();

                let mut results = Vec::with_capacity(handles.len());
                for handle in handles {
                    match handle.await {
                        Ok(Ok(value)) => results.push(value),
                        Ok(Err(err)) => return Err(err),
                        Err(reason) => super::exit(reason),
                    }
                }
                Ok(results)
            },
            timeout,
        )
        .await
    }

    pub async fn parallel_map<I, F, Fut, R>(
        &self,
        f: F,
        elements: I,
    ) -> Result<Vec<R>, InvokeError<Infallible>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.parallel_map_with_timeout(f, elements, Timeout::Unbounded)
            .await
    }

    pub async fn parallel_map_with_timeout<I, F, Fut, R>(
        &self,
        f: F,
        elements: I,
        timeout: impl Into<Timeout>,
    ) -> Result<Vec<R>, InvokeError<Infallible>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        self.try_parallel_map(
            move |element| f(element).map(Ok::<R, Infallible>),
            elements,
            timeout,
        )
        .await
    }
}

/// `results[i] == f(elements[i])`, computed concurrently, no timeout.
pub async fn parallel_map<I, F, Fut, R>(
    f: F,
    elements: I,
) -> Result<Vec<R>, InvokeError<Infallible>>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    Invoker::default().parallel_map(f, elements).await
}

/// Like [`parallel_map`], bounded by `timeout`.
pub async fn parallel_map_with_timeout<I, F, Fut, R>(
    f: F,
    elements: I,
    timeout: impl Into<Timeout>,
) -> Result<Vec<R>, InvokeError<Infallible>>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    Invoker::default()
        .parallel_map_with_timeout(f, elements, timeout)
        .await
}

/// Fallible variant of [`parallel_map`], no timeout.
pub async fn try_parallel_map<I, F, Fut, R, X>(f: F, elements: I) -> Result<Vec<R>, InvokeError<X>>
where
    I: IntoIterator,
    I::Item: Send + 'static,
    F: Fn(I::Item) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, X>> + Send + 'static,
    R: Send + 'static,
    X: Send + 'static,
{
    Invoker::default()
        .try_parallel_map(f, elements, Timeout::Unbounded)
        .await
}
