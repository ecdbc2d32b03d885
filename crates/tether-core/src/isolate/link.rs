//! Link - worker と subordinate の間の failure-propagation linkage
//!
//! A worker owns a [`LinkSet`]. Every future started with [`spawn_linked`]
//! while the worker runs joins that set:
//! - the subordinate panicking (or exiting) sends its reason on the set's
//!   exit channel, which the worker treats as its own abnormal termination;
//! - the worker going away for any reason aborts every subordinate still in
//!   the set, including ones they spawned in turn.
//!
//! Normal completion of a subordinate is not propagated.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use crate::domain::{ExitReason, UnitId};

tokio::task_local! {
    static LINKS: Arc<LinkSet>;
}

pub(crate) struct LinkSet {
    owner: UnitId,
    exit_tx: mpsc::UnboundedSender<ExitReason>,
    /// `None` once severed: anything linked afterwards is aborted on the spot.
    links: Mutex<Option<Vec<AbortHandle>>>,
}

impl LinkSet {
    pub(crate) fn new(owner: UnitId) -> (Arc<Self>, mpsc::UnboundedReceiver<ExitReason>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let set = Arc::new(Self {
            owner,
            exit_tx,
            links: Mutex::new(Some(Vec::new())),
        });
        (set, exit_rx)
    }

    /// Run `future` with this set as the current link scope.
    pub(crate) fn scope<F: Future>(
        self: &Arc<Self>,
        future: F,
    ) -> TaskLocalFuture<Arc<LinkSet>, F> {
        LINKS.scope(Arc::clone(self), future)
    }

    fn link(&self, handle: AbortHandle) {
        let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        match links.as_mut() {
            Some(handles) => {
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
            }
            None => handle.abort(),
        }
    }

    fn signal(&self, reason: ExitReason) {
        // 受信側（worker）がもういないなら、伝える相手もいない
        let _ = self.exit_tx.send(reason);
    }

    pub(crate) fn sever(&self) {
        let handles = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        let live = handles.iter().filter(|h| !h.is_finished()).count();
        if live > 0 {
            tracing::debug!(owner = %self.owner, live, "aborting linked subordinates");
        }
        for handle in handles {
            handle.abort();
        }
    }
}

/// Severs the set when the owning worker is dropped, returns or unwinds.
pub(crate) struct LinkGuard(Arc<LinkSet>);

impl LinkGuard {
    pub(crate) fn new(set: Arc<LinkSet>) -> Self {
        Self(set)
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        self.0.sever();
    }
}

/// Spawn `future` as a subordinate linked to the current worker.
///
/// Outside of an invocation there is nothing to link to; the future is
/// still spawned, but nobody tears it down.
pub fn spawn_linked<F>(future: F) -> LinkedHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let Ok(set) = LINKS.try_with(Arc::clone) else {
        tracing::warn!(
            "spawn_linked called outside an isolated invocation; subordinate is unlinked"
        );
        let inner = tokio::spawn(async move {
            AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .map_err(ExitReason::from_panic)
        });
        return LinkedHandle { inner };
    };

    let scope = Arc::clone(&set);
    let inner = tokio::spawn(set.scope(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(value) => Ok(value),
            Err(payload) => {
                let reason = ExitReason::from_panic(payload);
                tracing::debug!(owner = %scope.owner, %reason, "linked subordinate terminated");
                scope.signal(reason.clone());
                Err(reason)
            }
        }
    }));
    set.link(inner.abort_handle());
    LinkedHandle { inner }
}

/// Handle to a linked subordinate. Resolves to its value, or to the reason
/// it terminated abnormally.
///
/// Dropping the handle does not stop the subordinate; the link does.
pub struct LinkedHandle<T> {
    inner: JoinHandle<Result<T, ExitReason>>,
}

impl<T> LinkedHandle<T> {
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for LinkedHandle<T> {
    type Output = Result<T, ExitReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let joined = ready!(Pin::new(&mut self.inner).poll(cx));
        Poll::Ready(match joined {
            Ok(result) => result,
            Err(err) => Err(join_error_reason(err)),
        })
    }
}

pub(crate) fn join_error_reason(err: JoinError) -> ExitReason {
    if err.is_panic() {
        ExitReason::from_panic(err.into_panic())
    } else {
        ExitReason::Killed
    }
}
