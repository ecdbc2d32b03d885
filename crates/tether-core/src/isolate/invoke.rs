//! Isolated invocation: caller, supervisor and worker.
//!
//! ```text
//!  caller ──spawn──▶ supervisor ──spawn + link──▶ worker ──link──▶ subordinates
//!    ▲   ◀─monitor──┘     │                         │
//!    └──── Reply{token, Exit} ◀──┘                  │
//!    └──── Reply{token, Success | Raised} ◀─────────┘
//! ```
//!
//! - The supervisor owns the worker: aborting the supervisor drops the
//!   worker's abort guard, which drops the worker, which severs its links.
//! - The supervisor watches the caller through a cancellation token whose
//!   drop guard lives in the caller's future. Neither side can kill the
//!   other through that relation.
//! - Only the worker replies on the normal paths; only the supervisor
//!   replies when the worker died. One reply per token, at most.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::link::{LinkGuard, LinkSet, join_error_reason};
use crate::domain::{CorrelationToken, Envelope, ExitReason, Reply, Timeout, UnitId};
use crate::error::InvokeError;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

/// Runs tasks in isolation. Holds the generator for correlation tokens and
/// unit ids; otherwise stateless, so one instance can serve any number of
/// concurrent callers.
pub struct Invoker<G = UlidGenerator<SystemClock>> {
    ids: Arc<G>,
}

impl<G> Clone for Invoker<G> {
    fn clone(&self) -> Self {
        Self {
            ids: Arc::clone(&self.ids),
        }
    }
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(UlidGenerator::new(SystemClock))
    }
}

impl<G: IdGenerator> Invoker<G> {
    pub fn new(ids: G) -> Self {
        Self { ids: Arc::new(ids) }
    }

    /// Run `task` on a fresh worker and reproduce its outcome here.
    ///
    /// - `Ok(value)` when the task returned `Ok(value)`.
    /// - `Err(Raised(e))` when it returned `Err(e)`.
    /// - `Err(Exit(reason))` when the worker panicked, called
    ///   [`exit`](crate::exit), or a subordinate linked to it crashed.
    /// - `Err(Timeout(limit))` when no reply arrived within `timeout`. The
    ///   supervisor, the worker and every linked subordinate are aborted
    ///   before this returns.
    ///
    /// Dropping the returned future before it resolves tears the worker
    /// down as well.
    pub async fn invoke<T, E, F, Fut>(
        &self,
        task: F,
        timeout: impl Into<Timeout>,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = timeout.into();
        let token = self.ids.correlation_token();
        let supervisor_id = self.ids.unit_id();
        let worker_id = self.ids.unit_id();

        // worker と supervisor のどちらか一方だけが送るので 1 で足りる
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        let liveness = CancellationToken::new();
        let alive = liveness.clone().drop_guard();

        let supervisor = Supervisor {
            token,
            worker_id,
            reply_tx,
            caller: liveness,
        };
        let span = tracing::debug_span!("supervisor", %token, unit = %supervisor_id);
        let supervisor = tokio::spawn(supervisor.run(task).instrument(span));
        tracing::trace!(%token, %timeout, "invocation started");

        let received = match timeout {
            Timeout::Unbounded => receive(token, &mut reply_rx).await,
            Timeout::Bounded(limit) => {
                match tokio::time::timeout(limit, receive(token, &mut reply_rx)).await {
                    Ok(envelope) => envelope,
                    Err(_) => {
                        tracing::warn!(%token, ?limit, "invocation timed out; killing supervisor");
                        kill(supervisor).await;
                        return Err(InvokeError::Timeout(limit));
                    }
                }
            }
        };

        // 返信は受け取った。ここから先 supervisor に caller 喪失を見せる必要はない
        let _ = alive.disarm();

        match received {
            Envelope::Success(value) => Ok(value),
            Envelope::Raised(err) => Err(InvokeError::Raised(err)),
            Envelope::Exit(reason) => Err(InvokeError::Exit(reason)),
        }
    }
}

/// Run `task` in isolation with the default invoker.
pub async fn invoke<T, E, F, Fut>(
    task: F,
    timeout: impl Into<Timeout>,
) -> Result<T, InvokeError<E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Invoker::default().invoke(task, timeout).await
}

/// Wait for the reply addressed to `token`. Anything else in the mailbox
/// belongs to nobody and is dropped.
async fn receive<T, E>(
    token: CorrelationToken,
    reply_rx: &mut mpsc::Receiver<Reply<T, E>>,
) -> Envelope<T, E> {
    loop {
        match reply_rx.recv().await {
            Some(reply) if reply.token == token => return reply.envelope,
            Some(reply) => {
                tracing::warn!(expected = %token, got = %reply.token, "discarding stale reply");
            }
            // 両方の送信側が返信なしで消えた（runtime の停止など）
            None => return Envelope::Exit(ExitReason::Killed),
        }
    }
}

async fn kill(supervisor: JoinHandle<()>) {
    supervisor.abort();
    // supervisor の future が drop されたところで worker の abort guard も落ちる
    let _ = supervisor.await;
}

struct Supervisor<T, E> {
    token: CorrelationToken,
    worker_id: UnitId,
    reply_tx: mpsc::Sender<Reply<T, E>>,
    caller: CancellationToken,
}

impl<T, E> Supervisor<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn run<F, Fut>(self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (links, exit_rx) = LinkSet::new(self.worker_id);
        let worker = Worker {
            token: self.token,
            reply_tx: self.reply_tx.clone(),
            links,
            exit_rx,
        };
        let span = tracing::debug_span!("worker", unit = %self.worker_id);
        // 関数を抜けると worker も abort される
        let mut worker = AbortOnDrop(tokio::spawn(worker.run(task).instrument(span)));

        tokio::select! {
            _ = self.caller.cancelled() => {
                tracing::debug!("caller is gone; killing worker");
            }
            joined = &mut worker.0 => {
                let reason = match joined {
                    Ok(Ok(())) => {
                        tracing::trace!("worker finished");
                        return;
                    }
                    Ok(Err(reason)) => reason,
                    Err(err) => join_error_reason(err),
                };
                tracing::debug!(%reason, "worker terminated abnormally");
                let reply = Reply::new(self.token, Envelope::Exit(reason));
                if self.reply_tx.send(reply).await.is_err() {
                    tracing::debug!("caller is gone; exit reason dropped");
                }
            }
        }
    }
}

/// Aborts the task when dropped. This is the supervisor's half of the link
/// to its worker.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Worker<T, E> {
    token: CorrelationToken,
    reply_tx: mpsc::Sender<Reply<T, E>>,
    links: Arc<LinkSet>,
    exit_rx: mpsc::UnboundedReceiver<ExitReason>,
}

impl<T, E> Worker<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// `Ok(())` is a normal termination (a reply has been sent), `Err` an
    /// abnormal one. A panic inside the task unwinds out of here and the
    /// supervisor reads it from the join handle.
    async fn run<F, Fut>(self, task: F) -> Result<(), ExitReason>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let Self {
            token,
            reply_tx,
            links,
            mut exit_rx,
        } = self;
        let _guard = LinkGuard::new(Arc::clone(&links));

        let result = links
            .scope(async move {
                tokio::select! {
                    biased;
                    Some(reason) = exit_rx.recv() => Err(reason),
                    result = task() => Ok(result),
                }
            })
            .await?;

        let envelope = Envelope::from(result);
        tracing::trace!(kind = envelope.kind(), "replying");
        if reply_tx.send(Reply::new(token, envelope)).await.is_err() {
            tracing::debug!("caller is gone; reply dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Exception};
    use crate::isolate::{exit, spawn_linked};
    use rand::Rng;
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    async fn forever() -> Result<(), Infallible> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn exits(reason: &'static str) -> Result<(), Infallible> {
        exit(ExitReason::custom(reason))
    }

    async fn panics(msg: &'static str) -> Result<(), Infallible> {
        panic!("{msg}")
    }

    #[tokio::test]
    async fn returns_task_value() {
        let value = invoke(|| async { Ok::<_, Infallible>(42) }, Timeout::Unbounded).await;
        assert_eq!(value.unwrap(), 42);
    }

    #[tokio::test]
    async fn reproduces_raised_exception() {
        let line = line!() + 2;
        let err = invoke(
            || async { Err::<(), _>(Exception::transient(json!({"conn": 3})).context("checkout")) },
            Timeout::millis(1_000),
        )
        .await
        .unwrap_err();

        assert!(!err.is_fatal());
        let InvokeError::Raised(e) = err else {
            panic!("expected a raised exception");
        };
        assert_eq!(e.class, ErrorKind::Transient);
        assert_eq!(e.payload, json!({"conn": 3}));
        assert_eq!(e.trace.file, file!());
        assert_eq!(e.trace.line, line);
        assert_eq!(e.trace.frames, vec!["checkout".to_string()]);
    }

    #[tokio::test]
    async fn worker_panic_is_an_exit() {
        let err = invoke(|| panics("worker blew up"), Timeout::Unbounded)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(
            err.exit_reason(),
            Some(ExitReason::Panic("worker blew up".into()))
        );
    }

    #[tokio::test]
    async fn explicit_exit_reason_is_reproduced() {
        let err = invoke(|| exits("pool_down"), Timeout::Unbounded)
            .await
            .unwrap_err();

        assert_eq!(err.exit_reason(), Some(ExitReason::custom("pool_down")));
    }

    #[tokio::test]
    async fn linked_crash_terminates_the_worker() {
        let err = invoke(
            || async {
                spawn_linked(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    exits("subordinate_down").await
                });
                forever().await
            },
            Timeout::millis(2_000),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.exit_reason(),
            Some(ExitReason::custom("subordinate_down"))
        );
    }

    #[tokio::test]
    async fn escalated_exit_keeps_reason_across_nesting() {
        let err = invoke(
            || async {
                let inner = invoke(|| exits("inner"), Timeout::Unbounded).await;
                inner.map_err(InvokeError::escalate)
            },
            Timeout::Unbounded,
        )
        .await
        .unwrap_err();

        assert_eq!(err.exit_reason(), Some(ExitReason::custom("inner")));
    }

    #[tokio::test]
    async fn timeout_tears_down_worker_and_subordinates() {
        let worker_dropped = Arc::new(AtomicBool::new(false));
        let sub_dropped = Arc::new(AtomicBool::new(false));
        let (w, s) = (worker_dropped.clone(), sub_dropped.clone());

        let started = Instant::now();
        let err = invoke(
            move || async move {
                let _flag = SetOnDrop(w);
                spawn_linked(async move {
                    let _flag = SetOnDrop(s);
                    std::future::pending::<()>().await;
                });
                forever().await
            },
            Timeout::millis(50),
        )
        .await
        .unwrap_err();

        let InvokeError::Timeout(after) = err else {
            panic!("expected a timeout");
        };
        assert_eq!(after, Duration::from_millis(50));
        assert!(started.elapsed() >= Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(worker_dropped.load(Ordering::SeqCst));
        assert!(sub_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropped_caller_tears_down_worker() {
        let worker_dropped = Arc::new(AtomicBool::new(false));
        let w = worker_dropped.clone();

        let caller = tokio::spawn(async move {
            invoke(
                move || async move {
                    let _flag = SetOnDrop(w);
                    forever().await
                },
                Timeout::Unbounded,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!worker_dropped.load(Ordering::SeqCst));

        caller.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(worker_dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stale_replies_are_discarded() {
        let ids = UlidGenerator::new(SystemClock);
        let (mine, other) = (ids.correlation_token(), ids.correlation_token());
        let (tx, mut rx) = mpsc::channel::<Reply<u32, ()>>(2);

        tx.send(Reply::new(other, Envelope::Success(1)))
            .await
            .unwrap();
        tx.send(Reply::new(mine, Envelope::Success(2)))
            .await
            .unwrap();

        assert_eq!(receive(mine, &mut rx).await, Envelope::Success(2));
    }

    #[tokio::test]
    async fn closed_mailbox_reads_as_killed() {
        let token = UlidGenerator::new(SystemClock).correlation_token();
        let (tx, mut rx) = mpsc::channel::<Reply<u32, ()>>(1);
        drop(tx);

        let envelope = receive(token, &mut rx).await;
        assert_eq!(envelope, Envelope::Exit(ExitReason::Killed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_invocations_get_their_own_value() {
        let invoker = Invoker::default();
        let mut callers = Vec::new();
        for i in 0..200_u32 {
            let invoker = invoker.clone();
            let delay = rand::thread_rng().gen_range(0..20);
            callers.push(tokio::spawn(async move {
                let value = invoker
                    .invoke(
                        move || async move {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            Ok::<_, Infallible>(i)
                        },
                        Timeout::millis(5_000),
                    )
                    .await;
                (i, value.unwrap())
            }));
        }

        for caller in callers {
            let (sent, got) = caller.await.unwrap();
            assert_eq!(sent, got);
        }
    }
}
