//! Cross-task signaling shared by the node services: the commit-height
//! tracker, the shutdown token threaded through `Context`, and the bounded
//! retry schedule.

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use creep::Context;
use derive_more::Display;
use futures::channel::oneshot;
use futures::future::{self, Either};
use futures::pin_mut;
use futures_timer::Delay;
use parking_lot::Mutex;

#[derive(Debug, Display)]
#[display(fmt = "wait for height deadline exceeded")]
pub struct DeadlineExceeded;

impl Error for DeadlineExceeded {}

struct TrackerInner {
    top:     AtomicU64,
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

/// Publishes the last committed block height and wakes every waiter on each
/// commit. Clones observe the same underlying counter.
#[derive(Clone)]
pub struct BlockTracker {
    inner: Arc<TrackerInner>,
}

impl BlockTracker {
    pub fn new(initial_height: u64) -> Self {
        BlockTracker {
            inner: Arc::new(TrackerInner {
                top:     AtomicU64::new(initial_height),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn current(&self) -> u64 {
        self.inner.top.load(Ordering::SeqCst)
    }

    /// Bumps the counter by one and wakes every waiter. Returns the new top.
    pub fn increment(&self) -> u64 {
        let new_top = self.inner.top.fetch_add(1, Ordering::SeqCst) + 1;
        for waiter in self.inner.waiters.lock().drain(..) {
            let _ = waiter.send(());
        }
        new_top
    }

    /// Monotonic: an advance below the current top is ignored.
    pub fn advance(&self, height: u64) {
        let mut top = self.inner.top.load(Ordering::SeqCst);
        while height > top {
            match self.inner.top.compare_exchange(
                top,
                height,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    for waiter in self.inner.waiters.lock().drain(..) {
                        let _ = waiter.send(());
                    }
                    return;
                }
                Err(current) => top = current,
            }
        }
    }

    pub async fn wait_for_height(&self, height: u64) {
        loop {
            if self.current() >= height {
                return;
            }

            let rx = {
                let mut waiters = self.inner.waiters.lock();
                // re-check under the lock, advance may have raced us
                if self.current() >= height {
                    return;
                }
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            };

            let _ = rx.await;
        }
    }

    pub async fn wait_for_height_within(
        &self,
        height: u64,
        deadline: Duration,
    ) -> Result<(), DeadlineExceeded> {
        let wait = self.wait_for_height(height);
        pin_mut!(wait);

        match future::select(wait, Delay::new(deadline)).await {
            Either::Left(_) => Ok(()),
            Either::Right(_) => Err(DeadlineExceeded),
        }
    }
}

#[derive(Debug)]
struct ShutdownInner {
    cancelled: AtomicBool,
    waiters:   Mutex<Vec<oneshot::Sender<()>>>,
}

/// Observable at every blocking call of a service. Cancellation is one-way.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownInner>,
}

pub struct ShutdownHandle {
    inner: Arc<ShutdownInner>,
}

pub fn shutdown_pair() -> (ShutdownHandle, ShutdownToken) {
    let inner = Arc::new(ShutdownInner {
        cancelled: AtomicBool::new(false),
        waiters:   Mutex::new(Vec::new()),
    });

    (
        ShutdownHandle {
            inner: Arc::clone(&inner),
        },
        ShutdownToken { inner },
    )
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        for waiter in self.inner.waiters.lock().drain(..) {
            let _ = waiter.send(());
        }
    }
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let rx = {
            let mut waiters = self.inner.waiters.lock();
            if self.is_cancelled() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            rx
        };

        let _ = rx.await;
    }
}

const SHUTDOWN_TOKEN_KEY: &str = "shutdown_token";

/// Puts the service shutdown token on `Context` so leaf calls can observe
/// cancellation without extra plumbing.
pub trait CancelContext {
    fn with_shutdown(&self, token: ShutdownToken) -> Self;

    fn shutdown_token(&self) -> Option<&ShutdownToken>;

    fn is_cancelled(&self) -> bool;
}

impl CancelContext for Context {
    fn with_shutdown(&self, token: ShutdownToken) -> Self {
        self.with_value::<ShutdownToken>(SHUTDOWN_TOKEN_KEY, token)
    }

    fn shutdown_token(&self) -> Option<&ShutdownToken> {
        self.get::<ShutdownToken>(SHUTDOWN_TOKEN_KEY)
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown_token()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }
}

/// Resolves when the context's shutdown token fires. A context without a
/// token never resolves.
pub async fn context_cancelled(ctx: &Context) {
    match ctx.shutdown_token() {
        Some(token) => token.cancelled().await,
        None => future::pending::<()>().await,
    }
}

/// Exponential backoff doubled up to a ceiling, bounded in attempts.
pub struct Backoff {
    next:      Duration,
    ceiling:   Duration,
    remaining: u32,
}

impl Backoff {
    pub fn bounded(base: Duration, ceiling: Duration, max_retries: u32) -> Self {
        Backoff {
            next: base,
            ceiling,
            remaining: max_retries,
        }
    }

    /// `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next;
        self.next = std::cmp::min(self.next * 2, self.ceiling);
        Some(delay)
    }
}
