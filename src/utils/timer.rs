//! Small scheduling primitives: cancellable delayed tasks and a monotonic
//! generation counter for invalidating stale async results.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a task scheduled with [`schedule`].
pub struct TaskHandle {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the task if its delay has not elapsed yet. A task that already
    /// started running its body is left to finish.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Run `task` after `delay` unless cancelled first.
pub fn schedule<F>(delay: Duration, task: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => return,
        }
        task.await;
    });

    TaskHandle {
        cancel_token,
        handle,
    }
}

/// Monotonic counter; every `advance` invalidates tickets issued before it.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Bump the counter and return a ticket for the new value.
    pub fn advance(&self) -> GenerationTicket {
        let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationTicket {
            generation: self.clone(),
            value,
        }
    }

    /// Ticket for the current value without bumping it.
    pub fn ticket(&self) -> GenerationTicket {
        GenerationTicket {
            generation: self.clone(),
            value: self.current(),
        }
    }
}

/// Captured at dispatch time, checked at completion time.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    generation: Generation,
    value: u64,
}

impl GenerationTicket {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_current(&self) -> bool {
        self.generation.current() == self.value
    }
}
