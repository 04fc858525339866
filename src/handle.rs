use super::{
    errors::PoolError,
    result::TaskResult,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// A queued unit of work. The closure owns the promise side of the task's
/// oneshot channel; dropping it unresolved breaks the promise.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle on a submitted task.
///
/// The result arrives exactly once. Dropping the handle does not cancel the
/// task; it only discards the result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<TaskResult<T>>,
    ready: Option<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<TaskResult<T>>) -> Self {
        Self {
            receiver,
            ready: None,
        }
    }

    /// Non-blocking readiness check. Once this returns `true`, `wait` returns
    /// without blocking.
    pub fn is_ready(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.ready = Some(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.ready = Some(Err(PoolError::Lost));
                true
            }
        }
    }

    /// Block the calling thread until the task resolves.
    ///
    /// Returns the task's value, `Panicked` if the task panicked, or `Lost`
    /// if the task was discarded before it could run. Must not be called from
    /// an async context; `.await` the handle instead.
    pub fn wait(mut self) -> TaskResult<T> {
        if let Some(result) = self.ready.take() {
            return result;
        }
        self.receiver.blocking_recv().unwrap_or(Err(PoolError::Lost))
    }
}

// Sound: neither field is structurally pinned by poll().
impl<T> Unpin for TaskHandle<T> {}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(result) = this.ready.take() {
            return Poll::Ready(result);
        }
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(PoolError::Lost))),
            Poll::Pending => Poll::Pending,
        }
    }
}
