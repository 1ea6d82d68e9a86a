//! Local completion tracking for commands the cube never acknowledges.
//!
//! Timed moves, light patterns and melodies are fire-and-forget on the
//! wire. Their completion is modelled with a timer started after the
//! write. Issuing a new command on the same characteristic supersedes the
//! pending one: its timer is cancelled and its completion resolves right
//! away.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use log::debug;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::lock;

/// Resolves when a timed command has run its course or was superseded.
/// Never fails.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion {
    rx: Option<oneshot::Receiver<()>>,
}

impl Completion {
    /// A completion that is already resolved.
    pub fn ready() -> Self {
        Self { rx: None }
    }

    pub fn is_ready(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(());
        };
        // A dropped sender also counts as done.
        match Pin::new(rx).poll(cx) {
            Poll::Ready(_) => {
                self.rx = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct Pending {
    generation: u64,
    timer: JoinHandle<()>,
    done: oneshot::Sender<()>,
}

impl Pending {
    fn finish(self) {
        self.timer.abort();
        let _ = self.done.send(());
    }
}

#[derive(Default)]
struct State {
    generation: u64,
    pending: Option<Pending>,
}

/// At most one pending timed operation per characteristic.
pub struct TimedController {
    name: &'static str,
    state: Arc<Mutex<State>>,
}

impl TimedController {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Resolve the pending operation, if any, without waiting for its timer.
    pub fn supersede(&self) {
        let pending = lock(&self.state).pending.take();
        if let Some(pending) = pending {
            debug!("{}: superseding pending operation #{}", self.name, pending.generation);
            pending.finish();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Supersede, perform `write`, then track `duration`. A failed write
    /// is returned as is and leaves nothing pending.
    pub async fn issue<W>(&self, duration: Duration, write: W) -> Result<Completion>
    where
        W: Future<Output = Result<()>>,
    {
        self.supersede();
        write.await?;

        if duration.is_zero() {
            return Ok(Completion::ready());
        }

        let (done, rx) = oneshot::channel();
        let mut state = lock(&self.state);
        // Another command may have landed while the write was in flight.
        if let Some(previous) = state.pending.take() {
            previous.finish();
        }
        state.generation += 1;
        let generation = state.generation;

        let shared = Arc::clone(&self.state);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let expired = {
                let mut state = lock(&shared);
                match &state.pending {
                    Some(p) if p.generation == generation => state.pending.take(),
                    _ => None,
                }
            };
            if let Some(expired) = expired {
                let _ = expired.done.send(());
            }
        });

        state.pending = Some(Pending {
            generation,
            timer,
            done,
        });
        Ok(Completion { rx: Some(rx) })
    }
}

impl Drop for TimedController {
    fn drop(&mut self) {
        self.supersede();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CubeError;
    use futures::FutureExt;

    async fn ok() -> Result<()> {
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_completes_immediately() {
        let timed = TimedController::new("test");
        let completion = timed.issue(Duration::ZERO, ok()).await.unwrap();
        assert!(completion.is_ready());
        assert!(!timed.is_pending());
        completion.await;
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_duration() {
        let timed = TimedController::new("test");
        let mut completion = timed.issue(Duration::from_millis(500), ok()).await.unwrap();
        assert!(timed.is_pending());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!((&mut completion).now_or_never().is_none());

        tokio::time::sleep(Duration::from_millis(2)).await;
        completion.await;
        assert!(!timed.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_command_supersedes_pending_one() {
        let timed = TimedController::new("test");
        let first = timed.issue(Duration::from_secs(10), ok()).await.unwrap();
        let mut second = timed.issue(Duration::from_secs(10), ok()).await.unwrap();

        // The first resolves without any time passing.
        first.now_or_never().expect("superseded completion resolves");
        assert!((&mut second).now_or_never().is_none());
        assert!(timed.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_installs_nothing() {
        let timed = TimedController::new("test");
        let pending = timed.issue(Duration::from_secs(1), ok()).await.unwrap();
        let err = timed
            .issue(Duration::from_secs(1), async {
                Err(CubeError::Write("link lost".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CubeError::Write(_)));
        assert!(!timed.is_pending());
        pending.now_or_never().expect("previous operation was superseded");
    }
}
