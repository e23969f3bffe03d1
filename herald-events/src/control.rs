//! Campaign control signal.
//!
//! One `watch` channel per campaign carries its status. The engine is the only
//! writer; every wait in the dispatch loop holds a [`ControlHandle`] and ends
//! early as soon as the status stops being active.

use herald_core::CampaignStatus;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// How a controlled wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed.
    Elapsed,
    /// The campaign left the active states; carries the status seen.
    Interrupted(CampaignStatus),
}

impl WaitOutcome {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, Self::Elapsed)
    }
}

/// Writer side of the control signal.
#[derive(Debug)]
pub struct ControlSignal {
    tx: watch::Sender<CampaignStatus>,
}

impl ControlSignal {
    pub fn new(initial: CampaignStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new status. Waiters wake immediately.
    pub fn set(&self, status: CampaignStatus) {
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> CampaignStatus {
        *self.tx.borrow()
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader side of the control signal, held by every suspension point.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    rx: watch::Receiver<CampaignStatus>,
}

impl ControlHandle {
    pub fn status(&self) -> CampaignStatus {
        *self.rx.borrow()
    }

    /// The dispatch loop may keep going.
    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// The campaign reached a terminal state; in-flight work should stop.
    pub fn is_terminated(&self) -> bool {
        self.status().is_terminal()
    }

    /// Wait until `deadline`, checking the status at least every `poll`.
    ///
    /// Returns early with [`WaitOutcome::Interrupted`] once the campaign is
    /// paused or terminated.
    pub async fn wait_until(&mut self, deadline: Instant, poll: Duration) -> WaitOutcome {
        self.wait_while(deadline, poll, |status| status.is_active())
            .await
    }

    /// Sleep for `duration` unless the campaign terminates first.
    ///
    /// Pausing does not cut this short: it is used inside a delivery attempt,
    /// which always runs to completion unless aborted.
    pub async fn sleep_unless_terminated(&mut self, duration: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + duration;
        self.wait_while(deadline, poll, |status| !status.is_terminal())
            .await
            .is_elapsed()
    }

    async fn wait_while<F>(&mut self, deadline: Instant, poll: Duration, keep_going: F) -> WaitOutcome
    where
        F: Fn(CampaignStatus) -> bool,
    {
        let poll = poll.max(Duration::from_millis(1));
        loop {
            let status = self.status();
            if !keep_going(status) {
                return WaitOutcome::Interrupted(status);
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Elapsed;
            }
            let slice_end = deadline.min(now + poll);
            tokio::select! {
                _ = sleep_until(slice_end) => {}
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // Writer dropped: the engine is gone.
                        return WaitOutcome::Interrupted(CampaignStatus::Aborted);
                    }
                }
            }
        }
    }
}
