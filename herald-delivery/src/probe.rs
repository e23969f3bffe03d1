//! Validity probe and sent confirmation.
//!
//! Both wait in slices of at most one poll interval and check the control
//! signal between slices, so an abort ends them within one interval.

use crate::strategies::bounded;
use crate::DeliveryChannel;
use herald_events::ControlHandle;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Result of watching for the invalid-recipient indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Valid,
    Invalid,
    Aborted,
}

/// Result of waiting for the sent indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentVerdict {
    Confirmed,
    /// The window passed without the indicator and without an error
    Unconfirmed,
    Aborted,
}

/// Decides whether the remote system rejected a recipient.
#[derive(Debug, Clone, Copy)]
pub struct ValidityProbe {
    poll: Duration,
    /// Bound on one probe call; defaults to the poll interval
    call_timeout: Duration,
}

impl ValidityProbe {
    pub fn new(poll: Duration) -> Self {
        let poll = poll.max(Duration::from_millis(1));
        Self {
            poll,
            call_timeout: poll,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout.max(Duration::from_millis(1));
        self
    }

    /// Watch for the invalid indicator for `window`.
    ///
    /// Probe errors are treated as "not seen": the indicator is the only
    /// evidence of invalidity.
    pub async fn check(
        &self,
        channel: &dyn DeliveryChannel,
        identifier: &str,
        window: Duration,
        control: &mut ControlHandle,
    ) -> ProbeVerdict {
        let deadline = Instant::now() + window;
        loop {
            if control.is_terminated() {
                return ProbeVerdict::Aborted;
            }
            let now = Instant::now();
            if now >= deadline {
                return ProbeVerdict::Valid;
            }
            let slice = self.poll.min(deadline - now);
            match bounded(
                self.call_timeout,
                "validity probe",
                channel.probe_validity(identifier, slice),
            )
            .await
            {
                Ok(true) => return ProbeVerdict::Invalid,
                Ok(false) => {}
                Err(e) => debug!(identifier = identifier, error = %e, "Validity probe error"),
            }
            if !self.rest(slice, now, control).await {
                return ProbeVerdict::Aborted;
            }
        }
    }

    /// Wait up to `window` for the sent indicator.
    pub async fn confirm_sent(
        &self,
        channel: &dyn DeliveryChannel,
        window: Duration,
        control: &mut ControlHandle,
    ) -> SentVerdict {
        let deadline = Instant::now() + window;
        loop {
            if control.is_terminated() {
                return SentVerdict::Aborted;
            }
            let now = Instant::now();
            if now >= deadline {
                return SentVerdict::Unconfirmed;
            }
            let slice = self.poll.min(deadline - now);
            match bounded(self.call_timeout, "sent probe", channel.probe_sent(slice)).await {
                Ok(true) => return SentVerdict::Confirmed,
                Ok(false) => {}
                Err(e) => debug!(error = %e, "Sent probe error"),
            }
            if !self.rest(slice, now, control).await {
                return SentVerdict::Aborted;
            }
        }
    }

    /// Sleep out whatever the channel did not spend of the slice.
    async fn rest(&self, slice: Duration, started: Instant, control: &mut ControlHandle) -> bool {
        let spent = started.elapsed();
        if spent >= slice {
            return true;
        }
        control.sleep_unless_terminated(slice - spent, self.poll).await
    }
}
