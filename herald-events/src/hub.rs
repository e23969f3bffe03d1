//! Progress broadcasting.

use herald_core::{ProgressEvent, DEFAULT_PROGRESS_CAPACITY};
use tokio::sync::broadcast;
use tracing::debug;

/// Anything that accepts progress events.
///
/// Emitting never blocks and never fails; an event nobody listens to is
/// dropped.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Broadcast hub for progress events.
///
/// Subscribers that fall behind by more than the channel capacity miss the
/// oldest events (lagged) rather than slowing the dispatch loop down.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send an event to all current subscribers.
    pub fn broadcast(&self, event: ProgressEvent) {
        let kind = event.kind.as_str();
        let campaign_id = event.campaign_id.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(
                    campaign_id = %campaign_id,
                    kind = kind,
                    receivers = receivers,
                    "Broadcast progress"
                );
            }
            Err(_) => {
                debug!(campaign_id = %campaign_id, kind = kind, "No receivers for progress");
            }
        }
    }

    /// Receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_CAPACITY)
    }
}

impl ProgressSink for ProgressHub {
    fn emit(&self, event: ProgressEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Campaign, CampaignRequest, Contact, ProgressKind};

    fn campaign() -> Campaign {
        Campaign::prepare(CampaignRequest::new(vec![Contact::new("15550000001")], "hi"))
            .expect("valid request")
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let hub = ProgressHub::new(16);
        let mut rx = hub.subscribe();
        let campaign = campaign();

        hub.emit(ProgressEvent::from_campaign(ProgressKind::Started, &campaign));
        hub.emit(ProgressEvent::from_campaign(ProgressKind::Sending, &campaign));

        assert_eq!(rx.recv().await.unwrap().kind, ProgressKind::Started);
        assert_eq!(rx.recv().await.unwrap().kind, ProgressKind::Sending);
    }

    #[test]
    fn test_broadcast_without_receivers_is_harmless() {
        let hub = ProgressHub::new(4);
        assert_eq!(hub.receiver_count(), 0);
        hub.broadcast(ProgressEvent::from_campaign(ProgressKind::Started, &campaign()));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let hub = ProgressHub::new(2);
        let mut rx = hub.subscribe();
        let campaign = campaign();
        for _ in 0..5 {
            hub.emit(ProgressEvent::from_campaign(ProgressKind::Sending, &campaign));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
