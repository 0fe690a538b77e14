//! Forwarding of local lifecycle events to other processes

use crate::{
    broker::Subscription,
    coordination::{CoordinationError, PubSubAdapter},
    execution::events::LifecycleEvent,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Forward every event from `subscription` to `topic` on `adapter`
///
/// Runs until the subscription ends, then returns the number of events
/// forwarded. Events that fail to serialize are skipped; adapter errors stop
/// the relay and are returned unchanged.
pub async fn relay_events(
    mut subscription: Subscription<LifecycleEvent>,
    adapter: Arc<dyn PubSubAdapter>,
    topic: &str,
) -> Result<usize, CoordinationError> {
    let mut forwarded = 0;

    while let Some(event) = subscription.recv().await {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping event {} that failed to serialize: {}", event.id, e);
                continue;
            }
        };
        adapter.publish(topic, payload).await?;
        debug!("Relayed event {} of step {} to '{}'", event.id, event.event.step_id(), topic);
        forwarded += 1;
    }

    debug!("Relay to '{}' finished after {} event(s)", topic, forwarded);
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{EventBroker, SubscribeSettings};
    use crate::coordination::InMemoryCoordinator;
    use crate::execution::events::ExecutionEvent;
    use crate::core::ValueMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_relay_forwards_until_broker_closes() {
        let broker = EventBroker::new();
        let coordinator = Arc::new(InMemoryCoordinator::default());
        let mut remote = coordinator.subscribe("remote").await.unwrap();

        let local = broker
            .subscribe("run:x", "relay", SubscribeSettings::default())
            .unwrap();
        let adapter: Arc<dyn PubSubAdapter> = coordinator.clone();
        let handle = tokio::spawn(async move { relay_events(local, adapter, "remote").await });

        let event = LifecycleEvent::new(
            "p",
            Uuid::nil(),
            ExecutionEvent::StepPrepared {
                step_id: "s".to_string(),
                variables: ValueMap::new(),
            },
        );
        broker.publish("run:x", event.clone());

        let payload = remote.recv().await.unwrap();
        let received: LifecycleEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(received, event);

        broker.close();
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
}
