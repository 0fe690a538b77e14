//! In-process broker delivery and its use by step preparation

mod helpers;

use helpers::*;
use pipeline_engine::broker::{EventBroker, SubscribeSettings};
use pipeline_engine::coordination::{InMemoryCoordinator, PubSubAdapter};
use pipeline_engine::core::{Value, VariableSpec, VariableType};
use pipeline_engine::execution::{relay_events, ExecutionEvent, LifecycleEvent, StepPreparer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(1);

#[test]
fn test_publish_without_subscriber() {
    let broker: EventBroker<&str> = EventBroker::new();
    broker.publish("topic_1", "mock_data");
    assert!(!broker.is_closed());
}

#[tokio::test]
async fn test_subscriber_of_closed_broker_gets_nothing() {
    let broker: EventBroker<&str> = EventBroker::new();
    let mut sub = broker
        .subscribe("topic_1", "subscriber_1", SubscribeSettings::with_buffer_size(1))
        .unwrap();

    broker.close();
    broker.publish("topic_1", "mock_data");

    let received = tokio::time::timeout(WAIT, sub.recv()).await.unwrap();
    assert_eq!(received, None);
    assert!(sub.is_closed());
}

#[test]
fn test_subscribe_after_close_is_refused() {
    let broker: EventBroker<&str> = EventBroker::new();
    broker.close();
    broker.close();

    assert!(broker.is_closed());
    assert!(broker
        .subscribe("topic_1", "late", SubscribeSettings::default())
        .is_none());
}

#[tokio::test]
async fn test_only_open_subscribers_receive() {
    let broker: EventBroker<&str> = EventBroker::new();
    let mut first = broker
        .subscribe("topic_1", "subscriber_1", SubscribeSettings::with_buffer_size(1))
        .unwrap();
    let mut second = broker
        .subscribe("topic_1", "subscriber_2", SubscribeSettings::with_buffer_size(1))
        .unwrap();

    second.close();
    broker.publish("topic_1", "mock_data");
    broker.close();

    let first_got = tokio::time::timeout(WAIT, first.recv()).await.unwrap();
    let second_got = tokio::time::timeout(WAIT, second.recv()).await.unwrap();
    assert_eq!(first_got, Some("mock_data"));
    assert_eq!(second_got, None);

    first.close();
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let broker: EventBroker<u32> = EventBroker::new();
    let mut a = broker.subscribe("a", "s", SubscribeSettings::default()).unwrap();
    let mut b = broker.subscribe("b", "s", SubscribeSettings::default()).unwrap();

    broker.publish("a", 1);
    assert_eq!(a.try_recv(), Some(1));
    assert_eq!(b.try_recv(), None);
}

#[tokio::test]
async fn test_preparation_events_reach_remote_observers() {
    let broker = EventBroker::new();
    let run_id = Uuid::new_v4();
    let preparer = StepPreparer::new("project-1", run_id, broker.clone());

    let coordinator = Arc::new(InMemoryCoordinator::default());
    let mut remote = coordinator.subscribe("runs").await.unwrap();

    let local = broker
        .subscribe(&preparer.topic(), "relay", SubscribeSettings::default())
        .unwrap();
    let adapter: Arc<dyn PubSubAdapter> = coordinator.clone();
    let relay = tokio::spawn(async move { relay_events(local, adapter, "runs").await });

    let ctx = fixture_context();
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "status".to_string(),
        VariableSpec::new("{{.Step.another.Data.StatusCode}}", VariableType::Int),
    );
    inputs.insert(
        "token".to_string(),
        VariableSpec::new("{{.Req.Header.unknown}}", VariableType::String).required("anonymous"),
    );
    preparer.prepare("next", &inputs, &ctx).unwrap();
    assert_eq!(ctx.get_step("next").var.get("token"), Some(&Value::from("anonymous")));

    let payload = tokio::time::timeout(WAIT, remote.recv()).await.unwrap().unwrap();
    let event: LifecycleEvent = serde_json::from_slice(&payload).unwrap();
    assert_eq!(event.run_id, run_id);
    assert_eq!(event.project_id, "project-1");
    match event.event {
        ExecutionEvent::StepPrepared { step_id, variables } => {
            assert_eq!(step_id, "next");
            assert_eq!(variables.get("status"), Some(&Value::Int(204)));
        }
        other => panic!("unexpected event {:?}", other),
    }

    broker.close();
    let forwarded = relay.await.unwrap().unwrap();
    assert_eq!(forwarded, 1);
}

#[tokio::test]
async fn test_failed_preparation_is_announced() {
    let broker = EventBroker::new();
    let preparer = StepPreparer::new("project-1", Uuid::new_v4(), broker.clone());
    let mut sub = broker
        .subscribe(&preparer.topic(), "observer", SubscribeSettings::default())
        .unwrap();

    let ctx = fixture_context();
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "count".to_string(),
        VariableSpec::new("{{.Req.Header.header_1}}", VariableType::Int),
    );
    assert!(preparer.prepare("next", &inputs, &ctx).is_err());
    assert!(ctx.get_step("next").var.is_empty());

    let event = sub.try_recv().unwrap();
    match event.event {
        ExecutionEvent::StepPreparationFailed { step_id, variable, .. } => {
            assert_eq!(step_id, "next");
            assert_eq!(variable, "count");
        }
        other => panic!("unexpected event {:?}", other),
    }
}
