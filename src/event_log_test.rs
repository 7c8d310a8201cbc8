//! Tests for the event log.

use crate::error::EventLogError;
use crate::event_log::{Channel, Event, EventLog, InMemoryChannel, RedisChannel, start_cursor};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn ids_are_fixed_width_and_increasing() {
  let log = EventLog::in_memory();
  let ids: Vec<String> = (0..50).map(|i| log.append(json!({ "n": i })).unwrap()).collect();
  assert!(ids.iter().all(|id| id.len() == 32));
  assert!(ids.windows(2).all(|w| w[0] < w[1]));
  assert_eq!(log.len(), 50);
  assert_eq!(log.get(&ids[3]), Some(json!({ "n": 3 })));
}

#[tokio::test]
async fn subscribe_replays_only_newer_entries() {
  let log = EventLog::in_memory();
  let first = log.append(json!("a")).unwrap();
  log.append(json!("b")).unwrap();
  log.append(json!("c")).unwrap();

  let mut sub = log.subscribe(Some(&first));
  let b = sub.next().await.unwrap().unwrap();
  let c = sub.next().await.unwrap().unwrap();
  assert_eq!(b.data, json!("b"));
  assert_eq!(c.data, json!("c"));
}

#[tokio::test]
async fn subscribe_tails_live_appends_after_replay() {
  let log = Arc::new(EventLog::in_memory());
  log.append(json!(1)).unwrap();
  let mut sub = log.subscribe(None);
  log.append(json!(2)).unwrap();

  let replayed = sub.next().await.unwrap().unwrap();
  assert_eq!(replayed.data, json!(1));
  let live = tokio::time::timeout(Duration::from_secs(1), sub.next())
    .await
    .unwrap()
    .unwrap()
    .unwrap();
  assert_eq!(live.data, json!(2));
}

#[tokio::test]
async fn live_entries_already_replayed_are_skipped() {
  let log = EventLog::in_memory();
  let mut sub = log.subscribe(None);
  let id = log.append(json!("x")).unwrap();
  let got = sub.next().await.unwrap().unwrap();
  assert_eq!(got.id, id);
  log.append(json!("y")).unwrap();
  let got = sub.next().await.unwrap().unwrap();
  assert_eq!(got.data, json!("y"));
}

#[test]
fn persisted_log_reloads_and_keeps_ordering() {
  let dir = tempfile::tempdir().unwrap();
  let first = {
    let log = EventLog::open(dir.path(), Arc::new(InMemoryChannel::default())).unwrap();
    log.append(json!({ "name": "count" })).unwrap();
    log.append(json!({ "name": "stream" })).unwrap()
  };
  let log = EventLog::open(dir.path(), Arc::new(InMemoryChannel::default())).unwrap();
  assert_eq!(log.len(), 2);
  assert_eq!(log.get(&first), Some(json!({ "name": "stream" })));
  let next = log.append(json!(null)).unwrap();
  assert!(next > first);
}

#[tokio::test]
async fn in_memory_channel_publishes_to_subscribers() {
  let channel = InMemoryChannel::new(4);
  let mut sub = channel.subscribe();
  let event = Event {
    id: "0".repeat(32),
    data: json!("hello"),
  };
  channel.publish(&event).unwrap();
  assert_eq!(sub.next().await.unwrap().unwrap(), event);
}

#[test]
fn redis_channel_reports_unreachable_server() {
  let channel = RedisChannel::open("redis://127.0.0.1:1/", "featureflow").unwrap();
  let event = Event {
    id: "1".to_string(),
    data: json!(1),
  };
  assert!(matches!(channel.publish(&event), Err(EventLogError::Redis(_))));
}

#[test]
fn redis_cursor_starts_just_before_server_time() {
  assert_eq!(start_cursor(1_700_000_000, 123_456), "1700000000122-0");
  assert_eq!(start_cursor(0, 0), "0-0");
}

#[tokio::test]
async fn redis_subscription_reports_unreachable_server() {
  let channel = RedisChannel::open("redis://127.0.0.1:1/", "featureflow").unwrap();
  let mut events = channel.subscribe();
  assert!(matches!(events.next().await, Some(Err(EventLogError::Redis(_)))));
  assert!(events.next().await.is_none());
}
