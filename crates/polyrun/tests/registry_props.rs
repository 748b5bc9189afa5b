//! The subscription registry against a plain model under random operation sequences.

use std::collections::BTreeMap;
use std::sync::Arc;

use polyrun::Connection;
use polyrun::ConnectionId;
use polyrun::EventManager;
use polyrun::MemoryEventManager;
use polyrun::Subscription;
use polyrun::transport;
use polyrun::transport::ConnectionSink;
use proptest::prelude::*;
use uuid::Uuid;

struct NullSink;

#[async_trait::async_trait]
impl ConnectionSink for NullSink {
    async fn push(&self, _message: &[u8]) -> transport::Result<()> {
        Ok(())
    }
}

const EVENTS: [&str; 2] = ["tick", "room"];
const LISTENERS: [&str; 3] = ["L1", "L2", "L3"];
const TARGETS: [Option<&str>; 3] = [None, Some("A"), Some("")];

#[derive(Clone, Debug)]
enum Op {
    Subscribe { conn: u128, event: usize, listener: usize, target: usize },
    Unsubscribe { event: usize, listener: usize },
    Drop { conn: u128 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u128..3, 0..EVENTS.len(), 0..LISTENERS.len(), 0..TARGETS.len())
            .prop_map(|(conn, event, listener, target)| Op::Subscribe { conn, event, listener, target }),
        2 => (0..EVENTS.len(), 0..LISTENERS.len()).prop_map(|(event, listener)| Op::Unsubscribe { event, listener }),
        1 => (0u128..3).prop_map(|conn| Op::Drop { conn }),
    ]
}

/// (connection, event, listener) -> target
type Model = BTreeMap<(u128, &'static str, &'static str), Option<&'static str>>;

fn connection(n: u128) -> Connection {
    Connection::with_id(ConnectionId(Uuid::from_u128(n + 1)), Arc::new(NullSink))
}

fn key(s: &Subscription) -> (u128, String, Option<String>) {
    (s.connection.id().0.as_u128() - 1, s.listener_id.clone(), s.target.clone())
}

proptest! {
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op(), 0..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let manager = MemoryEventManager::new();
        let mut model = Model::new();

        runtime.block_on(async {
            for op in &ops {
                match *op {
                    Op::Subscribe { conn, event, listener, target } => {
                        manager.subscribe(Subscription {
                            connection: connection(conn),
                            event: EVENTS[event].to_string(),
                            listener_id: LISTENERS[listener].to_string(),
                            payload: b"[]".to_vec(),
                            target: TARGETS[target].map(str::to_string),
                        }).await;
                        model.insert((conn, EVENTS[event], LISTENERS[listener]), TARGETS[target]);
                    }
                    Op::Unsubscribe { event, listener } => {
                        let before = model.len();
                        model.retain(|(_, e, l), _| !(*e == EVENTS[event] && *l == LISTENERS[listener]));
                        let removed = manager.unsubscribe(EVENTS[event], LISTENERS[listener]).await;
                        assert_eq!(removed, model.len() != before);
                    }
                    Op::Drop { conn } => {
                        manager.drop_client(&connection(conn)).await;
                        model.retain(|(c, _, _), _| *c != conn);
                    }
                }
            }

            assert_eq!(manager.len(), model.len());
            for event in EVENTS {
                for query in TARGETS {
                    let mut found: Vec<_> = manager.matching(event, query).await.iter().map(key).collect();
                    found.sort();
                    let mut expected: Vec<_> = model
                        .iter()
                        .filter(|((_, e, _), t)| *e == event && (query.is_none() || **t == query))
                        .map(|((c, _, l), t)| (*c, l.to_string(), t.map(str::to_string)))
                        .collect();
                    expected.sort();
                    assert_eq!(found, expected);
                }
            }
        });
    }
}
