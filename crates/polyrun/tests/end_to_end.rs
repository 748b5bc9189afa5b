//! Client and server wired together over the loopback transport.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use polyrun::ClientConfig;
use polyrun::Connection;
use polyrun::Emission;
use polyrun::MemoryEventManager;
use polyrun::RpcClient;
use polyrun::RpcServer;
use polyrun::client;
use polyrun::loopback;
use polyrun::transport;
use polyrun::transport::ConnectionSink;
use polyrun::transport::EventSender;
use polyschema::Builtin;
use polyschema::Schema;
use polyschema::TypeReference;
use polywire::ClientMessage;
use polywire::Codec;
use polywire::Value;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SCHEMA: &str = r#"{
  "name": "Lobby",
  "methods": [
    {
      "name": "add",
      "parameters": [
        { "name": "a", "type": { "name": "i32" } },
        { "name": "b", "type": { "name": "i32" } }
      ],
      "returnType": { "name": "i32" }
    },
    { "name": "boom", "parameters": [], "returnType": { "name": "void" } },
    { "name": "slow", "parameters": [], "returnType": { "name": "void" } }
  ],
  "events": [
    { "name": "tick", "parameters": [], "returnType": { "name": "i32" } },
    {
      "name": "room",
      "parameters": [
        { "isDispatch": true, "value": { "name": "text", "type": { "name": "string" } } },
        { "isTarget": true, "value": { "name": "room", "type": { "name": "string" } } }
      ],
      "returnType": { "name": "RoomUpdate" }
    }
  ],
  "models": [
    {
      "type": "struct",
      "name": "RoomUpdate",
      "properties": [
        { "name": "room", "type": { "name": "string" } },
        { "name": "text", "type": { "name": "string" } }
      ]
    }
  ]
}"#;

struct Harness {
    server: Arc<RpcServer>,
    events: Arc<MemoryEventManager>,
}

fn harness() -> Harness {
    let codec = Codec::json(Arc::new(Schema::from_json(SCHEMA).unwrap()));
    let events = Arc::new(MemoryEventManager::new());
    let server = RpcServer::builder(codec)
        .handler("add", |args: Vec<Value>| async move {
            let sum = args.iter().filter_map(Value::as_i32).sum::<i32>();
            anyhow::Ok(Value::I32(sum))
        })
        .handler("boom", |_args: Vec<Value>| async move {
            Err::<Value, _>(anyhow::anyhow!("disk on fire"))
        })
        .handler("slow", |_args: Vec<Value>| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok(Value::Void)
        })
        .event_manager(events.clone())
        .build()
        .unwrap();
    Harness { server: Arc::new(server), events }
}

impl Harness {
    fn connect(&self) -> loopback::LoopbackSession {
        loopback::connect(self.server.clone(), ClientConfig::default())
    }

    async fn emit_tick(&self, value: i32, emission: Emission) -> usize {
        self.server
            .emit("tick", emission, move |_| async move { anyhow::Ok(Value::I32(value)) })
            .await
            .unwrap()
    }

    async fn emit_room(&self, room: &str, text: &str) -> usize {
        let emission = Emission::new().target(room).dispatch(vec![Value::string(text)]);
        self.server
            .emit("room", emission, |args| async move {
                anyhow::Ok(Value::structure("RoomUpdate", vec![("room", args[1].clone()), ("text", args[0].clone())]))
            })
            .await
            .unwrap()
    }
}

/// Waits until `check` holds, polling briefly.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Drains a stream on a task so the test can observe it without holding it.
fn start(stream: polyrun::SubscriptionStream) -> (mpsc::UnboundedReceiver<client::Result<Value>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            if tx.send(item).is_err() {
                break;
            }
        }
    });
    (rx, task)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<client::Result<Value>>) -> client::Result<Value> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no value within two seconds")
        .expect("stream ended")
}

async fn quiet(rx: &mut mpsc::UnboundedReceiver<client::Result<Value>>) -> bool {
    tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err()
}

// ============================================================================
// Calls
// ============================================================================

#[tokio::test]
async fn test_add() {
    let h = harness();
    let session = h.connect();

    let sum = session.client().call_method("add", vec![2.into(), 3.into()]).await.unwrap();
    assert_eq!(sum, Value::I32(5));

    let i32_type = TypeReference::builtin(Builtin::I32);
    let sum = session
        .client()
        .call("add", vec![40.into(), 2.into()], &[i32_type.clone(), i32_type.clone()], &i32_type)
        .await
        .unwrap();
    assert_eq!(sum, Value::I32(42));
}

#[tokio::test]
async fn test_unknown_method_is_invalid_request() {
    let h = harness();
    let session = h.connect();

    let err = session
        .client()
        .call("bogus", vec![], &[], &TypeReference::builtin(Builtin::Void))
        .await
        .unwrap_err();
    assert!(matches!(err, client::Error::InvalidRequest(ref msg) if msg.contains("bogus")), "{:?}", err);

    let err = session.client().call_method("bogus", vec![]).await.unwrap_err();
    assert_eq!(err, client::Error::UnknownMethod("bogus".into()));
}

#[tokio::test]
async fn test_handler_failure_keeps_session_usable() {
    let h = harness();
    let session = h.connect();

    let err = session.client().call_method("boom", vec![]).await.unwrap_err();
    assert!(matches!(err, client::Error::Internal(_)), "{:?}", err);

    let sum = session.client().call_method("add", vec![1.into(), 1.into()]).await.unwrap();
    assert_eq!(sum, Value::I32(2));
}

#[tokio::test]
async fn test_call_timeout_is_transport_error() {
    let h = harness();
    let config = ClientConfig { call_timeout: Duration::from_millis(20) };
    let session = loopback::connect(h.server.clone(), config);

    let err = session.client().call_method("slow", vec![]).await.unwrap_err();
    assert_eq!(err, client::Error::Transport(transport::Error::Timeout));
}

#[tokio::test]
async fn test_wrong_arguments_fail_locally() {
    let h = harness();
    let session = h.connect();

    let err = session.client().call_method("add", vec![1.into()]).await.unwrap_err();
    assert!(matches!(err, client::Error::Wire(_)), "{:?}", err);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_tick_reaches_subscriber_once() {
    let h = harness();
    let session = h.connect();

    let subscription = session.client().subscribe_as("tick", "L1", vec![], None).unwrap();
    assert_eq!(subscription.listener_id(), "L1");
    let (mut rx, _task) = start(subscription.stream());
    eventually("subscription", || h.events.len() == 1).await;

    assert_eq!(h.emit_tick(42, Emission::new()).await, 1);
    assert_eq!(next(&mut rx).await.unwrap(), Value::I32(42));
    assert!(quiet(&mut rx).await);
}

#[tokio::test]
async fn test_ticks_arrive_in_emit_order() {
    let h = harness();
    let session = h.connect();

    let (mut rx, _task) = start(session.client().subscribe("tick", vec![], None).unwrap().stream());
    eventually("subscription", || h.events.len() == 1).await;

    for tick in 1..=20 {
        assert_eq!(h.emit_tick(tick, Emission::new()).await, 1);
    }
    let mut received = Vec::new();
    for _ in 1..=20 {
        received.push(next(&mut rx).await.unwrap());
    }
    assert_eq!(received, (1..=20).map(Value::I32).collect::<Vec<_>>());
    assert!(quiet(&mut rx).await);
}

#[tokio::test]
async fn test_targeted_emit_reaches_only_that_target() {
    let h = harness();
    let alice = h.connect();
    let bob = h.connect();

    let (mut in_a, _a) = start(alice.client().subscribe("room", vec!["A".into()], Some("A".into())).unwrap().stream());
    let (mut in_b, _b) = start(bob.client().subscribe("room", vec!["B".into()], Some("B".into())).unwrap().stream());
    eventually("both subscriptions", || h.events.len() == 2).await;

    assert_eq!(h.emit_room("A", "hello").await, 1);

    let update = next(&mut in_a).await.unwrap();
    assert_eq!(update.field("room"), Some(&Value::string("A")));
    assert_eq!(update.field("text"), Some(&Value::string("hello")));
    assert!(quiet(&mut in_b).await);
}

#[tokio::test]
async fn test_target_follows_target_argument() {
    let h = harness();
    let session = h.connect();

    let derived = session.client().subscribe("room", vec!["A".into()], None).unwrap();
    assert_eq!(derived.target(), Some("A"));
    let (mut in_a, _a) = start(derived.stream());
    eventually("room subscription", || h.events.len() == 1).await;
    assert_eq!(h.emit_room("A", "hi").await, 1);
    assert!(next(&mut in_a).await.is_ok());

    let err = session.client().subscribe("room", vec!["A".into()], Some("B".into())).err().unwrap();
    assert!(matches!(err, client::Error::Subscription(ref msg) if msg.contains("'B'")), "{:?}", err);

    let err = session.client().subscribe("nope", vec![], None).err().unwrap();
    assert_eq!(err, client::Error::UnknownEvent("nope".into()));
}

#[tokio::test]
async fn test_participant_is_not_notified() {
    let h = harness();
    let session = h.connect();

    let producer = session.client().subscribe("tick", vec![], None).unwrap();
    let watcher = session.client().subscribe("tick", vec![], None).unwrap();
    let (mut from_producer, _p) = start(producer.stream());
    let (mut from_watcher, _w) = start(watcher.stream());
    eventually("both subscriptions", || h.events.len() == 2).await;

    let delivered = h.emit_tick(7, Emission::new().participants([producer.listener_id()])).await;
    assert_eq!(delivered, 1);
    assert_eq!(next(&mut from_watcher).await.unwrap(), Value::I32(7));
    assert!(quiet(&mut from_producer).await);
}

#[tokio::test]
async fn test_nothing_sent_until_polled() {
    let h = harness();
    let session = h.connect();

    let subscription = session.client().subscribe("tick", vec![], None).unwrap();
    let stream = subscription.stream();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.events.is_empty());
    assert_eq!(session.client().events().listener_count(), 0);

    // Dropping a stream that never started sends nothing either.
    drop(stream);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.events.is_empty());
}

#[tokio::test]
async fn test_cancel_unsubscribes_then_restarts() {
    let h = harness();
    let session = h.connect();
    let subscription = session.client().subscribe("tick", vec![], None).unwrap();

    let (mut first, task) = start(subscription.stream());
    eventually("first run", || h.events.len() == 1).await;
    assert_eq!(h.emit_tick(1, Emission::new()).await, 1);
    assert_eq!(next(&mut first).await.unwrap(), Value::I32(1));

    task.abort();
    eventually("unsubscribe", || h.events.is_empty()).await;
    eventually("callback removal", || session.client().events().listener_count() == 0).await;
    assert_eq!(h.emit_tick(2, Emission::new()).await, 0);

    let (mut second, _task) = start(subscription.stream());
    eventually("second run", || h.events.len() == 1).await;
    assert_eq!(h.emit_tick(3, Emission::new()).await, 1);
    assert_eq!(next(&mut second).await.unwrap(), Value::I32(3));
}

/// Control channel that holds every frame until the gate opens, then hands it to the server.
struct GatedSender {
    gate: Arc<RwLock<()>>,
    server: Arc<RpcServer>,
    connection: Connection,
    sent: Arc<std::sync::Mutex<Vec<&'static str>>>,
}

#[async_trait::async_trait]
impl EventSender for GatedSender {
    async fn send(&self, message: &[u8]) -> transport::Result<()> {
        let _open = self.gate.read().await;
        let kind = match ClientMessage::from_bytes(message) {
            Ok(ClientMessage::Subscribe { .. }) => "subscribe",
            Ok(ClientMessage::Unsubscribe { .. }) => "unsubscribe",
            Err(_) => "unreadable",
        };
        self.sent.lock().unwrap().push(kind);
        self.server
            .accept_control(message, &self.connection)
            .await
            .map_err(|e| transport::Error::ConnectionLost(e.to_string()))
    }
}

struct ChannelSink(mpsc::UnboundedSender<Vec<u8>>);

#[async_trait::async_trait]
impl ConnectionSink for ChannelSink {
    async fn push(&self, message: &[u8]) -> transport::Result<()> {
        self.0
            .send(message.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("client gone".into()))
    }
}

fn gated_client(h: &Harness, gate: Arc<RwLock<()>>) -> (Arc<RpcClient>, Arc<std::sync::Mutex<Vec<&'static str>>>) {
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sender = GatedSender {
        gate,
        server: h.server.clone(),
        connection: Connection::new(Arc::new(ChannelSink(push_tx))),
        sent: sent.clone(),
    };
    let client = Arc::new(RpcClient::new(
        h.server.codec().clone(),
        Arc::new(loopback::LoopbackCall::new(h.server.clone())),
        Arc::new(sender),
        ClientConfig::default(),
    ));
    let events = client.events().clone();
    tokio::spawn(async move {
        while let Some(bytes) = push_rx.recv().await {
            events.handle_message(&bytes).unwrap();
        }
    });
    (client, sent)
}

#[tokio::test]
async fn test_restart_while_subscribe_pending() {
    let h = harness();
    let gate = Arc::new(RwLock::new(()));
    let closed = gate.clone().write_owned().await;
    let (client, sent) = gated_client(&h, gate);
    let subscription = client.subscribe("tick", vec![], None).unwrap();

    let mut first = subscription.stream();
    assert!(futures::poll!(first.next()).is_pending());
    drop(first);
    let mut second = subscription.stream();
    assert!(futures::poll!(second.next()).is_pending());
    assert!(sent.lock().unwrap().is_empty());

    drop(closed);
    let (mut second, _task) = start(second);
    eventually("three control frames", || sent.lock().unwrap().len() == 3).await;
    assert_eq!(*sent.lock().unwrap(), vec!["subscribe", "unsubscribe", "subscribe"]);
    eventually("second run registered", || h.events.len() == 1).await;
    assert_eq!(client.events().listener_count(), 1);

    assert_eq!(h.emit_tick(4, Emission::new()).await, 1);
    assert_eq!(next(&mut second).await.unwrap(), Value::I32(4));
}

#[test]
fn test_drop_outside_runtime_defers_unsubscribe() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let h = harness();
    let (client, sent) = runtime.block_on(async { gated_client(&h, Arc::new(RwLock::new(()))) });
    let subscription = client.subscribe("tick", vec![], None).unwrap();

    let mut first = subscription.stream();
    runtime.block_on(async { assert!(futures::poll!(first.next()).is_pending()) });
    assert_eq!(h.events.len(), 1);

    // No runtime here: the callback goes now, the unsubscribe waits in the outbox.
    drop(first);
    assert_eq!(client.events().listener_count(), 0);
    assert_eq!(*sent.lock().unwrap(), vec!["subscribe"]);

    runtime.block_on(async {
        let (mut second, _task) = start(subscription.stream());
        eventually("queued unsubscribe then subscribe", || sent.lock().unwrap().len() == 3).await;
        assert_eq!(*sent.lock().unwrap(), vec!["subscribe", "unsubscribe", "subscribe"]);
        eventually("second run registered", || h.events.len() == 1).await;
        assert_eq!(h.emit_tick(6, Emission::new()).await, 1);
        assert_eq!(next(&mut second).await.unwrap(), Value::I32(6));
    });
}

#[tokio::test]
async fn test_rejected_subscription_fails_stream() {
    let h = harness();
    // A client built against a schema revision the server does not have.
    let newer = Schema::from_json(&SCHEMA.replace(r#""name": "tick""#, r#""name": "tock""#)).unwrap();
    let session = loopback::connect_with(h.server.clone(), Codec::json(Arc::new(newer)), ClientConfig::default());

    let mut stream = session.client().subscribe("tock", vec![], None).unwrap().stream();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, client::Error::Subscription(ref msg) if msg.contains("tock")), "{:?}", err);
    assert!(stream.next().await.is_none());
    assert!(h.events.is_empty());
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_close_drops_subscriptions() {
    let h = harness();
    let leaving = h.connect();
    let staying = h.connect();

    let (_rx1, _t1) = start(leaving.client().subscribe("tick", vec![], None).unwrap().stream());
    let (mut rx2, _t2) = start(staying.client().subscribe("tick", vec![], None).unwrap().stream());
    eventually("subscriptions", || h.events.len() == 2).await;

    leaving.close().await;
    assert_eq!(h.events.len(), 1);
    assert_eq!(h.emit_tick(5, Emission::new()).await, 1);
    assert_eq!(next(&mut rx2).await.unwrap(), Value::I32(5));
}

#[tokio::test]
async fn test_protocol_violation_ends_session() {
    let h = harness();
    let session = h.connect();

    let subscription = session.client().subscribe("tick", vec![], None).unwrap();
    let (mut rx, _task) = start(subscription.stream());
    eventually("subscription", || h.events.len() == 1).await;

    session.send_raw(b"add:[1,2]").await.unwrap();
    eventually("session end", || !session.is_open()).await;
    eventually("registry cleanup", || h.events.is_empty()).await;

    let err = session.send_raw(b"{}").await;
    assert!(matches!(err, Err(transport::Error::ConnectionLost(_))));

    // The stream reports the lost session once, then ends.
    let err = next(&mut rx).await.unwrap_err();
    assert!(matches!(err, client::Error::Transport(transport::Error::ConnectionLost(_))), "{:?}", err);
    let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert!(ended.is_none());
    assert!(session.client().events().is_closed());
    assert_eq!(session.client().events().listener_count(), 0);

    // Runs started afterwards fail straight away.
    let mut late = subscription.stream();
    let err = late.next().await.unwrap().unwrap_err();
    assert!(matches!(err, client::Error::Transport(transport::Error::ConnectionLost(_))), "{:?}", err);
    assert!(late.next().await.is_none());
}

#[tokio::test]
async fn test_dead_connection_dropped_on_push() {
    let h = harness();
    let dead = h.connect();
    let live = h.connect();

    let (_d, _dt) = start(dead.client().subscribe("tick", vec![], None).unwrap().stream());
    let (mut l, _lt) = start(live.client().subscribe("tick", vec![], None).unwrap().stream());
    eventually("subscriptions", || h.events.len() == 2).await;

    dead.sever();
    assert_eq!(h.emit_tick(8, Emission::new()).await, 1);
    assert_eq!(h.events.len(), 1);
    assert_eq!(next(&mut l).await.unwrap(), Value::I32(8));
}
