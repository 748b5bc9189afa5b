//! # Client Event Streams
//!
//! The client mirror of the subscription registry: a table of local callbacks keyed by
//! listener id, fed by the control channel, and cold streams that own one
//! subscribe/unsubscribe cycle each.
//!
//! ## Invariants
//! - **Cold Start**: nothing is sent until a stream is first polled.
//! - **Unsubscribe Before Removal**: a cancelled stream sends `Unsubscribe`, then removes
//!   its callback. Deliveries arriving after the removal are dropped with a warning.
//! - **Ordered Control**: each subscription queues its control messages in a FIFO outbox
//!   at the moment they are issued, including the `Unsubscribe` of a dropped run, so a
//!   restart's `Subscribe` always reaches the server after it.
//! - **Generations**: every run registers under a fresh generation, and removal only
//!   succeeds for the generation that registered, so a late cancellation never removes
//!   a newer run's callback.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use dashmap::DashMap;
use futures::FutureExt;
use futures::Stream;
use futures::future::BoxFuture;
use polyschema::TypeReference;
use polywire::ClientMessage;
use polywire::Codec;
use polywire::ServerMessage;
use polywire::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::client::Error;
use crate::client::Result;
use crate::transport;
use crate::transport::EventSender;

enum Delivery {
    Payload(Vec<u8>),
    Failed(String),
    Closed(String),
}

struct Listener {
    generation: u64,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Routes control messages from the server to local streams.
pub struct EventClient {
    sender: Arc<dyn EventSender>,
    listeners: DashMap<String, Listener>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl EventClient {
    pub fn new(sender: Arc<dyn EventSender>) -> Self {
        Self {
            sender,
            listeners: DashMap::new(),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Handles one message read from the control channel.
    ///
    /// Only a frame that is not a server control message is an error.
    pub fn handle_message(&self, bytes: &[u8]) -> polywire::Result<()> {
        match ServerMessage::from_bytes(bytes)? {
            ServerMessage::Emitted { listener_id, payload } => {
                self.deliver(&listener_id, Delivery::Payload(payload));
            }
            ServerMessage::SubscriptionError { listener_id: Some(listener_id), error } => {
                self.deliver(&listener_id, Delivery::Failed(error));
            }
            ServerMessage::SubscriptionError { listener_id: None, error } => {
                warn!(%error, "subscription error for every listener");
                for listener in self.listeners.iter() {
                    let _ = listener.tx.send(Delivery::Failed(error.clone()));
                }
            }
        }
        Ok(())
    }

    /// Ends every registered stream with a connection error once the session is gone.
    ///
    /// Streams started afterwards fail immediately.
    pub fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(reason, listeners = self.listeners.len(), "closing event client");
        for listener in self.listeners.iter() {
            let _ = listener.tx.send(Delivery::Closed(reason.to_string()));
        }
        self.listeners.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of streams currently registered.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn deliver(&self, listener_id: &str, delivery: Delivery) {
        match self.listeners.get(listener_id) {
            // A send error means the stream is being dropped; its cancellation will follow.
            Some(listener) => {
                let _ = listener.tx.send(delivery);
            }
            None => warn!(listener = listener_id, "message for unknown listener, dropping"),
        }
    }

    fn register(&self, listener_id: &str) -> (u64, mpsc::UnboundedReceiver<Delivery>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if self.listeners.insert(listener_id.to_string(), Listener { generation, tx }).is_some() {
            debug!(listener = listener_id, "callback replaced by a newer stream");
        }
        (generation, rx)
    }

    fn unregister(&self, listener_id: &str, generation: u64) -> bool {
        self.listeners
            .remove_if(listener_id, |_, listener| listener.generation == generation)
            .is_some()
    }
}

enum Completion {
    /// Report the send result to the run that issued it.
    Notify(oneshot::Sender<transport::Result<()>>),
    /// Remove the callback of a cancelled run once its unsubscribe is out.
    Unregister(u64),
}

struct Outgoing {
    bytes: Vec<u8>,
    done: Completion,
}

struct SubscriptionInner {
    client: Arc<EventClient>,
    codec: Codec,
    event: String,
    listener_id: String,
    payload: Vec<u8>,
    target: Option<String>,
    return_type: TypeReference,
    /// Control messages not yet handed to the sender, oldest first.
    outbox: std::sync::Mutex<VecDeque<Outgoing>>,
    /// Held by the one task sending from the outbox.
    draining: Mutex<()>,
}

impl SubscriptionInner {
    fn subscribe_message(&self) -> polywire::Result<Vec<u8>> {
        ClientMessage::Subscribe {
            event: self.event.clone(),
            listener_id: self.listener_id.clone(),
            payload: self.payload.clone(),
            target: self.target.clone(),
        }
        .to_bytes()
    }

    fn unsubscribe_message(&self) -> polywire::Result<Vec<u8>> {
        ClientMessage::Unsubscribe { event: self.event.clone(), listener_id: self.listener_id.clone() }.to_bytes()
    }

    fn enqueue(&self, bytes: Vec<u8>, done: Completion) {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner()).push_back(Outgoing { bytes, done });
    }

    /// Sends queued messages in order until the outbox is empty.
    ///
    /// An entry leaves the queue only after its send finished, so a drain cancelled
    /// mid-send leaves it for the next one.
    async fn drain(self: Arc<Self>) {
        let _guard = self.draining.lock().await;
        loop {
            let front = {
                let outbox = self.outbox.lock().unwrap_or_else(|e| e.into_inner());
                outbox.front().map(|outgoing| outgoing.bytes.clone())
            };
            let Some(bytes) = front else {
                return;
            };
            let result = self.client.sender.send(&bytes).await;
            let Some(sent) = self.outbox.lock().unwrap_or_else(|e| e.into_inner()).pop_front() else {
                return;
            };
            match sent.done {
                Completion::Notify(tx) => {
                    let _ = tx.send(result);
                }
                Completion::Unregister(generation) => {
                    if let Err(e) = result {
                        warn!(listener = %self.listener_id, error = %e, "failed to send unsubscribe");
                    }
                    self.client.unregister(&self.listener_id, generation);
                    debug!(event = %self.event, listener = %self.listener_id, "unsubscribed");
                }
            }
        }
    }

    fn send_ordered(self: &Arc<Self>, bytes: Vec<u8>) -> BoxFuture<'static, transport::Result<()>> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(bytes, Completion::Notify(tx));
        let inner = self.clone();
        Box::pin(async move {
            inner.drain().await;
            rx.await.unwrap_or_else(|_| Err(transport::Error::ConnectionLost("subscribe was not sent".into())))
        })
    }

    fn cancel(self: &Arc<Self>, generation: u64) {
        let bytes = match self.unsubscribe_message() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(listener = %self.listener_id, error = %e, "failed to encode unsubscribe");
                self.client.unregister(&self.listener_id, generation);
                return;
            }
        };
        // Queued before returning, so a restart's subscribe lines up behind it.
        self.enqueue(bytes, Completion::Unregister(generation));

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.clone().drain());
            }
            Err(_) => {
                warn!(listener = %self.listener_id, "no async runtime, unsubscribe stays queued for the next run");
                self.client.unregister(&self.listener_id, generation);
            }
        }
    }
}

/// A subscription request that has not necessarily been sent.
///
/// Every call to `stream` starts an independent subscribe/unsubscribe cycle under the
/// same listener id.
#[derive(Clone)]
pub struct EventSubscription {
    inner: Arc<SubscriptionInner>,
}

impl EventSubscription {
    pub(crate) fn new(
        client: Arc<EventClient>,
        codec: Codec,
        event: String,
        listener_id: String,
        payload: Vec<u8>,
        target: Option<String>,
        return_type: TypeReference,
    ) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                client,
                codec,
                event,
                listener_id,
                payload,
                target,
                return_type,
                outbox: std::sync::Mutex::new(VecDeque::new()),
                draining: Mutex::new(()),
            }),
        }
    }

    pub fn event(&self) -> &str {
        &self.inner.event
    }

    pub fn listener_id(&self) -> &str {
        &self.inner.listener_id
    }

    pub fn target(&self) -> Option<&str> {
        self.inner.target.as_deref()
    }

    pub fn stream(&self) -> SubscriptionStream {
        SubscriptionStream { inner: self.inner.clone(), state: State::Idle }
    }
}

enum State {
    Idle,
    Subscribing {
        generation: u64,
        rx: mpsc::UnboundedReceiver<Delivery>,
        send: BoxFuture<'static, transport::Result<()>>,
    },
    Active {
        generation: u64,
        rx: mpsc::UnboundedReceiver<Delivery>,
    },
    Done,
}

/// Decoded event payloads for one run of a subscription.
///
/// Ends after yielding a subscription or transport error, including the connection error
/// raised when the session closes. Dropping it cancels the run: the `Unsubscribe` is queued
/// at once and sent from a task on the current tokio runtime. Dropped outside a runtime,
/// the callback is removed right away and the `Unsubscribe` is only sent when another
/// stream of the same subscription is polled.
pub struct SubscriptionStream {
    inner: Arc<SubscriptionInner>,
    state: State,
}

impl SubscriptionStream {
    pub fn listener_id(&self) -> &str {
        &self.inner.listener_id
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, State::Done) {
                State::Idle => {
                    if this.inner.client.is_closed() {
                        let lost = transport::Error::ConnectionLost("session closed".into());
                        return Poll::Ready(Some(Err(Error::Transport(lost))));
                    }
                    let bytes = match this.inner.subscribe_message() {
                        Ok(bytes) => bytes,
                        Err(e) => return Poll::Ready(Some(Err(Error::Wire(e)))),
                    };
                    let (generation, rx) = this.inner.client.register(&this.inner.listener_id);
                    let send = this.inner.send_ordered(bytes);
                    this.state = State::Subscribing { generation, rx, send };
                }
                State::Subscribing { generation, rx, mut send } => match send.poll_unpin(cx) {
                    Poll::Pending => {
                        this.state = State::Subscribing { generation, rx, send };
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(())) => {
                        debug!(event = %this.inner.event, listener = %this.inner.listener_id, "subscribed");
                        this.state = State::Active { generation, rx };
                    }
                    Poll::Ready(Err(e)) => {
                        this.inner.client.unregister(&this.inner.listener_id, generation);
                        return Poll::Ready(Some(Err(Error::Transport(e))));
                    }
                },
                State::Active { generation, mut rx } => match rx.poll_recv(cx) {
                    Poll::Pending => {
                        this.state = State::Active { generation, rx };
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(Delivery::Payload(bytes))) => {
                        this.state = State::Active { generation, rx };
                        let decoded = this.inner.codec.decode(&this.inner.return_type, &bytes).map_err(Error::Wire);
                        return Poll::Ready(Some(decoded));
                    }
                    Poll::Ready(Some(Delivery::Failed(error))) => {
                        // The server holds no subscription for a rejected run.
                        this.inner.client.unregister(&this.inner.listener_id, generation);
                        return Poll::Ready(Some(Err(Error::Subscription(error))));
                    }
                    Poll::Ready(Some(Delivery::Closed(reason))) => {
                        let lost = transport::Error::ConnectionLost(reason);
                        return Poll::Ready(Some(Err(Error::Transport(lost))));
                    }
                    Poll::Ready(None) => return Poll::Ready(None),
                },
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if let State::Subscribing { generation, .. } | State::Active { generation, .. } = self.state {
            self.inner.cancel(generation);
        }
    }
}
