//! # RPC Server
//!
//! Stateless call dispatch plus the server half of the event protocol.
//!
//! ## Invariants
//! - **Fail Closed**: a server only builds when every declared method has exactly one
//!   handler and every handler names a declared method.
//! - **Errors Stay Inside**: decode failures, handler errors and handler panics all become
//!   replies; nothing escapes `handle`.
//! - **Push Failure Is Disconnection**: a connection that cannot be pushed to is dropped
//!   from the registry, never retried.

use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use polyschema::EventEndpoint;
use polywire::CallDecoder;
use polywire::ClientMessage;
use polywire::Codec;
use polywire::Reply;
use polywire::ServerMessage;
use polywire::Value;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::config::ServerConfig;
use crate::events::EventManager;
use crate::events::MemoryEventManager;
use crate::events::Subscription;
use crate::transport::Connection;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// A bound method implementation, called with the decoded arguments in declaration order.
pub type MethodHandler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Returned by a handler (through `anyhow`) to answer with a client-class failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequest(pub String);

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidRequest {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Declared methods with no handler, sorted.
    MissingHandlers(Vec<String>),
    /// A handler was bound to a name the schema does not declare.
    UndeclaredHandler(String),
    UnknownEvent(String),
    /// An emission supplied the wrong number of dispatch values.
    DispatchArity { event: String, expected: usize, found: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHandlers(names) => write!(f, "No handler for: {}", names.join(", ")),
            Self::UndeclaredHandler(name) => write!(f, "Handler bound to undeclared method: {}", name),
            Self::UnknownEvent(name) => write!(f, "Unknown event: {}", name),
            Self::DispatchArity { event, expected, found } => {
                write!(f, "Event '{}' takes {} dispatch value(s), got {}", event, expected, found)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One occurrence of an event, as described by its producer.
#[derive(Clone, Debug, Default)]
pub struct Emission {
    /// Listener ids that produced the change and must not be notified.
    pub participants: HashSet<String>,
    /// Ignored for events without a target parameter.
    pub target: Option<String>,
    /// Values for the event's dispatch parameters, in declaration order.
    pub dispatch: Vec<Value>,
}

impl Emission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants.extend(participants.into_iter().map(Into::into));
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn dispatch(mut self, values: Vec<Value>) -> Self {
        self.dispatch = values;
        self
    }
}

pub struct RpcServerBuilder {
    codec: Codec,
    config: ServerConfig,
    handlers: HashMap<String, MethodHandler>,
    duplicates: Vec<String>,
    events: Option<Arc<dyn EventManager>>,
}

impl RpcServerBuilder {
    /// Binds `handler` to `method`.
    pub fn handler<F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let bound: MethodHandler = Arc::new(move |args| Box::pin(handler(args)) as HandlerFuture);
        if self.handlers.insert(method.to_string(), bound).is_some() {
            self.duplicates.push(method.to_string());
        }
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default in-memory registry.
    pub fn event_manager(mut self, events: Arc<dyn EventManager>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<RpcServer> {
        let schema = self.codec.schema();
        if let Some(name) = self.handlers.keys().find(|name| schema.method(name).is_none()) {
            return Err(Error::UndeclaredHandler(name.clone()));
        }
        if let Some(name) = self.duplicates.first() {
            warn!(method = %name, "handler bound twice, keeping the last one");
        }

        let mut missing: Vec<String> = schema
            .methods()
            .iter()
            .filter(|m| !self.handlers.contains_key(&m.name))
            .map(|m| m.name.clone())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(Error::MissingHandlers(missing));
        }

        Ok(RpcServer {
            codec: self.codec,
            config: self.config,
            handlers: self.handlers,
            events: self.events.unwrap_or_else(|| Arc::new(MemoryEventManager::new())),
        })
    }
}

pub struct RpcServer {
    codec: Codec,
    config: ServerConfig,
    handlers: HashMap<String, MethodHandler>,
    events: Arc<dyn EventManager>,
}

impl RpcServer {
    pub fn builder(codec: Codec) -> RpcServerBuilder {
        RpcServerBuilder {
            codec,
            config: ServerConfig::default(),
            handlers: HashMap::new(),
            duplicates: Vec::new(),
            events: None,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventManager> {
        &self.events
    }

    // ------------------------------------------------------------------------
    //  CALLS
    // ------------------------------------------------------------------------

    /// Answers one framed request. Holds no state between calls.
    pub async fn handle(&self, request: &[u8]) -> Reply {
        if request.len() > self.config.max_request_bytes {
            return Reply::invalid_request(format!(
                "request of {} bytes exceeds the limit of {}",
                request.len(),
                self.config.max_request_bytes
            ));
        }

        let call = match CallDecoder::decode(request) {
            Ok(call) => call,
            Err(e) => return Reply::invalid_request(e.to_string()),
        };
        let Some(method) = self.codec.schema().method(call.method) else {
            debug!(method = call.method, "unknown method");
            return Reply::invalid_request(format!("unknown method '{}'", call.method));
        };
        let args = match call.decode_args(&self.codec, &method.parameter_types()) {
            Ok(args) => args,
            Err(e) => {
                debug!(method = %method.name, error = %e, "undecodable arguments");
                return Reply::invalid_request(format!("invalid arguments for '{}': {}", method.name, e));
            }
        };
        let Some(handler) = self.handlers.get(&method.name).cloned() else {
            return self.internal(&method.name, "no handler bound");
        };

        // The handler is invoked inside the guarded future so synchronous panics are caught too.
        let outcome = AssertUnwindSafe(async move { handler(args).await }).catch_unwind().await;
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                if let Some(InvalidRequest(message)) = e.downcast_ref::<InvalidRequest>() {
                    debug!(method = %method.name, %message, "handler rejected request");
                    return Reply::invalid_request(message.clone());
                }
                return self.internal(&method.name, &format!("{:#}", e));
            }
            Err(panic) => return self.internal(&method.name, &panic_message(panic.as_ref())),
        };

        match self.codec.encode(&method.return_type, &value) {
            Ok(body) => {
                debug!(method = %method.name, bytes = body.len(), "call handled");
                Reply::success(body)
            }
            Err(e) => self.internal(&method.name, &format!("handler returned an invalid value: {}", e)),
        }
    }

    fn internal(&self, method: &str, detail: &str) -> Reply {
        error!(method, error = detail, "handler failed");
        if self.config.expose_internal_errors {
            Reply::internal_error(detail)
        } else {
            Reply::internal_error("internal server error")
        }
    }

    // ------------------------------------------------------------------------
    //  EVENTS
    // ------------------------------------------------------------------------

    /// Applies one control frame received from `connection`.
    ///
    /// Rejected subscriptions are answered on the connection. An `Err` means the frame was
    /// not a control message; the transport must end the session.
    pub async fn accept_control(&self, bytes: &[u8], connection: &Connection) -> polywire::Result<()> {
        match ClientMessage::from_bytes(bytes)? {
            ClientMessage::Subscribe { event, listener_id, payload, target } => {
                let Some(endpoint) = self.codec.schema().event(&event) else {
                    self.reject(connection, listener_id, format!("unknown event '{}'", event)).await;
                    return Ok(());
                };

                let target = match (endpoint.has_target(), target) {
                    (true, None) => {
                        self.reject(connection, listener_id, format!("event '{}' requires a target", event)).await;
                        return Ok(());
                    }
                    (true, target) => target,
                    (false, Some(_)) => {
                        debug!(%event, listener = %listener_id, "discarding target for untargeted event");
                        None
                    }
                    (false, None) => None,
                };

                let types = endpoint.subscription_types();
                let args = match self.codec.decode_tuple(&types, &payload) {
                    Ok(args) => args,
                    Err(e) => {
                        self.reject(connection, listener_id, format!("invalid subscription to '{}': {}", event, e)).await;
                        return Ok(());
                    }
                };

                if let (Some(position), Some(given)) = (endpoint.target_position(), target.as_deref()) {
                    match self.codec.target_text(&types[position], &args[position]) {
                        Ok(derived) if derived == given => {}
                        Ok(derived) => {
                            let message =
                                format!("target '{}' does not match the target argument '{}'", given, derived);
                            self.reject(connection, listener_id, message).await;
                            return Ok(());
                        }
                        Err(e) => {
                            self.reject(connection, listener_id, format!("invalid target for '{}': {}", event, e)).await;
                            return Ok(());
                        }
                    }
                }

                debug!(%event, listener = %listener_id, connection = %connection.id(), "subscribe");
                self.events
                    .subscribe(Subscription { connection: connection.clone(), event, listener_id, payload, target })
                    .await;
            }
            ClientMessage::Unsubscribe { event, listener_id } => {
                let removed = self.events.unsubscribe(&event, &listener_id).await;
                debug!(%event, listener = %listener_id, removed, "unsubscribe");
            }
        }
        Ok(())
    }

    /// Forgets every subscription of a closed session.
    pub async fn close_connection(&self, connection: &Connection) {
        self.events.drop_client(connection).await;
        debug!(connection = %connection.id(), "connection closed");
    }

    /// Delivers one event occurrence to every matching subscriber outside the participants.
    ///
    /// Each subscriber's stored arguments are decoded, merged with the dispatch values,
    /// passed to `handler`, and the result is pushed as an `Emitted` message. A subscriber
    /// whose arguments no longer decode or whose handler fails is skipped. Returns the
    /// number of messages pushed.
    pub async fn emit<F, Fut>(&self, event: &str, emission: Emission, handler: F) -> Result<usize>
    where
        F: Fn(Vec<Value>) -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let endpoint = self
            .codec
            .schema()
            .event(event)
            .ok_or_else(|| Error::UnknownEvent(event.to_string()))?;

        let expected = endpoint.parameters.iter().filter(|p| p.is_dispatch).count();
        if emission.dispatch.len() != expected {
            return Err(Error::DispatchArity { event: event.to_string(), expected, found: emission.dispatch.len() });
        }

        let target = match emission.target {
            Some(target) if !endpoint.has_target() => {
                warn!(event, %target, "event declares no target, emitting to every subscriber");
                None
            }
            target => target,
        };

        let subscription_types = endpoint.subscription_types();
        let mut delivered = 0;
        for subscription in self.events.matching(event, target.as_deref()).await {
            if emission.participants.contains(&subscription.listener_id) {
                continue;
            }

            let wire_args = match self.codec.decode_tuple(&subscription_types, &subscription.payload) {
                Ok(args) => args,
                Err(e) => {
                    warn!(event, listener = %subscription.listener_id, error = %e, "stored subscription no longer decodes");
                    continue;
                }
            };
            let value = match handler(splice(endpoint, wire_args, &emission.dispatch)).await {
                Ok(value) => value,
                Err(e) => {
                    let detail = format!("{:#}", e);
                    error!(event, listener = %subscription.listener_id, error = %detail, "event handler failed");
                    continue;
                }
            };
            let payload = match self.codec.encode(&endpoint.return_type, &value) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(event, error = %e, "event handler returned an invalid value");
                    continue;
                }
            };

            let message = ServerMessage::Emitted { listener_id: subscription.listener_id.clone(), payload };
            if self.push(&subscription.connection, &message).await {
                delivered += 1;
            }
        }

        debug!(event, delivered, "emitted");
        Ok(delivered)
    }

    async fn reject(&self, connection: &Connection, listener_id: String, error: String) {
        warn!(listener = %listener_id, %error, "subscription rejected");
        let message = ServerMessage::SubscriptionError { listener_id: Some(listener_id), error };
        self.push(connection, &message).await;
    }

    /// Returns whether the message reached the connection.
    async fn push(&self, connection: &Connection, message: &ServerMessage) -> bool {
        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to encode control message");
                return false;
            }
        };
        match connection.push(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %connection.id(), error = %e, "push failed, dropping connection");
                self.events.drop_client(connection).await;
                false
            }
        }
    }
}

/// Interleaves subscriber arguments and dispatch values back into declaration order.
fn splice(endpoint: &EventEndpoint, wire_args: Vec<Value>, dispatch: &[Value]) -> Vec<Value> {
    let mut wire = wire_args.into_iter();
    let mut dispatch = dispatch.iter().cloned();
    endpoint
        .parameters
        .iter()
        .filter_map(|p| if p.is_dispatch { dispatch.next() } else { wire.next() })
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
