//! # RPC Client
//!
//! Frames calls, sends them over a `CallTransport`, and maps the reply status onto
//! distinguishable errors. Subscriptions are handed out as cold `EventSubscription`s
//! backed by the shared `EventClient`.

use std::sync::Arc;

use polyschema::TypeReference;
use polywire::Codec;
use polywire::ReplyStatus;
use polywire::Rpc;
use polywire::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::events::EventClient;
use crate::events::EventSubscription;
use crate::transport;
use crate::transport::CallTransport;
use crate::transport::EventSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The server rejected the request (status 400). Carries the server's message.
    InvalidRequest(String),
    /// The handler failed on the server (status 500).
    Internal(String),
    /// The exchange failed or the server answered outside the protocol.
    Transport(transport::Error),
    /// A value could not be encoded or a reply could not be decoded locally.
    Wire(polywire::Error),
    /// The schema declares no method by that name.
    UnknownMethod(String),
    /// The schema declares no event by that name.
    UnknownEvent(String),
    /// The server refused a subscription.
    Subscription(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal server error: {}", msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::UnknownMethod(name) => write!(f, "Unknown method: {}", name),
            Self::UnknownEvent(name) => write!(f, "Unknown event: {}", name),
            Self::Subscription(msg) => write!(f, "Subscription failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<polywire::Error> for Error {
    fn from(e: polywire::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct RpcClient {
    codec: Codec,
    transport: Arc<dyn CallTransport>,
    events: Arc<EventClient>,
    config: ClientConfig,
}

impl RpcClient {
    pub fn new(
        codec: Codec,
        transport: Arc<dyn CallTransport>,
        events: Arc<dyn EventSender>,
        config: ClientConfig,
    ) -> Self {
        Self {
            codec,
            transport,
            events: Arc::new(EventClient::new(events)),
            config,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The callback table fed by the control channel; transports pass every inbound
    /// control frame to `EventClient::handle_message`.
    pub fn events(&self) -> &Arc<EventClient> {
        &self.events
    }

    /// Encodes the call, sends it, and awaits the response with the configured timeout.
    pub async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        arg_types: &[TypeReference],
        return_type: &TypeReference,
    ) -> Result<Value> {
        let request = Rpc::new(method, args)?.to_bytes(&self.codec, arg_types)?;

        let response = match tokio::time::timeout(self.config.call_timeout, self.transport.call(&request)).await {
            Ok(response) => response?,
            Err(_) => return Err(Error::Transport(transport::Error::Timeout)),
        };
        debug!(method, code = response.code, bytes = response.body.len(), "call answered");

        match ReplyStatus::from_code(response.code) {
            Some(ReplyStatus::Success) => Ok(self.codec.decode(return_type, &response.body)?),
            Some(ReplyStatus::InvalidRequest) => Err(Error::InvalidRequest(message(&response.body))),
            Some(ReplyStatus::InternalError) => Err(Error::Internal(message(&response.body))),
            None => Err(Error::Transport(transport::Error::UnexpectedStatus(response.code))),
        }
    }

    /// Like `call`, with the signature looked up in the schema.
    pub async fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let schema = self.codec.schema().clone();
        let endpoint = schema.method(method).ok_or_else(|| Error::UnknownMethod(method.to_string()))?;
        self.call(method, args, &endpoint.parameter_types(), &endpoint.return_type).await
    }

    /// Prepares a subscription; nothing is sent until one of its streams is polled.
    ///
    /// `args` are the event's non-dispatch parameters in declaration order. For events with
    /// a target parameter the target is the text of that argument; an explicit `target`
    /// must agree with it. Events without one ignore `target`.
    pub fn subscribe(&self, event: &str, args: Vec<Value>, target: Option<String>) -> Result<EventSubscription> {
        self.subscribe_as(event, Uuid::new_v4().to_string(), args, target)
    }

    /// Like `subscribe`, under a listener id chosen by the caller.
    pub fn subscribe_as(
        &self,
        event: &str,
        listener_id: impl Into<String>,
        args: Vec<Value>,
        target: Option<String>,
    ) -> Result<EventSubscription> {
        let endpoint = self
            .codec
            .schema()
            .event(event)
            .ok_or_else(|| Error::UnknownEvent(event.to_string()))?;
        let types = endpoint.subscription_types();
        let payload = self.codec.encode_tuple(&types, &args)?;

        let target = match endpoint.target_position() {
            Some(position) => {
                let derived = self.codec.target_text(&types[position], &args[position])?;
                match target {
                    Some(given) if given != derived => {
                        return Err(Error::Subscription(format!(
                            "target '{}' does not match the target argument '{}'",
                            given, derived
                        )));
                    }
                    _ => Some(derived),
                }
            }
            None => {
                if target.is_some() {
                    debug!(event, "event declares no target, ignoring the one given");
                }
                None
            }
        };

        Ok(EventSubscription::new(
            self.events.clone(),
            self.codec.clone(),
            event.to_string(),
            listener_id.into(),
            payload,
            target,
            endpoint.return_type.clone(),
        ))
    }
}

fn message(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
