//! In-process transports.
//!
//! Connects an `RpcClient` to an `RpcServer` in the same process: calls go straight to
//! `RpcServer::handle`, and control frames travel over a pair of unbounded channels with
//! one pump task per direction. When either pump stops, the client's event streams end
//! with a connection error.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use polywire::Codec;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::client::RpcClient;
use crate::config::ClientConfig;
use crate::server::RpcServer;
use crate::transport;
use crate::transport::CallTransport;
use crate::transport::Connection;
use crate::transport::ConnectionSink;
use crate::transport::EventSender;
use crate::transport::Response;

/// Answers calls by handing the request to the server directly.
pub struct LoopbackCall {
    server: Arc<RpcServer>,
}

impl LoopbackCall {
    pub fn new(server: Arc<RpcServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl CallTransport for LoopbackCall {
    async fn call(&self, request: &[u8]) -> transport::Result<Response> {
        Ok(self.server.handle(request).await.into())
    }
}

struct LoopbackSink {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    open: Arc<AtomicBool>,
}

impl LoopbackSink {
    fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

#[async_trait]
impl ConnectionSink for LoopbackSink {
    async fn push(&self, message: &[u8]) -> transport::Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(transport::Error::ConnectionLost("session closed".into()));
        }
        let tx = self.tx.lock().ok().and_then(|tx| tx.clone());
        match tx {
            Some(tx) => tx
                .send(message.to_vec())
                .map_err(|_| transport::Error::ConnectionLost("client gone".into())),
            None => Err(transport::Error::ConnectionLost("session closed".into())),
        }
    }
}

struct LoopbackSender {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LoopbackSender {
    fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

#[async_trait]
impl EventSender for LoopbackSender {
    async fn send(&self, message: &[u8]) -> transport::Result<()> {
        let tx = self.tx.lock().ok().and_then(|tx| tx.clone());
        match tx {
            Some(tx) => tx
                .send(message.to_vec())
                .map_err(|_| transport::Error::ConnectionLost("server gone".into())),
            None => Err(transport::Error::ConnectionLost("session closed".into())),
        }
    }
}

/// One client session against an in-process server.
pub struct LoopbackSession {
    client: Arc<RpcClient>,
    connection: Connection,
    sender: Arc<LoopbackSender>,
    open: Arc<AtomicBool>,
    server_pump: Option<JoinHandle<()>>,
    client_pump: Option<JoinHandle<()>>,
}

/// Opens a session. Must be called inside a tokio runtime.
pub fn connect(server: Arc<RpcServer>, config: ClientConfig) -> LoopbackSession {
    let codec = server.codec().clone();
    connect_with(server, codec, config)
}

/// Opens a session whose client encodes with its own codec, as a client built against
/// another revision of the schema would.
pub fn connect_with(server: Arc<RpcServer>, codec: Codec, config: ClientConfig) -> LoopbackSession {
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let open = Arc::new(AtomicBool::new(true));

    let sink = Arc::new(LoopbackSink { tx: Mutex::new(Some(push_tx)), open: open.clone() });
    let connection = Connection::new(sink.clone());
    let sender = Arc::new(LoopbackSender { tx: Mutex::new(Some(control_tx)) });
    let client = Arc::new(RpcClient::new(
        codec,
        Arc::new(LoopbackCall::new(server.clone())),
        sender.clone(),
        config,
    ));

    let server_pump = {
        let connection = connection.clone();
        let open = open.clone();
        tokio::spawn(async move {
            while let Some(bytes) = control_rx.recv().await {
                if let Err(e) = server.accept_control(&bytes, &connection).await {
                    warn!(connection = %connection.id(), error = %e, "protocol violation, ending session");
                    break;
                }
            }
            open.store(false, Ordering::SeqCst);
            sink.close();
            server.close_connection(&connection).await;
        })
    };

    let client_pump = {
        let events = client.events().clone();
        tokio::spawn(async move {
            while let Some(bytes) = push_rx.recv().await {
                if let Err(e) = events.handle_message(&bytes) {
                    warn!(error = %e, "unreadable control frame from server");
                    break;
                }
            }
            events.close("session ended");
        })
    };

    debug!(connection = %connection.id(), "loopback session opened");
    LoopbackSession {
        client,
        connection,
        sender,
        open,
        server_pump: Some(server_pump),
        client_pump: Some(client_pump),
    }
}

impl LoopbackSession {
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// The server's view of this session.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Sends a raw frame on the control channel, bypassing the client.
    pub async fn send_raw(&self, bytes: &[u8]) -> transport::Result<()> {
        self.sender.send(bytes).await
    }

    /// Makes every further push to this session fail without the server being told,
    /// like a socket that died silently.
    pub fn sever(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Ends the session and waits until the server has forgotten it and every event
    /// stream of the client has ended.
    pub async fn close(mut self) {
        self.sender.close();
        for (name, pump) in [("server", self.server_pump.take()), ("client", self.client_pump.take())] {
            let Some(pump) = pump else { continue };
            if let Err(e) = pump.await {
                warn!(pump = name, error = %e, "pump failed");
            }
        }
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.sender.close();
        if let Some(pump) = self.client_pump.take() {
            pump.abort();
        }
        self.client.events().close("session dropped");
    }
}
