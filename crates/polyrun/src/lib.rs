//! # polyrun
//!
//! The runtime half of polyrpc: a stateless call dispatcher, the server-side
//! subscription registry, client event streams, and the transport seams they plug into.

pub mod client;
pub mod config;
pub mod events;
pub mod loopback;
pub mod server;
pub mod telemetry;
pub mod transport;


pub use client::RpcClient;
pub use config::ClientConfig;
pub use config::ServerConfig;
pub use events::EventClient;
pub use events::EventManager;
pub use events::EventSubscription;
pub use events::MemoryEventManager;
pub use events::Subscription;
pub use events::SubscriptionStream;
pub use loopback::LoopbackSession;
pub use server::Emission;
pub use server::InvalidRequest;
pub use server::RpcServer;
pub use server::RpcServerBuilder;
pub use transport::Connection;
pub use transport::ConnectionId;
