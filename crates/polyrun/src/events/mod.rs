pub mod client;
pub mod manager;

pub use client::EventClient;
pub use client::EventSubscription;
pub use client::SubscriptionStream;
pub use manager::EventManager;
pub use manager::MemoryEventManager;
pub use manager::Subscription;
