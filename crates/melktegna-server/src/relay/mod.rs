//! Real-time relay: connection registry, presence binding, message routing
//! and disconnect cleanup.

pub mod disconnect;
pub mod presence;
pub mod registry;
pub mod router;

pub use disconnect::{ConnectionState, DisconnectHandler};
pub use presence::PresenceBinder;
pub use registry::{ConnectionHandle, ConnectionRegistry, DeliveryError};
pub use router::{MessageRouter, RouteOutcome};
