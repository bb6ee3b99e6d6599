//! WebSocket front of the chat hub: connection registry, broadcast fan-out,
//! staff commands and the per-connection message loop.

pub mod broadcast;
pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod ingest;
pub mod server;

pub use broadcast::{BroadcastHub, DeliveryReport};
pub use command::{CommandProcessor, StaffAction};
pub use config::HubConfig;
pub use connection::{Connection, ConnectionRegistry};
pub use engine::HttpQueryEngine;
pub use ingest::MessageIngester;
pub use server::{AppState, GatewayServer};
