// uprotect-api: Async transport client for the UniFi Protect private API

pub mod client;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;
pub mod websocket;

pub use client::{Credentials, ProtectClient, RawBootstrap};
pub use error::Error;
pub use frame::{RawFrame, UpdateFrame};
pub use session::Session;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{SessionEvent, WsSession};
