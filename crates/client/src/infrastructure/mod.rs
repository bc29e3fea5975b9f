//! Infrastructure adapters for the outbound ports.

pub mod http_client;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
