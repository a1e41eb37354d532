//! Real-time pub/sub gateway: topic fan-out, presence and the WebSocket
//! connection loop.

pub mod connection;
pub mod dispatcher;
