//! MQRPC Core - Message envelope model
//!
//! The envelope is the transport-agnostic unit exchanged between RPC clients
//! and servers: a routing key (service + method), opaque payload bytes, and a
//! transport-private acknowledgment token that never leaves the process.

pub mod envelope;
pub mod error;

pub use envelope::{AckToken, Envelope, MethodName, ServiceName};
pub use error::{Error, Result};
