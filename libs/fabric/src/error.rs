use thiserror::Error;

use mqrpc_core::{MethodName, ServiceName};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Envelope error: {0}")]
    Envelope(#[from] mqrpc_core::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Envelope {service}.{method} has no ack token")]
    MissingAckToken {
        service: ServiceName,
        method: MethodName,
    },

    #[error("Unknown ack token: {0}")]
    UnknownAckToken(String),

    #[error("Queue closed")]
    QueueClosed,

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;
