use thiserror::Error;

use mqrpc_core::{MethodName, ServiceName};

use crate::shutdown::QuitSignal;

/// Error returned by a service handler
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot encode payload {value}: {source}")]
    Encode {
        value: String,
        #[source]
        source: mqrpc_fabric::Error,
    },

    #[error("cannot decode payload for {service}.{method} ({payload}): {source}")]
    Decode {
        service: ServiceName,
        method: MethodName,
        payload: String,
        #[source]
        source: mqrpc_fabric::Error,
    },

    #[error("no service description for {0}")]
    NoSuchService(ServiceName),

    #[error("no method description for {method} in service {service}")]
    NoSuchMethod {
        service: ServiceName,
        method: MethodName,
    },

    #[error("handler {service}.{method} failed: {source}")]
    Handler {
        service: ServiceName,
        method: MethodName,
        #[source]
        source: BoxError,
    },

    #[error("cannot send message {envelope}: {source}")]
    Send {
        envelope: String,
        #[source]
        source: mqrpc_fabric::Error,
    },

    #[error("error on receive message: {0}")]
    Receive(#[source] mqrpc_fabric::Error),

    #[error("cannot delete message {envelope}: {source}")]
    Delete {
        envelope: String,
        #[source]
        source: mqrpc_fabric::Error,
    },

    #[error("error on handle message batch of {batch_size}: {source}")]
    Batch {
        batch_size: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("dispatch task for {envelope} panicked: {reason}")]
    Panicked { envelope: String, reason: String },

    #[error("cannot listen for {signal}: {source}")]
    Signal {
        signal: QuitSignal,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Unknown service or method name
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::NoSuchService(_) | Self::NoSuchMethod { .. })
    }

    /// The transport cannot perform the requested operation at all
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Send {
                source: mqrpc_fabric::Error::Unsupported(_),
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Render at most a short prefix of a payload for error messages
pub(crate) fn payload_preview(payload: &[u8]) -> String {
    const LIMIT: usize = 128;

    let shown = &payload[..payload.len().min(LIMIT)];
    let mut preview = String::from_utf8_lossy(shown).into_owned();
    if payload.len() > LIMIT {
        preview.push_str(&format!("... {} bytes total", payload.len()));
    }
    preview
}
