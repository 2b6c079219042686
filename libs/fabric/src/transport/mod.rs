use mqrpc_core::Envelope;

use crate::error::{Error, Result};

pub mod memory;

pub use self::memory::{MemoryQueue, MemoryQueueBuilder, ReceiverConfig};

/// Send capability of a message transport
#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    /// Attempt delivery of one envelope (publish/subscribe)
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Send and wait for the reply payload (request/reply)
    ///
    /// Queues that cannot correlate replies keep this default.
    async fn send_sync(&self, _envelope: Envelope) -> Result<Vec<u8>> {
        Err(Error::Unsupported("request/reply"))
    }
}

/// Receive capability of a message transport
#[async_trait::async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Block until the transport yields the next batch (possibly empty)
    ///
    /// Every returned envelope carries the ack token of this delivery.
    async fn receive_batch(&self) -> Result<Vec<Envelope>>;
}

/// Delete (acknowledge) capability of a message transport
#[async_trait::async_trait]
pub trait MessageDeleter: Send + Sync {
    /// Remove a previously received envelope using its ack token
    async fn delete(&self, envelope: &Envelope) -> Result<()>;
}
