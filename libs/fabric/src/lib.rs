//! MQRPC Fabric - Codec and message transport layer
//!
//! Provides the pluggable payload codecs (JSON, bincode, MessagePack) and the
//! three transport capabilities the RPC engine builds on: sending one envelope,
//! receiving a batch, and deleting a received envelope by its ack token.
//!
//! # Example
//!
//! ```no_run
//! use mqrpc_core::Envelope;
//! use mqrpc_fabric::codec::{Codec, JsonCodec};
//! use mqrpc_fabric::transport::{MemoryQueue, MessageDeleter, MessageReceiver, MessageSender};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Say { msg: String }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = MemoryQueue::new();
//! let payload = JsonCodec.encode(&Say { msg: "hi".to_string() })?;
//! queue.send(Envelope::new("Echo", "Echo/Say", payload)).await?;
//!
//! for envelope in queue.receive_batch().await? {
//!     let say: Say = JsonCodec.decode(envelope.payload())?;
//!     println!("{}", say.msg);
//!     queue.delete(&envelope).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use codec::{Codec, JsonCodec};
pub use error::{Error, Result};
