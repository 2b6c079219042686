//! MQRPC - RPC over message queues
//!
//! Clients encode a call into an [`Envelope`] and hand it to a queue. A server
//! receives envelopes in batches, routes each one to a registered service
//! method, decodes its payload, runs the handler, and deletes the message
//! once the handler succeeds.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mqrpc::{CallContext, MethodDescriptor, RpcClient, RpcServer, ServiceDescriptor};
//! use mqrpc_fabric::transport::MemoryQueue;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Say { msg: String }
//!
//! struct Echo;
//!
//! impl Echo {
//!     async fn say(&self, input: Say) -> Result<Say, std::io::Error> {
//!         println!("{}", input.msg);
//!         Ok(input)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = MemoryQueue::new();
//!
//! let descriptor = ServiceDescriptor::<Echo>::new("Echo").method(MethodDescriptor::new(
//!     "Echo/Say",
//!     |echo: Arc<Echo>, _ctx: CallContext, input: Say| async move { echo.say(input).await },
//! ));
//!
//! let server = RpcServer::builder(queue.clone())
//!     .deleter(queue.clone())
//!     .register(Arc::new(Echo), descriptor)
//!     .build();
//!
//! let client = RpcClient::new(queue.clone());
//! client.send_async("Echo", "Echo/Say", &Say { msg: "hi".to_string() }).await?;
//!
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod shutdown;

// Re-exports for convenience
pub use client::RpcClient;
pub use config::{FailurePolicy, ServerConfig};
pub use error::{BoxError, Error, Result};
pub use mqrpc_core::{AckToken, Envelope, MethodName, ServiceName};
pub use registry::{
    CallContext, DecodeFn, MethodDescriptor, Registry, RegistryBuilder, ServiceDescriptor,
};
pub use server::{RpcServer, ServerBuilder};
pub use shutdown::{QuitHandle, QuitReason, QuitSignal};
