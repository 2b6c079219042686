//! RPC server: the receive → decode → invoke → acknowledge loop.
//!
//! `serve()` receives one batch at a time from the transport and dispatches
//! every message in it on its own task, then waits for all of them before
//! receiving again. Messages inside a batch run in no particular order;
//! batches never overlap.
//!
//! A message is deleted from the transport only after its handler succeeds.
//! If the delete itself fails the message is eventually redelivered and
//! handled again, so handlers must be idempotent (at-least-once delivery).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use mqrpc_core::Envelope;
use mqrpc_fabric::codec::{Codec, JsonCodec};
use mqrpc_fabric::transport::{MessageDeleter, MessageReceiver};

use crate::config::{FailurePolicy, ServerConfig};
use crate::error::{Error, Result};
use crate::registry::{CallContext, Registry, RegistryBuilder, ServiceDescriptor};
use crate::shutdown::{QuitChannel, QuitHandle};

/// Builder for an [`RpcServer`]; services are registered here
pub struct ServerBuilder<C = JsonCodec> {
    registry: RegistryBuilder<C>,
    codec: C,
    receiver: Arc<dyn MessageReceiver>,
    deleter: Option<Arc<dyn MessageDeleter>>,
    config: ServerConfig,
    cancellation: CancellationToken,
}

impl ServerBuilder<JsonCodec> {
    /// Server decoding payloads as JSON unless a method overrides it
    pub fn new(receiver: impl MessageReceiver + 'static) -> Self {
        Self::with_codec(receiver, JsonCodec)
    }
}

impl<C: Codec + 'static> ServerBuilder<C> {
    /// Server with a different default payload codec
    pub fn with_codec(receiver: impl MessageReceiver + 'static, codec: C) -> Self {
        Self {
            registry: RegistryBuilder::new(),
            codec,
            receiver: Arc::new(receiver),
            deleter: None,
            config: ServerConfig::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Acknowledge successfully handled messages through `deleter`
    pub fn deleter(mut self, deleter: impl MessageDeleter + 'static) -> Self {
        self.deleter = Some(Arc::new(deleter));
        self
    }

    /// Replace the whole server configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// What a failed message does to the serve loop
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Share a cancellation source with the rest of the process
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Register a service instance under its descriptor's name
    pub fn register<S>(mut self, instance: Arc<S>, descriptor: ServiceDescriptor<S, C>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.registry.register(instance, descriptor);
        self
    }

    /// Register a service instance under an explicit name
    pub fn register_as<S>(
        mut self,
        instance: Arc<S>,
        name: &str,
        descriptor: ServiceDescriptor<S, C>,
    ) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.registry.register_as(instance, name, descriptor);
        self
    }

    /// Freeze the registry and create the server
    pub fn build(self) -> RpcServer<C> {
        RpcServer {
            dispatcher: Arc::new(Dispatcher {
                registry: self.registry.build(),
                codec: self.codec,
                deleter: self.deleter,
                cancellation: self.cancellation,
            }),
            receiver: self.receiver,
            config: self.config,
            quit: QuitChannel::new(),
        }
    }
}

/// Everything a dispatch task needs, shared read-only across tasks
struct Dispatcher<C> {
    registry: Registry<C>,
    codec: C,
    deleter: Option<Arc<dyn MessageDeleter>>,
    cancellation: CancellationToken,
}

impl<C: Codec + 'static> Dispatcher<C> {
    async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        let method = self
            .registry
            .resolve(envelope.service_name(), envelope.method_name())?;

        let ctx = CallContext::new(
            envelope.service_name().clone(),
            envelope.method_name().clone(),
            self.cancellation.child_token(),
        );
        method.invoke(ctx, &self.codec, envelope.payload()).await?;

        if let Some(deleter) = &self.deleter {
            deleter
                .delete(&envelope)
                .await
                .map_err(|source| Error::Delete {
                    envelope: envelope.to_string(),
                    source,
                })?;
            tracing::debug!("message acknowledged");
        }
        Ok(())
    }
}

/// Message-queue RPC server
pub struct RpcServer<C = JsonCodec> {
    dispatcher: Arc<Dispatcher<C>>,
    receiver: Arc<dyn MessageReceiver>,
    config: ServerConfig,
    quit: QuitChannel,
}

impl RpcServer<JsonCodec> {
    /// Start building a JSON server reading from `receiver`
    pub fn builder(receiver: impl MessageReceiver + 'static) -> ServerBuilder<JsonCodec> {
        ServerBuilder::new(receiver)
    }
}

impl<C: Codec + 'static> RpcServer<C> {
    /// Handle for stopping `serve()` after the current batch
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.handle()
    }

    /// The cancellation source checked between batches
    pub fn cancellation(&self) -> CancellationToken {
        self.dispatcher.cancellation.clone()
    }

    /// The frozen routing table
    pub fn registry(&self) -> &Registry<C> {
        &self.dispatcher.registry
    }

    /// Dispatch a single message outside the serve loop
    pub async fn handle_message(&self, envelope: Envelope) -> Result<()> {
        self.dispatcher.dispatch(envelope).await
    }

    /// Receive and dispatch batches until told to stop
    ///
    /// Returns `Ok(())` when the cancellation token fires or a quit signal
    /// arrives (both checked only between batches), and an error when the
    /// transport fails to receive or, under [`FailurePolicy::AbortLoop`],
    /// when any message of a batch fails.
    pub async fn serve(mut self) -> Result<()> {
        tracing::info!(services = self.dispatcher.registry.len(), "rpc server serving");

        let result = match self.quit.listen(&self.config.quit_signals) {
            Ok(()) => self.run().await,
            Err(error) => Err(error),
        };

        self.quit.close();
        match &result {
            Ok(()) => tracing::info!("rpc server stopped"),
            Err(error) => tracing::error!(%error, "rpc server stopped on error"),
        }
        result
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            let batch = self.receiver.receive_batch().await.map_err(Error::Receive)?;
            self.dispatch_batch(batch).await?;

            if self.dispatcher.cancellation.is_cancelled() {
                tracing::info!("stop receiving message, cancelled");
                return Ok(());
            }
            if let Some(reason) = self.quit.try_recv() {
                tracing::info!(%reason, "stop receiving message");
                return Ok(());
            }
        }
    }

    async fn dispatch_batch(&self, batch: Vec<Envelope>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch_size = batch.len();
        tracing::debug!(batch_size, "dispatching batch");

        let tasks: Vec<(String, JoinHandle<Result<()>>)> = batch
            .into_iter()
            .map(|envelope| {
                let label = envelope.to_string();
                let span = tracing::debug_span!(
                    "dispatch",
                    service = %envelope.service_name(),
                    method = %envelope.method_name(),
                );
                let dispatcher = Arc::clone(&self.dispatcher);
                let task = tokio::spawn(
                    async move { dispatcher.dispatch(envelope).await }.instrument(span),
                );
                (label, task)
            })
            .collect();

        // Join every task before deciding; a failure never cancels its siblings.
        let mut first_error = None;
        for (label, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(Error::Panicked {
                    envelope: label,
                    reason: join_error.to_string(),
                }),
            };
            let Err(error) = outcome else {
                continue;
            };

            match self.config.failure_policy {
                FailurePolicy::IsolatePerMessage => {
                    tracing::warn!(%error, "message dispatch failed, leaving it for redelivery");
                }
                FailurePolicy::AbortLoop if first_error.is_none() => {
                    first_error = Some(error);
                }
                FailurePolicy::AbortLoop => {
                    tracing::warn!(%error, "further message dispatch failure in aborted batch");
                }
            }
        }

        match first_error {
            Some(error) => Err(Error::Batch {
                batch_size,
                source: Box::new(error),
            }),
            None => Ok(()),
        }
    }
}
