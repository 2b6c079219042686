//! Echo service served over an in-process queue
//!
//! Sends one JSON and one MessagePack call, serves until both are handled,
//! then exits. Ctrl-C stops it early; after `serve` returns, Ctrl-C is no
//! longer handled, so the process must exit on its own.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p mqrpc --example echo
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mqrpc::{
    BoxError, CallContext, MethodDescriptor, RpcClient, RpcServer, ServerBuilder, ServerConfig,
    ServiceDescriptor,
};
use mqrpc_fabric::codec::{Codec, MessagePackCodec};
use mqrpc_fabric::transport::MemoryQueue;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct SayRequest {
    msg: String,
}

#[async_trait::async_trait]
trait Echo: Send + Sync {
    async fn say(&self, ctx: &CallContext, input: SayRequest) -> Result<(), BoxError>;
}

/// Prints each message and cancels `done` after the expected number of calls
struct PrintEcho {
    remaining: AtomicUsize,
    done: CancellationToken,
}

#[async_trait::async_trait]
impl Echo for PrintEcho {
    async fn say(&self, ctx: &CallContext, input: SayRequest) -> Result<(), BoxError> {
        tracing::info!(method = %ctx.method(), msg = %input.msg, "echo");
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.done.cancel();
        }
        Ok(())
    }
}

fn register_echo_service<C: Codec + 'static>(
    builder: ServerBuilder<C>,
    echo: Arc<dyn Echo>,
) -> ServerBuilder<C> {
    let descriptor = ServiceDescriptor::new("Echo")
        .method(MethodDescriptor::new(
            "Echo/Say",
            |echo: Arc<dyn Echo>, ctx: CallContext, input: SayRequest| async move {
                echo.say(&ctx, input).await
            },
        ))
        .method(MethodDescriptor::with_decoder(
            "Echo/SayPacked",
            MessagePackCodec,
            |echo: Arc<dyn Echo>, ctx: CallContext, input: SayRequest| async move {
                echo.say(&ctx, input).await
            },
        ));
    builder.register(echo, descriptor)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let queue = MemoryQueue::builder()
        .wait_time(Duration::from_millis(200))
        .build();
    let done = CancellationToken::new();

    let builder = RpcServer::builder(queue.clone())
        .deleter(queue.clone())
        .config(ServerConfig::default().with_default_quit_signals())
        .cancellation(done.clone());
    let builder = register_echo_service(
        builder,
        Arc::new(PrintEcho {
            remaining: AtomicUsize::new(2),
            done,
        }),
    );
    let server = builder.build();

    let client = RpcClient::new(queue.clone());
    client
        .send_async(
            "Echo",
            "Echo/Say",
            &SayRequest {
                msg: "hello over json".to_string(),
            },
        )
        .await?;
    client
        .send_async_with(
            "Echo",
            "Echo/SayPacked",
            &SayRequest {
                msg: "hello over msgpack".to_string(),
            },
            &MessagePackCodec,
        )
        .await?;

    server.serve().await?;
    Ok(())
}
