use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use mqrpc_core::{Envelope, MethodName, ServiceName};
use mqrpc_fabric::codec::{Codec, JsonCodec};
use mqrpc_fabric::transport::MessageSender;

use crate::error::{payload_preview, Error, Result};

/// Client side of the RPC: encodes calls into envelopes and hands them to a sender
///
/// Every call makes exactly one send attempt. Delivery and durability are up
/// to the transport; the client neither retries nor buffers.
pub struct RpcClient<C = JsonCodec> {
    sender: Arc<dyn MessageSender>,
    codec: C,
}

impl RpcClient<JsonCodec> {
    /// Client encoding payloads as JSON unless a call overrides it
    pub fn new(sender: impl MessageSender + 'static) -> Self {
        Self::with_codec(sender, JsonCodec)
    }
}

impl<C: Codec> RpcClient<C> {
    /// Client with a different default payload codec
    pub fn with_codec(sender: impl MessageSender + 'static, codec: C) -> Self {
        Self {
            sender: Arc::new(sender),
            codec,
        }
    }

    /// Fire-and-forget call encoded with the client's default codec
    pub async fn send_async<I>(
        &self,
        service: impl Into<ServiceName>,
        method: impl Into<MethodName>,
        input: &I,
    ) -> Result<()>
    where
        I: Serialize + Debug + ?Sized,
    {
        self.send_async_with(service, method, input, &self.codec)
            .await
    }

    /// Fire-and-forget call encoded with `encoder`
    pub async fn send_async_with<I, E>(
        &self,
        service: impl Into<ServiceName>,
        method: impl Into<MethodName>,
        input: &I,
        encoder: &E,
    ) -> Result<()>
    where
        I: Serialize + Debug + ?Sized,
        E: Codec,
    {
        let envelope = encode_envelope(service.into(), method.into(), input, encoder)?;
        let label = envelope.to_string();

        self.sender
            .send(envelope)
            .await
            .map_err(|source| Error::Send {
                envelope: label,
                source,
            })
    }

    /// Request/reply call encoded with the client's default codec
    ///
    /// Fails with an unsupported-operation error on transports that cannot
    /// correlate replies; see [`Error::is_unsupported`].
    pub async fn send_sync<I, O>(
        &self,
        service: impl Into<ServiceName>,
        method: impl Into<MethodName>,
        input: &I,
    ) -> Result<O>
    where
        I: Serialize + Debug + ?Sized,
        O: DeserializeOwned,
    {
        self.send_sync_with(service, method, input, &self.codec)
            .await
    }

    /// Request/reply call; `encoder` encodes the input and decodes the reply
    pub async fn send_sync_with<I, O, E>(
        &self,
        service: impl Into<ServiceName>,
        method: impl Into<MethodName>,
        input: &I,
        encoder: &E,
    ) -> Result<O>
    where
        I: Serialize + Debug + ?Sized,
        O: DeserializeOwned,
        E: Codec,
    {
        let (service, method) = (service.into(), method.into());
        let envelope = encode_envelope(service.clone(), method.clone(), input, encoder)?;
        let label = envelope.to_string();

        let reply = self
            .sender
            .send_sync(envelope)
            .await
            .map_err(|source| Error::Send {
                envelope: label,
                source,
            })?;

        encoder.decode(&reply).map_err(|source| Error::Decode {
            service,
            method,
            payload: payload_preview(&reply),
            source,
        })
    }
}

fn encode_envelope<I, E>(
    service: ServiceName,
    method: MethodName,
    input: &I,
    encoder: &E,
) -> Result<Envelope>
where
    I: Serialize + Debug + ?Sized,
    E: Codec,
{
    let payload = encoder.encode(input).map_err(|source| Error::Encode {
        value: format!("{input:?}"),
        source,
    })?;
    Ok(Envelope::new(service, method, payload))
}
