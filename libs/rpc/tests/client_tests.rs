use mqrpc::{Envelope, Error, RpcClient};
use mqrpc_fabric::{
    codec::{BincodeCodec, Codec, JsonCodec, MessagePackCodec},
    transport::{MemoryQueue, MessageReceiver, MessageSender},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SayRequest {
    msg: String,
}

fn say_request(msg: &str) -> SayRequest {
    SayRequest {
        msg: msg.to_string(),
    }
}

/// Sender that keeps every envelope and answers request/reply calls by
/// echoing the payload back
#[derive(Clone, Default)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<Envelope>>>,
}

#[async_trait::async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, envelope: Envelope) -> mqrpc_fabric::Result<()> {
        self.sent.lock().push(envelope);
        Ok(())
    }

    async fn send_sync(&self, envelope: Envelope) -> mqrpc_fabric::Result<Vec<u8>> {
        let reply = envelope.payload().to_vec();
        self.sent.lock().push(envelope);
        Ok(reply)
    }
}

#[tokio::test]
async fn send_async_encodes_with_default_codec() {
    let sender = RecordingSender::default();
    let client = RpcClient::new(sender.clone());

    client
        .send_async("Echo", "Echo/Say", &say_request("hi"))
        .await
        .unwrap();

    let sent = sender.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].service_name().as_str(), "Echo");
    assert_eq!(sent[0].method_name().as_str(), "Echo/Say");
    assert_eq!(sent[0].payload(), br#"{"msg":"hi"}"#);
    assert!(sent[0].ack_token().is_none());
}

#[tokio::test]
async fn send_async_with_uses_call_encoder() {
    let sender = RecordingSender::default();
    let client = RpcClient::new(sender.clone());

    client
        .send_async_with("Echo", "Echo/SayPacked", &say_request("hi"), &MessagePackCodec)
        .await
        .unwrap();

    let sent = sender.sent.lock();
    let decoded: SayRequest = MessagePackCodec.decode(sent[0].payload()).unwrap();
    assert_eq!(decoded, say_request("hi"));
    assert!(JsonCodec.decode::<SayRequest>(sent[0].payload()).is_err());
}

#[tokio::test]
async fn client_default_codec_is_pluggable() {
    let sender = RecordingSender::default();
    let client = RpcClient::with_codec(sender.clone(), BincodeCodec);

    client
        .send_async("Echo", "Echo/Say", &say_request("binary"))
        .await
        .unwrap();

    let decoded: SayRequest = BincodeCodec.decode(sender.sent.lock()[0].payload()).unwrap();
    assert_eq!(decoded, say_request("binary"));
}

#[tokio::test]
async fn encode_failure_names_the_value_and_sends_nothing() {
    let sender = RecordingSender::default();
    let client = RpcClient::new(sender.clone());
    let mut input = HashMap::new();
    input.insert((1u8, 2u8), 3u8);

    let err = client
        .send_async("Echo", "Echo/Say", &input)
        .await
        .unwrap_err();

    match err {
        Error::Encode { value, .. } => assert!(value.contains("(1, 2)")),
        other => panic!("Expected Encode, got {:?}", other),
    }
    assert!(sender.sent.lock().is_empty());
}

#[tokio::test]
async fn send_failure_is_wrapped() {
    let queue = MemoryQueue::new();
    queue.close();
    let client = RpcClient::new(queue);

    let err = client
        .send_async("Echo", "Echo/Say", &say_request("hi"))
        .await
        .unwrap_err();

    match err {
        Error::Send { envelope, source } => {
            assert!(envelope.contains("Echo.Echo/Say"));
            assert!(matches!(source, mqrpc_fabric::Error::QueueClosed));
        }
        other => panic!("Expected Send, got {:?}", other),
    }
}

#[tokio::test]
async fn send_sync_is_unsupported_on_a_queue() {
    let client = RpcClient::new(MemoryQueue::new());

    let err = client
        .send_sync::<_, SayRequest>("Echo", "Echo/Say", &say_request("hi"))
        .await
        .unwrap_err();

    assert!(err.is_unsupported());
}

#[tokio::test]
async fn send_sync_decodes_the_reply() {
    let sender = RecordingSender::default();
    let client = RpcClient::new(sender.clone());

    let reply: SayRequest = client
        .send_sync("Echo", "Echo/Say", &say_request("ping"))
        .await
        .unwrap();

    assert_eq!(reply, say_request("ping"));
    assert_eq!(sender.sent.lock().len(), 1);
}

#[tokio::test]
async fn queued_message_arrives_as_sent() {
    let queue = MemoryQueue::builder().wait_time(Duration::ZERO).build();
    let client = RpcClient::new(queue.clone());

    client
        .send_async("Echo", "Echo/Say", &say_request("hi"))
        .await
        .unwrap();

    let batch = queue.receive_batch().await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].service_name().as_str(), "Echo");
    assert_eq!(
        JsonCodec.decode::<SayRequest>(batch[0].payload()).unwrap(),
        say_request("hi")
    );
    assert!(batch[0].ack_token().is_some());
}
