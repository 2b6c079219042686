use mqrpc_fabric::{
    codec::{BincodeCodec, Codec, JsonCodec, MessagePackCodec},
    error::Error,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u64,
    msg: String,
    tags: Vec<i32>,
    reply_to: Option<String>,
}

fn round_trip<C: Codec>(codec: &C, message: &TestMessage) -> TestMessage {
    let bytes = codec.encode(message).unwrap();
    codec.decode(&bytes).unwrap()
}

proptest! {
    #[test]
    fn every_codec_round_trips(
        id in any::<u64>(),
        msg in ".*",
        tags in proptest::collection::vec(any::<i32>(), 0..8),
        reply_to in proptest::option::of("[a-z]{1,12}"),
    ) {
        let message = TestMessage { id, msg, tags, reply_to };

        prop_assert_eq!(round_trip(&JsonCodec, &message), message.clone());
        prop_assert_eq!(round_trip(&BincodeCodec, &message), message.clone());
        prop_assert_eq!(round_trip(&MessagePackCodec, &message), message);
    }
}

#[test]
fn json_payload_keeps_field_names() {
    let bytes = JsonCodec
        .encode(&TestMessage {
            id: 1,
            msg: "hi".to_string(),
            tags: vec![],
            reply_to: None,
        })
        .unwrap();

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\"msg\":\"hi\""));
}

#[test]
fn decoding_garbage_is_a_codec_error() {
    let garbage = b"\xff\x00not a payload";

    assert!(matches!(
        JsonCodec.decode::<TestMessage>(garbage),
        Err(Error::Codec(_))
    ));
    assert!(matches!(
        MessagePackCodec.decode::<TestMessage>(garbage),
        Err(Error::Codec(_))
    ));
}

#[test]
fn codecs_are_not_interchangeable() {
    let message = TestMessage {
        id: 7,
        msg: "binary".to_string(),
        tags: vec![1, 2, 3],
        reply_to: None,
    };
    let bytes = BincodeCodec.encode(&message).unwrap();

    assert!(JsonCodec.decode::<TestMessage>(&bytes).is_err());
}
