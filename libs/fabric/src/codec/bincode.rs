use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Payload codec for Rust-to-Rust calls
///
/// Not self-describing: both ends must agree on the exact input type, field
/// order included.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(codec_error)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(codec_error)
    }
}

fn codec_error(error: bincode::Error) -> Error {
    Error::Codec(format!("bincode: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_payload_names_the_codec() {
        let bytes = BincodeCodec.encode(&(7u64, "seven".to_string())).unwrap();

        match BincodeCodec.decode::<(u64, String)>(&bytes[..4]) {
            Err(Error::Codec(msg)) => assert!(msg.starts_with("bincode: ")),
            other => panic!("Expected Codec error, got {:?}", other),
        }
    }
}
