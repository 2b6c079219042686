use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub mod bincode;
pub mod json;
pub mod msgpack;

pub use self::bincode::BincodeCodec;
pub use self::json::JsonCodec;
pub use self::msgpack::MessagePackCodec;

/// Codec trait for turning payload values into bytes and back
///
/// The engine never looks inside a payload; which codec applies is decided
/// per call (per-method override, else the client or server default).
pub trait Codec: Send + Sync {
    /// Encode a value into bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}
