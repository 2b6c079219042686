use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of a registered service, the first half of a routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

/// Name of a method within a service, the second half of a routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodName(String);

macro_rules! name_impls {
    ($name:ident) => {
        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_impls!(ServiceName);
name_impls!(MethodName);

/// Transport-private handle for acknowledging a received envelope
///
/// Never serialized. Set by a receiver, consumed by a deleter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckToken(String);

impl AckToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of message exchange between client and server
///
/// Only the routing key and the payload cross the transport boundary; the
/// acknowledgment token stays local to the process that received the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    service_name: ServiceName,
    method_name: MethodName,
    #[serde(with = "base64_payload")]
    payload: Vec<u8>,
    #[serde(skip)]
    ack_token: Option<AckToken>,
}

impl Envelope {
    /// Build an outgoing envelope (no ack token)
    pub fn new(
        service_name: impl Into<ServiceName>,
        method_name: impl Into<MethodName>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            payload,
            ack_token: None,
        }
    }

    /// Attach the token a receiver obtained for this delivery
    pub fn with_ack_token(mut self, token: AckToken) -> Self {
        self.ack_token = Some(token);
        self
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.service_name
    }

    pub fn method_name(&self) -> &MethodName {
        &self.method_name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn ack_token(&self) -> Option<&AckToken> {
        self.ack_token.as_ref()
    }

    /// Serialize to the JSON text that travels through the queue
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Parse the JSON text form; the result never carries an ack token
    ///
    /// Routing keys are not checked here. An empty or unknown name is a
    /// routing error for the server to report, not a parse failure.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} ({} bytes",
            self.service_name,
            self.method_name,
            self.payload.len()
        )?;
        if let Some(token) = &self.ack_token {
            write!(f, ", ack {token}")?;
        }
        f.write_str(")")
    }
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn json_form_has_three_fields_and_base64_payload() {
        let envelope = Envelope::new("Echo", "Echo/Say", b"{\"msg\":\"hi\"}".to_vec())
            .with_ack_token(AckToken::new("receipt-1"));

        let json = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(object["service_name"], "Echo");
        assert_eq!(object["method_name"], "Echo/Say");
        assert_eq!(object["payload"], "eyJtc2ciOiJoaSJ9");
        assert!(!json.contains("receipt-1"));
    }

    #[test]
    fn parsed_envelope_has_no_ack_token() {
        let json = r#"{"service_name":"Echo","method_name":"Echo/Say","payload":"aGk="}"#;
        let envelope = Envelope::from_json(json).unwrap();

        assert_eq!(envelope.service_name().as_str(), "Echo");
        assert_eq!(envelope.method_name().as_str(), "Echo/Say");
        assert_eq!(envelope.payload(), b"hi");
        assert!(envelope.ack_token().is_none());
    }

    #[test]
    fn empty_routing_key_parses() {
        let json = r#"{"service_name":"","method_name":"Echo/Say","payload":""}"#;
        let envelope = Envelope::from_json(json).unwrap();

        assert_eq!(envelope.service_name().as_str(), "");
        assert!(envelope.payload().is_empty());
    }

    #[test]
    fn rejects_invalid_base64_payload() {
        let json = r#"{"service_name":"Echo","method_name":"Echo/Say","payload":"%%%"}"#;
        assert!(matches!(
            Envelope::from_json(json),
            Err(Error::Serialization(_))
        ));
    }
}
