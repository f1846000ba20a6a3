//! Serde adapters for byte payloads carried as base64 strings.
//!
//! Post data, response bodies and fulfillment bodies travel over the wire
//! base64-encoded. Use with `#[serde(with = "...")]`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serializer};

/// Encodes a byte slice as standard base64.
pub fn encode(bytes: &[u8]) -> String {
	STANDARD.encode(bytes)
}

/// Decodes a standard base64 string.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
	STANDARD.decode(text)
}

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
	D: Deserializer<'de>,
{
	let text = String::deserialize(deserializer)?;
	decode(&text).map_err(serde::de::Error::custom)
}

/// Same as the parent module, for `Option<Vec<u8>>` fields.
pub mod option {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match bytes {
			Some(bytes) => serializer.serialize_some(&super::encode(bytes)),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let text: Option<String> = Option::deserialize(deserializer)?;
		text.map(|t| super::decode(&t).map_err(serde::de::Error::custom)).transpose()
	}
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Payload {
		#[serde(with = "super")]
		body: Vec<u8>,
		#[serde(default, with = "super::option", skip_serializing_if = "Option::is_none")]
		extra: Option<Vec<u8>>,
	}

	#[test]
	fn test_body_is_base64_on_the_wire() {
		let payload = Payload {
			body: b"hello".to_vec(),
			extra: None,
		};
		let value = serde_json::to_value(&payload).unwrap();
		assert_eq!(value, serde_json::json!({"body": "aGVsbG8="}));
	}

	#[test]
	fn test_missing_optional_field_is_none() {
		let payload: Payload = serde_json::from_value(serde_json::json!({"body": ""})).unwrap();
		assert!(payload.body.is_empty());
		assert!(payload.extra.is_none());
	}

	#[test]
	fn test_invalid_base64_is_rejected() {
		let result: Result<Payload, _> = serde_json::from_value(serde_json::json!({"body": "!!not base64"}));
		assert!(result.is_err());
	}
}
