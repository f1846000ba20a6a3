//! Tagged JavaScript value format used by evaluation calls.
//!
//! | JS value | Wire |
//! |---|---|
//! | string | `{"s": "..."}` |
//! | number | `{"n": 1.5}` |
//! | boolean | `{"b": true}` |
//! | null / undefined / NaN / ±Infinity / -0 | `{"v": "null"}` etc. |
//! | array | `{"a": [...]}` |
//! | object | `{"o": [{"k": "...", "v": ...}]}` |
//! | Date | `{"d": "ISO string"}` |
//! | BigInt | `{"bi": "123"}` |
//! | handle | `{"h": index}` |

use pw_net_runtime::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Number, Value, json};

/// Serializes `arg` into the `{value, handles}` argument envelope.
pub(crate) fn serialize_argument<A: Serialize + ?Sized>(arg: &A) -> Result<Value> {
	let value = serde_json::to_value(arg)?;
	Ok(json!({
		"value": to_protocol(&value),
		"handles": [],
	}))
}

/// Converts a JSON value into its tagged form.
pub(crate) fn to_protocol(value: &Value) -> Value {
	match value {
		Value::Null => json!({"v": "null"}),
		Value::Bool(b) => json!({"b": b}),
		Value::Number(n) => json!({"n": n}),
		Value::String(s) => json!({"s": s}),
		Value::Array(items) => json!({"a": items.iter().map(to_protocol).collect::<Vec<_>>()}),
		Value::Object(map) => json!({
			"o": map.iter().map(|(k, v)| json!({"k": k, "v": to_protocol(v)})).collect::<Vec<_>>()
		}),
	}
}

/// Converts a tagged value back into plain JSON.
///
/// Values JSON cannot carry degrade: `NaN` and the infinities become
/// `null`, dates and BigInts become strings. Handle references cannot be
/// materialized and fail with [`Error::Evaluation`].
pub(crate) fn parse_result(value: &Value) -> Result<Value> {
	let Value::Object(map) = value else {
		return Err(Error::ProtocolError(format!("Expected tagged value, got {value}")));
	};

	if let Some(s) = map.get("s") {
		return Ok(s.clone());
	}
	if let Some(n) = map.get("n") {
		return Ok(n.clone());
	}
	if let Some(b) = map.get("b") {
		return Ok(b.clone());
	}
	if let Some(v) = map.get("v").and_then(Value::as_str) {
		return match v {
			"null" | "undefined" | "NaN" | "Infinity" | "-Infinity" => Ok(Value::Null),
			"-0" => Ok(Number::from_f64(-0.0).map(Value::Number).unwrap_or(Value::Null)),
			other => Err(Error::ProtocolError(format!("Unknown special value: {other}"))),
		};
	}
	if let Some(items) = map.get("a").and_then(Value::as_array) {
		return items.iter().map(parse_result).collect::<Result<Vec<_>>>().map(Value::Array);
	}
	if let Some(entries) = map.get("o").and_then(Value::as_array) {
		let mut object = Map::with_capacity(entries.len());
		for entry in entries {
			let key = entry
				.get("k")
				.and_then(Value::as_str)
				.ok_or_else(|| Error::ProtocolError(format!("Object entry without key: {entry}")))?;
			let val = entry.get("v").ok_or_else(|| Error::ProtocolError(format!("Object entry without value: {entry}")))?;
			object.insert(key.to_string(), parse_result(val)?);
		}
		return Ok(Value::Object(object));
	}
	if let Some(date) = map.get("d").and_then(Value::as_str) {
		return Ok(Value::String(date.to_string()));
	}
	if let Some(bigint) = map.get("bi").and_then(Value::as_str) {
		return Ok(Value::String(bigint.to_string()));
	}
	if map.contains_key("h") {
		return Err(Error::Evaluation("Cannot deserialize a handle reference; use evaluate_handle".to_string()));
	}

	Err(Error::ProtocolError(format!("Unrecognized tagged value: {value}")))
}

/// Returns true when `expression` is function source rather than an
/// expression to evaluate.
///
/// Recognizes `function` / `async function` declarations and arrow
/// functions with a bare or parenthesized parameter list.
pub(crate) fn is_function(expression: &str) -> bool {
	let mut source = expression.trim_start();
	if let Some(rest) = source.strip_prefix("async") {
		if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
			source = rest.trim_start();
		}
	}

	if let Some(rest) = source.strip_prefix("function") {
		return rest.starts_with(|c: char| c.is_whitespace() || c == '(' || c == '*');
	}

	let Some((head, _)) = source.split_once("=>") else {
		return false;
	};
	let head = head.trim();
	if head.starts_with('(') {
		return head.ends_with(')') && balanced(head);
	}
	!head.is_empty() && head.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn balanced(text: &str) -> bool {
	let mut depth = 0i32;
	for (i, c) in text.char_indices() {
		match c {
			'(' => depth += 1,
			')' => {
				depth -= 1;
				// The opening paren must close at the very end: `(a) + (b) => ..` is not a parameter list.
				if depth == 0 && i + 1 != text.len() {
					return false;
				}
			}
			_ => {}
		}
	}
	depth == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_argument_envelope() {
		let arg = serialize_argument(&json!({"name": "w", "ids": [1, true, null]})).unwrap();
		assert_eq!(
			arg,
			json!({
				"value": {"o": [
					{"k": "ids", "v": {"a": [{"n": 1}, {"b": true}, {"v": "null"}]}},
					{"k": "name", "v": {"s": "w"}}
				]},
				"handles": []
			})
		);
	}

	#[test]
	fn test_unit_argument_is_null() {
		assert_eq!(serialize_argument(&()).unwrap()["value"], json!({"v": "null"}));
	}

	#[test]
	fn test_parse_nested_result() {
		let tagged = json!({"o": [
			{"k": "count", "v": {"n": 3}},
			{"k": "tags", "v": {"a": [{"s": "a"}, {"v": "undefined"}]}},
			{"k": "when", "v": {"d": "2020-01-01T00:00:00.000Z"}}
		]});
		assert_eq!(
			parse_result(&tagged).unwrap(),
			json!({"count": 3, "tags": ["a", null], "when": "2020-01-01T00:00:00.000Z"})
		);
	}

	#[test]
	fn test_parse_special_numbers() {
		assert_eq!(parse_result(&json!({"v": "NaN"})).unwrap(), Value::Null);
		assert_eq!(parse_result(&json!({"v": "-Infinity"})).unwrap(), Value::Null);
		let neg_zero = parse_result(&json!({"v": "-0"})).unwrap();
		assert_eq!(neg_zero.as_f64(), Some(0.0));
		assert!(neg_zero.as_f64().unwrap().is_sign_negative());
		assert_eq!(parse_result(&json!({"bi": "12345678901234567890"})).unwrap(), json!("12345678901234567890"));
	}

	#[test]
	fn test_parse_rejects_handles_and_garbage() {
		assert!(matches!(parse_result(&json!({"h": 0})), Err(Error::Evaluation(_))));
		assert!(matches!(parse_result(&json!({"zz": 1})), Err(Error::ProtocolError(_))));
		assert!(matches!(parse_result(&json!(5)), Err(Error::ProtocolError(_))));
	}

	#[test]
	fn test_is_function_detection() {
		assert!(is_function("() => 1"));
		assert!(is_function("x => x * 2"));
		assert!(is_function("(a, b) => a + b"));
		assert!(is_function("async () => fetch('/')"));
		assert!(is_function("function () { return self.name; }"));
		assert!(is_function("async function run(arg) {}"));

		assert!(!is_function("1 + 2"));
		assert!(!is_function("self.name"));
		assert!(!is_function("functionName()"));
		assert!(!is_function("(a) + (b) => c"));
		assert!(!is_function("a.b => c"));
	}
}
