//! JSON payload decoding helpers
//!
//! Payloads come in three shapes depending on the rule type: one rule object,
//! an array of rule objects, or a `name → rule` map.

use crate::strategies::errors::IntakeError;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn parse(object: &'static str, payload: &str) -> Result<Value, IntakeError> {
    serde_json::from_str(payload).map_err(|e| IntakeError::decode(object, e.to_string()))
}

fn convert<T: DeserializeOwned>(object: &'static str, value: Value) -> Result<T, IntakeError> {
    serde_json::from_value(value).map_err(|e| IntakeError::decode(object, e.to_string()))
}

/// Decode a payload holding exactly one rule
pub fn decode_one<T: DeserializeOwned>(object: &'static str, payload: &str) -> Result<T, IntakeError> {
    convert(object, parse(object, payload)?)
}

/// Decode a payload holding one rule or an array of rules
///
/// A single malformed element rejects the whole payload.
pub fn decode_list<T: DeserializeOwned>(
    object: &'static str,
    payload: &str,
) -> Result<Vec<T>, IntakeError> {
    match parse(object, payload)? {
        Value::Array(items) => items.into_iter().map(|item| convert(object, item)).collect(),
        other => Ok(vec![convert(object, other)?]),
    }
}

/// Decode a `name → rule` map, or an array of such maps, in declaration order
pub fn decode_map<T: DeserializeOwned>(
    object: &'static str,
    payload: &str,
) -> Result<Vec<(String, T)>, IntakeError> {
    let maps = match parse(object, payload)? {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut rules = Vec::new();
    for map in maps {
        let Value::Object(entries) = map else {
            return Err(IntakeError::decode(object, "expected a JSON object keyed by name"));
        };
        for (name, body) in entries {
            if name.is_empty() {
                return Err(IntakeError::validation(object, "empty name"));
            }
            rules.push((name, convert(object, body)?));
        }
    }
    Ok(rules)
}

/// Split a `-name` deletion marker from the name
///
/// Returns the bare name and whether the identity must be present.
pub fn split_polarity(name: &str) -> (&str, bool) {
    match name.strip_prefix('-') {
        Some(bare) => (bare, false),
        None => (name, true),
    }
}
