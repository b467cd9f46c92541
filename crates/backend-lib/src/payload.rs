// ============================
// crates/backend-lib/src/payload.rs
// ============================
//! Lenient access to client payload objects.
//!
//! Clients are browsers running our own UI, so a wrongly typed field falls back to its
//! default instead of failing the whole message.

use serde_json::{Map, Value};

/// A client payload, always an object (non-objects read as empty)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// Trimmed string; missing, non-string and blank all read as `None`
    pub fn string(&self, key: &str) -> Option<String> {
        let trimmed = self.0.get(key)?.as_str()?.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn string_or(&self, key: &str, fallback: &str) -> String {
        self.string(key).unwrap_or_else(|| fallback.to_string())
    }

    /// `true` only for a JSON `true`
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Integer from a finite number (truncated) or a numeric string
    pub fn int_or(&self, key: &str, fallback: i64) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(fallback),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(fallback),
            _ => fallback,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
