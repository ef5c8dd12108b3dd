//! User identity normalization.
//!
//! The backend and the transport disagree on id types: the same user may show
//! up as `42`, `42.0` or `"42"`. Every comparison of user ids goes through
//! [`normalize_id`] and the [`UserKey`] it produces, so the string form is the
//! single identity.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Normalized user identity, compared by its string representation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserKey(String);

impl UserKey {
    /// Build a key from a string id. Returns `None` for blank input.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    /// Build a key from any JSON id (string or number).
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        normalize_id(value).map(Self)
    }

    /// The normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key can identify the local user.
    ///
    /// A numeric zero id means "not signed in" on the backend.
    #[must_use]
    pub fn is_identifying(&self) -> bool {
        self.0 != "0"
    }

    /// Identity comparison used wherever two user ids meet.
    #[must_use]
    pub fn matches(&self, other: &UserKey) -> bool {
        self.0 == other.0
    }
}

impl From<u64> for UserKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Normalize a JSON id to its canonical string form.
///
/// Integral numbers lose any fractional suffix (`42.0` becomes `"42"`),
/// strings are trimmed, and anything else (or a blank string) yields `None`.
#[must_use]
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(int.to_string());
            }
            if let Some(uint) = number.as_u64() {
                return Some(uint.to_string());
            }
            number.as_f64().map(format_float_id)
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn format_float_id(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

impl Serialize for UserKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        UserKey::from_json(&raw).ok_or_else(|| D::Error::custom(format!("invalid user id: {raw}")))
    }
}

#[cfg(test)]
#[path = "ident_test.rs"]
mod tests;
