use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::SessionError;

pub const COOKIES_KEY: &str = "cookies";
pub const ORIGINS_KEY: &str = "origins";

/// Serialized authenticated browser state: a cookie set plus per-origin storage.
///
/// The content is opaque apart from the two structural keys checked on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBlob {
    root: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub cookie_count: usize,
    pub origin_count: usize,
    pub domains: BTreeSet<String>,
}

impl SessionBlob {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| SessionError::Format(format!("not valid JSON: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        let Value::Object(root) = value else {
            return Err(SessionError::Format("root must be an object".into()));
        };
        let missing: Vec<&str> = [COOKIES_KEY, ORIGINS_KEY]
            .into_iter()
            .filter(|key| !root.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(SessionError::Format(format!(
                "missing required keys: {}",
                missing.join(", ")
            )));
        }
        for key in [COOKIES_KEY, ORIGINS_KEY] {
            if !root[key].is_array() {
                return Err(SessionError::Format(format!("`{key}` must be an array")));
            }
        }
        Ok(Self { root })
    }

    /// Builds a blob from captured browser state.
    pub fn from_parts(cookies: Vec<Value>, origins: Vec<Value>) -> Self {
        let mut root = Map::new();
        root.insert(COOKIES_KEY.into(), Value::Array(cookies));
        root.insert(ORIGINS_KEY.into(), Value::Array(origins));
        Self { root }
    }

    pub fn cookies(&self) -> &[Value] {
        self.array(COOKIES_KEY)
    }

    pub fn origins(&self) -> &[Value] {
        self.array(ORIGINS_KEY)
    }

    fn array(&self, key: &str) -> &[Value] {
        self.root
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn summary(&self) -> SessionSummary {
        let domains = self
            .cookies()
            .iter()
            .filter_map(|cookie| cookie.get("domain").and_then(Value::as_str))
            .filter(|domain| !domain.is_empty())
            .map(str::to_string)
            .collect();
        SessionSummary {
            cookie_count: self.cookies().len(),
            origin_count: self.origins().len(),
            domains,
        }
    }

    pub fn to_json(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string_pretty(&self.root).unwrap_or_default()
    }
}
