use serde_json::{Map, Value};

/// Which extraction strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordSource {
    Network,
    Dom,
    Vision,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSource::Network => write!(f, "network"),
            RecordSource::Dom => write!(f, "dom"),
            RecordSource::Vision => write!(f, "vision"),
        }
    }
}

/// Vendor-shaped product data as one strategy saw it. Consumed by the
/// normalizer immediately after extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source: RecordSource,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    #[must_use]
    pub fn new(source: RecordSource, fields: Map<String, Value>) -> Self {
        Self { source, fields }
    }

    /// Wraps a JSON value; non-objects yield `None`.
    #[must_use]
    pub fn from_value(source: RecordSource, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { source, fields }),
            _ => None,
        }
    }

    /// First key present with a non-null value.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .find(|v| !v.is_null())
    }

    /// First key present whose value is a non-blank string (numbers are
    /// stringified).
    #[must_use]
    pub fn text_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}
