use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named binary arguments carried by an envelope
pub type Arguments = BTreeMap<String, Vec<u8>>;

/// One unit of work addressed to `component.operation` on the peer
///
/// Argument values travel as base64 strings so the JSON form stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub component: String,
    pub operation: String,
    #[serde(with = "base64_values")]
    pub arguments: Arguments,
}

impl Envelope {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            arguments: Arguments::new(),
        }
    }

    /// Replace the whole argument map
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn arg(&self, key: &str) -> Option<&[u8]> {
        self.arguments.get(key).map(Vec::as_slice)
    }
}

mod base64_values {
    use std::collections::BTreeMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Arguments;

    pub fn serialize<S: Serializer>(arguments: &Arguments, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(arguments.len()))?;
        for (key, value) in arguments {
            map.serialize_entry(key, &STANDARD.encode(value))?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arguments, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                STANDARD
                    .decode(value.as_bytes())
                    .map(|bytes| (key, bytes))
                    .map_err(|e| D::Error::custom(format!("argument value is not base64: {e}")))
            })
            .collect()
    }
}
