//! Global node identifiers.
//!
//! A global id records the provider and the field path leading from the
//! provider root to a node, so the node can be located again without any
//! session state. The JSON form `{"api": .., "p": [{"f", "a"?, "id"?}]}` is
//! gzip-compressed and base64 encoded.

use crate::error::GlobalIdError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Largest decompressed payload accepted by [`GlobalId::decode`].
pub const MAX_GLOBAL_ID_BYTES: u64 = 64 * 1024;

/// One field traversed on the way to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    #[serde(rename = "f")]
    pub field: String,
    /// Untyped arguments of the field, keys sorted.
    #[serde(rename = "a", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Value>,
    /// Key of the element picked from a connection or array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl PathStep {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            arguments: BTreeMap::new(),
            id: None,
        }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: BTreeMap<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = (!id.is_null()).then_some(id);
        self
    }

    /// The arguments to send when replaying this step, `id` included.
    pub fn replay_arguments(&self) -> Option<Value> {
        let mut arguments: serde_json::Map<String, Value> = self
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(id) = &self.id {
            arguments.insert("id".to_string(), id.clone());
        }
        (!arguments.is_empty()).then_some(Value::Object(arguments))
    }
}

/// A decoded global id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalId {
    pub api: String,
    #[serde(rename = "p")]
    pub path: Vec<PathStep>,
}

impl GlobalId {
    pub fn new(api: impl Into<String>, path: Vec<PathStep>) -> Self {
        Self {
            api: api.into(),
            path,
        }
    }

    /// Serializes, compresses and encodes the id.
    pub fn encode(&self) -> Result<String, GlobalIdError> {
        let json = serde_json::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        Ok(STANDARD.encode(compressed))
    }

    /// Reverses [`GlobalId::encode`].
    pub fn decode(encoded: &str) -> Result<Self, GlobalIdError> {
        let compressed = STANDARD.decode(encoded.trim())?;
        let mut json = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .take(MAX_GLOBAL_ID_BYTES + 1)
            .read_to_end(&mut json)?;
        if json.len() as u64 > MAX_GLOBAL_ID_BYTES {
            return Err(GlobalIdError::TooLarge {
                limit: MAX_GLOBAL_ID_BYTES,
            });
        }
        let id: GlobalId = serde_json::from_slice(&json)?;
        if id.path.is_empty() {
            return Err(GlobalIdError::EmptyPath);
        }
        Ok(id)
    }

    /// Encodes the id, or `null` if it cannot be encoded.
    pub fn to_value(&self) -> Value {
        match self.encode() {
            Ok(encoded) => Value::String(encoded),
            Err(error) => {
                tracing::warn!(api = %self.api, %error, "global id encoding failed");
                Value::Null
            }
        }
    }
}
