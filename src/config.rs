//! Codec configuration and per-call overrides.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::keys::KeyId;
use crate::store::ContentStore;

/// The logical collection the tokenizer writes to unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "codex-data";

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_always_compress() -> bool {
    true
}

/// Static configuration for a protection pipeline.
///
/// ```json
/// { "key_id": "k1", "compress": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Key id used to protect tokens when no override is supplied.
    pub key_id: KeyId,
    /// Append a zlib stage after the tokenizer.
    #[serde(default)]
    pub compress: bool,
    /// Keep compressed output even when it is not smaller than the input.
    #[serde(default = "default_always_compress")]
    pub always_compress: bool,
    /// Content store collection for original payloads.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl CodecConfig {
    pub fn new(key_id: impl Into<KeyId>) -> Self {
        Self {
            key_id: key_id.into(),
            compress: false,
            always_compress: default_always_compress(),
            collection: default_collection(),
        }
    }

    /// Load configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, CodecError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_always_compress(mut self, always: bool) -> Self {
        self.always_compress = always;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Reject configurations no pipeline could run with.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.key_id.is_empty() {
            return Err(CodecError::InvalidPipeline("empty key id".into()));
        }
        if self.collection.is_empty() {
            return Err(CodecError::InvalidPipeline("empty collection".into()));
        }
        Ok(())
    }
}

/// Overrides scoped to one logical unit of work.
///
/// Passed explicitly to assembly; any field left `None` falls back to the
/// configured default.
#[derive(Clone, Default)]
pub struct CodecContext {
    pub key_id: Option<KeyId>,
    pub store: Option<Arc<dyn ContentStore>>,
}

impl std::fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecContext")
            .field("key_id", &self.key_id)
            .field("store", &self.store.as_ref().map(|_| ".."))
            .finish()
    }
}

impl CodecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_id(mut self, key_id: impl Into<KeyId>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_fields_absent() {
        let config = CodecConfig::from_json_str(r#"{ "key_id": "k1" }"#).unwrap();
        assert_eq!(config, CodecConfig::new("k1"));
        assert!(!config.compress);
        assert!(config.always_compress);
        assert_eq!(config.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_explicit_fields_override_defaults() {
        let config = CodecConfig::from_json_str(
            r#"{ "key_id": "k2", "compress": true, "always_compress": false, "collection": "audit" }"#,
        )
        .unwrap();
        assert!(config.compress);
        assert!(!config.always_compress);
        assert_eq!(config.collection, "audit");
    }

    #[test]
    fn test_missing_or_empty_key_id_rejected() {
        assert!(matches!(CodecConfig::from_json_str("{}"), Err(CodecError::Decode(_))));
        assert!(matches!(
            CodecConfig::from_json_str(r#"{ "key_id": "" }"#),
            Err(CodecError::InvalidPipeline(_))
        ));
    }
}
