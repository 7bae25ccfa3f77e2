//! The tokenizing codec.
//!
//! Outbound, each payload's structured content is moved into the content
//! store under a fresh random token, and only the encrypted token travels:
//!
//! ```text
//! content ──▶ store.insert({..content, _id: token}) ──▶ encrypt(token) ──▶ wire
//! ```
//!
//! Inbound reverses it:
//!
//! ```text
//! wire ──▶ decrypt ──▶ token ──▶ store.retrieve(token) ──▶ content
//! ```
//!
//! Payloads that do not carry the protected marker pass through decode
//! untouched, without touching the store or the key resolver.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditTrail, Operation};
use crate::codec::{map_batch, PayloadCodec, StageRole};
use crate::config::{CodecConfig, CodecContext, DEFAULT_COLLECTION};
use crate::crypto;
use crate::error::CodecError;
use crate::keys::{KeyId, KeyResolver};
use crate::payload::{
    Payload, ENCODING_JSON, ENCODING_PROTECTED, METADATA_ENCODING, METADATA_KEY_ID,
};
use crate::store::{ContentStore, IDENTITY_FIELD};

/// A random handle standing in for a payload's content on the wire.
///
/// Generated fresh for every payload; never derived from content, so equal
/// payloads still get distinct tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(Uuid);

impl Token {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form recovered from a decrypted payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::MalformedToken)?;
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|_| CodecError::MalformedToken)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Stores payload content externally and emits an encrypted token instead.
#[derive(Clone)]
pub struct TokenizingCodec {
    key_id: KeyId,
    collection: String,
    resolver: Arc<dyn KeyResolver>,
    store: Arc<dyn ContentStore>,
    audit: Option<Arc<AuditTrail>>,
}

impl fmt::Debug for TokenizingCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizingCodec")
            .field("key_id", &self.key_id)
            .field("collection", &self.collection)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl TokenizingCodec {
    /// Protect with `key_id`, writing to the default collection.
    pub fn new(
        key_id: impl Into<KeyId>,
        resolver: Arc<dyn KeyResolver>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            resolver,
            store,
            audit: None,
        }
    }

    /// Build from configuration.
    pub fn from_config(
        config: &CodecConfig,
        resolver: Arc<dyn KeyResolver>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self::new(config.key_id.clone(), resolver, store).with_collection(config.collection.clone())
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Report every issued and redeemed token to `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// A copy of this codec with `ctx`'s overrides applied.
    pub fn with_context(&self, ctx: &CodecContext) -> Self {
        let mut codec = self.clone();
        if let Some(key_id) = &ctx.key_id {
            codec.key_id = key_id.clone();
        }
        if let Some(store) = &ctx.store {
            codec.store = Arc::clone(store);
        }
        codec
    }

    /// The key id used for outbound payloads.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn record(&self, token: &Token, key_id: &str, operation: Operation) {
        if let Some(audit) = &self.audit {
            audit.append(AuditRecord {
                token: token.to_string(),
                key_id: key_id.to_string(),
                collection: self.collection.clone(),
                operation,
                timestamp: Utc::now(),
            });
        }
    }

    fn encode_one(&self, payload: &Payload) -> Result<Payload, CodecError> {
        let mut record = match serde_json::from_slice::<Value>(&payload.data)? {
            Value::Object(map) => map,
            _ => return Err(CodecError::NotAnObject),
        };
        if record.contains_key(IDENTITY_FIELD) {
            return Err(CodecError::ReservedField(IDENTITY_FIELD));
        }

        let token = Token::generate();
        let token_text = token.to_string();
        record.insert(IDENTITY_FIELD.to_string(), Value::String(token_text.clone()));
        self.store.insert(&self.collection, &record)?;

        let key = self.resolver.resolve(&self.key_id)?;
        let ciphertext = crypto::encrypt(key.as_bytes(), token_text.as_bytes())?;

        self.record(&token, &self.key_id, Operation::Tokenized);
        trace!(key_id = %self.key_id, "Payload tokenized");

        Ok(Payload::new(ciphertext)
            .with_metadata(METADATA_ENCODING, ENCODING_PROTECTED)
            .with_metadata(METADATA_KEY_ID, self.key_id.as_bytes()))
    }

    fn decode_one(&self, payload: Payload) -> Result<Payload, CodecError> {
        if !payload.is_protected() {
            trace!("Payload passed through");
            return Ok(payload);
        }

        let key_id = payload.key_id().ok_or(CodecError::MissingKeyId)?;
        let key_id = std::str::from_utf8(key_id)
            .map_err(|_| CodecError::UnknownKeyId(String::from_utf8_lossy(key_id).into_owned()))?;

        let key = self.resolver.resolve(key_id)?;
        let plaintext = crypto::decrypt(key.as_bytes(), &payload.data)?;
        let token = Token::parse(&plaintext)?;

        let mut record = self.store.retrieve(&self.collection, &token.to_string())?;
        record.remove(IDENTITY_FIELD);
        let data = serde_json::to_vec(&record)?;

        self.record(&token, key_id, Operation::Redeemed);
        trace!(key_id, "Payload redeemed");

        Ok(Payload::new(data).with_metadata(METADATA_ENCODING, ENCODING_JSON))
    }
}

impl PayloadCodec for TokenizingCodec {
    fn name(&self) -> &'static str {
        "tokenizer"
    }

    fn role(&self) -> StageRole {
        StageRole::Tokenizer
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_batch(self.name(), "encode", payloads, |p| self.encode_one(&p))
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_batch(self.name(), "decode", payloads, |p| self.decode_one(p))
    }
}
