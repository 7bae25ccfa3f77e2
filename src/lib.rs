//! # tokenvault
//!
//! A payload protection codec that never puts content on the wire.
//!
//! Outbound, each structured payload is written to a content store under a
//! fresh random token, and only that token, encrypted with AES-256-GCM,
//! leaves the process. Inbound, the token is decrypted and the original
//! content fetched back. Payloads that were never protected pass through.
//!
//! Stages compose into a [`Pipeline`] whose placement rules are checked at
//! assembly: the tokenizer always runs closest to the content, so optional
//! compression only ever sees token ciphertext.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenvault::{
//!     generate_key, CodecConfig, MemoryStore, Payload, PipelineAssembler, StaticKeyResolver,
//! };
//!
//! # fn main() -> Result<(), tokenvault::CodecError> {
//! let resolver = StaticKeyResolver::new().with_key("k1", generate_key()?);
//! let assembler = PipelineAssembler::new(
//!     CodecConfig::new("k1").with_compression(true),
//!     Arc::new(resolver),
//!     Arc::new(MemoryStore::new()),
//! )?;
//! let pipeline = assembler.assemble()?;
//!
//! let wire = pipeline.encode(vec![Payload::json(&serde_json::json!({"user": "alice"}))?])?;
//! let restored = pipeline.decode(wire)?;
//! assert_eq!(restored[0].to_value()?["user"], "alice");
//! # Ok(())
//! # }
//! ```

pub(crate) mod crypto;
pub mod audit;
pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod keys;
pub mod payload;
pub mod pipeline;
pub mod store;
pub mod tokenizer;

pub use codec::{PayloadCodec, StageRole};
pub use compression::ZlibCodec;
pub use config::{CodecConfig, CodecContext};
pub use error::{CodecError, ErrorKind};
pub use keys::{DerivedKeyResolver, KeyId, KeyMaterial, KeyResolver, StaticKeyResolver};
pub use payload::Payload;
pub use pipeline::{Pipeline, PipelineAssembler, PipelineBuilder};
pub use store::{ContentStore, DirectoryStore, MemoryStore, Record, StoreError};
pub use tokenizer::{Token, TokenizingCodec};

/// Generate cryptographically secure key material.
///
/// In production, key material should come from a secrets service behind a
/// [`KeyResolver`]; this is for tests, demos, and master keys for
/// [`DerivedKeyResolver`].
pub fn generate_key() -> Result<KeyMaterial, CodecError> {
    keys::generate()
}
