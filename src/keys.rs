//! Key material and key resolution.
//!
//! This module owns two responsibilities:
//! 1. Holding symmetric key material in a type that is opaque, non-cloneable,
//!    and zeroised on drop.
//! 2. Mapping a key id to that material through the [`KeyResolver`] seam.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`). HKDF lives here because it operates on key
//! material, not on ciphertexts.

use std::collections::HashMap;
use std::fmt;

use ring::hkdf;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, KEY_LEN};
use crate::error::CodecError;

/// An opaque label selecting which key material protects a token.
pub type KeyId = String;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Raw symmetric key material.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop.
/// - `Debug` never prints the bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Construct key material from raw bytes.
    ///
    /// In production these bytes come from a secrets service. Use
    /// [`crate::generate_key`] for fresh random material.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Construct key material from a slice, rejecting the wrong length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CodecError::InvalidKey)?;
        Ok(Self { bytes })
    }

    /// Borrow the raw key bytes for encrypt/decrypt.
    ///
    /// `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Generate fresh random key material.
pub(crate) fn generate() -> Result<KeyMaterial, CodecError> {
    Ok(KeyMaterial::from_bytes(crypto::generate_random_key()?))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Maps a key id to raw key material.
///
/// Resolution is synchronous from the codec's point of view. Bindings that
/// call out to a secrets service own their own latency and retry policy.
/// Implementations must be safe to call concurrently from many in-flight
/// encode/decode calls.
pub trait KeyResolver: Send + Sync {
    /// Resolve `key_id`, or fail with [`CodecError::UnknownKeyId`].
    fn resolve(&self, key_id: &str) -> Result<KeyMaterial, CodecError>;
}

/// A resolver over a fixed table of key ids.
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: HashMap<KeyId, KeyMaterial>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register material under `key_id`, replacing any previous entry.
    pub fn insert(&mut self, key_id: impl Into<KeyId>, material: KeyMaterial) {
        self.keys.insert(key_id.into(), material);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_key(mut self, key_id: impl Into<KeyId>, material: KeyMaterial) -> Self {
        self.insert(key_id, material);
        self
    }

    /// Returns true if `key_id` is registered.
    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, key_id: &str) -> Result<KeyMaterial, CodecError> {
        self.keys
            .get(key_id)
            .map(|material| KeyMaterial::from_bytes(*material.as_bytes()))
            .ok_or_else(|| CodecError::UnknownKeyId(key_id.to_string()))
    }
}

/// A resolver that derives material for any key id from one master key.
///
/// ```text
/// HKDF-SHA256(
///     ikm  = master_key,
///     salt = None,
///     info = "tokenvault:key:{key_id}"
/// )
/// ```
///
/// Each key id produces a statistically independent key. Knowing one
/// derived key reveals nothing about the master key or any other id's key.
/// An allow-list can restrict which ids resolve at all.
pub struct DerivedKeyResolver {
    master: KeyMaterial,
    allowed: Option<Vec<KeyId>>,
}

impl DerivedKeyResolver {
    /// Derive for every key id.
    pub fn new(master: KeyMaterial) -> Self {
        Self { master, allowed: None }
    }

    /// Derive only for the listed key ids; all others are unknown.
    pub fn restricted<I, S>(master: KeyMaterial, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<KeyId>,
    {
        Self {
            master,
            allowed: Some(allowed.into_iter().map(Into::into).collect()),
        }
    }

    fn permits(&self, key_id: &str) -> bool {
        match &self.allowed {
            Some(ids) => ids.iter().any(|id| id == key_id),
            None => !key_id.is_empty(),
        }
    }
}

impl KeyResolver for DerivedKeyResolver {
    fn resolve(&self, key_id: &str) -> Result<KeyMaterial, CodecError> {
        if !self.permits(key_id) {
            return Err(CodecError::UnknownKeyId(key_id.to_string()));
        }
        derive_key(&self.master, key_id)
    }
}

fn derive_key(master: &KeyMaterial, key_id: &str) -> Result<KeyMaterial, CodecError> {
    let info = format!("tokenvault:key:{}", key_id);

    // An empty salt is treated by HKDF as a zero-filled salt of hash length.
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(master.as_bytes());

    let info_slices = [info.as_bytes()];
    let okm = prk
        .expand(&info_slices, hkdf::HKDF_SHA256)
        .map_err(|_| CodecError::InvalidKey)?;

    let mut derived = [0u8; KEY_LEN];
    okm.fill(&mut derived).map_err(|_| CodecError::InvalidKey)?;

    let material = KeyMaterial::from_bytes(derived);
    derived.zeroize();
    Ok(material)
}
