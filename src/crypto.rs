//! Low-level cryptographic operations.
//!
//! This module and `keys` are the only places that import `ring`. The
//! tokenizer encrypts and decrypts tokens exclusively through the functions
//! exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CodecError;

const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of symmetric key material in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// A nonce generated for a single encryption operation.
/// Newtype to prevent accidental reuse; each `Nonce` is consumed on use.
struct OwnedNonce(Nonce);

fn generate_nonce() -> Result<OwnedNonce, CodecError> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; NONCE_LEN];
    rng.fill(&mut buf).map_err(|_| CodecError::RandomnessFailure)?;
    Ok(OwnedNonce(Nonce::assume_unique_for_key(buf)))
}

fn sealing_key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey, CodecError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CodecError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` with AES-256-GCM.
///
/// The nonce is bundled with the output and extracted again by `decrypt`.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext + GCM tag ]
/// ```
pub fn encrypt(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let key = sealing_key(key_bytes)?;
    let nonce = generate_nonce()?;

    let mut output = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    output.extend_from_slice(nonce.0.as_ref());
    output.extend_from_slice(plaintext);

    let tag = key
        .seal_in_place_separate_tag(nonce.0, aead::Aad::empty(), &mut output[NONCE_LEN..])
        .map_err(|_| CodecError::EncryptionFailure)?;
    output.extend_from_slice(tag.as_ref());

    Ok(output)
}

/// Decrypt bytes produced by `encrypt`.
///
/// A wrong key, a tampered ciphertext, or a truncated buffer all fail the
/// GCM check. The caller receives no partial plaintext.
pub fn decrypt(key_bytes: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(CodecError::DecryptionFailure);
    }

    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
    let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| CodecError::DecryptionFailure)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let key = sealing_key(key_bytes)?;
    let mut buffer = sealed.to_vec();

    let plaintext = key
        .open_in_place(nonce, aead::Aad::empty(), &mut buffer)
        .map_err(|_| CodecError::DecryptionFailure)?;

    Ok(plaintext.to_vec())
}

/// Generate random key material from the system RNG.
pub fn generate_random_key() -> Result<[u8; KEY_LEN], CodecError> {
    let rng = SystemRandom::new();
    let mut key = [0u8; KEY_LEN];
    rng.fill(&mut key).map_err(|_| CodecError::RandomnessFailure)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_LEN];
        let sealed = encrypt(&key, b"token-text").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"token-text".len() + TAG_LEN);
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"token-text");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = [7u8; KEY_LEN];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a, b, "two encryptions of the same plaintext must differ");
    }

    #[test]
    fn test_wrong_key_and_tampering_rejected() {
        let key = [7u8; KEY_LEN];
        let mut sealed = encrypt(&key, b"secret").unwrap();

        assert!(matches!(
            decrypt(&[8u8; KEY_LEN], &sealed),
            Err(CodecError::DecryptionFailure)
        ));

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(decrypt(&key, &sealed), Err(CodecError::DecryptionFailure)));
    }

    #[test]
    fn test_random_keys_are_distinct() {
        let a = generate_random_key().unwrap();
        let b = generate_random_key().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, [0u8; KEY_LEN]);
    }

    #[test]
    fn test_short_input_rejected() {
        let key = [7u8; KEY_LEN];
        assert!(matches!(decrypt(&key, &[0u8; 5]), Err(CodecError::DecryptionFailure)));
    }
}
