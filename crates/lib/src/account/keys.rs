//! Key formatting and signing helpers
//!
//! Keys cross serialization boundaries as prefixed strings
//! (e.g. `"ed25519:base64..."`), following the algorithm-prefixed format so a
//! stored key is self-describing.

use base64ct::{Base64, Encoding};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use super::types::StringKeypair;
use crate::{Result, vault::VaultError};

/// Size of Ed25519 and X25519 keys in bytes
pub const KEY_SIZE: usize = 32;

/// Generate a fresh Ed25519 signing keypair, formatted as prefixed strings.
pub fn generate_signing_keypair() -> StringKeypair {
    let signing = SigningKey::generate(&mut OsRng);
    StringKeypair {
        public: format_key("ed25519", signing.verifying_key().as_bytes()),
        secret: format_key("ed25519", &signing.to_bytes()),
    }
}

/// Generate a fresh X25519 box keypair, formatted as prefixed strings.
pub fn generate_box_keypair() -> StringKeypair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    StringKeypair {
        public: format_key("x25519", public.as_bytes()),
        secret: format_key("x25519", &secret.to_bytes()),
    }
}

/// Generate a random 32-byte symmetric key, hex encoded.
pub fn generate_symmetric_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

/// Format key bytes as a prefixed string (e.g. `"ed25519:base64..."`).
pub fn format_key(algorithm: &str, bytes: &[u8]) -> String {
    let encoded = Base64::encode_string(bytes);
    format!("{algorithm}:{encoded}")
}

/// Parse a prefixed key string back into its raw 32 bytes, checking the
/// algorithm prefix.
pub fn parse_key(formatted: &str, expected_algorithm: &str) -> Result<[u8; KEY_SIZE]> {
    let (prefix, data) = formatted
        .split_once(':')
        .ok_or_else(|| VaultError::MalformedPayload {
            reason: "Expected 'algorithm:key' format".to_string(),
        })?;

    if prefix != expected_algorithm {
        return Err(VaultError::MalformedPayload {
            reason: format!("Expected '{expected_algorithm}' key, got '{prefix}'"),
        }
        .into());
    }

    let bytes = Base64::decode_vec(data).map_err(|e| VaultError::MalformedPayload {
        reason: format!("Invalid base64 for key: {e}"),
    })?;

    bytes
        .try_into()
        .map_err(|v: Vec<u8>| {
            VaultError::MalformedPayload {
                reason: format!("Key must be {KEY_SIZE} bytes, got {}", v.len()),
            }
            .into()
        })
}

/// Sign a message with a prefixed-string Ed25519 secret key, returning a
/// base64 signature.
pub fn sign_message(secret: &str, message: &[u8]) -> Result<String> {
    let bytes = parse_key(secret, "ed25519")?;
    let signing = SigningKey::from_bytes(&bytes);
    let signature = signing.sign(message);
    Ok(Base64::encode_string(&signature.to_bytes()))
}

/// Verify a base64 signature over a message with a prefixed-string Ed25519
/// public key.
pub fn verify_message(public: &str, message: &[u8], signature: &str) -> Result<bool> {
    let key_bytes = parse_key(public, "ed25519")?;
    let verifying =
        VerifyingKey::from_bytes(&key_bytes).map_err(|e| VaultError::MalformedPayload {
            reason: format!("Invalid verifying key: {e}"),
        })?;

    let sig_bytes = Base64::decode_vec(signature).map_err(|e| VaultError::MalformedPayload {
        reason: format!("Invalid base64 for signature: {e}"),
    })?;
    let sig_array: [u8; 64] = match sig_bytes.try_into() {
        Ok(arr) => arr,
        Err(_) => return Ok(false),
    };

    Ok(verifying
        .verify(message, &Signature::from_bytes(&sig_array))
        .is_ok())
}

/// Generate a 24-word BIP-39 recovery mnemonic from fresh entropy.
pub fn generate_mnemonic() -> Result<String> {
    let mut entropy = [0u8; 32];
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = bip39::Mnemonic::from_entropy_in(bip39::Language::English, &entropy).map_err(
        |e| VaultError::KeyDerivation {
            reason: format!("Mnemonic generation failed: {e}"),
        },
    )?;

    Ok(mnemonic.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format_round_trip() {
        let keypair = generate_signing_keypair();

        let bytes = parse_key(&keypair.public, "ed25519").unwrap();
        assert_eq!(format_key("ed25519", &bytes), keypair.public);
    }

    #[test]
    fn test_parse_key_rejects_wrong_algorithm() {
        let keypair = generate_box_keypair();
        assert!(parse_key(&keypair.public, "ed25519").is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = generate_signing_keypair();
        let sig = sign_message(&keypair.secret, b"claims").unwrap();

        assert!(verify_message(&keypair.public, b"claims", &sig).unwrap());
        assert!(!verify_message(&keypair.public, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_mnemonic_has_24_words() {
        let mnemonic = generate_mnemonic().unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 24);
    }
}
