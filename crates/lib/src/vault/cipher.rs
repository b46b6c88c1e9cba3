//! Password-based key derivation and authenticated encryption
//!
//! Implements the vault cipher using:
//! - Argon2id for password-to-seed derivation
//! - X25519 for the deterministic box keypair
//! - XChaCha20-Poly1305 for authenticated encryption
//!
//! The keypair derivation is deterministic: equal passwords always yield
//! byte-identical keypairs. This is what lets the recovery chain work without
//! storing any extra state: knowing the password (or mnemonic) is sufficient
//! to re-derive the exact keypair that sealed the file. Each `encrypt` call
//! uses a fresh random nonce, prepended to the ciphertext.

use argon2::Argon2;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::errors::VaultError;
use crate::Result;

/// Seed length for keypair derivation (32 bytes, the X25519 secret size)
pub const SEED_LENGTH: usize = 32;

/// Nonce length for XChaCha20-Poly1305 (24 bytes)
pub const NONCE_LENGTH: usize = 24;

/// Fixed application salt for the deterministic password-to-seed derivation.
/// Changing this value invalidates every stored vault file.
const DERIVATION_SALT: &[u8] = b"covault/vault-cipher/v1";

/// Deterministic X25519 keypair derived from a password.
///
/// The secret half zeroizes on drop via `x25519_dalek::StaticSecret`.
pub struct BoxKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl BoxKeypair {
    /// Get the public key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Compute the symmetric sealing key for the self-box: the X25519 shared
    /// secret of this keypair with itself, hashed to remove curve structure.
    fn sealing_key(&self) -> Zeroizing<[u8; 32]> {
        let shared = self.secret.diffie_hellman(&self.public);
        let digest = Sha256::digest(shared.as_bytes());
        Zeroizing::new(digest.into())
    }
}

/// Derive a deterministic box keypair from a password.
///
/// Hashes the password to a fixed-length seed with Argon2id under a fixed
/// application salt, then uses the seed as the X25519 secret. Pure function:
/// equal inputs always yield byte-identical keypairs; no state, no I/O.
pub fn derive_keypair(password: &str) -> Result<BoxKeypair> {
    let mut seed = Zeroizing::new([0u8; SEED_LENGTH]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), DERIVATION_SALT, seed.as_mut())
        .map_err(|e| VaultError::KeyDerivation {
            reason: e.to_string(),
        })?;

    let secret = StaticSecret::from(*seed);
    let public = PublicKey::from(&secret);

    Ok(BoxKeypair { secret, public })
}

/// Encrypt a payload under a password.
///
/// Derives the keypair from `password` and seals `plaintext` using the
/// keypair as both sender and recipient. The output is `nonce || ciphertext`.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
    let keypair = derive_keypair(password)?;
    let key = keypair.sealing_key();

    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_ref()).map_err(|e| VaultError::Encryption {
            reason: e.to_string(),
        })?;

    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| VaultError::Encryption {
            reason: e.to_string(),
        })?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a payload under a password.
///
/// Fails with `VaultError::Decryption` when authentication fails; a wrong
/// password and corrupted data are indistinguishable; there is no separate
/// integrity check.
pub fn decrypt(ciphertext: &[u8], password: &str) -> Result<Vec<u8>> {
    if ciphertext.len() <= NONCE_LENGTH {
        return Err(VaultError::Decryption.into());
    }

    let keypair = derive_keypair(password)?;
    let key = keypair.sealing_key();

    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_ref()).map_err(|_| VaultError::Decryption)?;

    let (nonce, body) = ciphertext.split_at(NONCE_LENGTH);
    cipher
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| VaultError::Decryption.into())
}
