//! Core data types for the account system

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keys;
use crate::Result;

/// A keypair carried as prefixed strings (e.g. `"ed25519:base64..."`).
///
/// String form is what crosses every serialization boundary; raw bytes are
/// re-derived only at the point of use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct StringKeypair {
    pub public: String,
    pub secret: String,
}

/// Kind of physical device running this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
}

/// Per-device identity and registration record.
///
/// One instance per physical device, created at first login/creation on that
/// device and rewritten whenever the signing identity or schema version
/// changes. Stored encrypted at a fixed local path outside the replicated
/// namespace so device identity never propagates to other devices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device signing identity
    pub key_pair: StringKeypair,

    /// Unique device identifier
    pub device_id: String,

    /// Kind of device
    pub device_type: DeviceType,

    /// Certificate issued by the account service binding this device to the
    /// account. Absent until first registration.
    pub server_sig: Option<String>,

    /// Drive schema version this device last migrated to. Absent on legacy
    /// devices that predate versioning.
    pub drive_version: Option<String>,

    /// Public key the drive announces under when syncing
    pub drive_syncing_public_key: String,
}

/// The account's full identity document, stored in the drive's `account`
/// collection.
///
/// Created once at account creation; mutated only to backfill a missing
/// signing keypair; never deleted except on local account removal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Unique account identifier
    pub uid: String,

    /// Asymmetric box keypair for sealed payload exchange
    pub secret_box_keypair: StringKeypair,

    /// Account signing keypair. Absent on legacy accounts; backfilled by the
    /// login flow.
    pub signing_keypair: Option<StringKeypair>,

    /// Symmetric drive-encryption key, hex encoded
    pub drive_encryption_key: String,

    /// Public key the drive announces under when syncing
    pub drive_syncing_public_key: String,

    /// BIP-39 recovery phrase
    pub mnemonic: String,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

/// Payload of the vault file, sealed under the master password.
///
/// Knowledge of the password alone recovers the symmetric key needed to open
/// the drive.
#[derive(Clone, Debug, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct VaultPayload {
    /// Symmetric drive-encryption key, hex encoded
    pub drive_encryption_key: String,

    /// Account signing keypair, when one existed at sealing time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<StringKeypair>,
}

/// Payload of the recovery file, sealed under the mnemonic.
///
/// The decrypted content is itself the master password, forming the two-tier
/// recovery chain: mnemonic → password → drive key.
#[derive(Clone, Debug, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryPayload {
    pub master_pass: String,
}

/// Auth claims presented to the account service.
///
/// Derived on demand from the account identity and device info, never
/// persisted: recomputed per token request and signed with the device's
/// signing key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Account public box key
    pub account_key: String,

    /// Device signing public key
    pub device_signing_key: String,

    /// Device identifier
    pub device_id: String,

    /// Base64 signature over the claims, by the device signing key
    pub sig: String,
}

impl AuthClaims {
    /// Derive fresh claims for a device of an account.
    pub fn derive(account: &AccountIdentity, device: &DeviceInfo) -> Result<Self> {
        let account_key = account.secret_box_keypair.public.clone();
        let device_signing_key = device.key_pair.public.clone();
        let device_id = device.device_id.clone();

        let message = Self::message(&account_key, &device_signing_key, &device_id);
        let sig = keys::sign_message(&device.key_pair.secret, message.as_bytes())?;

        Ok(Self {
            account_key,
            device_signing_key,
            device_id,
            sig,
        })
    }

    /// Verify the claims signature against the embedded device signing key.
    pub fn verify(&self) -> Result<bool> {
        let message = Self::message(&self.account_key, &self.device_signing_key, &self.device_id);
        keys::verify_message(&self.device_signing_key, message.as_bytes(), &self.sig)
    }

    fn message(account_key: &str, device_signing_key: &str, device_id: &str) -> String {
        format!("{account_key}|{device_signing_key}|{device_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::keys::{generate_box_keypair, generate_signing_keypair};

    fn test_account() -> AccountIdentity {
        AccountIdentity {
            uid: "acct-1".to_string(),
            secret_box_keypair: generate_box_keypair(),
            signing_keypair: Some(generate_signing_keypair()),
            drive_encryption_key: keys::generate_symmetric_key(),
            drive_syncing_public_key: "drive-key".to_string(),
            mnemonic: "abandon ability able".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn test_device() -> DeviceInfo {
        DeviceInfo {
            key_pair: generate_signing_keypair(),
            device_id: "dev-1".to_string(),
            device_type: DeviceType::Desktop,
            server_sig: None,
            drive_version: None,
            drive_syncing_public_key: "drive-key".to_string(),
        }
    }

    #[test]
    fn test_auth_claims_verify() {
        let claims = AuthClaims::derive(&test_account(), &test_device()).unwrap();
        assert!(claims.verify().unwrap());
    }

    #[test]
    fn test_auth_claims_tamper_detected() {
        let mut claims = AuthClaims::derive(&test_account(), &test_device()).unwrap();
        claims.device_id = "dev-2".to_string();
        assert!(!claims.verify().unwrap());
    }

    #[test]
    fn test_vault_payload_optional_keypair() {
        let payload = VaultPayload {
            drive_encryption_key: "abc123".to_string(),
            key_pair: None,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("key_pair").is_none());

        let back: VaultPayload = serde_json::from_value(json).unwrap();
        assert!(back.key_pair.is_none());
    }
}
