//! Remote identity/registration service collaborator
//!
//! The account service is the remote authority that registers accounts,
//! issues device certificates, records signing keys, and brokers the
//! short-lived sync codes used to bootstrap new devices. The core consumes it
//! through the `AccountService` trait; `LocalAccountService` is an in-process
//! implementation backed by its own service signing key.

pub mod errors;

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use errors::RemoteError;

use crate::{Result, account::AuthClaims};

/// Everything a new device needs to locate and bootstrap from an existing
/// account's drive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncInfo {
    pub drive_key: String,
    pub peer_pub_key: String,
    pub email: String,
}

/// Remote identity/registration authority.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Register a new account: its public box key, email, and drive key.
    async fn register(&self, account_key: &str, email: &str, drive_key: &str) -> Result<()>;

    /// Issue a short-lived sync code authorizing a new device to bootstrap
    /// from this account's drive.
    async fn create_sync_code(&self, claims: &AuthClaims) -> Result<String>;

    /// Resolve a sync code into the peer drive's coordinates. Consumes the
    /// code.
    async fn get_sync_info(&self, code: &str) -> Result<SyncInfo>;

    /// Register a device with the account, returning the server certificate
    /// binding the device to it.
    async fn register_new_device(&self, claims: &AuthClaims) -> Result<String>;

    /// Record an account signing key.
    async fn register_signing_key(
        &self,
        claims: &AuthClaims,
        signing_public_key: &str,
    ) -> Result<()>;
}

struct AccountRecord {
    email: String,
    drive_key: String,
    device_ids: Vec<String>,
    signing_keys: Vec<String>,
}

/// In-process account service backed by its own Ed25519 service key.
///
/// Device certificates are real signatures over `account_key:device_id`, so
/// anything downstream that checks certificate presence behaves as it would
/// against the real service.
pub struct LocalAccountService {
    service_key: SigningKey,
    accounts: Mutex<HashMap<String, AccountRecord>>,
    sync_codes: Mutex<HashMap<String, SyncInfo>>,
}

impl Default for LocalAccountService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAccountService {
    pub fn new() -> Self {
        Self {
            service_key: SigningKey::generate(&mut OsRng),
            accounts: Mutex::new(HashMap::new()),
            sync_codes: Mutex::new(HashMap::new()),
        }
    }

    fn verify_claims(&self, claims: &AuthClaims) -> Result<()> {
        if !claims.verify()? {
            return Err(RemoteError::InvalidClaims {
                reason: "Signature verification failed".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl AccountService for LocalAccountService {
    async fn register(&self, account_key: &str, email: &str, drive_key: &str) -> Result<()> {
        let mut accounts = self.accounts.lock().expect("accounts poisoned");
        if accounts.contains_key(account_key) {
            return Err(RemoteError::Rejected {
                reason: format!("Account already registered: {email}"),
            }
            .into());
        }

        accounts.insert(
            account_key.to_string(),
            AccountRecord {
                email: email.to_string(),
                drive_key: drive_key.to_string(),
                device_ids: Vec::new(),
                signing_keys: Vec::new(),
            },
        );

        info!(email = %email, "Registered account");
        Ok(())
    }

    async fn create_sync_code(&self, claims: &AuthClaims) -> Result<String> {
        self.verify_claims(claims)?;

        let (email, drive_key) = {
            let accounts = self.accounts.lock().expect("accounts poisoned");
            let record =
                accounts
                    .get(&claims.account_key)
                    .ok_or_else(|| RemoteError::AccountNotFound {
                        account_key: claims.account_key.clone(),
                    })?;
            (record.email.clone(), record.drive_key.clone())
        };

        let mut code_bytes = [0u8; 4];
        OsRng.fill_bytes(&mut code_bytes);
        let code = hex::encode(code_bytes);

        self.sync_codes.lock().expect("sync codes poisoned").insert(
            code.clone(),
            SyncInfo {
                drive_key,
                peer_pub_key: claims.device_signing_key.clone(),
                email,
            },
        );

        Ok(code)
    }

    async fn get_sync_info(&self, code: &str) -> Result<SyncInfo> {
        self.sync_codes
            .lock()
            .expect("sync codes poisoned")
            .remove(code)
            .ok_or_else(|| RemoteError::InvalidSyncCode.into())
    }

    async fn register_new_device(&self, claims: &AuthClaims) -> Result<String> {
        self.verify_claims(claims)?;

        {
            let mut accounts = self.accounts.lock().expect("accounts poisoned");
            let record = accounts.get_mut(&claims.account_key).ok_or_else(|| {
                RemoteError::AccountNotFound {
                    account_key: claims.account_key.clone(),
                }
            })?;
            if !record.device_ids.contains(&claims.device_id) {
                record.device_ids.push(claims.device_id.clone());
            }
        }

        let message = format!("{}:{}", claims.account_key, claims.device_id);
        let signature = self.service_key.sign(message.as_bytes());

        info!(device_id = %claims.device_id, "Registered device");
        Ok(Base64::encode_string(&signature.to_bytes()))
    }

    async fn register_signing_key(
        &self,
        claims: &AuthClaims,
        signing_public_key: &str,
    ) -> Result<()> {
        self.verify_claims(claims)?;

        let mut accounts = self.accounts.lock().expect("accounts poisoned");
        let record =
            accounts
                .get_mut(&claims.account_key)
                .ok_or_else(|| RemoteError::AccountNotFound {
                    account_key: claims.account_key.clone(),
                })?;
        if !record.signing_keys.contains(&signing_public_key.to_string()) {
            record.signing_keys.push(signing_public_key.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountIdentity, DeviceInfo, DeviceType, keys};

    fn fixture() -> (AccountIdentity, DeviceInfo) {
        let account = AccountIdentity {
            uid: "acct-1".to_string(),
            secret_box_keypair: keys::generate_box_keypair(),
            signing_keypair: Some(keys::generate_signing_keypair()),
            drive_encryption_key: keys::generate_symmetric_key(),
            drive_syncing_public_key: "drive-key".to_string(),
            mnemonic: "abandon".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let device = DeviceInfo {
            key_pair: keys::generate_signing_keypair(),
            device_id: "dev-1".to_string(),
            device_type: DeviceType::Desktop,
            server_sig: None,
            drive_version: None,
            drive_syncing_public_key: "drive-key".to_string(),
        };
        (account, device)
    }

    #[tokio::test]
    async fn test_sync_code_round_trip_and_single_use() {
        let service = LocalAccountService::new();
        let (account, device) = fixture();

        service
            .register(
                &account.secret_box_keypair.public,
                "alice@covault.test",
                "drive-key",
            )
            .await
            .unwrap();

        let claims = AuthClaims::derive(&account, &device).unwrap();
        let code = service.create_sync_code(&claims).await.unwrap();

        let info = service.get_sync_info(&code).await.unwrap();
        assert_eq!(info.drive_key, "drive-key");
        assert_eq!(info.email, "alice@covault.test");

        // Codes are single-use
        let err = service.get_sync_info(&code).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Remote(RemoteError::InvalidSyncCode)
        ));
    }

    #[tokio::test]
    async fn test_tampered_claims_rejected() {
        let service = LocalAccountService::new();
        let (account, device) = fixture();

        service
            .register(&account.secret_box_keypair.public, "a@b.c", "drive-key")
            .await
            .unwrap();

        let mut claims = AuthClaims::derive(&account, &device).unwrap();
        claims.device_id = "forged".to_string();

        let err = service.register_new_device(&claims).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Remote(RemoteError::InvalidClaims { .. })
        ));
    }
}
