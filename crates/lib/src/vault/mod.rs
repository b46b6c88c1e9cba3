//! Vault system for Covault
//!
//! Provides password-based sealing of the account's secret files: the vault
//! (drive encryption key, sealed under the master password), the recovery
//! file (master password, sealed under the mnemonic), and the per-device
//! device-info file.

pub mod cipher;
pub mod errors;
pub mod store;

pub use errors::VaultError;
pub use store::{VaultKind, VaultStore};
