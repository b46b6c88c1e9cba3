//! Constants used throughout the Covault library.
//!
//! This module provides central definitions for fixed file paths, collection
//! names, and the current drive schema version.

/// Drive-relative path of the vault file (sealed under the master password).
pub const VAULT_PATH: &str = "/vault";

/// Drive-relative path of the recovery file (sealed under the mnemonic).
pub const RECOVERY_PATH: &str = "/recovery";

/// File name of the encrypted per-device info file, stored in the local
/// account directory outside the replicated namespace.
pub const DEVICE_INFO_FILE: &str = "device_info";

/// File name of the local flag marking that this device has seen the vault
/// after a fresh device sync.
pub const VAULT_SEEN_FILE: &str = "vault_seen";

/// Current drive schema version. Device info carrying any other value (or
/// none) triggers the legacy migration pass on login.
pub const DRIVE_VERSION: &str = "2.0";

/// Collection holding the single account document.
pub const ACCOUNT_COLLECTION: &str = "account";

/// Collection holding mailbox records.
pub const MAILBOX_COLLECTION: &str = "mailbox";

/// Collection holding folder records.
pub const FOLDER_COLLECTION: &str = "folder";

/// Collection holding file-metadata records for the drive file namespace.
pub const FILE_COLLECTION: &str = "file";

/// Baseline collections polled during device sync as a coarse heuristic for
/// "initial data has replicated".
pub const BASELINE_COLLECTIONS: [&str; 3] =
    [ACCOUNT_COLLECTION, MAILBOX_COLLECTION, FOLDER_COLLECTION];

/// Path prefix under which email message files live in the drive namespace.
pub const EMAIL_PATH_PREFIX: &str = "/email/";
