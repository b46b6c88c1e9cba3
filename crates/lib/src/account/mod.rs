//! Account system for Covault
//!
//! Defines the account identity, per-device info, and vault payload types,
//! the signing/box key helpers, and the `AccountManager` facade driving the
//! UI-originated flows (create, login, reset password, sync code, device
//! sync).

pub mod keys;
pub mod manager;
pub mod types;

pub use manager::AccountManager;
pub use types::*;
