//! Vault store and recovery-chain tests.

use covault::account::DeviceType;

use crate::helpers::TestEnv;

#[tokio::test]
async fn test_reset_password_reseals_the_chain() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account("alice@covault.test", "old-pass", DeviceType::Desktop)
        .await
        .unwrap();
    let mnemonic = ctx.account.mnemonic.clone();
    ctx.close().await.unwrap();

    manager
        .reset_password("alice@covault.test", "old-pass", "new-pass")
        .await
        .unwrap();

    // New password opens the account, the old one no longer does
    let ctx = manager
        .login("alice@covault.test", "new-pass")
        .await
        .unwrap();
    ctx.close().await.unwrap();

    let err = manager
        .login("alice@covault.test", "old-pass")
        .await
        .unwrap_err();
    assert!(err.is_decryption_error());

    // The unchanged mnemonic now recovers the new master password
    let recovered = manager
        .recover_master_password("alice@covault.test", &mnemonic)
        .await
        .unwrap();
    assert_eq!(recovered, "new-pass");
}

#[tokio::test]
async fn test_reset_password_with_wrong_old_password_fails() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account("alice@covault.test", "old-pass", DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();

    let err = manager
        .reset_password("alice@covault.test", "guess", "new-pass")
        .await
        .unwrap_err();
    assert!(err.is_decryption_error());

    // Nothing was re-sealed
    let ctx = manager
        .login("alice@covault.test", "old-pass")
        .await
        .unwrap();
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_recover_master_password_with_wrong_mnemonic_fails() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account("alice@covault.test", "hunter2", DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();

    let err = manager
        .recover_master_password("alice@covault.test", "wrong words entirely")
        .await
        .unwrap_err();
    assert!(err.is_decryption_error());
}

#[tokio::test]
async fn test_remove_local_account_deletes_local_state_only() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account("alice@covault.test", "hunter2", DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();

    let account_dir = manager.paths("alice@covault.test").account_dir();
    assert!(account_dir.exists());

    manager
        .remove_local_account("alice@covault.test")
        .await
        .unwrap();
    assert!(!account_dir.exists());
}
