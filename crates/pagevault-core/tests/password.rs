//! Credential lifecycle: set, authenticate, change.

mod common;

use common::{encrypted_fs, open_fs, pattern, plain_fs, PAGE};
use pagevault_core::crypto::KdfParams;
use pagevault_core::{SecretRecord, Storage, VfsError};

#[test]
fn password_round_trip_across_reopen() {
    let (fs, storage) = encrypted_fs("correct horse");
    fs.mkdir("/docs").unwrap();
    fs.write("/docs/a.txt", b"alpha").unwrap();
    drop(fs);

    let fs = open_fs(storage);
    assert!(!fs.auth_passed());
    assert!(!fs.auth("wrong").unwrap());
    assert!(!fs.auth_passed());
    assert!(!fs.auth("").unwrap());
    assert!(!fs.auth_passed());

    assert!(fs.auth("correct horse").unwrap());
    assert!(fs.auth_passed());
    assert_eq!(fs.read("/docs/a.txt").unwrap(), b"alpha");
    assert!(fs.stat("/docs").unwrap().is_directory);
}

#[test]
fn set_password_twice_is_rejected() {
    let (fs, _) = encrypted_fs("one");
    assert!(matches!(
        fs.set_password_with_kdf("two", KdfParams::fast_insecure()),
        Err(VfsError::Invalid { .. })
    ));
}

#[test]
fn empty_password_is_rejected() {
    let (fs, _) = plain_fs();
    assert!(matches!(fs.set_password(""), Err(VfsError::Invalid { .. })));
}

#[test]
fn auth_on_an_unencrypted_volume_is_false_but_harmless() {
    let (fs, _) = plain_fs();
    assert!(fs.auth_passed());
    assert!(!fs.auth("anything").unwrap());
    assert!(fs.auth_passed());
}

#[test]
fn change_password_keeps_stored_content_readable() {
    let (fs, storage) = encrypted_fs("old pw");
    let data = pattern(5000);
    fs.write("/f.bin", &data).unwrap();
    fs.change_password_with_kdf("old pw", "new pw", KdfParams::fast_insecure())
        .unwrap();
    drop(fs);

    let fs = open_fs(storage);
    assert!(!fs.auth("old pw").unwrap());
    assert!(fs.auth("new pw").unwrap());
    assert_eq!(fs.read("/f.bin").unwrap(), data);
}

#[test]
fn change_password_requires_the_old_password() {
    let (fs, _) = encrypted_fs("right");
    assert!(matches!(
        fs.change_password_with_kdf("wrong", "next", KdfParams::fast_insecure()),
        Err(VfsError::Permission { .. })
    ));
}

#[test]
fn change_password_rejects_an_empty_replacement() {
    let (fs, _) = encrypted_fs("pw");
    assert!(matches!(
        fs.change_password_with_kdf("pw", "", KdfParams::fast_insecure()),
        Err(VfsError::Invalid { .. })
    ));
}

#[test]
fn protecting_an_existing_volume_seals_prior_state() {
    // Tree, content pages, and keychain written before set_password are all
    // re-sealed under the new key and stay readable after unlock.
    let (fs, storage) = plain_fs();
    fs.mkdir("/old").unwrap();
    let data = pattern(2 * PAGE as usize + 33);
    fs.write("/old/data.bin", &data).unwrap();
    let secret = fs
        .keychain()
        .save(SecretRecord {
            id: String::new(),
            name: "mail".into(),
            account: "me@example.com".into(),
            password: "hunter2".into(),
            modified_at: 0,
        })
        .unwrap();

    fs.set_password_with_kdf("pw", KdfParams::fast_insecure())
        .unwrap();

    // The stored page bytes are ciphertext now.
    let first_page = fs.stat("/old/data.bin").unwrap().pages[0].clone();
    assert_ne!(
        storage.get(&first_page).unwrap().as_slice(),
        &data[..PAGE as usize]
    );
    drop(fs);

    let fs = open_fs(storage);
    assert!(fs.auth("pw").unwrap());
    assert!(fs.stat("/old").unwrap().is_directory);
    assert_eq!(fs.read("/old/data.bin").unwrap(), data);
    assert_eq!(fs.keychain().list().unwrap(), vec![secret]);
}
