//! The secret-record store.

mod common;

use common::{encrypted_fs, open_fs, plain_fs};
use pagevault_core::{SecretRecord, VfsError};

fn record(name: &str) -> SecretRecord {
    SecretRecord {
        id: String::new(),
        name: name.into(),
        account: format!("{name}@example.com"),
        password: "hunter2".into(),
        modified_at: 0,
    }
}

#[test]
fn save_assigns_an_id_and_timestamp() {
    let (fs, _) = plain_fs();
    let kc = fs.keychain();
    let saved = kc.save(record("mail")).unwrap();
    assert!(!saved.id.is_empty());
    assert!(saved.modified_at > 0);
    assert_eq!(kc.get(&saved.id).unwrap().unwrap(), saved);
}

#[test]
fn saving_with_an_existing_id_updates_in_place() {
    let (fs, _) = plain_fs();
    let kc = fs.keychain();
    let mut saved = kc.save(record("mail")).unwrap();
    saved.password = "rotated".into();
    let updated = kc.save(saved.clone()).unwrap();
    assert_eq!(updated.id, saved.id);
    assert_eq!(kc.list().unwrap().len(), 1);
    assert_eq!(kc.get(&saved.id).unwrap().unwrap().password, "rotated");
}

#[test]
fn delete_is_a_no_op_for_unknown_ids() {
    let (fs, _) = plain_fs();
    let kc = fs.keychain();
    kc.delete("ghost").unwrap();

    let saved = kc.save(record("mail")).unwrap();
    kc.delete(&saved.id).unwrap();
    assert!(kc.get(&saved.id).unwrap().is_none());
    kc.delete(&saved.id).unwrap();
}

#[test]
fn list_sorts_by_name() {
    let (fs, _) = plain_fs();
    let kc = fs.keychain();
    kc.save(record("charlie")).unwrap();
    kc.save(record("alice")).unwrap();
    kc.save(record("bob")).unwrap();
    let names: Vec<String> = kc.list().unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["alice", "bob", "charlie"]);
}

#[test]
fn records_survive_reopen_behind_the_password() {
    let (fs, storage) = encrypted_fs("pw");
    let saved = fs.keychain().save(record("bank")).unwrap();
    drop(fs);

    let fs = open_fs(storage);
    assert!(matches!(
        fs.keychain().list(),
        Err(VfsError::Permission { .. })
    ));
    assert!(fs.auth("pw").unwrap());
    assert_eq!(fs.keychain().list().unwrap(), vec![saved]);
}
