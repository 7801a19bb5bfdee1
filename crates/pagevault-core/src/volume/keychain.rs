//! The secret-record store: a flat map of credentials persisted as one
//! encrypted blob, independent of the file tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VfsError;
use crate::fs::tree::unix_now;
use crate::storage::KEY_KEYCHAIN;
use crate::volume::{lock_volume, Volume};

/// One stored secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    /// Assigned on first save when empty.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub modified_at: i64,
}

/// Secret-record store over a shared volume.
///
/// Records live in a single blob under a reserved storage key, sealed by
/// the same content-key transform as every other volume blob. The store is
/// loaded per call; it is small and has no cache to invalidate.
pub struct KeyChain {
    inner: Arc<Mutex<Volume>>,
}

impl KeyChain {
    pub(crate) fn new(inner: Arc<Mutex<Volume>>) -> Self {
        Self { inner }
    }

    fn load(vol: &Volume) -> Result<HashMap<String, SecretRecord>, VfsError> {
        match vol.get_blob(KEY_KEYCHAIN)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(HashMap::new()),
        }
    }

    fn store(vol: &mut Volume, records: &HashMap<String, SecretRecord>) -> Result<(), VfsError> {
        let blob = serde_json::to_vec(records)?;
        vol.put_blob(KEY_KEYCHAIN, &blob)
    }

    /// Insert or update a record.
    ///
    /// Assigns an id when the record carries none and stamps `modified_at`.
    /// Returns the stored form.
    pub fn save(&self, mut record: SecretRecord) -> Result<SecretRecord, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("keychain_save")?;
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.modified_at = unix_now();
        let mut records = Self::load(&vol)?;
        records.insert(record.id.clone(), record.clone());
        Self::store(&mut vol, &records)?;
        Ok(record)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &str) -> Result<Option<SecretRecord>, VfsError> {
        let vol = lock_volume(&self.inner);
        vol.require_auth("keychain_get")?;
        Ok(Self::load(&vol)?.remove(id))
    }

    /// Delete a record by id. Absent ids are a no-op.
    pub fn delete(&self, id: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("keychain_delete")?;
        let mut records = Self::load(&vol)?;
        if records.remove(id).is_some() {
            Self::store(&mut vol, &records)?;
        }
        Ok(())
    }

    /// All records, sorted by name.
    pub fn list(&self) -> Result<Vec<SecretRecord>, VfsError> {
        let vol = lock_volume(&self.inner);
        vol.require_auth("keychain_list")?;
        let mut records: Vec<SecretRecord> = Self::load(&vol)?.into_values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}
