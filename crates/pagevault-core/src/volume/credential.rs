//! The credential blob: persisted proof of the volume password and the
//! encrypted content key.
//!
//! Layout (all fields concatenated):
//!
//! ```text
//! log_n (1) | r (1) | p (1) | salt (16) | ciphertext (64)
//! ```
//!
//! where `ciphertext` is `content_key (32) || derived_key (32)` transformed
//! under the derived key. Authentication re-derives the key from the
//! candidate password with the recorded parameters and salt, decrypts, and
//! compares the trailing half against the derivation in constant time; on a
//! match the leading half becomes the volume content key. The content key is
//! random and independent of the password, so a password change never
//! requires re-encrypting stored pages when the key is carried over.

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{derive_key, KdfParams, PageCodec, KEY_LEN, SALT_LEN};
use crate::error::VfsError;
use crate::storage::KEY_CREDENTIAL;

const HEADER_LEN: usize = 3 + SALT_LEN;
const BLOB_LEN: usize = HEADER_LEN + 2 * KEY_LEN;

/// Build a credential blob for `password`, generating a fresh random
/// content key. Returns the blob and the content key.
pub(crate) fn create(
    password: &str,
    params: KdfParams,
) -> Result<(Vec<u8>, Zeroizing<[u8; KEY_LEN]>), VfsError> {
    let mut content_key = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(content_key.as_mut());
    let blob = seal(password, params, &content_key)?;
    Ok((blob, content_key))
}

/// Build a credential blob for `password` around an existing content key.
pub(crate) fn seal(
    password: &str,
    params: KdfParams,
    content_key: &[u8; KEY_LEN],
) -> Result<Vec<u8>, VfsError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let derived = derive_key(password, &salt, params)?;

    let mut plain = Zeroizing::new([0u8; 2 * KEY_LEN]);
    plain[..KEY_LEN].copy_from_slice(content_key);
    plain[KEY_LEN..].copy_from_slice(derived.as_ref());
    let ciphertext = PageCodec::new(*derived).transform(KEY_CREDENTIAL, plain.as_ref());

    let mut blob = Vec::with_capacity(BLOB_LEN);
    blob.push(params.log_n);
    blob.push(params.r);
    blob.push(params.p);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Check `password` against a credential blob.
///
/// Returns the content key on a match and `None` on a mismatch. A malformed
/// blob is an error: it means the stored credential is corrupt, not that the
/// password is wrong.
pub(crate) fn unlock(
    blob: &[u8],
    password: &str,
) -> Result<Option<Zeroizing<[u8; KEY_LEN]>>, VfsError> {
    if blob.len() != BLOB_LEN {
        return Err(VfsError::invalid(format!(
            "credential blob has length {}, expected {BLOB_LEN}",
            blob.len()
        )));
    }
    let params = KdfParams {
        log_n: blob[0],
        r: blob[1],
        p: blob[2],
    };
    let salt = &blob[3..HEADER_LEN];
    let derived = derive_key(password, salt, params)?;

    let plain =
        Zeroizing::new(PageCodec::new(*derived).transform(KEY_CREDENTIAL, &blob[HEADER_LEN..]));
    if plain[KEY_LEN..].ct_eq(derived.as_ref()).into() {
        let mut content_key = Zeroizing::new([0u8; KEY_LEN]);
        content_key.copy_from_slice(&plain[..KEY_LEN]);
        Ok(Some(content_key))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_recovers_the_content_key() {
        let (blob, key) = create("correct horse", KdfParams::fast_insecure()).unwrap();
        let unlocked = unlock(&blob, "correct horse").unwrap().unwrap();
        assert_eq!(*key, *unlocked);
    }

    #[test]
    fn wrong_password_is_a_clean_mismatch() {
        let (blob, _) = create("correct horse", KdfParams::fast_insecure()).unwrap();
        assert!(unlock(&blob, "battery staple").unwrap().is_none());
        assert!(unlock(&blob, "").unwrap().is_none());
    }

    #[test]
    fn seal_carries_an_existing_key_under_a_new_password() {
        let key = [9u8; KEY_LEN];
        let blob = seal("new password", KdfParams::fast_insecure(), &key).unwrap();
        let unlocked = unlock(&blob, "new password").unwrap().unwrap();
        assert_eq!(*unlocked, key);
    }

    #[test]
    fn truncated_blob_is_an_error_not_a_mismatch() {
        let (blob, _) = create("pw", KdfParams::fast_insecure()).unwrap();
        let err = unlock(&blob[..blob.len() - 1], "pw").unwrap_err();
        assert!(matches!(err, VfsError::Invalid { .. }));
    }

    #[test]
    fn blobs_differ_per_creation_even_for_the_same_password() {
        let params = KdfParams::fast_insecure();
        let (a, _) = create("pw", params).unwrap();
        let (b, _) = create("pw", params).unwrap();
        assert_ne!(a, b);
    }
}
