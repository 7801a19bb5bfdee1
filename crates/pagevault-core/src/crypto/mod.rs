//! Symmetric page transform and password-based key derivation.
//!
//! The directory tree, the configuration, the keychain, and each content
//! page all go through the same [`PageCodec::transform`] before they reach
//! storage. The transform is AES-256-CTR keyed by the
//! volume content key with the IV derived from the blob's storage key, so
//! it is an involution: applying it twice restores the plaintext, and the
//! same call serves for both encryption and decryption.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use ring::digest;
use thiserror::Error;
use tracing::trace;
use zeroize::Zeroizing;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Length of the volume content key and of the derived password key.
pub const KEY_LEN: usize = 32;
/// Length of the KDF salt stored in the credential blob.
pub const SALT_LEN: usize = 16;

/// Errors that can occur during key derivation or codec construction.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The scrypt cost parameters are invalid.
    ///
    /// This indicates a corrupted credential blob or a programming error;
    /// parameters produced by [`KdfParams`] constructors are always valid.
    #[error("invalid scrypt parameters: {0}")]
    InvalidKdfParams(String),

    /// Key derivation failed, typically from an output-length mismatch.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

/// Scrypt cost parameters, recorded verbatim inside the credential blob so
/// that authentication re-derives with exactly the parameters the password
/// was set with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost parameter N.
    pub log_n: u8,
    /// Block size parameter.
    pub r: u8,
    /// Parallelization parameter.
    pub p: u8,
}

impl Default for KdfParams {
    fn default() -> Self {
        // N = 2^15, the cost commonly used for interactive vault unlock.
        Self { log_n: 15, r: 8, p: 1 }
    }
}

impl KdfParams {
    /// Weak parameters (N = 2^10) for tests that exercise the password
    /// machinery without paying the full derivation cost.
    ///
    /// Never use these for a real volume.
    #[must_use]
    pub fn fast_insecure() -> Self {
        Self { log_n: 10, r: 8, p: 1 }
    }
}

/// Derive a symmetric key from a password via scrypt.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let scrypt_params = scrypt::Params::new(
        params.log_n,
        u32::from(params.r),
        u32::from(params.p),
        KEY_LEN,
    )
    .map_err(|e| CryptoError::InvalidKdfParams(e.to_string()))?;

    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, out.as_mut())
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(out)
}

/// Applies the reversible symmetric transform to byte buffers.
///
/// The codec is a pure function of its inputs: it returns a fresh buffer
/// rather than mutating in place, so a caller can keep reading the original
/// bytes after transforming them.
pub struct PageCodec {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl PageCodec {
    #[must_use]
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Encrypt or decrypt `data`; the transform is its own inverse.
    ///
    /// `seed` is the blob's storage key; the CTR IV is the leading half of
    /// its SHA-256 digest, so every stored blob consumes a distinct
    /// keystream under the shared content key.
    #[must_use]
    pub fn transform(&self, seed: &str, data: &[u8]) -> Vec<u8> {
        trace!(seed, len = data.len(), "applying page transform");
        let mut iv = [0u8; 16];
        let digest = digest::digest(&digest::SHA256, seed.as_bytes());
        iv.copy_from_slice(&digest.as_ref()[..16]);

        let mut buf = data.to_vec();
        let mut cipher = Aes256Ctr::new((&*self.key).into(), (&iv).into());
        cipher.apply_keystream(&mut buf);
        buf
    }
}

impl fmt::Debug for PageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCodec")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
