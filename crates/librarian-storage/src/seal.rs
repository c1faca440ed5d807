//! Password sealing of archive entries.
//!
//! A sealed entry is `MAGIC | version | kdf params | salt | nonce | ciphertext`:
//! AES-256-GCM under a key derived from the library password with Argon2id.
//! The params are the three cost values as little-endian `u32`s. Opening always
//! uses the params stored in the entry; configured params only apply to new
//! seals. Entries written without a password are plain JSON, which can never
//! start with the magic.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use librarian_core::Password;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Leading bytes of every sealed entry.
pub const SEALED_MAGIC: &[u8; 6] = b"LBSEAL";
/// Header layout written by [`Sealer::seal`].
pub const SEAL_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const PARAMS_LEN: usize = 12;
/// Upper bound on the memory cost accepted from an entry header (4 GiB).
const MAX_MEMORY_COST: u32 = 4 * 1024 * 1024;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Balanced for desktop use, roughly half a second per derivation.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Cheapest accepted setting. Meant for tests and very small devices.
    pub fn minimal() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn to_bytes(self) -> [u8; PARAMS_LEN] {
        let mut bytes = [0u8; PARAMS_LEN];
        bytes[0..4].copy_from_slice(&self.memory_cost.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.time_cost.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.parallelism.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; PARAMS_LEN]) -> Self {
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Self {
            memory_cost: word(0),
            time_cost: word(4),
            parallelism: word(8),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    /// The entry is sealed and no password was supplied.
    #[error("entry is encrypted and requires a password")]
    PasswordRequired,
    /// Authentication failed: wrong password (or tampered entry).
    #[error("bad password for encrypted entry")]
    BadPassword,
    #[error("malformed sealed entry: {0}")]
    Malformed(String),
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("cipher failure: {0}")]
    Cipher(String),
}

impl SealError {
    /// True when the failure is down to the password rather than the data.
    pub fn is_password_failure(&self) -> bool {
        matches!(self, Self::PasswordRequired | Self::BadPassword)
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey {
    #[zeroize(skip)]
    params: KdfParams,
    salt: [u8; SALT_LEN],
    bytes: [u8; KEY_LEN],
}

/// Seals and unseals entries for one password. The derived key is cached per
/// salt and params, so a session pays for key derivation once.
pub struct Sealer {
    password: Password,
    params: KdfParams,
    cached: Option<DerivedKey>,
}

impl Sealer {
    pub fn new(password: Password, params: KdfParams) -> Self {
        Self {
            password,
            params,
            cached: None,
        }
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let params = self.params;
        let (salt, cipher) = self.cipher(None, params)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SealError::Cipher(format!("encrypt failed: {e}")))?;

        let mut out = Vec::with_capacity(
            SEALED_MAGIC.len() + 1 + PARAMS_LEN + SALT_LEN + NONCE_LEN + ciphertext.len(),
        );
        out.extend_from_slice(SEALED_MAGIC);
        out.push(SEAL_VERSION);
        out.extend_from_slice(&params.to_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&mut self, body: &[u8]) -> Result<Vec<u8>, SealError> {
        let Some((&version, rest)) = body.split_first() else {
            return Err(SealError::Malformed("missing header".to_string()));
        };
        if version != SEAL_VERSION {
            return Err(SealError::Malformed(format!(
                "unsupported seal version {version}"
            )));
        }
        if rest.len() < PARAMS_LEN + SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(SealError::Malformed(format!(
                "expected at least {} bytes after the version, got {}",
                PARAMS_LEN + SALT_LEN + NONCE_LEN + TAG_LEN,
                rest.len()
            )));
        }
        let (params, rest) = rest.split_at(PARAMS_LEN);
        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let params: &[u8; PARAMS_LEN] = params
            .try_into()
            .map_err(|_| SealError::Malformed("params length".to_string()))?;
        let params = KdfParams::from_bytes(params);
        if params.memory_cost > MAX_MEMORY_COST {
            return Err(SealError::Malformed(format!(
                "memory cost {} KiB exceeds the {MAX_MEMORY_COST} KiB limit",
                params.memory_cost
            )));
        }
        let salt: [u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| SealError::Malformed("salt length".to_string()))?;

        let (_, cipher) = self.cipher(Some(salt), params).map_err(|err| match err {
            SealError::Kdf(reason) => SealError::Malformed(format!("stored kdf params: {reason}")),
            other => other,
        })?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::BadPassword)
    }

    /// Cipher for `salt` under `params`, or for the cached (else a fresh) salt
    /// when sealing.
    fn cipher(
        &mut self,
        salt: Option<[u8; SALT_LEN]>,
        params: KdfParams,
    ) -> Result<([u8; SALT_LEN], Aes256Gcm), SealError> {
        let key = match (self.cached.take(), salt) {
            (Some(cached), Some(salt)) if cached.salt == salt && cached.params == params => cached,
            (Some(cached), None) if cached.params == params => cached,
            (_, salt) => derive_key(
                &self.password,
                salt.unwrap_or_else(generate_salt),
                params,
            )?,
        };
        let cipher = Aes256Gcm::new_from_slice(&key.bytes)
            .map_err(|e| SealError::Cipher(format!("cipher init failed: {e}")))?;
        let salt = key.salt;
        self.cached = Some(key);
        Ok((salt, cipher))
    }
}

impl fmt::Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealer")
            .field("params", &self.params)
            .field("key_cached", &self.cached.is_some())
            .finish_non_exhaustive()
    }
}

pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(SEALED_MAGIC)
}

/// Returns the plaintext of a stored entry. Plain entries pass through
/// unchanged whether or not a sealer is available.
pub fn unseal(sealer: Option<&mut Sealer>, bytes: &[u8]) -> Result<Vec<u8>, SealError> {
    let Some(body) = bytes.strip_prefix(SEALED_MAGIC) else {
        return Ok(bytes.to_vec());
    };
    match sealer {
        Some(sealer) => sealer.open(body),
        None => Err(SealError::PasswordRequired),
    }
}

fn derive_key(
    password: &Password,
    salt: [u8; SALT_LEN],
    params: KdfParams,
) -> Result<DerivedKey, SealError> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| SealError::Kdf(format!("invalid parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = DerivedKey {
        params,
        salt,
        bytes: [0u8; KEY_LEN],
    };
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut key.bytes)
        .map_err(|e| SealError::Kdf(e.to_string()))?;
    Ok(key)
}

fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
