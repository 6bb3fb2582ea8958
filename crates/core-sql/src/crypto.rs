//! Sealing of instance and database credentials at rest.
//!
//! Passwords are encrypted with AES-256-SIV under a process-wide key and
//! stored as base64 `nonce || ciphertext`. Repository code only ever sees
//! ciphertext; unsealing happens where a connection config is assembled for
//! Anchor.

use aes_siv::aead::{Aead, KeyInit};
use aes_siv::{Aes256SivAead, Nonce};

/// AES-256-SIV takes a double-width (512 bit) key.
pub const KEY_LEN: usize = 64;
const NONCE_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sealing key must be {KEY_LEN} bytes, got {0}")]
    BadKeyLength(usize),
    #[error("sealed credential is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("sealed credential is truncated")]
    Truncated,
    #[error("failed to seal or unseal credential")]
    Crypto,
    #[error("unsealed credential is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Sealer holds the process-wide credential key.
#[derive(Clone)]
pub struct Sealer {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sealer(..)")
    }
}

impl Sealer {
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| Error::BadKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Seal a plaintext credential into its at-rest representation.
    pub fn seal(&self, plaintext: &str) -> Result<String, Error> {
        let cipher = Aes256SivAead::new_from_slice(&self.key).map_err(|_| Error::Crypto)?;
        let nonce: [u8; NONCE_LEN] = rand::random();

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::Crypto)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(base64::encode(out))
    }

    /// Unseal an at-rest credential back to plaintext.
    pub fn unseal(&self, sealed: &str) -> Result<String, Error> {
        let bytes = base64::decode(sealed)?;
        if bytes.len() < NONCE_LEN {
            return Err(Error::Truncated);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);

        let cipher = Aes256SivAead::new_from_slice(&self.key).map_err(|_| Error::Crypto)?;
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto)?;

        Ok(String::from_utf8(plain)?)
    }
}

#[cfg(test)]
mod test {
    use super::{Sealer, KEY_LEN};

    #[test]
    fn seal_round_trips() {
        let sealer = Sealer::new(&[7u8; KEY_LEN]).unwrap();
        let sealed = sealer.seal("s3cret-password").unwrap();
        assert_ne!(sealed, "s3cret-password");
        assert_eq!(sealer.unseal(&sealed).unwrap(), "s3cret-password");
    }

    #[test]
    fn distinct_nonces_produce_distinct_ciphertext() {
        let sealer = Sealer::new(&[7u8; KEY_LEN]).unwrap();
        assert_ne!(sealer.seal("x").unwrap(), sealer.seal("x").unwrap());
    }

    #[test]
    fn rejects_bad_key_and_garbage() {
        assert!(Sealer::new(&[0u8; 16]).is_err());
        let sealer = Sealer::new(&[7u8; KEY_LEN]).unwrap();
        assert!(sealer.unseal("@@not-base64@@").is_err());
        assert!(sealer.unseal("AAAA").is_err());
    }
}
