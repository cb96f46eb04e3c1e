use std::fmt::Debug;

use aes::Aes128;
use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;

use super::DecryptionError;
use super::pkcs5::Pkcs5;
use super::rc4::Rc4;
use crate::ObjectId;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// One configured crypt filter: turns the file encryption key plus an
/// object identity into cleartext or ciphertext.
pub trait CryptFilter: Debug + Send + Sync {
    fn encrypt(&self, file_key: &[u8], id: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
    fn decrypt(&self, file_key: &[u8], id: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
}

/// The `/Identity` filter: data passes through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct IdentityCryptFilter;

impl CryptFilter for IdentityCryptFilter {
    fn encrypt(&self, _: &[u8], _: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _: &[u8], _: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(ciphertext.to_vec())
    }
}

/// Derives the per-object key of revisions 2 through 4: the file key
/// extended with the low bytes of the object and generation number, hashed
/// with MD5, truncated to `min(key len + 5, 16)`. AES object keys mix in
/// the `sAlT` marker bytes.
pub(crate) fn object_key(file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&id.0.to_le_bytes()[..3]);
    hasher.update(&id.1.to_le_bytes()[..2]);
    if aes {
        hasher.update(b"sAlT");
    }
    let digest = hasher.finalize();
    let len = (file_key.len() + 5).min(16);
    digest[..len].to_vec()
}

/// RC4 with a per-object key (V1/V2 encryption, and the V4 `/V2` filter).
#[derive(Debug, Clone, Copy)]
pub struct Rc4CryptFilter;

impl CryptFilter for Rc4CryptFilter {
    fn encrypt(&self, file_key: &[u8], id: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(Rc4::new(&object_key(file_key, id, false)).apply(plaintext))
    }

    fn decrypt(&self, file_key: &[u8], id: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        // RC4 is its own inverse.
        self.encrypt(file_key, id, ciphertext)
    }
}

fn aes_cbc_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);
    let encryptor = match key.len() {
        16 => Aes128CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs5>(plaintext),
        32 => Aes256CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs5>(plaintext),
        _ => return Err(DecryptionError::InvalidKeyLength),
    };
    let mut output = iv.to_vec();
    output.extend(encryptor);
    Ok(output)
}

fn aes_cbc_decrypt(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    if payload.len() < 16 {
        return Err(DecryptionError::MalformedPayload);
    }
    let (iv, ciphertext) = payload.split_at(16);
    match key.len() {
        16 => Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs5>(ciphertext)
            .map_err(|_| DecryptionError::MalformedPayload),
        32 => Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs5>(ciphertext)
            .map_err(|_| DecryptionError::MalformedPayload),
        _ => Err(DecryptionError::InvalidKeyLength),
    }
}

/// AES-128-CBC with a per-object key and a fresh IV prepended to every
/// payload (the V4 `/AESV2` filter).
#[derive(Debug, Clone, Copy)]
pub struct Aes128CryptFilter;

impl CryptFilter for Aes128CryptFilter {
    fn encrypt(&self, file_key: &[u8], id: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        aes_cbc_encrypt(&object_key(file_key, id, true), plaintext)
    }

    fn decrypt(&self, file_key: &[u8], id: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        aes_cbc_decrypt(&object_key(file_key, id, true), ciphertext)
    }
}

/// AES-256-CBC using the file key directly (the V5 `/AESV3` filter).
#[derive(Debug, Clone, Copy)]
pub struct Aes256CryptFilter;

impl CryptFilter for Aes256CryptFilter {
    fn encrypt(&self, file_key: &[u8], _: ObjectId, plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        aes_cbc_encrypt(file_key, plaintext)
    }

    fn decrypt(&self, file_key: &[u8], _: ObjectId, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        aes_cbc_decrypt(file_key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_is_truncated_for_short_file_keys() {
        let key = object_key(&[0u8; 5], (1, 0), false);
        assert_eq!(key.len(), 10);
        let key = object_key(&[0u8; 16], (1, 0), false);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn rc4_filter_roundtrip() {
        let filter = Rc4CryptFilter;
        let file_key = [7u8; 16];
        let encrypted = filter.encrypt(&file_key, (12, 0), b"secret bytes").unwrap();
        assert_ne!(encrypted, b"secret bytes");
        assert_eq!(filter.decrypt(&file_key, (12, 0), &encrypted).unwrap(), b"secret bytes");
    }

    #[test]
    fn aes_filters_roundtrip_with_fresh_ivs() {
        let filter = Aes128CryptFilter;
        let file_key = [3u8; 16];
        let a = filter.encrypt(&file_key, (9, 0), b"payload").unwrap();
        let b = filter.encrypt(&file_key, (9, 0), b"payload").unwrap();
        assert_ne!(a, b);
        assert_eq!(filter.decrypt(&file_key, (9, 0), &a).unwrap(), b"payload");
        assert_eq!(filter.decrypt(&file_key, (9, 0), &b).unwrap(), b"payload");

        let filter = Aes256CryptFilter;
        let file_key = [5u8; 32];
        let encrypted = filter.encrypt(&file_key, (1, 0), b"wide key payload").unwrap();
        assert_eq!(
            filter.decrypt(&file_key, (1, 0), &encrypted).unwrap(),
            b"wide key payload"
        );
    }

    #[test]
    fn truncated_aes_payload_is_malformed() {
        let filter = Aes256CryptFilter;
        assert!(matches!(
            filter.decrypt(&[0u8; 32], (1, 0), b"short"),
            Err(DecryptionError::MalformedPayload)
        ));
    }
}
