//! Standard security handler: password-based encryption, revisions 2
//! through 6.
//!
//! Revisions 2 to 4 derive RC4 or AES-128 keys from MD5 over the padded
//! password; revisions 5 and 6 carry an AES-256 file key unlocked through
//! SHA-2 based password hashes. Strings and stream payloads are encrypted
//! object by object; the encryption dictionary, the file identifier and
//! cross-reference streams are not.

pub mod crypt_filters;
mod pkcs5;
mod rc4;

use std::sync::Arc;

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};
use bitflags::bitflags;
use log::warn;
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

use crate::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use self::crypt_filters::{
    Aes128CryptFilter, Aes256CryptFilter, CryptFilter, IdentityCryptFilter, Rc4CryptFilter,
};
use self::rc4::Rc4;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// The password padding string of Algorithm 2.
const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("the document is not encrypted")]
    NotEncrypted,
    #[error("neither password matches")]
    IncorrectPassword,
    #[error("unsupported security handler")]
    UnsupportedSecurityHandler,
    #[error("unsupported security handler revision {0}")]
    UnsupportedRevision(i64),
    #[error("unsupported encryption version {0}")]
    UnsupportedVersion(i64),
    #[error("unsupported crypt filter method")]
    UnsupportedCryptFilter,
    #[error("unsupported encryption key length")]
    InvalidKeyLength,
    #[error("encryption dictionary is missing the {0} entry")]
    MissingEntry(&'static str),
    #[error("encryption dictionary entry {0} is malformed")]
    MalformedEntry(&'static str),
    #[error("encrypted payload is malformed")]
    MalformedPayload,
}

bitflags! {
    /// The user access permissions of the `P` entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PermissionFlags: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_FOR_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl PermissionFlags {
    /// The signed 32-bit value stored on disk, with all reserved bits set
    /// the way Table 22 requires.
    pub fn as_p_value(&self) -> i32 {
        (self.bits() | 0xFFFF_F0C0) as i32
    }
}

impl Default for PermissionFlags {
    fn default() -> Self {
        PermissionFlags::all()
    }
}

/// Which password unlocked the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRole {
    User,
    Owner,
}

/// How a document written by this crate should be encrypted.
#[derive(Debug, Clone)]
pub struct EncryptionSettings {
    pub user_password: String,
    pub owner_password: String,
    pub permissions: PermissionFlags,
    /// AES instead of RC4. Forced for 256-bit keys.
    pub use_aes: bool,
    /// 40, 128 or 256 bits.
    pub key_length: u16,
}

impl EncryptionSettings {
    pub fn with_passwords(user: &str, owner: &str) -> EncryptionSettings {
        EncryptionSettings {
            user_password: user.to_string(),
            owner_password: owner.to_string(),
            permissions: PermissionFlags::default(),
            use_aes: true,
            key_length: 256,
        }
    }
}

/// A live encryption context: the authenticated file key plus the crypt
/// filters the document routes strings and streams through.
#[derive(Clone)]
pub struct EncryptionState {
    pub version: i64,
    pub revision: i64,
    pub key: Vec<u8>,
    pub encrypt_metadata: bool,
    pub role: PasswordRole,
    string_filter: Arc<dyn CryptFilter>,
    stream_filter: Arc<dyn CryptFilter>,
}

impl std::fmt::Debug for EncryptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EncryptionState")
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl EncryptionState {
    /// Authenticates `password` against the document's encryption
    /// dictionary and, on success, yields the decryption context.
    pub fn decode(document: &Document, password: &str) -> Result<EncryptionState, DecryptionError> {
        let dict = document
            .encryption_dictionary()
            .map_err(|_| DecryptionError::NotEncrypted)?;
        let handler = dict
            .get(b"Filter")
            .and_then(Object::as_name)
            .map_err(|_| DecryptionError::MissingEntry("Filter"))?;
        if handler != b"Standard" {
            return Err(DecryptionError::UnsupportedSecurityHandler);
        }

        let version = int_entry(dict, b"V").ok_or(DecryptionError::MissingEntry("V"))?;
        let revision = int_entry(dict, b"R").ok_or(DecryptionError::MissingEntry("R"))?;
        if !matches!(version, 1 | 2 | 4 | 5) {
            return Err(DecryptionError::UnsupportedVersion(version));
        }
        let encrypt_metadata = dict
            .get(b"EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);

        let (key, role) = match revision {
            2..=4 => authenticate_legacy(document, dict, revision, password, encrypt_metadata)?,
            5 | 6 => authenticate_v5(dict, revision, password)?,
            other => return Err(DecryptionError::UnsupportedRevision(other)),
        };

        let (string_filter, stream_filter) = build_filters(dict, version)?;
        Ok(EncryptionState {
            version,
            revision,
            key,
            encrypt_metadata,
            role,
            string_filter,
            stream_filter,
        })
    }

    /// Produces the encryption dictionary and live state for writing a
    /// protected file.
    pub fn generate(
        settings: &EncryptionSettings, file_id: &[u8],
    ) -> Result<(EncryptionState, Dictionary), DecryptionError> {
        match settings.key_length {
            40 | 128 => generate_legacy(settings, file_id),
            256 => generate_v5(settings),
            _ => Err(DecryptionError::InvalidKeyLength),
        }
    }

    pub(crate) fn decrypt_string(&self, id: ObjectId, bytes: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        self.string_filter.decrypt(&self.key, id, bytes)
    }

    pub(crate) fn encrypt_string(&self, id: ObjectId, bytes: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        self.string_filter.encrypt(&self.key, id, bytes)
    }

    pub(crate) fn decrypt_stream(&self, id: ObjectId, bytes: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        self.stream_filter.decrypt(&self.key, id, bytes)
    }

    pub(crate) fn encrypt_stream(&self, id: ObjectId, bytes: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        self.stream_filter.encrypt(&self.key, id, bytes)
    }
}

fn int_entry(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).and_then(Object::as_i64).ok()
}

fn bytes_entry<'a>(dict: &'a Dictionary, key: &'static str) -> Result<&'a [u8], DecryptionError> {
    dict.get(key.as_bytes())
        .and_then(Object::as_str)
        .map_err(|_| DecryptionError::MissingEntry(key))
}

fn first_file_id(document: &Document) -> Vec<u8> {
    document
        .trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str().ok())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

fn build_filters(
    dict: &Dictionary, version: i64,
) -> Result<(Arc<dyn CryptFilter>, Arc<dyn CryptFilter>), DecryptionError> {
    if version < 4 {
        let rc4: Arc<dyn CryptFilter> = Arc::new(Rc4CryptFilter);
        return Ok((rc4.clone(), rc4));
    }
    let named = |name: &[u8]| -> Result<Arc<dyn CryptFilter>, DecryptionError> {
        if name == b"Identity" {
            return Ok(Arc::new(IdentityCryptFilter));
        }
        let cf = dict
            .get(b"CF")
            .and_then(Object::as_dict)
            .map_err(|_| DecryptionError::MissingEntry("CF"))?;
        let method = cf
            .get(name)
            .and_then(Object::as_dict)
            .and_then(|filter| filter.get(b"CFM"))
            .and_then(Object::as_name)
            .map_err(|_| DecryptionError::MalformedEntry("CF"))?;
        match method {
            b"V2" => Ok(Arc::new(Rc4CryptFilter)),
            b"AESV2" => Ok(Arc::new(Aes128CryptFilter)),
            b"AESV3" => Ok(Arc::new(Aes256CryptFilter)),
            b"None" => Ok(Arc::new(IdentityCryptFilter)),
            _ => Err(DecryptionError::UnsupportedCryptFilter),
        }
    };
    let stream_name = dict
        .get(b"StmF")
        .and_then(Object::as_name)
        .unwrap_or(b"Identity");
    let string_name = dict
        .get(b"StrF")
        .and_then(Object::as_name)
        .unwrap_or(b"Identity");
    Ok((named(string_name)?, named(stream_name)?))
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let take = password.len().min(32);
    padded[..take].copy_from_slice(&password[..take]);
    padded[take..].copy_from_slice(&PAD[..32 - take]);
    padded
}

/// Algorithm 2: the file encryption key of revisions 2 to 4.
fn legacy_file_key(
    padded_password: &[u8; 32], o_value: &[u8], p_value: i32, file_id: &[u8], revision: i64,
    key_length: usize, encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(padded_password);
    hasher.update(&o_value[..o_value.len().min(32)]);
    hasher.update(p_value.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut digest = hasher.finalize().to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            digest = Md5::digest(&digest[..key_length]).to_vec();
        }
    }
    digest.truncate(key_length);
    digest
}

/// Algorithms 4 and 5: the `U` value a given file key should produce.
fn legacy_user_value(file_key: &[u8], file_id: &[u8], revision: i64) -> Vec<u8> {
    if revision == 2 {
        return Rc4::new(file_key).apply(&PAD);
    }
    let mut hasher = Md5::new();
    hasher.update(PAD);
    hasher.update(file_id);
    let mut value = Rc4::new(file_key).apply(&hasher.finalize());
    for i in 1..=19u8 {
        let round_key: Vec<u8> = file_key.iter().map(|&b| b ^ i).collect();
        value = Rc4::new(&round_key).apply(&value);
    }
    value.extend_from_slice(&[0; 16]);
    value
}

/// The RC4 key of Algorithm 3, derived from the owner password.
fn owner_rc4_key(owner_password: &[u8; 32], revision: i64, key_length: usize) -> Vec<u8> {
    let mut digest = Md5::digest(owner_password).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            digest = Md5::digest(&digest).to_vec();
        }
    }
    digest.truncate(key_length);
    digest
}

/// Algorithm 3: the `O` value.
fn legacy_owner_value(
    user_password: &[u8; 32], owner_password: &[u8; 32], revision: i64, key_length: usize,
) -> Vec<u8> {
    let rc4_key = owner_rc4_key(owner_password, revision, key_length);
    let mut value = Rc4::new(&rc4_key).apply(user_password);
    if revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = rc4_key.iter().map(|&b| b ^ i).collect();
            value = Rc4::new(&round_key).apply(&value);
        }
    }
    value
}

fn authenticate_legacy(
    document: &Document, dict: &Dictionary, revision: i64, password: &str, encrypt_metadata: bool,
) -> Result<(Vec<u8>, PasswordRole), DecryptionError> {
    let key_length = match int_entry(dict, b"Length").unwrap_or(40) {
        bits @ 40..=128 if bits % 8 == 0 => bits as usize / 8,
        _ => return Err(DecryptionError::InvalidKeyLength),
    };
    let o_value = bytes_entry(dict, "O")?.to_vec();
    let u_value = bytes_entry(dict, "U")?.to_vec();
    let p_value = int_entry(dict, b"P").ok_or(DecryptionError::MissingEntry("P"))? as i32;
    let file_id = first_file_id(document);

    let check_user = |padded: &[u8; 32]| -> Option<Vec<u8>> {
        let key = legacy_file_key(padded, &o_value, p_value, &file_id, revision, key_length, encrypt_metadata);
        let expected = legacy_user_value(&key, &file_id, revision);
        let matches = if revision == 2 {
            expected.get(..32) == u_value.get(..32)
        } else {
            expected.get(..16) == u_value.get(..16)
        };
        matches.then_some(key)
    };

    let padded = pad_password(password.as_bytes());
    if let Some(key) = check_user(&padded) {
        return Ok((key, PasswordRole::User));
    }

    // Owner path: undo the RC4 layers over O to recover the padded user
    // password, then authenticate with that.
    let rc4_key = owner_rc4_key(&padded, revision, key_length);
    let mut recovered = o_value.clone();
    if revision == 2 {
        recovered = Rc4::new(&rc4_key).apply(&recovered);
    } else {
        for i in (0..=19u8).rev() {
            let round_key: Vec<u8> = rc4_key.iter().map(|&b| b ^ i).collect();
            recovered = Rc4::new(&round_key).apply(&recovered);
        }
    }
    if recovered.len() == 32 {
        let mut recovered_padded = [0u8; 32];
        recovered_padded.copy_from_slice(&recovered);
        if let Some(key) = check_user(&recovered_padded) {
            return Ok((key, PasswordRole::Owner));
        }
    }

    Err(DecryptionError::IncorrectPassword)
}

/// Prepares a revision 5/6 password: SASLprep-normalized UTF-8, truncated
/// to 127 bytes.
fn prepare_v5_password(password: &str) -> Vec<u8> {
    let normalized = stringprep::saslprep(password)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| password.to_string());
    let mut bytes = normalized.into_bytes();
    bytes.truncate(127);
    bytes
}

/// Algorithm 2.B: the iterated hash of revision 6.
fn hash_r6(password: &[u8], salt: &[u8], user_data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(user_data);
    let mut key: Vec<u8> = hasher.finalize().to_vec();

    let mut round = 0usize;
    loop {
        let mut block = Vec::with_capacity((password.len() + key.len() + user_data.len()) * 64);
        for _ in 0..64 {
            block.extend_from_slice(password);
            block.extend_from_slice(&key);
            block.extend_from_slice(user_data);
        }
        let encrypted = Aes128CbcEnc::new(key[..16].into(), key[16..32].into())
            .encrypt_padded_vec_mut::<NoPadding>(&block);
        let modulo = encrypted[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        key = match modulo {
            0 => Sha256::digest(&encrypted).to_vec(),
            1 => Sha384::digest(&encrypted).to_vec(),
            _ => Sha512::digest(&encrypted).to_vec(),
        };
        round += 1;
        let last = encrypted.last().copied().unwrap_or(0) as usize;
        if round >= 64 && last <= round - 32 {
            break;
        }
    }

    let mut output = [0u8; 32];
    output.copy_from_slice(&key[..32]);
    output
}

fn v5_password_hash(password: &[u8], salt: &[u8], user_data: &[u8], revision: i64) -> [u8; 32] {
    if revision == 5 {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(user_data);
        hasher.finalize().into()
    } else {
        hash_r6(password, salt, user_data)
    }
}

fn aes256_no_pad_decrypt(key: &[u8], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| DecryptionError::MalformedPayload)
}

fn authenticate_v5(
    dict: &Dictionary, revision: i64, password: &str,
) -> Result<(Vec<u8>, PasswordRole), DecryptionError> {
    let u_value = bytes_entry(dict, "U")?.to_vec();
    let o_value = bytes_entry(dict, "O")?.to_vec();
    let ue_value = bytes_entry(dict, "UE")?.to_vec();
    let oe_value = bytes_entry(dict, "OE")?.to_vec();
    if u_value.len() < 48 || o_value.len() < 48 {
        return Err(DecryptionError::MalformedEntry("U"));
    }
    let password = prepare_v5_password(password);

    let (u_hash, u_validation_salt, u_key_salt) = (&u_value[..32], &u_value[32..40], &u_value[40..48]);
    let (o_hash, o_validation_salt, o_key_salt) = (&o_value[..32], &o_value[32..40], &o_value[40..48]);

    if v5_password_hash(&password, u_validation_salt, b"", revision) == u_hash {
        let intermediate = v5_password_hash(&password, u_key_salt, b"", revision);
        let key = aes256_no_pad_decrypt(&intermediate, &[0; 16], &ue_value)?;
        verify_perms(dict, &key);
        return Ok((key, PasswordRole::User));
    }

    if v5_password_hash(&password, o_validation_salt, &u_value[..48], revision) == o_hash {
        let intermediate = v5_password_hash(&password, o_key_salt, &u_value[..48], revision);
        let key = aes256_no_pad_decrypt(&intermediate, &[0; 16], &oe_value)?;
        verify_perms(dict, &key);
        return Ok((key, PasswordRole::Owner));
    }

    Err(DecryptionError::IncorrectPassword)
}

/// Decrypts the `Perms` entry and checks its marker bytes. A mismatch is
/// reported but does not reject the file: the permissions themselves stay
/// advisory.
fn verify_perms(dict: &Dictionary, file_key: &[u8]) {
    let Ok(perms) = dict.get(b"Perms").and_then(Object::as_str) else {
        return;
    };
    if perms.len() != 16 || file_key.len() != 32 {
        warn!("malformed Perms entry in the encryption dictionary");
        return;
    }
    let decrypted = Aes256EcbDec::new(file_key.into())
        .decrypt_padded_vec_mut::<NoPadding>(perms)
        .unwrap_or_default();
    if decrypted.get(9..12) != Some(b"adb".as_slice()) {
        warn!("Perms entry does not verify against the file key");
    }
}

fn generate_legacy(
    settings: &EncryptionSettings, file_id: &[u8],
) -> Result<(EncryptionState, Dictionary), DecryptionError> {
    let key_length = settings.key_length as usize / 8;
    let (version, revision) = match (settings.key_length, settings.use_aes) {
        (40, _) => (1, 2),
        (128, false) => (2, 3),
        (128, true) => (4, 4),
        _ => return Err(DecryptionError::InvalidKeyLength),
    };
    let permissions = settings.permissions.as_p_value();
    let user_padded = pad_password(settings.user_password.as_bytes());
    let owner_padded = if settings.owner_password.is_empty() {
        user_padded
    } else {
        pad_password(settings.owner_password.as_bytes())
    };

    let o_value = legacy_owner_value(&user_padded, &owner_padded, revision, key_length);
    let key = legacy_file_key(&user_padded, &o_value, permissions, file_id, revision, key_length, true);
    let u_value = legacy_user_value(&key, file_id, revision);

    let mut dict = crate::dictionary! {
        "Filter" => "Standard",
        "V" => version,
        "R" => revision,
        "Length" => settings.key_length as i64,
        "P" => permissions as i64,
        "O" => Object::String(o_value, StringFormat::Hexadecimal),
        "U" => Object::String(u_value, StringFormat::Hexadecimal),
    };

    let filter: Arc<dyn CryptFilter> = if revision == 4 {
        dict.set(
            "CF",
            crate::dictionary! {
                "StdCF" => crate::dictionary! {
                    "Type" => "CryptFilter",
                    "CFM" => "AESV2",
                    "Length" => 16,
                },
            },
        );
        dict.set("StmF", Object::name("StdCF"));
        dict.set("StrF", Object::name("StdCF"));
        Arc::new(Aes128CryptFilter)
    } else {
        Arc::new(Rc4CryptFilter)
    };

    let state = EncryptionState {
        version,
        revision,
        key,
        encrypt_metadata: true,
        role: PasswordRole::Owner,
        string_filter: filter.clone(),
        stream_filter: filter,
    };
    Ok((state, dict))
}

fn generate_v5(settings: &EncryptionSettings) -> Result<(EncryptionState, Dictionary), DecryptionError> {
    let mut rng = rand::rng();
    let mut key = vec![0u8; 32];
    rng.fill_bytes(&mut key);
    let mut salts = [0u8; 32];
    rng.fill_bytes(&mut salts);
    let (u_validation_salt, u_key_salt) = (&salts[0..8], &salts[8..16]);
    let (o_validation_salt, o_key_salt) = (&salts[16..24], &salts[24..32]);

    let user_password = prepare_v5_password(&settings.user_password);
    let owner_password = if settings.owner_password.is_empty() {
        user_password.clone()
    } else {
        prepare_v5_password(&settings.owner_password)
    };

    let mut u_value = hash_r6(&user_password, u_validation_salt, b"").to_vec();
    u_value.extend_from_slice(u_validation_salt);
    u_value.extend_from_slice(u_key_salt);
    let u_intermediate = hash_r6(&user_password, u_key_salt, b"");
    let ue_value = Aes256CbcEnc::new(u_intermediate.as_slice().into(), (&[0u8; 16]).into())
        .encrypt_padded_vec_mut::<NoPadding>(&key);

    let mut o_value = hash_r6(&owner_password, o_validation_salt, &u_value).to_vec();
    o_value.extend_from_slice(o_validation_salt);
    o_value.extend_from_slice(o_key_salt);
    let o_intermediate = hash_r6(&owner_password, o_key_salt, &u_value);
    let oe_value = Aes256CbcEnc::new(o_intermediate.as_slice().into(), (&[0u8; 16]).into())
        .encrypt_padded_vec_mut::<NoPadding>(&key);

    let permissions = settings.permissions.as_p_value();
    let mut perms_plain = [0u8; 16];
    perms_plain[..4].copy_from_slice(&permissions.to_le_bytes());
    perms_plain[4..8].copy_from_slice(&[0xFF; 4]);
    perms_plain[8] = b'T';
    perms_plain[9..12].copy_from_slice(b"adb");
    rng.fill_bytes(&mut perms_plain[12..]);
    let perms_value = Aes256EcbEnc::new(key.as_slice().into())
        .encrypt_padded_vec_mut::<NoPadding>(&perms_plain);

    let dict = crate::dictionary! {
        "Filter" => "Standard",
        "V" => 5,
        "R" => 6,
        "Length" => 256,
        "P" => permissions as i64,
        "O" => Object::String(o_value, StringFormat::Hexadecimal),
        "U" => Object::String(u_value, StringFormat::Hexadecimal),
        "OE" => Object::String(oe_value, StringFormat::Hexadecimal),
        "UE" => Object::String(ue_value, StringFormat::Hexadecimal),
        "Perms" => Object::String(perms_value, StringFormat::Hexadecimal),
        "EncryptMetadata" => true,
        "CF" => crate::dictionary! {
            "StdCF" => crate::dictionary! {
                "Type" => "CryptFilter",
                "CFM" => "AESV3",
                "Length" => 32,
            },
        },
        "StmF" => Object::name("StdCF"),
        "StrF" => Object::name("StdCF"),
    };

    let filter: Arc<dyn CryptFilter> = Arc::new(Aes256CryptFilter);
    let state = EncryptionState {
        version: 5,
        revision: 6,
        key,
        encrypt_metadata: true,
        role: PasswordRole::Owner,
        string_filter: filter.clone(),
        stream_filter: filter,
    };
    Ok((state, dict))
}

/// True for stream payloads that stay cleartext: cross-reference streams,
/// metadata when `EncryptMetadata` is off, and streams routed through the
/// `/Identity` crypt filter.
fn stream_is_exempt(state: &EncryptionState, stream: &Stream) -> bool {
    if stream.dict.has_type(b"XRef") {
        return true;
    }
    if !state.encrypt_metadata && stream.dict.has_type(b"Metadata") {
        return true;
    }
    let names: Vec<&[u8]> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(array)) => array.iter().filter_map(|f| f.as_name().ok()).collect(),
        _ => vec![],
    };
    if names.contains(&b"Crypt".as_slice()) {
        let per_stream = stream
            .dict
            .get(b"DecodeParms")
            .ok()
            .and_then(|parms| parms.as_dict().ok())
            .and_then(|parms| parms.get(b"Name").ok())
            .and_then(|name| name.as_name().ok())
            .unwrap_or(b"Identity");
        return per_stream == b"Identity";
    }
    false
}

/// Decrypts every string and stream payload of one indirect object.
pub fn decrypt_object(
    state: &EncryptionState, id: ObjectId, object: &mut Object,
) -> Result<(), DecryptionError> {
    transform_object(state, id, object, false)
}

/// Encrypts every string and stream payload of one indirect object.
pub fn encrypt_object(
    state: &EncryptionState, id: ObjectId, object: &mut Object,
) -> Result<(), DecryptionError> {
    transform_object(state, id, object, true)
}

fn transform_object(
    state: &EncryptionState, id: ObjectId, object: &mut Object, encrypting: bool,
) -> Result<(), DecryptionError> {
    match object {
        Object::String(bytes, _) => {
            *bytes = if encrypting {
                state.encrypt_string(id, bytes)?
            } else {
                state.decrypt_string(id, bytes)?
            };
        }
        Object::Array(items) => {
            for item in items {
                transform_object(state, id, item, encrypting)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                transform_object(state, id, value, encrypting)?;
            }
        }
        Object::Stream(stream) => {
            if stream.dict.has_type(b"XRef") {
                return Ok(());
            }
            for (_, value) in stream.dict.iter_mut() {
                transform_object(state, id, value, encrypting)?;
            }
            if !stream_is_exempt(state, stream) {
                let content = if encrypting {
                    state.encrypt_stream(id, &stream.content)?
                } else {
                    state.decrypt_stream(id, &stream.content)?
                };
                stream.set_content(content);
            }
        }
        _ => {}
    }
    Ok(())
}
