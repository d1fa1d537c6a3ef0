//! Standard Security Handler (ISO 32000-2 Section 7.6.4)
//!
//! Revisions 2 to 4 derive an RC4 or AES-128 key from the padded password
//! with MD5. Revisions 5 and 6 unwrap a random AES-256 file key from
//! `/UE` or `/OE` using a SHA-2 based password hash.

use super::{EncryptionError, Permissions, Rc4};
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject, PdfStream};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256, Sha384, Sha512};
use unicode_normalization::UnicodeNormalization;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Password padding string (Algorithm 2, step a)
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// How strings or streams are encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Data is not encrypted
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

impl CryptMethod {
    pub fn name(self) -> &'static str {
        match self {
            CryptMethod::Identity => "Identity",
            CryptMethod::Rc4 => "V2",
            CryptMethod::AesV2 => "AESV2",
            CryptMethod::AesV3 => "AESV3",
        }
    }
}

/// Which password opened the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordKind {
    User,
    Owner,
}

/// Parsed `/Encrypt` dictionary of the standard handler
#[derive(Debug, Clone)]
pub struct EncryptionInfo {
    pub version: i64,
    pub revision: i64,
    /// File key length in bytes
    pub key_length: usize,
    /// Raw `/P` value
    pub p: i32,
    pub encrypt_metadata: bool,
    pub string_method: CryptMethod,
    pub stream_method: CryptMethod,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub owner_key: Vec<u8>,
    pub user_key: Vec<u8>,
}

impl EncryptionInfo {
    pub fn from_dict(dict: &PdfDictionary) -> Result<Self, EncryptionError> {
        let filter = dict.get_name("Filter").unwrap_or("");
        if filter != "Standard" {
            return Err(EncryptionError::UnsupportedHandler(filter.to_string()));
        }

        let version = dict.get_integer("V").unwrap_or(0);
        let revision = dict
            .get_integer("R")
            .ok_or(EncryptionError::InvalidEntry("R"))?;
        if !(2..=6).contains(&revision) || !matches!(version, 1 | 2 | 4 | 5) {
            return Err(EncryptionError::UnsupportedRevision { version, revision });
        }

        let bytes = |key: &'static str| -> Option<Vec<u8>> {
            dict.get(key)
                .and_then(|o| o.as_string())
                .map(|s| s.as_bytes().to_vec())
        };
        let min_hash = if revision >= 5 { 48 } else { 32 };
        let owner_hash = bytes("O")
            .filter(|o| o.len() >= min_hash)
            .ok_or(EncryptionError::InvalidEntry("O"))?;
        let user_hash = bytes("U")
            .filter(|u| u.len() >= min_hash)
            .ok_or(EncryptionError::InvalidEntry("U"))?;
        let p = dict
            .get_integer("P")
            .ok_or(EncryptionError::InvalidEntry("P"))? as i32;
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let (string_method, stream_method) = if version >= 4 {
            (
                crypt_filter_method(dict, "StrF")?,
                crypt_filter_method(dict, "StmF")?,
            )
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };

        let key_length = if revision >= 5 {
            32
        } else if revision == 2 {
            5
        } else if version >= 4 {
            16
        } else {
            let bits = dict.get_integer("Length").unwrap_or(40);
            (bits.clamp(40, 128) / 8) as usize
        };

        Ok(Self {
            version,
            revision,
            key_length,
            p,
            encrypt_metadata,
            string_method,
            stream_method,
            owner_hash,
            user_hash,
            owner_key: bytes("OE").unwrap_or_default(),
            user_key: bytes("UE").unwrap_or_default(),
        })
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_p(i64::from(self.p))
    }
}

/// Resolve the method of the crypt filter named by `/StrF` or `/StmF`
fn crypt_filter_method(dict: &PdfDictionary, key: &'static str) -> Result<CryptMethod, EncryptionError> {
    let name = dict.get_name(key).unwrap_or("Identity");
    if name == "Identity" {
        return Ok(CryptMethod::Identity);
    }
    let cfm = dict
        .get("CF")
        .and_then(|cf| cf.as_dict())
        .and_then(|cf| cf.get(name))
        .and_then(|f| f.as_dict())
        .and_then(|f| f.get_name("CFM"))
        .ok_or(EncryptionError::InvalidEntry(key))?;
    match cfm {
        "None" => Ok(CryptMethod::Identity),
        "V2" => Ok(CryptMethod::Rc4),
        "AESV2" => Ok(CryptMethod::AesV2),
        "AESV3" => Ok(CryptMethod::AesV3),
        other => Err(EncryptionError::UnsupportedHandler(format!("crypt filter method {other}"))),
    }
}

/// An authenticated standard security handler
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    info: EncryptionInfo,
    key: Vec<u8>,
    encrypt_dict_id: Option<ObjectId>,
    opened_with: PasswordKind,
}

impl SecurityHandler {
    /// Authenticate `password` (then the empty password) as user or owner password
    pub fn authenticate(
        dict: &PdfDictionary,
        encrypt_dict_id: Option<ObjectId>,
        file_id: &[u8],
        password: &[u8],
    ) -> Result<Self, EncryptionError> {
        let info = EncryptionInfo::from_dict(dict)?;

        let mut candidates = vec![password];
        if !password.is_empty() {
            candidates.push(b"");
        }

        for candidate in candidates {
            for kind in [PasswordKind::User, PasswordKind::Owner] {
                if let Some(key) = file_key(&info, candidate, kind, file_id)? {
                    tracing::debug!(
                        revision = info.revision,
                        ?kind,
                        "authenticated standard security handler"
                    );
                    return Ok(Self {
                        info,
                        key,
                        encrypt_dict_id,
                        opened_with: kind,
                    });
                }
            }
        }
        Err(EncryptionError::PasswordRequired)
    }

    pub fn info(&self) -> &EncryptionInfo {
        &self.info
    }

    pub fn permissions(&self) -> Permissions {
        self.info.permissions()
    }

    pub fn opened_with(&self) -> PasswordKind {
        self.opened_with
    }

    /// Decrypt every string and stream inside the indirect object `id`
    pub fn decrypt_object(&self, id: ObjectId, object: &mut PdfObject) -> Result<(), EncryptionError> {
        if Some(id) == self.encrypt_dict_id {
            return Ok(());
        }
        self.decrypt_value(id, object)
    }

    fn decrypt_value(&self, id: ObjectId, object: &mut PdfObject) -> Result<(), EncryptionError> {
        match object {
            PdfObject::String(s) => {
                s.0 = self.decrypt_bytes(self.info.string_method, id, &s.0)?;
            }
            PdfObject::Array(array) => {
                for item in array.0.iter_mut() {
                    self.decrypt_value(id, item)?;
                }
            }
            PdfObject::Dictionary(dict) => self.decrypt_dict(id, dict)?,
            PdfObject::Stream(stream) => self.decrypt_stream(id, stream)?,
            _ => {}
        }
        Ok(())
    }

    fn decrypt_dict(&self, id: ObjectId, dict: &mut PdfDictionary) -> Result<(), EncryptionError> {
        for value in dict.0.values_mut() {
            self.decrypt_value(id, value)?;
        }
        Ok(())
    }

    fn decrypt_stream(&self, id: ObjectId, stream: &mut PdfStream) -> Result<(), EncryptionError> {
        // Cross-reference streams are never encrypted
        if stream.dict.get_type() == Some("XRef") {
            return Ok(());
        }
        self.decrypt_dict(id, &mut stream.dict)?;

        let skip_data = (stream.dict.get_type() == Some("Metadata") && !self.info.encrypt_metadata)
            || stream.filter_names().iter().any(|f| f == "Crypt");
        if !skip_data {
            stream.data = self.decrypt_bytes(self.info.stream_method, id, &stream.data)?;
        }
        Ok(())
    }

    /// Decrypt raw bytes belonging to object `id`
    pub fn decrypt_bytes(&self, method: CryptMethod, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(Rc4::apply(&self.object_key(id, false), data)),
            CryptMethod::AesV2 => aes_cbc_decrypt(&self.object_key(id, true), data),
            CryptMethod::AesV3 => aes_cbc_decrypt(&self.key, data),
        }
    }

    /// Algorithm 1: per-object key for RC4 and AESV2
    fn object_key(&self, id: ObjectId, aes: bool) -> Vec<u8> {
        let mut input = self.key.clone();
        input.extend_from_slice(&id.number.to_le_bytes()[..3]);
        input.extend_from_slice(&id.generation.to_le_bytes());
        if aes {
            input.extend_from_slice(b"sAlT");
        }
        let hash = md5::compute(&input).0;
        hash[..(self.key.len() + 5).min(16)].to_vec()
    }
}

/// Derive and verify the file key, `None` when the password is wrong
fn file_key(
    info: &EncryptionInfo,
    password: &[u8],
    kind: PasswordKind,
    file_id: &[u8],
) -> Result<Option<Vec<u8>>, EncryptionError> {
    if info.revision >= 5 {
        return aes256_file_key(info, &prepare_utf8_password(info.revision, password), kind);
    }

    let user_password = match kind {
        PasswordKind::User => password.to_vec(),
        PasswordKind::Owner => user_password_from_owner(info, password),
    };
    let key = rc4_file_key(info, &user_password, file_id);
    Ok(user_key_matches(info, &key, file_id).then_some(key))
}

/// Pad or truncate a password to 32 bytes
pub(crate) fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Algorithm 2: file key for revisions 2 to 4
pub(crate) fn rc4_file_key(info: &EncryptionInfo, password: &[u8], file_id: &[u8]) -> Vec<u8> {
    let n = info.key_length;
    let mut input = pad_password(password).to_vec();
    input.extend_from_slice(&info.owner_hash[..32]);
    input.extend_from_slice(&(info.p as u32).to_le_bytes());
    input.extend_from_slice(file_id);
    if info.revision >= 4 && !info.encrypt_metadata {
        input.extend_from_slice(&[0xFF; 4]);
    }

    let mut hash = md5::compute(&input).0;
    if info.revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..n]).0;
        }
    }
    hash[..n].to_vec()
}

/// Algorithms 4 and 5: the `/U` value implied by `key`
pub(crate) fn compute_user_hash(info: &EncryptionInfo, key: &[u8], file_id: &[u8]) -> Vec<u8> {
    if info.revision == 2 {
        return Rc4::apply(key, &PADDING);
    }
    let mut input = PADDING.to_vec();
    input.extend_from_slice(file_id);
    let mut out = Rc4::apply(key, &md5::compute(&input).0);
    for i in 1..=19u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = Rc4::apply(&round_key, &out);
    }
    out
}

/// Algorithm 6
fn user_key_matches(info: &EncryptionInfo, key: &[u8], file_id: &[u8]) -> bool {
    let expected = compute_user_hash(info, key, file_id);
    let compare = if info.revision == 2 { 32 } else { 16 };
    expected[..compare] == info.user_hash[..compare]
}

/// RC4 key derived from the owner password (Algorithm 3, steps a to d)
fn owner_rc4_key(info: &EncryptionInfo, owner_password: &[u8]) -> Vec<u8> {
    let mut hash = md5::compute(pad_password(owner_password)).0;
    if info.revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(hash).0;
        }
    }
    hash[..info.key_length].to_vec()
}

/// Algorithm 3: the `/O` value for a pair of passwords
pub(crate) fn compute_owner_hash(info: &EncryptionInfo, owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
    let key = owner_rc4_key(info, owner_password);
    let mut out = Rc4::apply(&key, &pad_password(user_password));
    if info.revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            out = Rc4::apply(&round_key, &out);
        }
    }
    out
}

/// Algorithm 7: recover the padded user password from `/O`
fn user_password_from_owner(info: &EncryptionInfo, owner_password: &[u8]) -> Vec<u8> {
    let key = owner_rc4_key(info, owner_password);
    let mut out = info.owner_hash[..32].to_vec();
    if info.revision == 2 {
        return Rc4::apply(&key, &out);
    }
    for i in (0..=19u8).rev() {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = Rc4::apply(&round_key, &out);
    }
    out
}

/// UTF-8 password for revisions 5 and 6, SASLprep-normalized for R6
fn prepare_utf8_password(revision: i64, password: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(password);
    let prepared: String = if revision >= 6 {
        text.nfkc().filter(|c| !c.is_control()).collect()
    } else {
        text.into_owned()
    };
    let bytes = prepared.into_bytes();
    bytes[..bytes.len().min(127)].to_vec()
}

/// Algorithms 2.A and 11/12: verify and unwrap the AES-256 file key
fn aes256_file_key(
    info: &EncryptionInfo,
    password: &[u8],
    kind: PasswordKind,
) -> Result<Option<Vec<u8>>, EncryptionError> {
    let (hash, udata, wrapped) = match kind {
        PasswordKind::User => (&info.user_hash, &[][..], &info.user_key),
        PasswordKind::Owner => (&info.owner_hash, &info.user_hash[..48], &info.owner_key),
    };
    let validation_salt = &hash[32..40];
    let key_salt = &hash[40..48];

    if hash_r56(info.revision, password, validation_salt, udata)? != hash[..32] {
        return Ok(None);
    }
    if wrapped.len() < 32 {
        return Err(EncryptionError::InvalidEntry(match kind {
            PasswordKind::User => "UE",
            PasswordKind::Owner => "OE",
        }));
    }

    let intermediate = hash_r56(info.revision, password, key_salt, udata)?;
    let mut key = vec![0u8; 32];
    Aes256CbcDec::new_from_slices(&intermediate, &[0u8; 16])
        .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
        .decrypt_padded_b2b_mut::<NoPadding>(&wrapped[..32], &mut key)
        .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?;
    Ok(Some(key))
}

/// Algorithm 2.B (revision 6) or plain SHA-256 (revision 5)
fn hash_r56(revision: i64, password: &[u8], salt: &[u8], udata: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut input = password.to_vec();
    input.extend_from_slice(salt);
    input.extend_from_slice(udata);
    let mut k = Sha256::digest(&input).to_vec();
    if revision < 6 {
        return Ok(k);
    }

    let mut round = 0u32;
    loop {
        let mut k1 = Vec::with_capacity(64 * (password.len() + k.len() + udata.len()));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(udata);
        }
        let mut e = vec![0u8; k1.len()];
        Aes128CbcEnc::new_from_slices(&k[..16], &k[16..32])
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
            .encrypt_padded_b2b_mut::<NoPadding>(&k1, &mut e)
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?;

        let selector: u32 = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = e.last().copied().map_or(0, u32::from);
        if round >= 64 && last + 32 <= round {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

/// AES-CBC decryption of `IV || ciphertext` with PKCS#7 padding
fn aes_cbc_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < 16 || data.len() % 16 != 0 {
        return Err(EncryptionError::Cipher(format!(
            "AES data length {} is not IV plus whole blocks",
            data.len()
        )));
    }
    let (iv, encrypted) = data.split_at(16);
    if encrypted.is_empty() {
        return Ok(Vec::new());
    }

    let mut result = vec![0u8; encrypted.len()];
    let len = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
            .decrypt_padded_b2b_mut::<Pkcs7>(encrypted, &mut result)
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
            .len(),
        _ => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
            .decrypt_padded_b2b_mut::<Pkcs7>(encrypted, &mut result)
            .map_err(|e| EncryptionError::Cipher(format!("{e:?}")))?
            .len(),
    };
    result.truncate(len);
    Ok(result)
}
