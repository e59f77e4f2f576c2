//! crypto/cipher - AEAD primitive: AES-GCM с 16-байтовым IV и detached tag.
//!
//! Контракт:
//! - PageCipher::new(method, key, encrypt) - направленный контекст (encrypt или decrypt);
//! - encrypt_in_place(iv, aad, data, tag_out) / decrypt_in_place(iv, aad, data, tag);
//! - IncrementalCipher: init → add_aad* → add_data* → finish (буферизует и делает
//!   один single-shot вызов; используется только расширениями вроде WAL).
//!
//! 16-байтовый IV допустим для GCM: J0 выводится через GHASH(IV).

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::{Aes128, Aes256},
    AesGcm,
};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::consts::IV_LEN;
use crate::error::PageCryptError;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Tag length produced by every supported method.
pub const GCM_TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CipherMethod {
    Aes128Gcm,
    Aes256Gcm,
}

impl CipherMethod {
    pub fn key_len(self) -> usize {
        match self {
            CipherMethod::Aes128Gcm => 16,
            CipherMethod::Aes256Gcm => 32,
        }
    }

    /// Block length of the underlying block cipher.
    pub fn block_len(self) -> usize {
        16
    }

    pub fn tag_len(self) -> usize {
        GCM_TAG_LEN
    }

    pub fn iv_len(self) -> usize {
        IV_LEN
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherMethod::Aes128Gcm => "aes-128-gcm",
            CipherMethod::Aes256Gcm => "aes-256-gcm",
        }
    }
}

impl FromStr for CipherMethod {
    type Err = PageCryptError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-128-gcm" | "aes128gcm" | "aes128" => Ok(CipherMethod::Aes128Gcm),
            "aes-256-gcm" | "aes256gcm" | "aes256" => Ok(CipherMethod::Aes256Gcm),
            other => Err(PageCryptError::Configuration(format!(
                "unknown encryption method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum GcmCore {
    A128(Box<Aes128Gcm16>),
    A256(Box<Aes256Gcm16>),
}

/// Направленный AEAD-контекст.
pub struct PageCipher {
    method: CipherMethod,
    encrypt: bool,
    core: GcmCore,
}

fn cipher_failure(msg: String) -> anyhow::Error {
    PageCryptError::CipherFailure(msg).into()
}

impl PageCipher {
    pub fn new(method: CipherMethod, key: &[u8], encrypt: bool) -> Result<Self> {
        if key.len() != method.key_len() {
            return Err(PageCryptError::Configuration(format!(
                "cannot initialize {} context: key must be {} bytes, got {}",
                method,
                method.key_len(),
                key.len()
            ))
            .into());
        }
        let core = match method {
            CipherMethod::Aes128Gcm => GcmCore::A128(Box::new(
                Aes128Gcm16::new_from_slice(key).map_err(|e| anyhow!("aes-128-gcm key: {}", e))?,
            )),
            CipherMethod::Aes256Gcm => GcmCore::A256(Box::new(
                Aes256Gcm16::new_from_slice(key).map_err(|e| anyhow!("aes-256-gcm key: {}", e))?,
            )),
        };
        Ok(Self { method, encrypt, core })
    }

    pub fn method(&self) -> CipherMethod {
        self.method
    }

    pub fn is_encrypt(&self) -> bool {
        self.encrypt
    }

    /// Зашифровать `data` на месте, записать tag в `tag_out` (длина == tag_len).
    pub fn encrypt_in_place(
        &self,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        data: &mut [u8],
        tag_out: &mut [u8],
    ) -> Result<()> {
        if !self.encrypt {
            return Err(cipher_failure("encrypt called on a decryption context".into()));
        }
        if tag_out.len() != self.method.tag_len() {
            return Err(cipher_failure(format!(
                "tag buffer is {} bytes, {} expects {}",
                tag_out.len(),
                self.method,
                self.method.tag_len()
            )));
        }
        let nonce = GenericArray::<u8, U16>::from_slice(iv);
        let tag = match &self.core {
            GcmCore::A128(c) => c.encrypt_in_place_detached(nonce, aad, data),
            GcmCore::A256(c) => c.encrypt_in_place_detached(nonce, aad, data),
        }
        .map_err(|e| cipher_failure(format!("{} encrypt: {}", self.method, e)))?;
        tag_out.copy_from_slice(tag.as_slice());
        Ok(())
    }

    /// Расшифровать `data` на месте. Несовпадение тега - CipherFailure, data не валидна.
    pub fn decrypt_in_place(
        &self,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        data: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        if self.encrypt {
            return Err(cipher_failure("decrypt called on an encryption context".into()));
        }
        if tag.len() != self.method.tag_len() {
            return Err(cipher_failure(format!(
                "tag is {} bytes, {} expects {}",
                tag.len(),
                self.method,
                self.method.tag_len()
            )));
        }
        let nonce = GenericArray::<u8, U16>::from_slice(iv);
        let tag = GenericArray::<u8, U16>::from_slice(tag);
        let res = match &self.core {
            GcmCore::A128(c) => c.decrypt_in_place_detached(nonce, aad, data, tag),
            GcmCore::A256(c) => c.decrypt_in_place_detached(nonce, aad, data, tag),
        };
        res.map_err(|_| cipher_failure(format!("{} authentication tag mismatch", self.method)))
    }
}

impl fmt::Debug for PageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCipher")
            .field("method", &self.method)
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}

// ---------------- incremental variant ----------------

/// Incremental AEAD over a buffered record.
///
/// AAD must be added before any data, matching the order GCM authenticates them in.
pub struct IncrementalCipher<'a> {
    cipher: &'a PageCipher,
    iv: [u8; IV_LEN],
    aad: Vec<u8>,
    data: Vec<u8>,
}

impl<'a> IncrementalCipher<'a> {
    pub fn init(cipher: &'a PageCipher, iv: &[u8; IV_LEN]) -> Self {
        Self {
            cipher,
            iv: *iv,
            aad: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn add_aad(&mut self, aad: &[u8]) -> Result<()> {
        if !self.data.is_empty() {
            return Err(cipher_failure("AAD added after data".into()));
        }
        self.aad.extend_from_slice(aad);
        Ok(())
    }

    pub fn add_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Encrypt context: returns (ciphertext, tag). Decrypt context: `tag` is required and
    /// the plaintext is returned with an empty tag.
    pub fn finish(mut self, tag: Option<&[u8]>) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut out = std::mem::take(&mut self.data);
        if self.cipher.is_encrypt() {
            let mut t = vec![0u8; self.cipher.method().tag_len()];
            self.cipher.encrypt_in_place(&self.iv, &self.aad, &mut out, &mut t)?;
            Ok((out, t))
        } else {
            let tag = tag.ok_or_else(|| cipher_failure("decrypt finish without tag".into()))?;
            if let Err(e) = self.cipher.decrypt_in_place(&self.iv, &self.aad, &mut out, tag) {
                out.zeroize();
                return Err(e);
            }
            Ok((out, Vec::new()))
        }
    }
}

impl Drop for IncrementalCipher<'_> {
    fn drop(&mut self) {
        self.data.zeroize();
        self.iv.zeroize();
    }
}
