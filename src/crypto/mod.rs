//! crypto - постраничное AEAD-шифрование (AES-GCM, 16-байтовый IV).
//!
//! Подмодули:
//! - cipher.rs  - AEAD primitive (PageCipher, IncrementalCipher).
//! - counter.rs - общий счётчик для засева IV batch'ей (MemoryCounter, FileCounter).
//! - iv.rs      - IvAllocator: lock-free выдача уникальных IV.
//! - lsn.rs     - источник подменного LSN для non-permanent страниц.
//! - bufenc.rs  - шифрование/расшифровка одной страницы.
//! - walenc.rs  - точки входа для шифрования WAL (пока no-op).
//! - context.rs - CryptoContext: владеет всем вышеперечисленным.
//!
//! Ключи:
//! - KeyProvider отдаёт ключ по назначению (relation / wal) и метод шифрования.
//! - EnvKeyProvider читает ключ из ENV (HEX или BASE64).
//! - StaticKeyProvider удобен для тестов.
//! - NullKeyProvider - шифрование выключено (утилиты, инспекция раскладок).
//!
//! Использование:
//!   let kp = StaticKeyProvider::new(CipherMethod::Aes256Gcm, key.to_vec())?;
//!   let ctx = CryptoContext::open(&cfg, &kp)?;
//!   ctx.encrypt_page(&mut page, true, blkno, file_id)?;

use anyhow::{anyhow, Result};
use base64::Engine;
use std::fmt;
use zeroize::Zeroize;

use crate::consts::{ENV_KEY_BASE64, ENV_KEY_HEX, ENV_METHOD, ENV_WAL_KEY_HEX};
use crate::error::PageCryptError;

pub mod cipher;
pub mod counter;
pub mod iv;
pub mod lsn;
pub mod bufenc;
pub mod walenc;
pub mod context;

pub use cipher::{CipherMethod, IncrementalCipher, PageCipher, GCM_TAG_LEN};
pub use counter::{FileCounter, MemoryCounter, SharedCounter};
pub use iv::IvAllocator;
pub use lsn::{CounterLsnSource, LsnSource};
pub use bufenc::{build_aad, decrypt_page, encrypt_page, AAD_LEN};
pub use walenc::WalEncryption;
pub use context::CryptoContext;

/// Назначение ключа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Relation (table/index) pages.
    Relation,
    /// Write-ahead log records.
    Wal,
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPurpose::Relation => f.write_str("relation"),
            KeyPurpose::Wal => f.write_str("wal"),
        }
    }
}

/// Материал ключа для одного назначения.
#[derive(Clone)]
pub struct KeyMaterial {
    pub purpose: KeyPurpose,
    pub key: Vec<u8>,
}

// Безопасное обнуление: при уничтожении структуры стираем секреты из памяти.
impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("purpose", &self.purpose)
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Источник ключей. Thread-safe.
pub trait KeyProvider: Send + Sync {
    /// Метод шифрования кластера; None - шифрование выключено.
    fn method(&self) -> Option<CipherMethod>;
    /// Вернуть ключ для указанного назначения.
    fn key(&self, purpose: KeyPurpose) -> Result<KeyMaterial>;
}

fn check_key_len(method: CipherMethod, key: &[u8], what: &str) -> Result<()> {
    if key.len() != method.key_len() {
        return Err(PageCryptError::Configuration(format!(
            "{} key must be exactly {} bytes for {}, got {}",
            what,
            method.key_len(),
            method,
            key.len()
        ))
        .into());
    }
    Ok(())
}

/// Простой in-memory провайдер (удобен для тестов).
#[derive(Clone)]
pub struct StaticKeyProvider {
    method: CipherMethod,
    key: Vec<u8>,
    wal_key: Option<Vec<u8>>,
}

impl StaticKeyProvider {
    pub fn new(method: CipherMethod, key: Vec<u8>) -> Result<Self> {
        check_key_len(method, &key, "relation")?;
        Ok(Self {
            method,
            key,
            wal_key: None,
        })
    }

    /// Отдельный ключ для WAL. Без него WAL использует ключ relation.
    pub fn with_wal_key(mut self, key: Vec<u8>) -> Result<Self> {
        check_key_len(self.method, &key, "wal")?;
        self.wal_key = Some(key);
        Ok(self)
    }
}

impl KeyProvider for StaticKeyProvider {
    fn method(&self) -> Option<CipherMethod> {
        Some(self.method)
    }

    fn key(&self, purpose: KeyPurpose) -> Result<KeyMaterial> {
        let key = match (purpose, &self.wal_key) {
            (KeyPurpose::Wal, Some(k)) => k.clone(),
            _ => self.key.clone(),
        };
        Ok(KeyMaterial { purpose, key })
    }
}

impl Drop for StaticKeyProvider {
    fn drop(&mut self) {
        self.key.zeroize();
        if let Some(k) = self.wal_key.as_mut() {
            k.zeroize();
        }
    }
}

/// Провайдер из переменных окружения:
/// - PCRYPT_KEY_HEX     - ключ в hex (16 или 32 байта по методу).
/// - PCRYPT_KEY_BASE64  - альтернативно, ключ в base64.
/// - PCRYPT_METHOD      - aes-128-gcm | aes-256-gcm (по умолчанию aes-256-gcm).
/// - PCRYPT_WAL_KEY_HEX - опционально, отдельный ключ для WAL.
#[derive(Clone)]
pub struct EnvKeyProvider {
    inner: StaticKeyProvider,
}

impl EnvKeyProvider {
    pub fn from_env() -> Result<Self> {
        let method = match std::env::var(ENV_METHOD) {
            Ok(s) => s.parse::<CipherMethod>()?,
            Err(_) => CipherMethod::Aes256Gcm,
        };
        let key = if let Ok(hex) = std::env::var(ENV_KEY_HEX) {
            decode_hex_trimmed(&hex)?
        } else if let Ok(b64) = std::env::var(ENV_KEY_BASE64) {
            decode_base64_trimmed(&b64)?
        } else {
            return Err(PageCryptError::Configuration(format!(
                "EnvKeyProvider: set {} or {}",
                ENV_KEY_HEX, ENV_KEY_BASE64
            ))
            .into());
        };
        let mut inner = StaticKeyProvider::new(method, key)?;
        if let Ok(hex) = std::env::var(ENV_WAL_KEY_HEX) {
            inner = inner.with_wal_key(decode_hex_trimmed(&hex)?)?;
        }
        Ok(Self { inner })
    }
}

impl KeyProvider for EnvKeyProvider {
    fn method(&self) -> Option<CipherMethod> {
        self.inner.method()
    }

    fn key(&self, purpose: KeyPurpose) -> Result<KeyMaterial> {
        self.inner.key(purpose)
    }
}

/// Шифрование выключено: ключей нет.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullKeyProvider;

impl KeyProvider for NullKeyProvider {
    fn method(&self) -> Option<CipherMethod> {
        None
    }

    fn key(&self, purpose: KeyPurpose) -> Result<KeyMaterial> {
        Err(anyhow!("no {} key: encryption is disabled", purpose))
    }
}

// ---------------------- helpers ----------------------

pub(crate) fn decode_hex_trimmed(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(anyhow!("hex key must have even length"));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for i in (0..bytes.len()).step_by(2) {
        let h = (bytes[i] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i))?;
        let l = (bytes[i + 1] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i + 1))?;
        out.push(((h << 4) | l) as u8);
    }
    Ok(out)
}

pub(crate) fn decode_base64_trimmed(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s.as_bytes())
        .map_err(|e| anyhow!("base64 decode: {}", e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_base64_decoding() {
        assert_eq!(decode_hex_trimmed(" 00ff10 ").unwrap(), vec![0x00, 0xff, 0x10]);
        assert!(decode_hex_trimmed("abc").is_err());
        assert!(decode_hex_trimmed("zz").is_err());
        assert_eq!(decode_base64_trimmed("AAEC").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn static_provider_checks_length_and_wal_key() {
        assert!(StaticKeyProvider::new(CipherMethod::Aes256Gcm, vec![0u8; 16]).is_err());
        let kp = StaticKeyProvider::new(CipherMethod::Aes128Gcm, vec![1u8; 16])
            .unwrap()
            .with_wal_key(vec![2u8; 16])
            .unwrap();
        assert_eq!(kp.method(), Some(CipherMethod::Aes128Gcm));
        assert_eq!(kp.key(KeyPurpose::Relation).unwrap().key, vec![1u8; 16]);
        assert_eq!(kp.key(KeyPurpose::Wal).unwrap().key, vec![2u8; 16]);
    }

    #[test]
    fn null_provider_has_no_keys() {
        let kp = NullKeyProvider;
        assert!(kp.method().is_none());
        assert!(kp.key(KeyPurpose::Relation).is_err());
    }
}
