//! crypto/context - CryptoContext: всё состояние шифрования кластера в одном объекте.
//!
//! Владеет: BlockSizeConfig, зафиксированной раскладкой (Arc<FeatureRegistry>),
//! направленными cipher-контекстами, IvAllocator, источником подменного LSN и
//! WAL entry points. Строится один раз при старте и разделяется между потоками (Send + Sync).

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::Arc;

use super::bufenc;
use super::cipher::{CipherMethod, PageCipher};
use super::counter::{FileCounter, MemoryCounter, SharedCounter};
use super::iv::IvAllocator;
use super::lsn::{CounterLsnSource, LsnSource};
use super::walenc::WalEncryption;
use super::{KeyProvider, KeyPurpose, NullKeyProvider};
use crate::blocksize::BlockSizeConfig;
use crate::config::CryptConfig;
use crate::consts::{IV_COUNTER_FILE, IV_LEN};
use crate::error::PageCryptError;
use crate::metrics;
use crate::page::{
    page_set_feature_bitmap, page_update_extended_checksum, page_verify_extended_checksum,
};
use crate::pagefeat::{open_cluster_layout, BuiltinFeature, FeatureRegistry};

pub struct CryptoContext {
    config: BlockSizeConfig,
    registry: Arc<FeatureRegistry>,
    method: Option<CipherMethod>,
    enc: Option<PageCipher>,
    dec: Option<PageCipher>,
    iv: IvAllocator,
    lsn: Arc<dyn LsnSource>,
    // (offset, size) внутри страницы, резолвятся один раз
    encryption_region: Option<(usize, usize)>,
    checksum_region: Option<(usize, usize)>,
    wal: WalEncryption,
}

fn config_error(msg: String) -> anyhow::Error {
    PageCryptError::Configuration(msg).into()
}

impl CryptoContext {
    pub fn new(
        config: BlockSizeConfig,
        registry: Arc<FeatureRegistry>,
        keys: &dyn KeyProvider,
        counter: Arc<dyn SharedCounter>,
        lsn: Arc<dyn LsnSource>,
    ) -> Result<Self> {
        let page_size = config.block_size();
        if registry.bytes_used() > config.reserved_bytes() {
            return Err(config_error(format!(
                "layout '{}' uses {} bytes but the reserved footer is {} bytes",
                registry.name(),
                registry.bytes_used(),
                config.reserved_bytes()
            )));
        }

        let encryption_region = registry.feature_region(page_size, BuiltinFeature::EncryptionTags);
        let checksum_region = registry.feature_region(page_size, BuiltinFeature::ExtendedChecksums);

        let method = keys.method();
        let (enc, dec) = match method {
            Some(m) => {
                let (_, size) = encryption_region.ok_or_else(|| {
                    config_error(format!(
                        "encryption requires feature '{}' but layout '{}' lacks it",
                        BuiltinFeature::EncryptionTags.name(),
                        registry.name()
                    ))
                })?;
                if size < IV_LEN + m.tag_len() {
                    return Err(config_error(format!(
                        "feature '{}' is {} bytes, {} needs {}",
                        BuiltinFeature::EncryptionTags.name(),
                        size,
                        m,
                        IV_LEN + m.tag_len()
                    )));
                }
                let key = keys.key(KeyPurpose::Relation)?;
                (
                    Some(PageCipher::new(m, &key.key, true)?),
                    Some(PageCipher::new(m, &key.key, false)?),
                )
            }
            None => (None, None),
        };

        log::info!(
            "crypto: block_size={} reserved={} layout='{}' method={}",
            page_size,
            config.reserved_bytes(),
            registry.name(),
            method.map(|m| m.name()).unwrap_or("disabled")
        );

        Ok(Self {
            config,
            registry,
            method,
            enc,
            dec,
            iv: IvAllocator::new(counter),
            lsn,
            encryption_region,
            checksum_region,
            wal: WalEncryption::new(method),
        })
    }

    /// Контекст без шифрования: инспекция раскладок, extended checksum.
    pub fn for_tooling(config: BlockSizeConfig, registry: Arc<FeatureRegistry>) -> Result<Self> {
        Self::new(
            config,
            registry,
            &NullKeyProvider,
            Arc::new(MemoryCounter::default()),
            Arc::new(CounterLsnSource::new()),
        )
    }

    /// Собрать контекст из конфигурации: раскладка из `<data_dir>/pagefeat/<layout>`,
    /// общий счётчик IV в `<data_dir>/ivcounter` (без data_dir - в памяти процесса).
    pub fn open(cfg: &CryptConfig, keys: &dyn KeyProvider) -> Result<Self> {
        let config = BlockSizeConfig::init(cfg.block_size, cfg.reserved)?;

        let registry = match (&cfg.data_dir, cfg.layout_name.as_deref()) {
            (Some(dir), name) => open_cluster_layout(dir, name)?,
            (None, Some(name)) if !name.trim().is_empty() => {
                return Err(config_error(format!(
                    "layout '{}' requested but no data directory configured",
                    name
                )))
            }
            (None, _) => FeatureRegistry::empty(),
        };

        let counter: Arc<dyn SharedCounter> = match &cfg.data_dir {
            Some(dir) => {
                let path = dir.join(IV_COUNTER_FILE);
                Arc::new(
                    FileCounter::open_or_create(&path)
                        .with_context(|| format!("open IV counter {}", path.display()))?,
                )
            }
            None => Arc::new(MemoryCounter::default()),
        };

        let keys: &dyn KeyProvider = if cfg.encryption_enabled {
            match keys.method() {
                Some(m) if m == cfg.method => keys,
                Some(m) => {
                    return Err(config_error(format!(
                        "configured method {} but key provider supplies {}",
                        cfg.method, m
                    )))
                }
                None => {
                    return Err(config_error(
                        "encryption enabled but the key provider has no key".into(),
                    ))
                }
            }
        } else {
            &NullKeyProvider
        };

        Self::new(
            config,
            Arc::new(registry),
            keys,
            counter,
            Arc::new(CounterLsnSource::new()),
        )
    }

    // ---------------- page operations ----------------

    pub fn encrypt_page(
        &self,
        page: &mut [u8],
        is_permanent: bool,
        block_number: u32,
        file_id: u32,
    ) -> Result<()> {
        bufenc::encrypt_page(self, page, is_permanent, block_number, file_id)
    }

    pub fn decrypt_page(
        &self,
        page: &mut [u8],
        is_permanent: bool,
        block_number: u32,
        file_id: u32,
    ) -> Result<()> {
        bufenc::decrypt_page(self, page, is_permanent, block_number, file_id)
    }

    /// Записать extended checksum, если раскладка его содержит. Возвращает true, если записан.
    pub fn set_extended_checksum(&self, page: &mut [u8], block_number: u32) -> Result<bool> {
        let Some((off, size)) = self.checksum_region else {
            return Ok(false);
        };
        if page.len() != self.config.block_size() {
            return Err(anyhow!(
                "page buffer is {} bytes, cluster block size is {}",
                page.len(),
                self.config.block_size()
            ));
        }
        page_set_feature_bitmap(page, self.registry.builtin_bitmap());
        page_update_extended_checksum(page, off, size, block_number)?;
        Ok(true)
    }

    /// Проверить extended checksum. Страницы, записанные не под этой раскладкой, не проверяются.
    pub fn verify_extended_checksum(&self, page: &[u8], block_number: u32) -> Result<bool> {
        let off = self
            .registry
            .page_feature_offset(page, BuiltinFeature::ExtendedChecksums);
        if off == 0 {
            return Ok(true);
        }
        let size = self
            .registry
            .page_feature_size(page, BuiltinFeature::ExtendedChecksums);
        let ok = page_verify_extended_checksum(page, off, size, block_number)?;
        if !ok {
            metrics::record_checksum_failure();
            log::warn!("extended checksum mismatch on block {}", block_number);
        }
        Ok(ok)
    }

    // ---------------- accessors ----------------

    pub fn block_size_config(&self) -> &BlockSizeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FeatureRegistry> {
        &self.registry
    }

    pub fn method(&self) -> Option<CipherMethod> {
        self.method
    }

    pub fn is_encryption_enabled(&self) -> bool {
        self.enc.is_some()
    }

    pub fn checksum_region(&self) -> Option<(usize, usize)> {
        self.checksum_region
    }

    pub fn iv_allocator(&self) -> &IvAllocator {
        &self.iv
    }

    pub fn lsn_source(&self) -> &dyn LsnSource {
        self.lsn.as_ref()
    }

    pub fn wal(&self) -> &WalEncryption {
        &self.wal
    }

    /// Регион encryption_tags; ошибка, если шифрование выключено.
    pub fn encryption_region(&self) -> Result<(usize, usize)> {
        match (self.enc.is_some(), self.encryption_region) {
            (true, Some(r)) => Ok(r),
            _ => Err(config_error("page encryption is disabled".into())),
        }
    }

    pub(crate) fn encrypt_cipher(&self) -> Result<&PageCipher> {
        self.enc
            .as_ref()
            .ok_or_else(|| config_error("page encryption is disabled".into()))
    }

    pub(crate) fn decrypt_cipher(&self) -> Result<&PageCipher> {
        self.dec
            .as_ref()
            .ok_or_else(|| config_error("page encryption is disabled".into()))
    }
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext")
            .field("config", &self.config)
            .field("layout", &self.registry.name())
            .field("method", &self.method)
            .field("encryption_region", &self.encryption_region)
            .field("checksum_region", &self.checksum_region)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocksize::ReservedSize;
    use crate::crypto::StaticKeyProvider;

    fn layout(cap: usize) -> FeatureRegistry {
        let mut reg = FeatureRegistry::new("t", cap, 16).unwrap();
        reg.add_feature(BuiltinFeature::EncryptionTags, 0).unwrap();
        reg
    }

    #[test]
    fn rejects_layout_larger_than_footer() {
        let cfg = BlockSizeConfig::init(8192, ReservedSize::Bytes16).unwrap();
        let err = CryptoContext::for_tooling(cfg, Arc::new(layout(64))).unwrap_err();
        assert!(err.to_string().contains("reserved footer"));
    }

    #[test]
    fn encryption_needs_tags_region() {
        let cfg = BlockSizeConfig::init(8192, ReservedSize::Bytes32).unwrap();
        let kp = StaticKeyProvider::new(CipherMethod::Aes128Gcm, vec![0u8; 16]).unwrap();
        let err = CryptoContext::new(
            cfg,
            Arc::new(FeatureRegistry::empty()),
            &kp,
            Arc::new(MemoryCounter::default()),
            Arc::new(CounterLsnSource::new()),
        )
        .unwrap_err();
        assert!(crate::error::error_kind(&err).unwrap().is_fatal());

        let ctx = CryptoContext::new(
            cfg,
            Arc::new(layout(32)),
            &kp,
            Arc::new(MemoryCounter::default()),
            Arc::new(CounterLsnSource::new()),
        )
        .unwrap();
        assert!(ctx.is_encryption_enabled());
        assert_eq!(ctx.encryption_region().unwrap(), (8192 - 32, 32));
    }

    #[test]
    fn tooling_context_refuses_to_encrypt() {
        let cfg = BlockSizeConfig::init(1024, ReservedSize::Bytes32).unwrap();
        let ctx = CryptoContext::for_tooling(cfg, Arc::new(layout(32))).unwrap();
        let mut page = vec![0u8; 1024];
        assert!(ctx.encrypt_page(&mut page, false, 0, 0).is_err());
    }
}
