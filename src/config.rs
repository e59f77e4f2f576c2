//! Centralized configuration and builder for pagecrypt.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - CryptConfig::from_env() reads the PCRYPT_* variables.
//! - ConfigBuilder returns a CryptConfig, which CryptoContext::open consumes.
//!
//! Keys are not part of the configuration; they come from a KeyProvider.

use std::fmt;
use std::path::PathBuf;

use crate::blocksize::{BlockSizeConfig, ReservedSize};
use crate::consts::{
    DEFAULT_BLOCK_SIZE, ENV_BLOCK_SIZE, ENV_DATA_DIR, ENV_ENCRYPTION, ENV_LAYOUT, ENV_METHOD,
    ENV_RESERVED,
};
use crate::crypto::CipherMethod;

/// Top-level configuration of the page encryption layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptConfig {
    /// Block size in bytes (power of two, 1K..32K).
    /// Env: PCRYPT_BLOCK_SIZE (default 8192)
    pub block_size: u32,

    /// Reserved footer at the end of every page.
    /// Env: PCRYPT_RESERVED = none|8|16|32|64|128 (default 32)
    pub reserved: ReservedSize,

    /// Cluster data directory (layouts, IV counter). None - in-memory counter, empty layout.
    /// Env: PCRYPT_DATA_DIR
    pub data_dir: Option<PathBuf>,

    /// Name of the page feature layout under <data_dir>/pagefeat.
    /// Env: PCRYPT_LAYOUT (default none → empty layout)
    pub layout_name: Option<String>,

    /// Enable page encryption.
    /// Env: PCRYPT_ENCRYPTION = 0|1|true|false (default false)
    pub encryption_enabled: bool,

    /// Cipher method when encryption is enabled.
    /// Env: PCRYPT_METHOD = aes-128-gcm|aes-256-gcm (default aes-256-gcm)
    pub method: CipherMethod,
}

impl Default for CryptConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            reserved: ReservedSize::Bytes32,
            data_dir: None,
            layout_name: None,
            encryption_enabled: false,
            method: CipherMethod::Aes256Gcm,
        }
    }
}

fn parse_bool(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

impl CryptConfig {
    /// Load configuration from environment variables. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var(ENV_BLOCK_SIZE) {
            match v.trim().parse::<u32>() {
                Ok(n) => cfg.block_size = n,
                Err(_) => log::warn!("{}: ignoring unparseable value '{}'", ENV_BLOCK_SIZE, v),
            }
        }

        if let Ok(v) = std::env::var(ENV_RESERVED) {
            match v.parse::<ReservedSize>() {
                Ok(r) => cfg.reserved = r,
                Err(e) => log::warn!("{}: {}", ENV_RESERVED, e),
            }
        }

        if let Ok(v) = std::env::var(ENV_DATA_DIR) {
            let s = v.trim();
            if !s.is_empty() {
                cfg.data_dir = Some(PathBuf::from(s));
            }
        }

        if let Ok(v) = std::env::var(ENV_LAYOUT) {
            let s = v.trim();
            if !s.is_empty() {
                cfg.layout_name = Some(s.to_string());
            }
        }

        if let Ok(v) = std::env::var(ENV_ENCRYPTION) {
            cfg.encryption_enabled = parse_bool(&v);
        }

        if let Ok(v) = std::env::var(ENV_METHOD) {
            match v.parse::<CipherMethod>() {
                Ok(m) => cfg.method = m,
                Err(e) => log::warn!("{}: {}", ENV_METHOD, e),
            }
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    pub fn with_reserved(mut self, reserved: ReservedSize) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.data_dir = dir.map(Into::into);
        self
    }

    pub fn with_layout_name<S: Into<String>>(mut self, name: Option<S>) -> Self {
        self.layout_name = name.map(Into::into);
        self
    }

    /// Enable/disable page encryption.
    pub fn with_encryption(mut self, on: bool) -> Self {
        self.encryption_enabled = on;
        self
    }

    pub fn with_method(mut self, method: CipherMethod) -> Self {
        self.method = method;
        self
    }

    /// Validate block size / reserved setting and derive the layout constants.
    pub fn block_size_config(&self) -> anyhow::Result<BlockSizeConfig> {
        BlockSizeConfig::init(self.block_size, self.reserved)
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for CryptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CryptConfig {{ \
             block_size: {}, \
             reserved: {}, \
             data_dir: {}, \
             layout: {}, \
             encryption: {}, \
             method: {} \
             }}",
            self.block_size,
            self.reserved,
            self.data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none(in-memory)".to_string()),
            self.layout_name.as_deref().unwrap_or("empty"),
            self.encryption_enabled,
            self.method,
        )
    }
}

/// Lightweight builder that produces a CryptConfig.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    cfg: CryptConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: CryptConfig::from_env(),
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: CryptConfig::default(),
        }
    }

    pub fn block_size(mut self, size: u32) -> Self {
        self.cfg.block_size = size;
        self
    }

    pub fn reserved(mut self, reserved: ReservedSize) -> Self {
        self.cfg.reserved = reserved;
        self
    }

    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cfg.data_dir = Some(dir.into());
        self
    }

    pub fn layout_name<S: Into<String>>(mut self, name: S) -> Self {
        self.cfg.layout_name = Some(name.into());
        self
    }

    pub fn encryption(mut self, on: bool) -> Self {
        self.cfg.encryption_enabled = on;
        self
    }

    pub fn method(mut self, method: CipherMethod) -> Self {
        self.cfg.method = method;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> CryptConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_setters() {
        let cfg = CryptConfig::default();
        assert_eq!(cfg.block_size, 8192);
        assert_eq!(cfg.reserved, ReservedSize::Bytes32);
        assert!(!cfg.encryption_enabled);

        let cfg = cfg
            .with_block_size(4096)
            .with_reserved(ReservedSize::Bytes64)
            .with_layout_name(Some("main"))
            .with_encryption(true)
            .with_method(CipherMethod::Aes128Gcm)
            .build();
        assert_eq!(cfg.block_size_config().unwrap().block_size(), 4096);
        let s = cfg.to_string();
        assert!(s.contains("layout: main"));
        assert!(s.contains("aes-128-gcm"));
    }

    #[test]
    fn builder_from_default_ignores_env() {
        let cfg = ConfigBuilder::from_default()
            .block_size(2048)
            .data_dir("/tmp/pc")
            .encryption(true)
            .build();
        assert_eq!(cfg.block_size, 2048);
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/tmp/pc")));
        assert!(cfg.encryption_enabled);
        assert_eq!(cfg.layout_name, None);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool(" On "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
    }
}
