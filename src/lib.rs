// Базовые модули
pub mod consts;
pub mod error;
pub mod metrics;
pub mod config;

// Раскладка страницы и reserved footer
pub mod blocksize; // src/blocksize.rs
pub mod page;      // src/page/{mod,common,header,checksum}.rs
pub mod pagefeat;  // src/pagefeat/{mod,builtin,registry,persist,cluster}.rs

// Криптография (per-page AEAD)
pub mod crypto;    // src/crypto/{mod,cipher,counter,iv,lsn,bufenc,walenc,context}.rs

// Удобные реэкспорты
pub use blocksize::{BlockSizeConfig, ReservedSize};
pub use config::{ConfigBuilder, CryptConfig};
pub use error::{error_kind, PageCryptError};
pub use pagefeat::{BuiltinFeature, FeatureDesc, FeatureRegistry};

// Реэкспорты crypto API (для удобства использования из внешнего кода)
pub use crypto::{
    CipherMethod, CryptoContext, EnvKeyProvider, KeyMaterial, KeyProvider, KeyPurpose,
    NullKeyProvider, StaticKeyProvider,
};
