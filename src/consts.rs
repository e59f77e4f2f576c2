//! Общие константы форматов (block sizes, reserved footer, layout files, IV counter).

// -------- Block size --------
pub const MIN_BLOCK_SIZE: u32 = 1024;
pub const MAX_BLOCK_SIZE: u32 = 32 * 1024;
pub const DEFAULT_BLOCK_SIZE: u32 = 8192;

// -------- Reserved footer --------
// Footer space is handed out in 8-byte chunks from the end of the page.
pub const RESERVED_CHUNK_BITS: u32 = 3;
pub const RESERVED_CHUNK_SIZE: usize = 1 << RESERVED_CHUNK_BITS;
pub const MAX_RESERVED_SIZE: usize = 128;

// -------- Page features --------
/// Cluster subdirectory holding persisted layouts, one file per layout name.
pub const PAGEFEAT_DIR: &str = "pagefeat";
pub const FEATURE_NAME_MAX: usize = 20;
pub const MAX_PAGE_FEATURES: usize = 16;

// -------- IV counter --------
pub const IV_COUNTER_FILE: &str = "ivcounter";
pub const IV_LEN: usize = 16;
pub const IV_BATCH_BITS: u32 = 10;
pub const IV_BATCH_SIZE: u64 = 1 << IV_BATCH_BITS;
pub const IV_BATCH_MASK: u64 = IV_BATCH_SIZE - 1;

// -------- ENV --------
pub const ENV_BLOCK_SIZE: &str = "PCRYPT_BLOCK_SIZE";
pub const ENV_RESERVED: &str = "PCRYPT_RESERVED";
pub const ENV_DATA_DIR: &str = "PCRYPT_DATA_DIR";
pub const ENV_LAYOUT: &str = "PCRYPT_LAYOUT";
pub const ENV_ENCRYPTION: &str = "PCRYPT_ENCRYPTION";
pub const ENV_METHOD: &str = "PCRYPT_METHOD";
pub const ENV_KEY_HEX: &str = "PCRYPT_KEY_HEX";
pub const ENV_KEY_BASE64: &str = "PCRYPT_KEY_BASE64";
pub const ENV_WAL_KEY_HEX: &str = "PCRYPT_WAL_KEY_HEX";
