use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI для pagecrypt: раскладки footer, геометрия блока, шифрование файлов страниц.
#[derive(Parser, Debug)]
#[command(name = "pagecrypt", version, about = "pagecrypt CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Параметры кластера для команд, работающих со страницами.
/// Не заданные флаги берутся из PCRYPT_* (см. CryptConfig::from_env).
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Cluster data directory (layouts, IV counter)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Page feature layout name under <data_dir>/pagefeat
    #[arg(long)]
    pub layout: Option<String>,
    #[arg(long)]
    pub block_size: Option<u32>,
    /// Reserved footer: none|8|16|32|64|128
    #[arg(long)]
    pub reserved: Option<String>,
    /// File identifier bound into every page's AAD
    #[arg(long, default_value_t = 0)]
    pub file_id: u32,
    /// First block number of the file (pages are numbered consecutively)
    #[arg(long, default_value_t = 0)]
    pub first_block: u32,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create and persist a page feature layout
    ///
    /// Пример:
    ///   pagecrypt layout-create --data-dir ./db --name main \
    ///     --feature encryption_tags --feature extended_checksums=64 --feature app_lsn=8
    LayoutCreate {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        name: String,
        /// Reserved footer the layout must fit into: none|8|16|32|64|128
        #[arg(long, default_value = "32")]
        reserved: String,
        #[arg(long, default_value_t = 16)]
        max_features: usize,
        /// name[=size]; size 0 or omitted means the built-in default
        #[arg(long = "feature")]
        feature: Vec<String>,
    },
    /// Show one layout, or list all layouts when --name is omitted
    LayoutShow {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the geometry derived from a block size and reserved setting
    Blocksize {
        #[arg(long, default_value_t = 8192)]
        block_size: u32,
        #[arg(long, default_value = "none")]
        reserved: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Encrypt a file of pages (key from PCRYPT_KEY_HEX / PCRYPT_KEY_BASE64)
    EncryptFile {
        #[arg(long)]
        input: PathBuf,
        /// Output file (must not exist)
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        page: PageArgs,
        /// Pages belong to a relation without WAL (substitute LSNs are stamped)
        #[arg(long, default_value_t = false)]
        non_permanent: bool,
    },
    /// Decrypt a file of pages; the first tag mismatch aborts
    DecryptFile {
        #[arg(long)]
        input: PathBuf,
        /// Output file (must not exist)
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        page: PageArgs,
        #[arg(long, default_value_t = false)]
        non_permanent: bool,
    },
    /// Generate a random key for PCRYPT_KEY_HEX / PCRYPT_KEY_BASE64
    Keygen {
        #[arg(long, default_value = "aes-256-gcm")]
        method: String,
        /// Print base64 instead of hex
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
}
