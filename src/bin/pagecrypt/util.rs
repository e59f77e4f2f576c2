use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use pagecrypt::{ConfigBuilder, CryptConfig, ReservedSize};

use crate::cli::PageArgs;

/// `name[=size]` → (name, size). Size omitted means 0 (built-in default).
pub fn parse_feature_arg(arg: &str) -> Result<(String, usize)> {
    match arg.split_once('=') {
        Some((name, size)) => {
            let size = size
                .trim()
                .parse::<usize>()
                .map_err(|e| anyhow!("feature '{}': bad size '{}': {}", name, size, e))?;
            Ok((name.trim().to_string(), size))
        }
        None => Ok((arg.trim().to_string(), 0)),
    }
}

/// Собрать CryptConfig: ENV (PCRYPT_*) + явные флаги CLI.
pub fn page_config(args: &PageArgs, encryption: bool) -> Result<CryptConfig> {
    let mut b = ConfigBuilder::new().encryption(encryption);
    if let Some(d) = &args.data_dir {
        b = b.data_dir(d.clone());
    }
    if let Some(l) = &args.layout {
        b = b.layout_name(l.clone());
    }
    if let Some(bs) = args.block_size {
        b = b.block_size(bs);
    }
    if let Some(r) = &args.reserved {
        b = b.reserved(r.parse::<ReservedSize>()?);
    }
    Ok(b.build())
}

pub fn read_all(path: &Path) -> Result<Vec<u8>> {
    let mut f = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Записать новый файл (create_new) и fsync.
pub fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("create {}", path.display()))?;
    f.write_all(data)?;
    f.sync_all()?;
    Ok(())
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
