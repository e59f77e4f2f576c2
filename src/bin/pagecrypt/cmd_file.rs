use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use pagecrypt::{CryptoContext, EnvKeyProvider};

use crate::cli::PageArgs;
use crate::util::{page_config, read_all, write_new};

fn open_context(page: &PageArgs) -> Result<CryptoContext> {
    let cfg = page_config(page, true)?;
    log::info!("{}", cfg);
    let keys = EnvKeyProvider::from_env()?;
    CryptoContext::open(&cfg, &keys)
}

fn load_pages(input: &Path, block_size: usize) -> Result<Vec<u8>> {
    let data = read_all(input)?;
    if data.len() % block_size != 0 {
        return Err(anyhow!(
            "{} is {} bytes, not a multiple of block size {}",
            input.display(),
            data.len(),
            block_size
        ));
    }
    Ok(data)
}

/// CLI: encrypt-file - зашифровать файл страниц постранично.
pub fn exec_encrypt(input: PathBuf, out: PathBuf, page: PageArgs, non_permanent: bool) -> Result<()> {
    let ctx = open_context(&page)?;
    let bs = ctx.block_size_config().block_size();
    let mut data = load_pages(&input, bs)?;

    let t0 = Instant::now();
    let mut n = 0u32;
    for (i, p) in data.chunks_mut(bs).enumerate() {
        let blkno = page.first_block.wrapping_add(i as u32);
        ctx.encrypt_page(p, !non_permanent, blkno, page.file_id)?;
        n += 1;
    }
    write_new(&out, &data)?;
    println!(
        "encrypted {} page(s) of {} bytes -> {} in {:.1} ms",
        n,
        bs,
        out.display(),
        t0.elapsed().as_secs_f64() * 1e3
    );
    Ok(())
}

/// CLI: decrypt-file - расшифровать файл страниц; первая ошибка тега прерывает работу.
pub fn exec_decrypt(input: PathBuf, out: PathBuf, page: PageArgs, non_permanent: bool) -> Result<()> {
    let ctx = open_context(&page)?;
    let bs = ctx.block_size_config().block_size();
    let mut data = load_pages(&input, bs)?;

    let t0 = Instant::now();
    let mut n = 0u32;
    for (i, p) in data.chunks_mut(bs).enumerate() {
        let blkno = page.first_block.wrapping_add(i as u32);
        ctx.decrypt_page(p, !non_permanent, blkno, page.file_id)
            .map_err(|e| e.context(format!("block {}", blkno)))?;
        n += 1;
    }
    write_new(&out, &data)?;
    println!(
        "decrypted {} page(s) of {} bytes -> {} in {:.1} ms",
        n,
        bs,
        out.display(),
        t0.elapsed().as_secs_f64() * 1e3
    );
    Ok(())
}
