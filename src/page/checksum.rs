//! page/checksum - extended checksum, хранится в footer region `extended_checksums`.
//!
//! - region[0..4]  - CRC32C (LE) по всей странице с занулённым region, затем block number (LE);
//! - region[4..]   - нули;
//! - stored == 0 на странице без LSN считается допустимым (новая/пустая страница).
//!
//! Block number подмешивается в CRC, поэтому страница, скопированная на чужое место,
//! не пройдёт проверку даже без шифрования.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::header::page_get_lsn;

#[inline]
fn check_region(page: &[u8], offset: usize, size: usize) -> Result<()> {
    if size < 4 || offset.checked_add(size).map(|end| end > page.len()).unwrap_or(true) {
        return Err(anyhow!(
            "extended checksum region [{}; {}] outside page of {} bytes",
            offset,
            size,
            page.len()
        ));
    }
    Ok(())
}

fn compute(page: &[u8], offset: usize, size: usize, block_number: u32) -> u32 {
    // CRC по частям вместо копии страницы: до region, нули region, после region.
    let mut crc = crc32c::crc32c(&page[..offset]);
    crc = crc32c::crc32c_append(crc, &vec![0u8; size]);
    crc = crc32c::crc32c_append(crc, &page[offset + size..]);
    let mut blk = [0u8; 4];
    LittleEndian::write_u32(&mut blk, block_number);
    crc32c::crc32c_append(crc, &blk)
}

/// Пересчитать и записать extended checksum.
pub fn page_update_extended_checksum(
    page: &mut [u8],
    offset: usize,
    size: usize,
    block_number: u32,
) -> Result<()> {
    check_region(page, offset, size)?;
    let crc = compute(page, offset, size, block_number);
    page[offset..offset + size].fill(0);
    LittleEndian::write_u32(&mut page[offset..offset + 4], crc);
    Ok(())
}

/// Проверить extended checksum. true = ок.
pub fn page_verify_extended_checksum(
    page: &[u8],
    offset: usize,
    size: usize,
    block_number: u32,
) -> Result<bool> {
    check_region(page, offset, size)?;
    let stored = LittleEndian::read_u32(&page[offset..offset + 4]);
    if stored == 0 && page_get_lsn(page) == 0 {
        return Ok(true);
    }
    Ok(stored == compute(page, offset, size, block_number))
}
