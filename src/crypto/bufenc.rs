//! crypto/bufenc - шифрование одной страницы.
//!
//! Раскладка зашифрованной страницы:
//!   [0 .. PAGE_ENCRYPT_OFFSET)              - заголовок, открытым текстом (входит в AAD);
//!   [PAGE_ENCRYPT_OFFSET .. footer_start)   - payload, шифруется на месте;
//!   [footer_start .. page_size)             - reserved footer, не шифруется;
//!       region encryption_tags: IV (16) || tag (16).
//!
//! AAD = header[0..24) || file_id (u32 LE) || block_number (u32 LE).
//! Страница, перенесённая в другой блок/файл или с изменённым заголовком, не расшифруется.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::context::CryptoContext;
use crate::consts::IV_LEN;
use crate::error::PageCryptError;
use crate::metrics::{record_decrypt_failure, record_page_decrypted, record_page_encrypted};
use crate::page::{
    is_split_tracking_index_page, page_feature_bitmap, page_get_lsn, page_set_feature_bitmap,
    page_set_lsn, PAGE_ENCRYPT_OFFSET,
};
use crate::pagefeat::BuiltinFeature;

pub const AAD_LEN: usize = PAGE_ENCRYPT_OFFSET + 4 + 4;

/// Associated data for one page operation. Never stored.
pub fn build_aad(page: &[u8], file_id: u32, block_number: u32) -> [u8; AAD_LEN] {
    let mut aad = [0u8; AAD_LEN];
    aad[..PAGE_ENCRYPT_OFFSET].copy_from_slice(&page[..PAGE_ENCRYPT_OFFSET]);
    LittleEndian::write_u32(&mut aad[PAGE_ENCRYPT_OFFSET..PAGE_ENCRYPT_OFFSET + 4], file_id);
    LittleEndian::write_u32(&mut aad[PAGE_ENCRYPT_OFFSET + 4..], block_number);
    aad
}

fn check_page_len(ctx: &CryptoContext, page: &[u8]) -> Result<()> {
    let bs = ctx.block_size_config().block_size();
    if page.len() != bs {
        return Err(anyhow!(
            "page buffer is {} bytes, cluster block size is {}",
            page.len(),
            bs
        ));
    }
    Ok(())
}

/// Зашифровать страницу на месте.
///
/// Non-permanent pages get a substitute LSN first (split-tracking index pages keep theirs),
/// then the page is stamped with the cluster feature bitmap so readers can locate the footer.
pub fn encrypt_page(
    ctx: &CryptoContext,
    page: &mut [u8],
    is_permanent: bool,
    block_number: u32,
    file_id: u32,
) -> Result<()> {
    check_page_len(ctx, page)?;
    let cipher = ctx.encrypt_cipher()?;
    let (region_off, _) = ctx.encryption_region()?;
    let footer_start = ctx.block_size_config().footer_start();
    let reserved = ctx.block_size_config().reserved_bytes();

    if is_permanent {
        if page_get_lsn(page) == 0 {
            return Err(anyhow!(
                "permanent page {} of file {} has no LSN",
                block_number,
                file_id
            ));
        }
    } else if !is_split_tracking_index_page(page, reserved) {
        page_set_lsn(page, ctx.lsn_source().next_lsn());
    }
    page_set_feature_bitmap(page, ctx.registry().builtin_bitmap());

    let iv = ctx.iv_allocator().next_iv()?;
    let aad = build_aad(page, file_id, block_number);
    let tag_len = cipher.method().tag_len();

    let (head, footer) = page.split_at_mut(footer_start);
    let payload = &mut head[PAGE_ENCRYPT_OFFSET..];
    let region = &mut footer[region_off - footer_start..];
    region[..IV_LEN].copy_from_slice(&iv);
    if let Err(e) =
        cipher.encrypt_in_place(&iv, &aad, payload, &mut region[IV_LEN..IV_LEN + tag_len])
    {
        log::error!("cannot encrypt page {} of file {}: {}", block_number, file_id, e);
        return Err(e);
    }

    record_page_encrypted(payload.len());
    Ok(())
}

/// Расшифровать страницу на месте. Несовпадение тега - CipherFailure (страница испорчена
/// или подменена); payload в этом случае остаётся зашифрованным.
pub fn decrypt_page(
    ctx: &CryptoContext,
    page: &mut [u8],
    is_permanent: bool,
    block_number: u32,
    file_id: u32,
) -> Result<()> {
    check_page_len(ctx, page)?;
    let cipher = ctx.decrypt_cipher()?;
    let footer_start = ctx.block_size_config().footer_start();

    let region_off = ctx
        .registry()
        .page_feature_offset(page, BuiltinFeature::EncryptionTags);
    if region_off == 0 {
        record_decrypt_failure();
        return Err(PageCryptError::CipherFailure(format!(
            "page {} of file {} does not carry layout '{}' (bitmap {:#06x})",
            block_number,
            file_id,
            ctx.registry().name(),
            page_feature_bitmap(page)
        ))
        .into());
    }

    let tag_len = cipher.method().tag_len();
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&page[region_off..region_off + IV_LEN]);
    let tag = page[region_off + IV_LEN..region_off + IV_LEN + tag_len].to_vec();
    let aad = build_aad(page, file_id, block_number);

    let payload = &mut page[PAGE_ENCRYPT_OFFSET..footer_start];
    if let Err(e) = cipher.decrypt_in_place(&iv, &aad, payload, &tag) {
        record_decrypt_failure();
        log::warn!(
            "cannot decrypt page {} of file {} (permanent={}): {}",
            block_number,
            file_id,
            is_permanent,
            e
        );
        return Err(e);
    }

    record_page_decrypted();
    Ok(())
}
