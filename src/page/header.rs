use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::page::common::{
    OFF_CHECKSUM, OFF_FEATURES, OFF_FLAGS, OFF_LOWER, OFF_LSN, OFF_PRUNE_XID, OFF_SPECIAL,
    OFF_UPPER, PAGE_HDR_SIZE, PD_EXTENDED_FEATS, SPLIT_FLAG_BITMASK, SPLIT_OFF_FLAGS,
    SPLIT_OFF_PAGE_ID, SPLIT_OPAQUE_SIZE, SPLIT_PAGE_ID,
};

/// Заголовок страницы.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHeader {
    pub lsn: u64,
    pub checksum: u16,
    pub flags: u16,
    pub lower: u16,
    pub upper: u16,
    pub special: u16,
    pub features: u16,
    pub prune_xid: u32,
}

/// Инициализировать пустую страницу.
///
/// `footer_len` - размер reserved footer (special area кладётся перед ним),
/// `features` - bitmap активной раскладки; ненулевой bitmap выставляет PD_EXTENDED_FEATS.
pub fn page_init(page: &mut [u8], special_size: usize, footer_len: usize, features: u16) -> Result<()> {
    let ps = page.len();
    if ps > u16::MAX as usize + 1 {
        return Err(anyhow!("page size {} does not fit u16 offsets", ps));
    }
    if ps < PAGE_HDR_SIZE + special_size + footer_len {
        return Err(anyhow!(
            "page buffer too small: {} < header {} + special {} + footer {}",
            ps,
            PAGE_HDR_SIZE,
            special_size,
            footer_len
        ));
    }
    page.fill(0);

    let special = (ps - footer_len - special_size) as u16;
    let h = PageHeader {
        lsn: 0,
        checksum: 0,
        flags: if features != 0 { PD_EXTENDED_FEATS } else { 0 },
        lower: PAGE_HDR_SIZE as u16,
        upper: special,
        special,
        features,
        prune_xid: 0,
    };
    page_header_write(page, &h)
}

pub fn page_header_read(page: &[u8]) -> Result<PageHeader> {
    if page.len() < PAGE_HDR_SIZE {
        return Err(anyhow!("page buffer too small for header"));
    }
    Ok(PageHeader {
        lsn: LittleEndian::read_u64(&page[OFF_LSN..OFF_LSN + 8]),
        checksum: LittleEndian::read_u16(&page[OFF_CHECKSUM..OFF_CHECKSUM + 2]),
        flags: LittleEndian::read_u16(&page[OFF_FLAGS..OFF_FLAGS + 2]),
        lower: LittleEndian::read_u16(&page[OFF_LOWER..OFF_LOWER + 2]),
        upper: LittleEndian::read_u16(&page[OFF_UPPER..OFF_UPPER + 2]),
        special: LittleEndian::read_u16(&page[OFF_SPECIAL..OFF_SPECIAL + 2]),
        features: LittleEndian::read_u16(&page[OFF_FEATURES..OFF_FEATURES + 2]),
        prune_xid: LittleEndian::read_u32(&page[OFF_PRUNE_XID..OFF_PRUNE_XID + 4]),
    })
}

pub fn page_header_write(page: &mut [u8], h: &PageHeader) -> Result<()> {
    if page.len() < PAGE_HDR_SIZE {
        return Err(anyhow!("page buffer too small for header"));
    }
    LittleEndian::write_u64(&mut page[OFF_LSN..OFF_LSN + 8], h.lsn);
    LittleEndian::write_u16(&mut page[OFF_CHECKSUM..OFF_CHECKSUM + 2], h.checksum);
    LittleEndian::write_u16(&mut page[OFF_FLAGS..OFF_FLAGS + 2], h.flags);
    LittleEndian::write_u16(&mut page[OFF_LOWER..OFF_LOWER + 2], h.lower);
    LittleEndian::write_u16(&mut page[OFF_UPPER..OFF_UPPER + 2], h.upper);
    LittleEndian::write_u16(&mut page[OFF_SPECIAL..OFF_SPECIAL + 2], h.special);
    LittleEndian::write_u16(&mut page[OFF_FEATURES..OFF_FEATURES + 2], h.features);
    LittleEndian::write_u32(&mut page[OFF_PRUNE_XID..OFF_PRUNE_XID + 4], h.prune_xid);
    Ok(())
}

// ---------- Быстрые аксессоры (без полного разбора) ----------
// Callers guarantee page.len() >= PAGE_HDR_SIZE.

#[inline]
pub fn page_get_lsn(page: &[u8]) -> u64 {
    LittleEndian::read_u64(&page[OFF_LSN..OFF_LSN + 8])
}

#[inline]
pub fn page_set_lsn(page: &mut [u8], lsn: u64) {
    LittleEndian::write_u64(&mut page[OFF_LSN..OFF_LSN + 8], lsn);
}

#[inline]
pub fn page_flags(page: &[u8]) -> u16 {
    LittleEndian::read_u16(&page[OFF_FLAGS..OFF_FLAGS + 2])
}

#[inline]
pub fn page_has_extended_features(page: &[u8]) -> bool {
    page_flags(page) & PD_EXTENDED_FEATS != 0
}

#[inline]
pub fn page_feature_bitmap(page: &[u8]) -> u16 {
    LittleEndian::read_u16(&page[OFF_FEATURES..OFF_FEATURES + 2])
}

/// Отметить страницу как записанную под раскладкой с данным bitmap.
pub fn page_set_feature_bitmap(page: &mut [u8], features: u16) {
    let mut flags = page_flags(page);
    if features != 0 {
        flags |= PD_EXTENDED_FEATS;
    } else {
        flags &= !PD_EXTENDED_FEATS;
    }
    LittleEndian::write_u16(&mut page[OFF_FLAGS..OFF_FLAGS + 2], flags);
    LittleEndian::write_u16(&mut page[OFF_FEATURES..OFF_FEATURES + 2], features);
}

/// Размер special area; footer лежит после неё и в размер не входит.
/// Битый pd_special (за пределами страницы) даёт 0.
#[inline]
pub fn page_special_size(page: &[u8], footer_len: usize) -> usize {
    let special = LittleEndian::read_u16(&page[OFF_SPECIAL..OFF_SPECIAL + 2]) as usize;
    let end = page.len().saturating_sub(footer_len);
    if special < PAGE_HDR_SIZE || special > end {
        return 0;
    }
    end - special
}

/// Index pages that keep their own LSN-like stamp for split detection.
///
/// Signature: special area of exactly SPLIT_OPAQUE_SIZE bytes, SPLIT_PAGE_ID in the
/// trailing page-id field, no flag bits outside SPLIT_FLAG_BITMASK, and a non-zero LSN.
/// A false positive only means a non-durable page keeps its own LSN.
pub fn is_split_tracking_index_page(page: &[u8], footer_len: usize) -> bool {
    if page.len() < PAGE_HDR_SIZE || page_special_size(page, footer_len) != SPLIT_OPAQUE_SIZE {
        return false;
    }
    let special = LittleEndian::read_u16(&page[OFF_SPECIAL..OFF_SPECIAL + 2]) as usize;
    let page_id = LittleEndian::read_u16(&page[special + SPLIT_OFF_PAGE_ID..special + SPLIT_OFF_PAGE_ID + 2]);
    let flags = LittleEndian::read_u16(&page[special + SPLIT_OFF_FLAGS..special + SPLIT_OFF_FLAGS + 2]);
    page_id == SPLIT_PAGE_ID && (flags & !SPLIT_FLAG_BITMASK) == 0 && page_get_lsn(page) != 0
}
