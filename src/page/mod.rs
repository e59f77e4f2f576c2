//! page - on-disk page header, split-tracking detection and the extended checksum.
//!
//! Разделение по подмодулям:
//! - common.rs   - offset’ы заголовка, PD_* флаги, special area split-tracking страниц.
//! - header.rs   - init/read/write заголовка, аксессоры LSN/flags/features.
//! - checksum.rs - extended checksum (CRC32C) в footer region.

pub mod common;
pub mod header;
pub mod checksum;

// ---------------- re-exports (внешний API модуля page) ----------------

pub use common::{
    PAGE_HDR_SIZE, PAGE_ENCRYPT_OFFSET,
    PD_EXTENDED_FEATS,
    SPLIT_OPAQUE_SIZE, SPLIT_PAGE_ID, SPLIT_FLAG_BITMASK,
};

pub use header::{
    PageHeader,
    page_init,
    page_header_read,
    page_header_write,
    page_get_lsn, page_set_lsn,
    page_has_extended_features, page_feature_bitmap, page_set_feature_bitmap,
    page_special_size, is_split_tracking_index_page,
};

pub use checksum::{
    page_update_extended_checksum, page_verify_extended_checksum,
};
