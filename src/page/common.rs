//! page/common - общие константы/offset’ы заголовка страницы и split-tracking special area.

// ---------- Заголовок страницы (24 байта, LE) ----------
/// Размер заголовка страницы.
pub const PAGE_HDR_SIZE: usize = 24;

/// lsn (u64): LSN последней модификации страницы.
pub const OFF_LSN: usize = 0;
/// checksum (u16): короткая чексумма заголовка (резерв, не используется этим слоем).
pub const OFF_CHECKSUM: usize = 8;
/// flags (u16): PD_* флаги.
pub const OFF_FLAGS: usize = 10;
/// lower (u16): начало свободного места.
pub const OFF_LOWER: usize = 12;
/// upper (u16): конец свободного места.
pub const OFF_UPPER: usize = 14;
/// special (u16): начало special area.
pub const OFF_SPECIAL: usize = 16;
/// features (u16): bitmap built-in фич раскладки, под которой записана страница.
pub const OFF_FEATURES: usize = 18;
/// prune_xid (u32).
pub const OFF_PRUNE_XID: usize = 20;

// ---------- Флаги ----------
pub const PD_HAS_FREE_LINES: u16 = 0x0001;
pub const PD_PAGE_FULL: u16 = 0x0002;
pub const PD_ALL_VISIBLE: u16 = 0x0004;
/// Страница несёт footer features (раскладка из FeatureRegistry).
pub const PD_EXTENDED_FEATS: u16 = 0x0008;

/// Everything before this offset stays in clear text and is authenticated as AAD.
pub const PAGE_ENCRYPT_OFFSET: usize = PAGE_HDR_SIZE;

// ---------- Split-tracking index pages (special area) ----------
// [nsn u64][rightlink u32][flags u16][page_id u16]
pub const SPLIT_OPAQUE_SIZE: usize = 16;
pub const SPLIT_OFF_NSN: usize = 0;
pub const SPLIT_OFF_RIGHTLINK: usize = 8;
pub const SPLIT_OFF_FLAGS: usize = 12;
pub const SPLIT_OFF_PAGE_ID: usize = 14;
/// Identifier stored in the last two bytes of the special area.
pub const SPLIT_PAGE_ID: u16 = 0xFF81;
/// Every valid flag bit of a split-tracking page.
pub const SPLIT_FLAG_BITMASK: u16 = 0x7F;
