//! blocksize - derived layout constants for the cluster block size.
//!
//! Вход: raw block size (2^n, 1 KiB ..= 32 KiB) и reserved footer setting.
//! Выход: неизменяемый BlockSizeConfig:
//! - block_setting: 1 = 1K, 2 = 2K, .. 6 = 32K (0 is never produced);
//! - block_bits = block_setting + 9;
//! - reserved_bytes = chunks << RESERVED_CHUNK_BITS;
//! - fsm: free-space-map geometry that depends on both values.
//!
//! The value is computed once at startup and handed to CryptoContext; every size
//! derived from the block size must agree with the reserved footer size used by the
//! page feature registry.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::consts::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, RESERVED_CHUNK_BITS};
use crate::error::PageCryptError;
use crate::page::common::PAGE_HDR_SIZE;

/// Reserved footer setting. Values are counts of 8-byte chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReservedSize {
    None = 0,
    Bytes8 = 1,
    Bytes16 = 2,
    Bytes32 = 4,
    Bytes64 = 8,
    Bytes128 = 16,
}

impl ReservedSize {
    pub const ALL: [ReservedSize; 6] = [
        ReservedSize::None,
        ReservedSize::Bytes8,
        ReservedSize::Bytes16,
        ReservedSize::Bytes32,
        ReservedSize::Bytes64,
        ReservedSize::Bytes128,
    ];

    #[inline]
    pub fn chunks(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn bytes(self) -> usize {
        self.chunks() << RESERVED_CHUNK_BITS
    }

    /// Exact byte count → setting. Sizes between settings are not accepted.
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.bytes() == bytes)
    }
}

impl FromStr for ReservedSize {
    type Err = PageCryptError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        if t == "none" || t == "no reserved space" {
            return Ok(ReservedSize::None);
        }
        t.parse::<usize>()
            .ok()
            .and_then(ReservedSize::from_bytes)
            .ok_or_else(|| {
                PageCryptError::Configuration(format!(
                    "invalid reserved page size '{}' (expected none, 0, 8, 16, 32, 64 or 128)",
                    s
                ))
            })
    }
}

impl fmt::Display for ReservedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservedSize::None => write!(f, "none"),
            r => write!(f, "{}", r.bytes()),
        }
    }
}

/// Free-space-map geometry, sized after the block and the footer it must leave alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FsmGeometry {
    pub nodes_per_page: usize,
    pub non_leaf_nodes_per_page: usize,
    pub slots_per_page: usize,
    /// Bytes of free space represented by one FSM category.
    pub cat_step: usize,
}

/// fp_next_slot (u32) precedes the node array on an FSM page.
const FSM_PAGE_PREFIX: usize = 4;
const FSM_CATEGORIES: usize = 256;

impl FsmGeometry {
    fn compute(block_size: usize, reserved_bytes: usize) -> Self {
        let nodes_per_page = block_size - PAGE_HDR_SIZE - FSM_PAGE_PREFIX - reserved_bytes;
        let non_leaf_nodes_per_page = block_size / 2 - 1;
        Self {
            nodes_per_page,
            non_leaf_nodes_per_page,
            slots_per_page: nodes_per_page - non_leaf_nodes_per_page,
            cat_step: block_size / FSM_CATEGORIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSizeConfig {
    block_setting: u32,
    reserved: ReservedSize,
    reserved_bytes: usize,
    fsm: FsmGeometry,
}

#[inline]
pub fn is_valid_block_size(size: u32) -> bool {
    (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) && size.is_power_of_two()
}

impl BlockSizeConfig {
    /// Validate inputs and derive all constants. Invalid input is a fatal configuration error.
    pub fn init(raw_block_size: u32, reserved: ReservedSize) -> Result<Self> {
        if !is_valid_block_size(raw_block_size) {
            return Err(PageCryptError::Configuration(format!(
                "block size must be a power of two in [{} .. {}], got {}",
                MIN_BLOCK_SIZE, MAX_BLOCK_SIZE, raw_block_size
            ))
            .into());
        }

        // smallest block (1K = 2^10) maps to setting 1
        let bits = raw_block_size.trailing_zeros();
        let block_setting = bits - 10 + 1;
        let reserved_bytes = reserved.bytes();

        let cfg = Self {
            block_setting,
            reserved,
            reserved_bytes,
            fsm: FsmGeometry::compute(raw_block_size as usize, reserved_bytes),
        };
        log::debug!(
            "block size init: size={} setting={} reserved={}",
            raw_block_size,
            block_setting,
            reserved_bytes
        );
        Ok(cfg)
    }

    /// Same as `init`, with the reserved setting given as text ("none", "16", ...).
    pub fn init_from_str(raw_block_size: u32, reserved: &str) -> Result<Self> {
        let r: ReservedSize = reserved.parse()?;
        Self::init(raw_block_size, r)
    }

    #[inline]
    pub fn block_setting(&self) -> u32 {
        self.block_setting
    }

    #[inline]
    pub fn block_bits(&self) -> u32 {
        self.block_setting + 9
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        1usize << self.block_bits()
    }

    #[inline]
    pub fn reserved(&self) -> ReservedSize {
        self.reserved
    }

    #[inline]
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    #[inline]
    pub fn fsm(&self) -> &FsmGeometry {
        &self.fsm
    }

    /// First byte of the reserved footer.
    #[inline]
    pub fn footer_start(&self) -> usize {
        self.block_size() - self.reserved_bytes
    }

    /// Bytes between the page header and the reserved footer.
    #[inline]
    pub fn max_payload_bytes(&self) -> usize {
        self.footer_start() - PAGE_HDR_SIZE
    }

    /// How many items of `item_size` (payload + line pointer) fit on one page.
    pub fn max_items_per_page(&self, item_size: usize) -> usize {
        if item_size == 0 {
            return 0;
        }
        self.max_payload_bytes() / item_size
    }
}

impl fmt::Display for BlockSizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockSizeConfig {{ block_size: {}, setting: {}, bits: {}, reserved: {}, fsm_slots: {} }}",
            self.block_size(),
            self.block_setting,
            self.block_bits(),
            self.reserved_bytes,
            self.fsm.slots_per_page,
        )
    }
}
