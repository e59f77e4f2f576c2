//! Lightweight global metrics for pagecrypt.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Page codec (encrypt/decrypt/tag failures, extended checksum mismatches)
//! - IV allocator (batches, issued IVs)
//! - Page feature layouts (persist/load)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Page codec -----
static PAGES_ENCRYPTED: AtomicU64 = AtomicU64::new(0);
static PAGES_DECRYPTED: AtomicU64 = AtomicU64::new(0);
static DECRYPT_FAILURES: AtomicU64 = AtomicU64::new(0);
static PAYLOAD_BYTES_ENCRYPTED: AtomicU64 = AtomicU64::new(0);
static CHECKSUM_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- IV allocator -----
static IV_BATCHES_DRAWN: AtomicU64 = AtomicU64::new(0);
static IVS_ISSUED: AtomicU64 = AtomicU64::new(0);

// ----- Layouts -----
static LAYOUTS_PERSISTED: AtomicU64 = AtomicU64::new(0);
static LAYOUTS_LOADED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    // Page codec
    pub pages_encrypted: u64,
    pub pages_decrypted: u64,
    pub decrypt_failures: u64,
    pub payload_bytes_encrypted: u64,
    pub checksum_failures: u64,

    // IV allocator
    pub iv_batches_drawn: u64,
    pub ivs_issued: u64,

    // Layouts
    pub layouts_persisted: u64,
    pub layouts_loaded: u64,
}

impl MetricsSnapshot {
    /// Среднее число IV на один batch draw.
    pub fn avg_ivs_per_batch(&self) -> f64 {
        if self.iv_batches_drawn == 0 {
            0.0
        } else {
            self.ivs_issued as f64 / self.iv_batches_drawn as f64
        }
    }
}

// ----- Recorders (Page codec) -----
pub fn record_page_encrypted(payload_len: usize) {
    PAGES_ENCRYPTED.fetch_add(1, Ordering::Relaxed);
    PAYLOAD_BYTES_ENCRYPTED.fetch_add(payload_len as u64, Ordering::Relaxed);
}

pub fn record_page_decrypted() {
    PAGES_DECRYPTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_decrypt_failure() {
    DECRYPT_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_checksum_failure() {
    CHECKSUM_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (IV allocator) -----
pub fn record_iv_batch() {
    IV_BATCHES_DRAWN.fetch_add(1, Ordering::Relaxed);
}

pub fn record_iv_issued() {
    IVS_ISSUED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Layouts) -----
pub fn record_layout_persisted() {
    LAYOUTS_PERSISTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_layout_loaded() {
    LAYOUTS_LOADED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pages_encrypted: PAGES_ENCRYPTED.load(Ordering::Relaxed),
        pages_decrypted: PAGES_DECRYPTED.load(Ordering::Relaxed),
        decrypt_failures: DECRYPT_FAILURES.load(Ordering::Relaxed),
        payload_bytes_encrypted: PAYLOAD_BYTES_ENCRYPTED.load(Ordering::Relaxed),
        checksum_failures: CHECKSUM_FAILURES.load(Ordering::Relaxed),

        iv_batches_drawn: IV_BATCHES_DRAWN.load(Ordering::Relaxed),
        ivs_issued: IVS_ISSUED.load(Ordering::Relaxed),

        layouts_persisted: LAYOUTS_PERSISTED.load(Ordering::Relaxed),
        layouts_loaded: LAYOUTS_LOADED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    PAGES_ENCRYPTED.store(0, Ordering::Relaxed);
    PAGES_DECRYPTED.store(0, Ordering::Relaxed);
    DECRYPT_FAILURES.store(0, Ordering::Relaxed);
    PAYLOAD_BYTES_ENCRYPTED.store(0, Ordering::Relaxed);
    CHECKSUM_FAILURES.store(0, Ordering::Relaxed);

    IV_BATCHES_DRAWN.store(0, Ordering::Relaxed);
    IVS_ISSUED.store(0, Ordering::Relaxed);

    LAYOUTS_PERSISTED.store(0, Ordering::Relaxed);
    LAYOUTS_LOADED.store(0, Ordering::Relaxed);
}
