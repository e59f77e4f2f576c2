//! crypto/lsn - подменный LSN для страниц без WAL (unlogged/temp).
//!
//! Такие страницы никогда не получают настоящий LSN, но поле LSN входит в AAD, поэтому
//! перед шифрованием в него ставится свежее монотонное значение.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait LsnSource: Send + Sync {
    fn next_lsn(&self) -> u64;
}

/// Монотонный счётчик, начиная с 1 (0 - "нет LSN").
#[derive(Debug)]
pub struct CounterLsnSource {
    next: AtomicU64,
}

impl CounterLsnSource {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }
}

impl Default for CounterLsnSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LsnSource for CounterLsnSource {
    fn next_lsn(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}
