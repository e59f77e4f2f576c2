//! crypto/iv - выдача уникальных 16-байтовых IV без блокировок.
//!
//! Локальный 64-битный счётчик процесса; младшие IV_BATCH_BITS бит - курсор внутри batch'а.
//! Когда курсор равен 0, процесс берёт новый batch из общего счётчика:
//!   origin = shared.increment() << IV_BATCH_BITS
//! и выдаёт origin, оставляя локально origin + 1.
//!
//! Формат IV: 8 нулевых байт || counter (big-endian).
//! Внутри процесса IV строго возрастают; batch'и разных процессов не пересекаются.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::counter::SharedCounter;
use crate::consts::{IV_BATCH_BITS, IV_BATCH_MASK, IV_LEN};
use crate::metrics::{record_iv_batch, record_iv_issued};

pub struct IvAllocator {
    local: AtomicU64,
    shared: Arc<dyn SharedCounter>,
}

impl IvAllocator {
    pub fn new(shared: Arc<dyn SharedCounter>) -> Self {
        Self {
            local: AtomicU64::new(0),
            shared,
        }
    }

    /// Следующее значение счётчика (уникально для всех процессов, разделяющих `shared`).
    pub fn next_counter(&self) -> Result<u64> {
        let mut cur = self.local.load(Ordering::Acquire);
        loop {
            if cur & IV_BATCH_MASK == 0 {
                // batch exhausted (or never started)
                let seed = self.shared.increment()?;
                // the highest batch is never handed out: its last IV would leave no successor
                if seed >= (u64::MAX >> IV_BATCH_BITS) {
                    return Err(anyhow!(
                        "IV space exhausted: shared counter {} does not fit a batch origin",
                        seed
                    ));
                }
                let origin = seed << IV_BATCH_BITS;
                match self.local.compare_exchange(
                    cur,
                    origin + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        record_iv_batch();
                        record_iv_issued();
                        log::debug!("iv: new batch origin={:#x}", origin);
                        return Ok(origin);
                    }
                    // another thread installed a batch first; the drawn seed is skipped
                    Err(actual) => cur = actual,
                }
            } else {
                match self.local.compare_exchange_weak(
                    cur,
                    cur + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        record_iv_issued();
                        return Ok(cur);
                    }
                    Err(actual) => cur = actual,
                }
            }
        }
    }

    pub fn next_iv(&self) -> Result<[u8; IV_LEN]> {
        let counter = self.next_counter()?;
        Ok(iv_from_counter(counter))
    }
}

pub fn iv_from_counter(counter: u64) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    iv[8..16].copy_from_slice(&counter.to_be_bytes());
    iv
}

impl std::fmt::Debug for IvAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IvAllocator")
            .field("local", &self.local.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::IV_BATCH_SIZE;
    use crate::crypto::counter::MemoryCounter;

    #[test]
    fn first_iv_is_batch_origin() {
        let shared = Arc::new(MemoryCounter::new(0));
        let a = IvAllocator::new(shared);
        assert_eq!(a.next_counter().unwrap(), IV_BATCH_SIZE);
        assert_eq!(a.next_counter().unwrap(), IV_BATCH_SIZE + 1);

        let iv = iv_from_counter(0x0102);
        assert_eq!(&iv[..8], &[0u8; 8]);
        assert_eq!(&iv[14..], &[0x01, 0x02]);
    }

    #[test]
    fn one_draw_per_batch() {
        let shared = Arc::new(MemoryCounter::new(0));
        let a = IvAllocator::new(shared.clone());
        let mut prev = None;
        for _ in 0..(IV_BATCH_SIZE * 2) {
            let c = a.next_counter().unwrap();
            if let Some(p) = prev {
                assert!(c > p);
            }
            prev = Some(c);
        }
        // batches 1 and 2 consumed exactly
        assert_eq!(shared.current().unwrap(), 2);
        a.next_counter().unwrap();
        assert_eq!(shared.current().unwrap(), 3);
    }

    #[test]
    fn exhausted_shared_counter_is_an_error() {
        let shared = Arc::new(MemoryCounter::new(u64::MAX >> IV_BATCH_BITS));
        let a = IvAllocator::new(shared);
        assert!(a.next_iv().is_err());
    }

    #[test]
    fn last_usable_batch_drains_without_overflow() {
        let last_seed = (u64::MAX >> IV_BATCH_BITS) - 1;
        let a = IvAllocator::new(Arc::new(MemoryCounter::new(last_seed - 1)));
        let mut c = 0;
        for _ in 0..IV_BATCH_SIZE {
            c = a.next_counter().unwrap();
        }
        assert_eq!(c, (last_seed << IV_BATCH_BITS) + IV_BATCH_MASK);
        assert!(c < u64::MAX);
        // следующий batch был бы последним во всём пространстве
        assert!(a.next_counter().is_err());
    }
}
