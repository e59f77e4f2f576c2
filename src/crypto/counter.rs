//! crypto/counter - общий 64-битный счётчик для засева IV batch'ей.
//!
//! Контракт: increment() атомарно увеличивает значение на 1 и возвращает НОВОЕ значение.
//! Значение никогда не сбрасывается, пока существуют зашифрованные им страницы.
//!
//! - MemoryCounter - AtomicU64, для одного процесса и тестов;
//! - FileCounter   - 8-байтовый файл (LE) под эксклюзивной fs2-блокировкой, fsync на каждый
//!   increment. Разделяется всеми процессами кластера.

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub trait SharedCounter: Send + Sync {
    /// Atomically add one and return the new value.
    fn increment(&self) -> Result<u64>;
    /// Current value (diagnostics only).
    fn current(&self) -> Result<u64>;
}

#[derive(Debug, Default)]
pub struct MemoryCounter {
    value: AtomicU64,
}

impl MemoryCounter {
    pub fn new(start: u64) -> Self {
        Self {
            value: AtomicU64::new(start),
        }
    }
}

impl SharedCounter for MemoryCounter {
    fn increment(&self) -> Result<u64> {
        let prev = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1))
            .map_err(|_| anyhow!("shared IV counter exhausted"))?;
        Ok(prev + 1)
    }

    fn current(&self) -> Result<u64> {
        Ok(self.value.load(Ordering::Acquire))
    }
}

/// Файл счётчика. Блокировка снимается при Drop гарда (fs2 unlock).
#[derive(Debug, Clone)]
pub struct FileCounter {
    path: PathBuf,
}

struct Locked(File);

impl Drop for Locked {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl FileCounter {
    /// Открыть существующий счётчик или создать новый со значением 0.
    ///
    /// Начальное значение пишется под эксклюзивной блокировкой; пустой файл читается как 0,
    /// поэтому конкурентный open до записи не видит "truncated".
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(f) => {
                    f.lock_exclusive()
                        .with_context(|| format!("lock_exclusive {}", path.display()))?;
                    let mut g = Locked(f);
                    // someone may have locked first and already advanced the counter
                    if g.0.metadata()?.len() == 0 {
                        g.0.write_all(&[0u8; 8])?;
                        g.0.sync_all()?;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("create IV counter {}", path.display()))
                }
            }
        }
        let c = Self {
            path: path.to_path_buf(),
        };
        c.current()?;
        Ok(c)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<Locked> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("open IV counter {}", self.path.display()))?;
        f.lock_exclusive()
            .with_context(|| format!("lock_exclusive {}", self.path.display()))?;
        Ok(Locked(f))
    }

    fn read_value(f: &mut File, path: &Path) -> Result<u64> {
        // только что созданный файл, начальное значение ещё не записано
        if f.metadata()?.len() == 0 {
            return Ok(0);
        }
        let mut buf = [0u8; 8];
        f.seek(SeekFrom::Start(0))?;
        f.read_exact(&mut buf)
            .with_context(|| format!("IV counter {} is truncated", path.display()))?;
        Ok(LittleEndian::read_u64(&buf))
    }
}

impl SharedCounter for FileCounter {
    fn increment(&self) -> Result<u64> {
        let mut g = self.lock()?;
        let cur = Self::read_value(&mut g.0, &self.path)?;
        let next = cur
            .checked_add(1)
            .ok_or_else(|| anyhow!("shared IV counter exhausted at {}", self.path.display()))?;
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, next);
        g.0.seek(SeekFrom::Start(0))?;
        g.0.write_all(&buf)?;
        // the new value must be durable before any IV from it is used
        g.0.sync_data()?;
        Ok(next)
    }

    fn current(&self) -> Result<u64> {
        let mut g = self.lock()?;
        Self::read_value(&mut g.0, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_counter_returns_new_value() {
        let c = MemoryCounter::new(0);
        assert_eq!(c.increment().unwrap(), 1);
        assert_eq!(c.increment().unwrap(), 2);
        assert_eq!(c.current().unwrap(), 2);

        let full = MemoryCounter::new(u64::MAX);
        assert!(full.increment().is_err());
    }

    #[test]
    fn empty_counter_file_reads_as_zero() {
        let path = std::env::temp_dir().join(format!(
            "pcrypt-counter-empty-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_file(&path);
        // файл создан другим процессом, начальное значение ещё не записано
        File::create(&path).unwrap();

        let c = FileCounter::open_or_create(&path).unwrap();
        assert_eq!(c.current().unwrap(), 0);
        assert_eq!(c.increment().unwrap(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);

        // повторный open не сбрасывает уже выданное значение
        let again = FileCounter::open_or_create(&path).unwrap();
        assert_eq!(again.current().unwrap(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
