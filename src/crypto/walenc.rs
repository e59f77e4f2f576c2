//! crypto/walenc - точки входа шифрования WAL.
//!
//! Формат зашифрованной WAL-записи ещё не зафиксирован, поэтому обе операции пока оставляют
//! запись нетронутой. Вызывающий код уже проходит через эти функции, чтобы включение
//! шифрования WAL не меняло call sites.

use anyhow::Result;

use super::cipher::CipherMethod;

#[derive(Debug, Clone, Default)]
pub struct WalEncryption {
    method: Option<CipherMethod>,
}

impl WalEncryption {
    pub fn new(method: Option<CipherMethod>) -> Self {
        Self { method }
    }

    pub fn disabled() -> Self {
        Self { method: None }
    }

    /// Метод, который будет использован для WAL (сейчас только информативно).
    pub fn method(&self) -> Option<CipherMethod> {
        self.method
    }

    /// No-op: запись остаётся открытым текстом.
    pub fn encrypt_record(&self, _lsn: u64, _record: &mut [u8]) -> Result<()> {
        Ok(())
    }

    /// No-op: запись остаётся открытым текстом.
    pub fn decrypt_record(&self, _lsn: u64, _record: &mut [u8]) -> Result<()> {
        Ok(())
    }
}
