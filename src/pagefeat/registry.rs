//! pagefeat/registry - in-memory page feature set.
//!
//! Футер страницы (reserved footer) растёт от конца страницы к началу. Фичи упакованы
//! плотно: offset каждой - смещение от конца страницы до конца её региона, т.е.
//! первая фича занимает последние `size` байт страницы.
//!
//! Правила:
//! - имя ≤ 20 байт, уникально в наборе;
//! - size округляется вверх до кратного 8;
//! - built-in с size=0 получает размер по умолчанию из каталога;
//! - locked набор не принимает новые built-in, но принимает пользовательские фичи,
//!   пока есть место (байты и слоты).

use anyhow::Result;
use serde::Serialize;

use super::builtin::BuiltinFeature;
use crate::consts::{FEATURE_NAME_MAX, MAX_PAGE_FEATURES, MAX_RESERVED_SIZE, RESERVED_CHUNK_SIZE};
use crate::error::PageCryptError;
use crate::page::header::{page_feature_bitmap, page_has_extended_features};
use crate::page::PAGE_HDR_SIZE;

/// Одна фича в наборе. `offset` отсчитывается от конца страницы.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureDesc {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub builtin: Option<BuiltinFeature>,
}

impl FeatureDesc {
    /// Смещение региона внутри страницы данного размера.
    #[inline]
    pub fn page_offset(&self, page_size: usize) -> usize {
        page_size - self.offset - self.size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureRegistry {
    name: String,
    bytes_managed: usize,
    bytes_used: usize,
    max_features: usize,
    feats: Vec<FeatureDesc>,
    builtin_bitmap: u16,
    locked: bool,
}

/// Feature names end up in `name=offset,size` lines, so the separators are excluded.
pub fn validate_feature_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= FEATURE_NAME_MAX
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'=' && b != b',');
    if !ok {
        return Err(PageCryptError::InvalidName(name.to_string()).into());
    }
    Ok(())
}

#[inline]
fn round_up_chunk(size: usize) -> usize {
    (size + RESERVED_CHUNK_SIZE - 1) & !(RESERVED_CHUNK_SIZE - 1)
}

impl FeatureRegistry {
    /// Пустой unlocked набор с заданной ёмкостью.
    pub fn new(name: &str, byte_capacity: usize, max_features: usize) -> Result<Self> {
        if name.is_empty()
            || name
                .bytes()
                .any(|b| !b.is_ascii_graphic() || b == b'/' || b == b'\\')
        {
            return Err(PageCryptError::Configuration(format!(
                "invalid page feature set name '{}'",
                name
            ))
            .into());
        }
        if max_features > MAX_PAGE_FEATURES {
            return Err(PageCryptError::Configuration(format!(
                "page feature set '{}': max_features {} exceeds {}",
                name, max_features, MAX_PAGE_FEATURES
            ))
            .into());
        }
        if byte_capacity > MAX_RESERVED_SIZE {
            return Err(PageCryptError::Configuration(format!(
                "page feature set '{}': capacity {} exceeds reserved maximum {}",
                name, byte_capacity, MAX_RESERVED_SIZE
            ))
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            bytes_managed: byte_capacity,
            bytes_used: 0,
            max_features,
            feats: Vec::with_capacity(max_features),
            builtin_bitmap: 0,
            locked: false,
        })
    }

    /// Постоянный пустой набор для кластеров без footer features.
    pub fn empty() -> Self {
        Self {
            name: "empty".to_string(),
            bytes_managed: 0,
            bytes_used: 0,
            max_features: 0,
            feats: Vec::new(),
            builtin_bitmap: 0,
            locked: true,
        }
    }

    // ---------- accessors ----------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes_managed(&self) -> usize {
        self.bytes_managed
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn bytes_free(&self) -> usize {
        self.bytes_managed - self.bytes_used
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn len(&self) -> usize {
        self.feats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feats.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn builtin_bitmap(&self) -> u16 {
        self.builtin_bitmap
    }

    pub fn features(&self) -> &[FeatureDesc] {
        &self.feats
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureDesc> {
        self.feats.iter().find(|f| f.name == name)
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    // ---------- add ----------

    /// Добавить built-in фичу (size=0 → размер по умолчанию).
    pub fn add_feature(&mut self, feature: BuiltinFeature, size: usize) -> Result<&FeatureDesc> {
        self.add_feature_by_name(feature.name(), size)
    }

    /// Добавить фичу по имени. Built-in распознаётся по каталогу.
    pub fn add_feature_by_name(&mut self, name: &str, size: usize) -> Result<&FeatureDesc> {
        validate_feature_name(name)?;

        if self.feats.iter().any(|f| f.name == name) {
            return Err(PageCryptError::DuplicateFeature(name.to_string()).into());
        }

        let mut size = round_up_chunk(size);
        let builtin = BuiltinFeature::from_name(name);
        if let Some(b) = builtin {
            if self.locked {
                return Err(PageCryptError::BuiltinLocked(name.to_string()).into());
            }
            if size == 0 {
                size = b.default_size();
            }
        }

        if size == 0 {
            return Err(PageCryptError::ZeroSize(name.to_string()).into());
        }

        let free_slots = self.max_features.saturating_sub(self.feats.len());
        if free_slots == 0 || size > self.bytes_free() {
            return Err(PageCryptError::CapacityExceeded {
                registry: self.name.clone(),
                need: size,
                free_bytes: self.bytes_free(),
                free_slots,
            }
            .into());
        }

        if let Some(b) = builtin {
            self.builtin_bitmap |= b.bit();
        }
        self.feats.push(FeatureDesc {
            name: name.to_string(),
            offset: self.bytes_used,
            size,
            builtin,
        });
        self.bytes_used += size;

        log::debug!(
            "page feature set '{}': added '{}' size={} ({} of {} bytes used)",
            self.name,
            name,
            size,
            self.bytes_used,
            self.bytes_managed
        );
        Ok(&self.feats[self.feats.len() - 1])
    }

    // ---------- queries ----------

    pub fn has_feature(&self, feature: BuiltinFeature) -> bool {
        self.builtin_bitmap & feature.bit() != 0
    }

    pub fn has_named_feature(&self, name: &str) -> bool {
        self.feature(name).is_some()
    }

    /// Размер фичи, 0 если её нет.
    pub fn feature_size(&self, feature: BuiltinFeature) -> usize {
        self.named_feature_size(feature.name())
    }

    pub fn named_feature_size(&self, name: &str) -> usize {
        self.feature(name).map(|f| f.size).unwrap_or(0)
    }

    /// Смещение региона внутри страницы размера `page_size`, 0 если фичи нет.
    ///
    /// Lookup is linear; resolve once at startup and cache the result.
    pub fn feature_offset(&self, page_size: usize, feature: BuiltinFeature) -> usize {
        self.named_feature_offset(page_size, feature.name())
    }

    pub fn named_feature_offset(&self, page_size: usize, name: &str) -> usize {
        self.feature(name)
            .map(|f| f.page_offset(page_size))
            .unwrap_or(0)
    }

    /// (offset, size) региона внутри страницы, если фича есть.
    pub fn feature_region(&self, page_size: usize, feature: BuiltinFeature) -> Option<(usize, usize)> {
        if !self.has_feature(feature) {
            return None;
        }
        self.feature(feature.name())
            .map(|f| (f.page_offset(page_size), f.size))
    }

    /// Записана ли страница под этой раскладкой.
    ///
    /// Pages without PD_EXTENDED_FEATS, with an empty bitmap, or with a bitmap from another
    /// layout carry no footer features we can address.
    pub fn page_uses_layout(&self, page: &[u8]) -> bool {
        if page.len() < PAGE_HDR_SIZE || !page_has_extended_features(page) {
            return false;
        }
        let bm = page_feature_bitmap(page);
        bm != 0 && bm == self.builtin_bitmap
    }

    /// Смещение built-in фичи на конкретной странице, 0 = нет.
    pub fn page_feature_offset(&self, page: &[u8], feature: BuiltinFeature) -> usize {
        self.page_named_feature_offset(page, feature.name())
    }

    pub fn page_named_feature_offset(&self, page: &[u8], name: &str) -> usize {
        if !self.page_uses_layout(page) {
            return 0;
        }
        self.named_feature_offset(page.len(), name)
    }

    /// Размер built-in фичи на конкретной странице, 0 = нет.
    pub fn page_feature_size(&self, page: &[u8], feature: BuiltinFeature) -> usize {
        self.page_named_feature_size(page, feature.name())
    }

    pub fn page_named_feature_size(&self, page: &[u8], name: &str) -> usize {
        if !self.page_uses_layout(page) {
            return 0;
        }
        self.named_feature_size(name)
    }

    /// Состояние built-in фич (name, enabled) для read-only статуса.
    pub fn builtin_status(&self) -> Vec<(&'static str, bool)> {
        BuiltinFeature::ALL
            .iter()
            .map(|b| (b.name(), self.has_feature(*b)))
            .collect()
    }

    // ---------- layout ----------

    /// Переупорядочить: built-in по возрастанию id, затем пользовательские в порядке
    /// добавления. Offsets пересчитываются плотно с нуля.
    ///
    /// Built-ins (IV/tag) must sit at a predictable position; user features only need space.
    pub fn optimize(&mut self) {
        if self.locked || self.builtin_bitmap == 0 || self.feats.len() <= 1 {
            return;
        }

        let mut ordered: Vec<FeatureDesc> = Vec::with_capacity(self.feats.len());
        for b in BuiltinFeature::ALL {
            if let Some(f) = self.feats.iter().find(|f| f.builtin == Some(b)) {
                ordered.push(f.clone());
            }
        }
        ordered.extend(self.feats.iter().filter(|f| f.builtin.is_none()).cloned());

        let mut off = 0usize;
        for f in ordered.iter_mut() {
            f.offset = off;
            off += f.size;
        }
        debug_assert_eq!(off, self.bytes_used);
        debug_assert_eq!(ordered.len(), self.feats.len());
        self.feats = ordered;
    }

    /// Проверка инвариантов: плотные offsets, сумма == bytes_used ≤ bytes_managed.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut off = 0usize;
        for f in &self.feats {
            if f.offset != off || f.size == 0 || f.size % RESERVED_CHUNK_SIZE != 0 {
                return Err(format!(
                    "feature '{}' at offset {} size {} breaks packing (expected offset {})",
                    f.name, f.offset, f.size, off
                ));
            }
            off += f.size;
        }
        if off != self.bytes_used || self.bytes_used > self.bytes_managed {
            return Err(format!(
                "used bytes {} (sum {}) vs managed {}",
                self.bytes_used, off, self.bytes_managed
            ));
        }
        Ok(())
    }
}
