//! pagefeat/cluster - раскладки кластера в `<data_dir>/pagefeat/<name>`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::registry::FeatureRegistry;
use crate::consts::PAGEFEAT_DIR;
use crate::error::PageCryptError;

pub fn layout_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(PAGEFEAT_DIR)
}

pub fn layout_path(data_dir: &Path, name: &str) -> PathBuf {
    layout_dir(data_dir).join(name)
}

/// Загрузить раскладку кластера. Пустое/отсутствующее имя → `FeatureRegistry::empty()`.
///
/// A named layout that cannot be loaded is fatal for startup.
pub fn open_cluster_layout(data_dir: &Path, name: Option<&str>) -> Result<FeatureRegistry> {
    let name = match name {
        Some(n) if !n.trim().is_empty() => n.trim(),
        _ => return Ok(FeatureRegistry::empty()),
    };
    let path = layout_path(data_dir, name);
    if !path.exists() {
        return Err(PageCryptError::Configuration(format!(
            "page feature set '{}' not found at {}",
            name,
            path.display()
        ))
        .into());
    }
    FeatureRegistry::load(&path)
        .with_context(|| format!("couldn't load page features from {}", path.display()))
}

/// Сохранить раскладку кластера под её именем. Возвращает путь файла.
pub fn create_cluster_layout(data_dir: &Path, reg: &mut FeatureRegistry) -> Result<PathBuf> {
    let dir = layout_dir(data_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(reg.name());
    reg.persist(&path)?;
    Ok(path)
}

/// Имена всех сохранённых раскладок (отсортировано).
pub fn list_cluster_layouts(data_dir: &Path) -> Result<Vec<String>> {
    let dir = layout_dir(data_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}
