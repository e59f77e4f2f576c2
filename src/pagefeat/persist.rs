//! pagefeat/persist - текстовый формат раскладки.
//!
//! Формат (один файл на набор, создаётся один раз и больше не меняется):
//!   features <count> <total_bytes>
//!   <name>=<offset>,<size>        (ровно count строк, offsets плотные, сумма == total_bytes)
//!
//! Политика:
//! - persist: optimize() → create_new (перезапись запрещена) → fsync → lock;
//! - load: строгий разбор, любое расхождение - LayoutCorruption; результат всегда locked.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::registry::FeatureRegistry;
use crate::consts::{FEATURE_NAME_MAX, MAX_PAGE_FEATURES, MAX_RESERVED_SIZE, RESERVED_CHUNK_SIZE};
use crate::error::PageCryptError;
use crate::metrics;

#[cfg(unix)]
fn fsync_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = fs::File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
fn fsync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Render the registry in the persisted text format.
pub fn render_layout(reg: &FeatureRegistry) -> String {
    let mut out = format!("features {} {}\n", reg.len(), reg.bytes_used());
    for f in reg.features() {
        out.push_str(&format!("{}={},{}\n", f.name, f.offset, f.size));
    }
    out
}

/// `name=offset,size` → parts. None if the line does not have that shape.
fn parse_feature_line(line: &str) -> Option<(&str, usize, usize)> {
    let (name, rest) = line.split_once('=')?;
    let (off, size) = rest.split_once(',')?;
    if off.is_empty() || size.is_empty() || !off.bytes().chain(size.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name, off.parse().ok()?, size.parse().ok()?))
}

fn parse_header_line(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split(' ');
    if parts.next()? != "features" {
        return None;
    }
    let count = parts.next()?.parse().ok()?;
    let total = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((count, total))
}

impl FeatureRegistry {
    /// Записать набор в `path`. Файл не должен существовать. После успеха набор locked.
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        self.optimize();
        if let Err(reason) = self.check_invariants() {
            return Err(PageCryptError::corruption(path.display().to_string(), reason).into());
        }

        let text = render_layout(self);
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| {
                format!(
                    "create page feature set file {} (existing layouts are never overwritten)",
                    path.display()
                )
            })?;
        f.write_all(text.as_bytes())
            .with_context(|| format!("write page feature set {}", path.display()))?;
        f.sync_all()?;
        fsync_parent_dir(path)
            .with_context(|| format!("fsync directory of {}", path.display()))?;

        self.lock();
        metrics::record_layout_persisted();
        log::info!(
            "page feature set '{}' persisted to {} ({} features, {} bytes)",
            self.name(),
            path.display(),
            self.len(),
            self.bytes_used()
        );
        Ok(())
    }

    /// Прочитать набор из `path`. Результат всегда locked.
    pub fn load(path: &Path) -> Result<FeatureRegistry> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read page feature set {}", path.display()))?;
        let shown = path.display().to_string();
        let corrupt = |reason: String| -> anyhow::Error {
            PageCryptError::corruption(shown.clone(), reason).into()
        };

        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| corrupt("empty feature set file".into()))?;
        let (count, total) = parse_header_line(header)
            .ok_or_else(|| corrupt(format!("corrupted header line '{}'", header)))?;
        if count > MAX_PAGE_FEATURES {
            return Err(corrupt(format!("invalid feature count {}", count)));
        }
        if total > MAX_RESERVED_SIZE {
            return Err(corrupt(format!("invalid feature total size {}", total)));
        }

        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let mut reg = FeatureRegistry::new(&name, total, count)
            .map_err(|e| corrupt(format!("couldn't create page feature set: {}", e)))?;

        let mut tot_size = 0usize;
        let mut tot_cnt = 0usize;
        for (idx, line) in lines.enumerate() {
            let lineno = idx + 2;
            let (feat, off, size) = parse_feature_line(line)
                .ok_or_else(|| corrupt(format!("malformed feature line {}: '{}'", lineno, line)))?;
            if feat.is_empty() || feat.len() > FEATURE_NAME_MAX {
                return Err(corrupt(format!("bad feature name on line {}", lineno)));
            }
            if off > total || size == 0 || size > total {
                return Err(corrupt(format!(
                    "invalid feature offset or size on line {} ({},{})",
                    lineno, off, size
                )));
            }
            if size % RESERVED_CHUNK_SIZE != 0 {
                return Err(corrupt(format!(
                    "feature '{}' size {} is not {}-byte aligned",
                    feat, size, RESERVED_CHUNK_SIZE
                )));
            }
            if off != tot_size {
                return Err(corrupt(format!(
                    "feature offsets do not line up: '{}' at {}, expected {}",
                    feat, off, tot_size
                )));
            }
            if tot_cnt == count {
                return Err(corrupt(format!(
                    "more feature lines than the {} declared in header",
                    count
                )));
            }
            reg.add_feature_by_name(feat, size)
                .map_err(|e| corrupt(format!("error adding feature '{}': {}", feat, e)))?;
            tot_size += size;
            tot_cnt += 1;
        }

        if tot_cnt != count {
            return Err(corrupt(format!(
                "read {} features, header declares {}",
                tot_cnt, count
            )));
        }
        if tot_size != total {
            return Err(corrupt(format!(
                "read {} bytes of features, header declares {}",
                tot_size, total
            )));
        }

        reg.lock();
        metrics::record_layout_loaded();
        log::debug!(
            "page feature set '{}' loaded from {} (bitmap={:#06b})",
            reg.name(),
            path.display(),
            reg.builtin_bitmap()
        );
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_format() {
        let mut r = FeatureRegistry::new("t", 64, 4).unwrap();
        r.add_feature_by_name("a", 10).unwrap();
        r.add_feature_by_name("b", 20).unwrap();
        assert_eq!(render_layout(&r), "features 2 40\na=0,16\nb=16,24\n");
    }

    #[test]
    fn line_parsers() {
        assert_eq!(parse_header_line("features 2 40"), Some((2, 40)));
        assert_eq!(parse_header_line("features 2 40 1"), None);
        assert_eq!(parse_header_line("feature 2 40"), None);
        assert_eq!(parse_header_line("features -1 40"), None);
        assert_eq!(parse_feature_line("a=0,16"), Some(("a", 0, 16)));
        assert_eq!(parse_feature_line("a=0;16"), None);
        assert_eq!(parse_feature_line("a=+0,16"), None);
        assert_eq!(parse_feature_line("a=0,"), None);
    }

    #[cfg(unix)]
    #[test]
    fn parent_dir_sync_errors_are_reported() {
        let dir = std::env::temp_dir().join(format!("pcrypt-persist-sync-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        assert!(fsync_parent_dir(&dir.join("main")).is_ok());
        assert!(fsync_parent_dir(Path::new("main")).is_ok());
        assert!(fsync_parent_dir(&dir.join("missing").join("main")).is_err());

        let mut r = FeatureRegistry::new("main", 32, 4).unwrap();
        r.add_feature_by_name("a", 8).unwrap();
        r.persist(&dir.join("main")).unwrap();
        assert!(r.is_locked());
        let _ = fs::remove_dir_all(&dir);
    }
}
