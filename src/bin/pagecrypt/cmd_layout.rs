use anyhow::{Context, Result};
use std::path::PathBuf;

use pagecrypt::blocksize::ReservedSize;
use pagecrypt::consts::MAX_PAGE_FEATURES;
use pagecrypt::metrics;
use pagecrypt::pagefeat::{
    create_cluster_layout, layout_path, list_cluster_layouts, open_cluster_layout,
    FeatureRegistry,
};

use crate::util::parse_feature_arg;

/// CLI: layout-create - собрать раскладку и сохранить её в <data_dir>/pagefeat/<name>.
///
/// Раскладка создаётся один раз; существующий файл не перезаписывается.
pub fn exec_create(
    data_dir: PathBuf,
    name: String,
    reserved: String,
    max_features: usize,
    features: Vec<String>,
) -> Result<()> {
    let reserved = reserved.parse::<ReservedSize>()?;
    let mut reg = FeatureRegistry::new(&name, reserved.bytes(), max_features.min(MAX_PAGE_FEATURES))?;
    for arg in &features {
        let (fname, size) = parse_feature_arg(arg)?;
        reg.add_feature_by_name(&fname, size)
            .with_context(|| format!("add feature '{}'", fname))?;
    }

    let path = create_cluster_layout(&data_dir, &mut reg)?;
    println!(
        "layout '{}' created at {}: {} feature(s), {}/{} bytes",
        reg.name(),
        path.display(),
        reg.len(),
        reg.bytes_used(),
        reg.bytes_managed()
    );
    for f in reg.features() {
        println!("  {:<20} offset={:<4} size={}", f.name, f.offset, f.size);
    }
    Ok(())
}

/// CLI: layout-show - показать раскладку (или список раскладок без --name).
pub fn exec_show(data_dir: PathBuf, name: Option<String>, json: bool) -> Result<()> {
    let Some(name) = name else {
        let names = list_cluster_layouts(&data_dir)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&names)?);
        } else if names.is_empty() {
            println!("no layouts under {}", data_dir.display());
        } else {
            for n in names {
                println!("{}", n);
            }
        }
        return Ok(());
    };

    let reg = open_cluster_layout(&data_dir, Some(&name))?;

    if json {
        let status: Vec<_> = reg
            .builtin_status()
            .into_iter()
            .map(|(n, on)| serde_json::json!({ "name": n, "enabled": on }))
            .collect();
        let obj = serde_json::json!({
            "path": layout_path(&data_dir, &name).display().to_string(),
            "layout": &reg,
            "bytes_free": reg.bytes_free(),
            "builtin_status": status,
            "metrics": metrics::snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("layout          = {}", reg.name());
    println!("path            = {}", layout_path(&data_dir, &name).display());
    println!("bytes           = {} used / {} managed", reg.bytes_used(), reg.bytes_managed());
    println!("builtin_bitmap  = {:#06x}", reg.builtin_bitmap());
    println!("locked          = {}", reg.is_locked());
    for (n, on) in reg.builtin_status() {
        println!("  {:<20} {}", n, if on { "on" } else { "off" });
    }
    println!("features:");
    for f in reg.features() {
        println!("  {:<20} offset={:<4} size={}", f.name, f.offset, f.size);
    }
    Ok(())
}
