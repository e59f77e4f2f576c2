use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use pagecrypt::pagefeat::{
    create_cluster_layout, layout_dir, layout_path, list_cluster_layouts, open_cluster_layout,
    render_layout,
};
use pagecrypt::page::{page_init, page_set_feature_bitmap};
use pagecrypt::{error_kind, BuiltinFeature, FeatureRegistry, PageCryptError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("pcrypt-layout-{prefix}-{pid}-{t}-{id}"))
}

fn kind(e: &anyhow::Error) -> PageCryptError {
    error_kind(e).cloned().expect("typed error")
}

fn write_layout(root: &Path, name: &str, text: &str) -> Result<()> {
    fs::create_dir_all(layout_dir(root))?;
    fs::write(layout_path(root, name), text)?;
    Ok(())
}

#[test]
fn persist_then_load_roundtrip() -> Result<()> {
    let root = unique_root("roundtrip");
    fs::create_dir_all(&root)?;

    // пользовательская фича добавлена раньше built-in'ов
    let mut reg = FeatureRegistry::new("main", 128, 16)?;
    reg.add_feature_by_name("app_lsn", 5)?;
    reg.add_feature(BuiltinFeature::ExtendedChecksums, 0)?;
    reg.add_feature(BuiltinFeature::EncryptionTags, 0)?;
    assert!(!reg.is_locked());

    let path = create_cluster_layout(&root, &mut reg)?;
    assert!(reg.is_locked());
    assert_eq!(path, layout_path(&root, "main"));

    // после optimize: built-in по id, затем пользовательские
    let names: Vec<&str> = reg.features().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["encryption_tags", "extended_checksums", "app_lsn"]);
    assert_eq!(
        fs::read_to_string(&path)?,
        "features 3 104\nencryption_tags=0,32\nextended_checksums=32,64\napp_lsn=96,8\n"
    );

    let loaded = open_cluster_layout(&root, Some("main"))?;
    assert!(loaded.is_locked());
    assert_eq!(loaded.name(), "main");
    assert_eq!(loaded.features(), reg.features());
    assert_eq!(loaded.builtin_bitmap(), 0b11);
    assert_eq!(render_layout(&loaded), render_layout(&reg));
    assert_eq!(
        loaded.feature_offset(8192, BuiltinFeature::EncryptionTags),
        8192 - 32
    );
    assert_eq!(loaded.named_feature_offset(8192, "app_lsn"), 8192 - 104);
    assert_eq!(loaded.named_feature_offset(8192, "missing"), 0);

    assert_eq!(list_cluster_layouts(&root)?, vec!["main".to_string()]);

    // набор заблокирован, но пользовательские фичи добавляются, пока есть место
    let late = reg.add_feature_by_name("late_user", 8)?;
    assert_eq!((late.offset, late.size), (104, 8));
    assert_eq!(reg.bytes_used(), 112);
    assert!(reg.is_locked());
    Ok(())
}

#[test]
fn persisted_layout_accepts_user_features_only() -> Result<()> {
    let root = unique_root("locked-user");
    fs::create_dir_all(&root)?;

    let mut reg = FeatureRegistry::new("tags", 64, 4)?;
    reg.add_feature(BuiltinFeature::EncryptionTags, 0)?;
    create_cluster_layout(&root, &mut reg)?;
    assert!(reg.is_locked());

    let user = reg.add_feature_by_name("user_x", 8)?;
    assert_eq!((user.offset, user.size), (32, 8));
    assert_eq!(reg.bytes_used(), 40);

    let e = reg
        .add_feature(BuiltinFeature::ExtendedChecksums, 0)
        .unwrap_err();
    assert_eq!(
        kind(&e),
        PageCryptError::BuiltinLocked("extended_checksums".into())
    );
    assert!(!reg.has_feature(BuiltinFeature::ExtendedChecksums));
    assert_eq!(reg.bytes_used(), 40);
    Ok(())
}

#[test]
fn persist_never_overwrites() -> Result<()> {
    let root = unique_root("overwrite");
    fs::create_dir_all(&root)?;

    let mut a = FeatureRegistry::new("dup", 64, 4)?;
    a.add_feature(BuiltinFeature::EncryptionTags, 0)?;
    create_cluster_layout(&root, &mut a)?;

    let mut b = FeatureRegistry::new("dup", 64, 4)?;
    b.add_feature_by_name("x", 8)?;
    assert!(create_cluster_layout(&root, &mut b).is_err());
    assert!(!b.is_locked());

    let loaded = open_cluster_layout(&root, Some("dup"))?;
    assert!(loaded.has_feature(BuiltinFeature::EncryptionTags));
    Ok(())
}

#[test]
fn loaded_layout_refuses_new_builtins() -> Result<()> {
    let root = unique_root("locked");
    fs::create_dir_all(&root)?;

    let mut reg = FeatureRegistry::new("l", 64, 4)?;
    reg.add_feature_by_name("user_a", 8)?;
    create_cluster_layout(&root, &mut reg)?;

    let mut loaded = open_cluster_layout(&root, Some("l"))?;
    let e = loaded
        .add_feature(BuiltinFeature::EncryptionTags, 0)
        .unwrap_err();
    assert_eq!(kind(&e), PageCryptError::BuiltinLocked("encryption_tags".into()));

    // загруженный набор управляет ровно своими байтами: места для новых фич нет
    let e = loaded.add_feature_by_name("user_b", 8).unwrap_err();
    assert!(matches!(kind(&e), PageCryptError::CapacityExceeded { .. }));
    Ok(())
}

#[test]
fn corrupted_layouts_are_rejected() -> Result<()> {
    let root = unique_root("corrupt");
    let cases = [
        ("empty", ""),
        ("bad_header", "feature 1 32\nencryption_tags=0,32\n"),
        ("count_mismatch", "features 2 32\nencryption_tags=0,32\n"),
        ("size_mismatch", "features 1 40\nencryption_tags=0,32\n"),
        ("gap", "features 2 40\na=0,8\nb=16,32\n"),
        ("unaligned", "features 1 12\na=0,12\n"),
        ("malformed", "features 1 8\na:0,8\n"),
        ("extra_line", "features 1 8\na=0,8\nb=8,8\n"),
        ("too_big", "features 1 256\na=0,256\n"),
        ("duplicate", "features 2 16\na=0,8\na=8,8\n"),
    ];
    for (name, text) in cases {
        write_layout(&root, name, text)?;
        let e = FeatureRegistry::load(&layout_path(&root, name)).unwrap_err();
        assert!(
            matches!(kind(&e), PageCryptError::LayoutCorruption { .. }),
            "case {}: {:?}",
            name,
            e
        );
        assert!(kind(&e).is_fatal());
    }
    Ok(())
}

#[test]
fn cluster_lookup_rules() -> Result<()> {
    let root = unique_root("cluster");
    fs::create_dir_all(&root)?;

    // пустое имя → пустой набор
    let empty = open_cluster_layout(&root, None)?;
    assert_eq!(empty.name(), "empty");
    assert!(empty.is_locked());
    assert_eq!(empty.bytes_managed(), 0);
    assert!(open_cluster_layout(&root, Some("  "))?.is_empty());

    // отсутствующий файл - ошибка конфигурации
    let e = open_cluster_layout(&root, Some("nope")).unwrap_err();
    assert!(matches!(kind(&e), PageCryptError::Configuration(_)));
    assert!(list_cluster_layouts(&root)?.is_empty());
    Ok(())
}

#[test]
fn page_level_lookup_follows_page_bitmap() -> Result<()> {
    let mut reg = FeatureRegistry::new("p", 128, 4)?;
    reg.add_feature(BuiltinFeature::EncryptionTags, 0)?;
    reg.add_feature_by_name("user", 16)?;

    let mut page = vec![0u8; 4096];
    page_init(&mut page, 0, 48, 0)?;
    // страница без PD_EXTENDED_FEATS
    assert_eq!(reg.page_feature_offset(&page, BuiltinFeature::EncryptionTags), 0);
    assert_eq!(reg.page_named_feature_size(&page, "user"), 0);

    page_set_feature_bitmap(&mut page, reg.builtin_bitmap());
    assert_eq!(
        reg.page_feature_offset(&page, BuiltinFeature::EncryptionTags),
        4096 - 32
    );
    assert_eq!(reg.page_named_feature_offset(&page, "user"), 4096 - 48);
    assert_eq!(reg.page_feature_size(&page, BuiltinFeature::EncryptionTags), 32);

    // bitmap другой раскладки
    page_set_feature_bitmap(&mut page, 0b10);
    assert_eq!(reg.page_feature_offset(&page, BuiltinFeature::EncryptionTags), 0);
    Ok(())
}
