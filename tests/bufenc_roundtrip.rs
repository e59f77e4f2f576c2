use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use oorandom::Rand64;

use pagecrypt::blocksize::{BlockSizeConfig, ReservedSize};
use pagecrypt::crypto::{CounterLsnSource, MemoryCounter};
use pagecrypt::metrics;
use pagecrypt::page::common::{SPLIT_OFF_FLAGS, SPLIT_OFF_PAGE_ID};
use pagecrypt::page::{
    page_feature_bitmap, page_get_lsn, page_has_extended_features, page_init,
    page_set_feature_bitmap, page_set_lsn, PAGE_ENCRYPT_OFFSET, SPLIT_OPAQUE_SIZE, SPLIT_PAGE_ID,
};
use pagecrypt::{
    error_kind, BuiltinFeature, CipherMethod, CryptoContext, FeatureRegistry, PageCryptError,
    StaticKeyProvider,
};

const BS: usize = 8192;

/// Контекст с раскладкой [encryption_tags] (+ extended_checksums при with_checksum).
fn context(with_checksum: bool, method: CipherMethod) -> Result<CryptoContext> {
    let reserved = if with_checksum {
        ReservedSize::Bytes128
    } else {
        ReservedSize::Bytes32
    };
    let cfg = BlockSizeConfig::init(BS as u32, reserved)?;
    let mut reg = FeatureRegistry::new("test", cfg.reserved_bytes(), 16)?;
    reg.add_feature(BuiltinFeature::EncryptionTags, 0)?;
    if with_checksum {
        reg.add_feature(BuiltinFeature::ExtendedChecksums, 0)?;
    }
    let kp = StaticKeyProvider::new(method, vec![0x5A; method.key_len()])?;
    CryptoContext::new(
        cfg,
        Arc::new(reg),
        &kp,
        Arc::new(MemoryCounter::new(0)),
        Arc::new(CounterLsnSource::starting_at(10_000)),
    )
}

/// Страница с заголовком, LSN и случайным payload.
fn make_page(ctx: &CryptoContext, rng: &mut Rand64, lsn: u64) -> Result<Vec<u8>> {
    let footer = ctx.block_size_config().reserved_bytes();
    let footer_start = ctx.block_size_config().footer_start();
    let mut p = vec![0u8; BS];
    page_init(&mut p, 0, footer, 0)?;
    for chunk in p[PAGE_ENCRYPT_OFFSET..footer_start].chunks_mut(8) {
        let v = rng.rand_u64().to_le_bytes();
        chunk.copy_from_slice(&v[..chunk.len()]);
    }
    page_set_lsn(&mut p, lsn);
    Ok(p)
}

fn expect_cipher_failure(r: Result<()>) {
    let e = r.expect_err("decrypt must fail");
    let k = error_kind(&e).expect("typed error");
    assert!(matches!(k, PageCryptError::CipherFailure(_)), "got {:?}", k);
    assert!(k.is_fatal());
}

#[test]
fn permanent_page_roundtrip_is_exact() -> Result<()> {
    for method in [CipherMethod::Aes128Gcm, CipherMethod::Aes256Gcm] {
        let ctx = context(false, method)?;
        let mut rng = Rand64::new(0xC0FFEE);
        let footer_start = ctx.block_size_config().footer_start();

        let mut page = make_page(&ctx, &mut rng, 777)?;
        let mut expected = page.clone();
        page_set_feature_bitmap(&mut expected, ctx.registry().builtin_bitmap());

        ctx.encrypt_page(&mut page, true, 3, 16384)?;
        assert_eq!(page_get_lsn(&page), 777);
        assert!(page_has_extended_features(&page));
        assert_eq!(page_feature_bitmap(&page), BuiltinFeature::EncryptionTags.bit());
        assert_eq!(&page[..PAGE_ENCRYPT_OFFSET], &expected[..PAGE_ENCRYPT_OFFSET]);
        assert_ne!(
            &page[PAGE_ENCRYPT_OFFSET..footer_start],
            &expected[PAGE_ENCRYPT_OFFSET..footer_start]
        );

        ctx.decrypt_page(&mut page, true, 3, 16384)?;
        assert_eq!(&page[..footer_start], &expected[..footer_start]);
    }
    Ok(())
}

#[test]
fn non_permanent_page_gets_substitute_lsn() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes256Gcm)?;
    let mut rng = Rand64::new(7);
    let footer_start = ctx.block_size_config().footer_start();

    let mut page = make_page(&ctx, &mut rng, 0)?;
    let payload = page[PAGE_ENCRYPT_OFFSET..footer_start].to_vec();

    ctx.encrypt_page(&mut page, false, 0, 1)?;
    let lsn1 = page_get_lsn(&page);
    assert!(lsn1 >= 10_000);

    ctx.decrypt_page(&mut page, false, 0, 1)?;
    assert_eq!(&page[PAGE_ENCRYPT_OFFSET..footer_start], &payload[..]);

    // повторная запись той же страницы получает новый LSN
    ctx.encrypt_page(&mut page, false, 0, 1)?;
    assert!(page_get_lsn(&page) > lsn1);
    Ok(())
}

#[test]
fn split_tracking_page_keeps_its_lsn() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes128Gcm)?;
    let footer = ctx.block_size_config().reserved_bytes();

    let mut page = vec![0u8; BS];
    page_init(&mut page, SPLIT_OPAQUE_SIZE, footer, 0)?;
    let sp = BS - footer - SPLIT_OPAQUE_SIZE;
    LittleEndian::write_u16(&mut page[sp + SPLIT_OFF_FLAGS..sp + SPLIT_OFF_FLAGS + 2], 0x01);
    LittleEndian::write_u16(&mut page[sp + SPLIT_OFF_PAGE_ID..sp + SPLIT_OFF_PAGE_ID + 2], SPLIT_PAGE_ID);
    page_set_lsn(&mut page, 55);
    page[100] = 0x42;

    ctx.encrypt_page(&mut page, false, 9, 2)?;
    assert_eq!(page_get_lsn(&page), 55);
    ctx.decrypt_page(&mut page, false, 9, 2)?;
    assert_eq!(page[100], 0x42);
    Ok(())
}

#[test]
fn tampering_is_detected() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes256Gcm)?;
    let mut rng = Rand64::new(0xDEADBEEF);
    let (region, _) = ctx.encryption_region()?;

    let mut page = make_page(&ctx, &mut rng, 1234)?;
    ctx.encrypt_page(&mut page, true, 5, 77)?;
    let sealed = page.clone();

    // бит в ciphertext
    let mut tampered = sealed.clone();
    tampered[PAGE_ENCRYPT_OFFSET + 100] ^= 0x01;
    let mut p = tampered.clone();
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 5, 77));
    // payload остаётся нетронутым
    assert_eq!(p, tampered);

    // бит в теге
    let mut p = sealed.clone();
    p[region + 16] ^= 0x80;
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 5, 77));

    // бит в IV
    let mut p = sealed.clone();
    p[region + 15] ^= 0x02;
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 5, 77));

    // заголовок входит в AAD (prune_xid @20)
    let mut p = sealed.clone();
    p[20] ^= 0x10;
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 5, 77));

    // страница на чужом месте
    let mut p = sealed.clone();
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 6, 77));
    let mut p = sealed.clone();
    expect_cipher_failure(ctx.decrypt_page(&mut p, true, 5, 78));

    // оригинал по-прежнему расшифровывается
    let mut p = sealed;
    ctx.decrypt_page(&mut p, true, 5, 77)?;
    Ok(())
}

#[test]
fn page_without_layout_is_rejected() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes256Gcm)?;
    let mut rng = Rand64::new(1);

    let mut page = make_page(&ctx, &mut rng, 10)?;
    ctx.encrypt_page(&mut page, true, 0, 0)?;
    let payload = page[PAGE_ENCRYPT_OFFSET..].to_vec();

    // как будто страница записана без footer features
    page_set_feature_bitmap(&mut page, 0);
    expect_cipher_failure(ctx.decrypt_page(&mut page, true, 0, 0));
    assert_eq!(&page[PAGE_ENCRYPT_OFFSET..], &payload[..]);

    // другой bitmap (раскладка с extended_checksums)
    page_set_feature_bitmap(&mut page, 0b11);
    expect_cipher_failure(ctx.decrypt_page(&mut page, true, 0, 0));
    Ok(())
}

#[test]
fn permanent_page_without_lsn_is_refused() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes256Gcm)?;
    let mut rng = Rand64::new(2);
    let mut page = make_page(&ctx, &mut rng, 0)?;
    assert!(ctx.encrypt_page(&mut page, true, 0, 0).is_err());
    Ok(())
}

#[test]
fn every_write_uses_a_fresh_iv() -> Result<()> {
    let ctx = context(false, CipherMethod::Aes128Gcm)?;
    let mut rng = Rand64::new(3);
    let (region, _) = ctx.encryption_region()?;

    let mut page = make_page(&ctx, &mut rng, 1)?;
    let mut seen = HashSet::new();
    for blk in 0..2500u32 {
        ctx.encrypt_page(&mut page, true, blk, 0)?;
        assert!(seen.insert(page[region..region + 16].to_vec()), "IV reused at {}", blk);
        ctx.decrypt_page(&mut page, true, blk, 0)?;
    }
    Ok(())
}

#[test]
fn extended_checksum_over_encrypted_page() -> Result<()> {
    let ctx = context(true, CipherMethod::Aes256Gcm)?;
    let mut rng = Rand64::new(4);
    assert_eq!(ctx.checksum_region(), Some((BS - 96, 64)));

    let mut page = make_page(&ctx, &mut rng, 99)?;
    ctx.encrypt_page(&mut page, true, 12, 3)?;
    assert!(ctx.set_extended_checksum(&mut page, 12)?);
    let failures_before = metrics::snapshot().checksum_failures;
    assert!(ctx.verify_extended_checksum(&page, 12)?);
    assert!(!ctx.verify_extended_checksum(&page, 13)?);

    let mut flipped = page.clone();
    flipped[PAGE_ENCRYPT_OFFSET + 1] ^= 0x04;
    assert!(!ctx.verify_extended_checksum(&flipped, 12)?);
    // счётчики глобальные, параллельные тесты могут только добавить
    assert!(metrics::snapshot().checksum_failures >= failures_before + 2);

    // checksum не мешает расшифровке
    ctx.decrypt_page(&mut page, true, 12, 3)?;
    Ok(())
}

#[test]
fn concurrent_writers_share_one_context() -> Result<()> {
    let ctx = Arc::new(context(false, CipherMethod::Aes256Gcm)?);
    let (region, _) = ctx.encryption_region()?;
    let mut handles = Vec::new();
    for t in 0..4u64 {
        let ctx = ctx.clone();
        handles.push(std::thread::spawn(move || -> Result<Vec<Vec<u8>>> {
            let mut rng = Rand64::new(100 + t as u128);
            let mut ivs = Vec::new();
            for i in 0..600u32 {
                let mut p = make_page(&ctx, &mut rng, 1 + i as u64)?;
                ctx.encrypt_page(&mut p, true, i, t as u32)?;
                ivs.push(p[region..region + 16].to_vec());
                ctx.decrypt_page(&mut p, true, i, t as u32)?;
            }
            Ok(ivs)
        }));
    }
    let mut all = HashSet::new();
    for h in handles {
        let ivs = h.join().expect("thread panicked")?;
        for iv in ivs {
            assert!(all.insert(iv));
        }
    }
    assert_eq!(all.len(), 2400);
    Ok(())
}
