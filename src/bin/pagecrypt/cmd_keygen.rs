use anyhow::Result;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use pagecrypt::CipherMethod;

use crate::util::encode_hex;

/// CLI: keygen - случайный ключ нужной длины для PCRYPT_KEY_HEX / PCRYPT_KEY_BASE64.
pub fn exec(method: String, as_base64: bool) -> Result<()> {
    let method = method.parse::<CipherMethod>()?;
    let mut key = vec![0u8; method.key_len()];
    OsRng.fill_bytes(&mut key);

    if as_base64 {
        println!("{}", base64::engine::general_purpose::STANDARD.encode(&key));
    } else {
        println!("{}", encode_hex(&key));
    }
    key.zeroize();
    Ok(())
}
