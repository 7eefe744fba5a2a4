//! Pack encryption.
//!
//! Packs are JSON documents encrypted with AES-128 in ECB mode, PKCS#7 padded
//! and base64 encoded. Until a controller confirms the bind it only accepts
//! packs sealed with [`DEFAULT_KEY`]; afterwards it switches to the key it
//! handed out in `bindok`.

use crate::error::WireError;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use std::fmt;

const BLOCK: usize = 16;

/// Shared factory key used for discovery and binding
pub const DEFAULT_KEY: CipherKey = CipherKey(*b"a3K8Bx%2r8Y7#xDh");

/// 128-bit pack key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherKey([u8; BLOCK]);

impl CipherKey {
    /// Parse the ASCII key carried in a bind confirmation
    pub fn parse(key: &str) -> Result<Self, WireError> {
        let bytes: [u8; BLOCK] = key.as_bytes().try_into().map_err(|_| {
            WireError::MalformedFrame(format!("key must be {BLOCK} bytes, got {}", key.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Whether this is the factory key
    pub fn is_default(&self) -> bool {
        *self == DEFAULT_KEY
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        DEFAULT_KEY
    }
}

// Keys never end up in logs.
impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("CipherKey(default)")
        } else {
            f.write_str("CipherKey(session)")
        }
    }
}

/// Encrypt raw bytes and return the base64 text
pub fn encrypt(plaintext: &[u8], key: &CipherKey) -> String {
    let cipher = Aes128::new((&key.0).into());

    let pad = BLOCK - plaintext.len() % BLOCK;
    let mut buf = Vec::with_capacity(plaintext.len() + pad);
    buf.extend_from_slice(plaintext);
    buf.resize(plaintext.len() + pad, pad as u8);

    for block in buf.chunks_exact_mut(BLOCK) {
        cipher.encrypt_block(block.into());
    }

    STANDARD.encode(buf)
}

/// Decrypt base64 text and strip the padding
pub fn decrypt(ciphertext: &str, key: &CipherKey) -> Result<Vec<u8>, WireError> {
    let mut buf = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| WireError::DecryptionFailure(format!("base64: {e}")))?;

    if buf.is_empty() || buf.len() % BLOCK != 0 {
        return Err(WireError::DecryptionFailure(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK}",
            buf.len()
        )));
    }

    let cipher = Aes128::new((&key.0).into());
    for block in buf.chunks_exact_mut(BLOCK) {
        cipher.decrypt_block(block.into());
    }

    let pad = usize::from(buf[buf.len() - 1]);
    let valid = (1..=BLOCK).contains(&pad)
        && buf[buf.len() - pad..].iter().all(|&b| usize::from(b) == pad);
    if !valid {
        return Err(WireError::DecryptionFailure("bad padding".to_string()));
    }
    buf.truncate(buf.len() - pad);

    Ok(buf)
}

/// Serialize and encrypt a pack
pub fn seal_pack(pack: &Value, key: &CipherKey) -> String {
    encrypt(pack.to_string().as_bytes(), key)
}

/// Decrypt and parse a pack.
///
/// Any failure, including plaintext that is not a JSON object, is reported as
/// [`WireError::DecryptionFailure`]; a wrong key occasionally passes the
/// padding check and only shows up as garbage JSON.
pub fn open_pack(ciphertext: &str, key: &CipherKey) -> Result<Value, WireError> {
    let plain = decrypt(ciphertext, key)?;
    let text = std::str::from_utf8(&plain)
        .map_err(|_| WireError::DecryptionFailure("plaintext is not UTF-8".to_string()))?;
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(WireError::DecryptionFailure(
            "plaintext is not a JSON object".to_string(),
        )),
        Err(e) => Err(WireError::DecryptionFailure(format!("plaintext: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_pack_fits_one_block() {
        let sealed = encrypt(br#"{"t":"scan"}"#, &DEFAULT_KEY);
        let opened = decrypt(&sealed, &DEFAULT_KEY).unwrap();
        assert_eq!(opened, br#"{"t":"scan"}"#);
        assert_eq!(STANDARD.decode(&sealed).unwrap().len(), 16);
    }

    #[test]
    fn test_full_block_gets_extra_padding() {
        let plain = [b'x'; 32];
        let sealed = encrypt(&plain, &DEFAULT_KEY);
        assert_eq!(STANDARD.decode(&sealed).unwrap().len(), 48);
        assert_eq!(decrypt(&sealed, &DEFAULT_KEY).unwrap(), plain);
    }

    #[test]
    fn test_pack_with_session_key() {
        let key = CipherKey::parse("0123456789abcdef").unwrap();
        assert!(!key.is_default());

        let pack = json!({"t": "status", "mac": "f4911e000000", "cols": ["Pow"]});
        let sealed = seal_pack(&pack, &key);
        assert_eq!(open_pack(&sealed, &key).unwrap(), pack);
        assert!(matches!(
            open_pack(&sealed, &DEFAULT_KEY),
            Err(WireError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            decrypt("not base64!", &DEFAULT_KEY),
            Err(WireError::DecryptionFailure(_))
        ));
        assert!(matches!(
            decrypt(&STANDARD.encode([0u8; 10]), &DEFAULT_KEY),
            Err(WireError::DecryptionFailure(_))
        ));
        assert!(matches!(
            open_pack(&encrypt(b"[1,2,3]", &DEFAULT_KEY), &DEFAULT_KEY),
            Err(WireError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_key_length() {
        assert!(CipherKey::parse("short").is_err());
        assert_eq!(format!("{:?}", DEFAULT_KEY), "CipherKey(default)");
    }
}
