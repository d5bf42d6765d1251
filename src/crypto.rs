use crate::{CommonKeyType, Result};
use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::Deserialize;
use std::path::Path;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The platform common keys, one per [`CommonKeyType`].
///
/// The real keys are secret and must be supplied by the caller. `Default`
/// gives all-zero keys, which only make sense for test fixtures.
///
/// ```
/// let keys = cafe_pack::CommonKeys::from_json(
///     r#"{"standard": "000102030405060708090a0b0c0d0e0f"}"#,
/// ).unwrap();
/// assert_eq!(keys.standard[15], 0x0F);
/// assert_eq!(keys.korean, [0; 16]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommonKeys {
    #[serde(deserialize_with = "hex::deserialize")]
    pub standard: [u8; 16],
    #[serde(deserialize_with = "hex::deserialize", default)]
    pub korean: [u8; 16],
}

impl CommonKeys {
    /// Reads keys from JSON of the form `{"standard": "<hex>", "korean": "<hex>"}`
    pub fn from_json(json: &str) -> Result<CommonKeys> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<CommonKeys> {
        let json = std::fs::read_to_string(path)?;
        CommonKeys::from_json(&json)
    }

    pub fn get(&self, index: CommonKeyType) -> &[u8; 16] {
        match index {
            CommonKeyType::Standard => &self.standard,
            CommonKeyType::Korean => &self.korean,
        }
    }
}

/// Big endian title ID followed by eight zero bytes
fn title_key_iv(title_id: u64) -> [u8; 16] {
    let mut iv = [0; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());
    iv
}

/// Decrypts a ticket's title key with AES-128-CBC, a single block and no padding.
pub fn decrypt_title_key(encrypted: &[u8; 16], title_id: u64, common_key: &[u8; 16]) -> [u8; 16] {
    let mut block = *encrypted;
    Aes128CbcDec::new(&(*common_key).into(), &title_key_iv(title_id).into())
        .decrypt_block_mut(GenericArray::from_mut_slice(&mut block));
    block
}

/// Inverse of [`decrypt_title_key`].
pub fn encrypt_title_key(title_key: &[u8; 16], title_id: u64, common_key: &[u8; 16]) -> [u8; 16] {
    let mut block = *title_key;
    Aes128CbcEnc::new(&(*common_key).into(), &title_key_iv(title_id).into())
        .encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
    block
}
