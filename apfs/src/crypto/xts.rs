//! AES-XTS-like file-block decryption. Not standard XTS: the tweak is
//! seeded from `crypto_id XOR logical_block_address` rather than a
//! sector index, so this hand-rolls the tweak schedule over raw AES
//! block-cipher primitives instead of using a sector-indexed XTS crate.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{ApfsError, Result};

pub const KEY_LEN: usize = 32;
const BLOCK_LEN: usize = 16;
const GF_REDUCTION: u8 = 0x87;

/// Advance a 16-byte tweak by one position: multiply by x in GF(2^128)
/// using the reduction polynomial x^128 + x^7 + x^2 + x + 1.
fn gf_multiply_by_x(tweak: &mut [u8; 16]) {
    let mut carry = 0u8;
    for byte in tweak.iter_mut() {
        let new_carry = (*byte & 0x80) >> 7;
        *byte = (*byte << 1) | carry;
        carry = new_carry;
    }
    if carry != 0 {
        tweak[0] ^= GF_REDUCTION;
    }
}

fn encrypt_block_128(key: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128::new_from_slice(key).expect("16-byte key");
    let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
    cipher.encrypt_block(ga);
}

fn decrypt_block_128(key: &[u8; 16], block: &mut [u8; 16]) {
    let cipher = Aes128::new_from_slice(key).expect("16-byte key");
    let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
    cipher.decrypt_block(ga);
}

fn initial_tweak(tweak_key: &[u8; 16], crypto_id: u64, lba: u64) -> [u8; 16] {
    let tweak_value = crypto_id ^ lba;
    let mut tweak_block = [0u8; 16];
    tweak_block[..8].copy_from_slice(&tweak_value.to_le_bytes());
    encrypt_block_128(tweak_key, &mut tweak_block);
    tweak_block
}

fn xor16(a: &mut [u8; 16], b: &[u8; 16]) {
    for i in 0..16 {
        a[i] ^= b[i];
    }
}

/// Decrypt `data` (a whole multiple of 16 bytes) in place, one AES
/// block at a time, advancing the tweak by GF(2^128) multiplication
/// between blocks.
pub fn decrypt_region(key: &[u8; KEY_LEN], crypto_id: u64, lba: u64, data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(ApfsError::InvalidInput(
            "xts region length must be a multiple of 16 bytes".into(),
        ));
    }
    let data_key: [u8; 16] = key[0..16].try_into().unwrap();
    let tweak_key: [u8; 16] = key[16..32].try_into().unwrap();
    let mut tweak = initial_tweak(&tweak_key, crypto_id, lba);

    for chunk in data.chunks_mut(BLOCK_LEN) {
        let mut block: [u8; 16] = chunk.try_into().unwrap();
        xor16(&mut block, &tweak);
        decrypt_block_128(&data_key, &mut block);
        xor16(&mut block, &tweak);
        chunk.copy_from_slice(&block);
        gf_multiply_by_x(&mut tweak);
    }
    Ok(())
}

/// Inverse of [`decrypt_region`], used only to build round-trip tests.
#[cfg(test)]
fn encrypt_region(key: &[u8; KEY_LEN], crypto_id: u64, lba: u64, data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(ApfsError::InvalidInput(
            "xts region length must be a multiple of 16 bytes".into(),
        ));
    }
    let data_key: [u8; 16] = key[0..16].try_into().unwrap();
    let tweak_key: [u8; 16] = key[16..32].try_into().unwrap();
    let mut tweak = initial_tweak(&tweak_key, crypto_id, lba);

    for chunk in data.chunks_mut(BLOCK_LEN) {
        let mut block: [u8; 16] = chunk.try_into().unwrap();
        xor16(&mut block, &tweak);
        encrypt_block_128(&data_key, &mut block);
        xor16(&mut block, &tweak);
        chunk.copy_from_slice(&block);
        gf_multiply_by_x(&mut tweak);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gf_multiply_by_x_no_carry() {
        let mut tweak = [0u8; 16];
        tweak[0] = 0x01;
        gf_multiply_by_x(&mut tweak);
        assert_eq!(tweak[0], 0x02);
    }

    #[test]
    fn test_gf_multiply_by_x_with_carry() {
        let mut tweak = [0u8; 16];
        tweak[15] = 0x80;
        gf_multiply_by_x(&mut tweak);
        assert_eq!(tweak[15], 0x00);
        assert_eq!(tweak[0], GF_REDUCTION);
    }

    #[test]
    fn test_round_trip_single_block() {
        let key = [0x5Au8; KEY_LEN];
        let mut data = [0xAAu8; 16];
        let original = data;

        encrypt_region(&key, 42, 7, &mut data).unwrap();
        assert_ne!(data, original);
        decrypt_region(&key, 42, 7, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_round_trip_multi_block() {
        let key = [0x11u8; KEY_LEN];
        let mut data = vec![0u8; 64];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = data.clone();

        encrypt_region(&key, 1, 0, &mut data).unwrap();
        assert_ne!(data, original);
        decrypt_region(&key, 1, 0, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_rejects_unaligned_length() {
        let key = [0x11u8; KEY_LEN];
        let mut data = vec![0u8; 17];
        assert!(decrypt_region(&key, 0, 0, &mut data).is_err());
    }

    #[test]
    fn test_different_lba_yields_different_ciphertext() {
        let key = [0x33u8; KEY_LEN];
        let mut data_a = [0x00u8; 16];
        let mut data_b = [0x00u8; 16];
        encrypt_region(&key, 5, 0, &mut data_a).unwrap();
        encrypt_region(&key, 5, 1, &mut data_b).unwrap();
        assert_ne!(data_a, data_b);
    }
}
