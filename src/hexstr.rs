// SPDX-FileCopyrightText: © 2026 The tpm2-ops Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Hex string conversion used by every layer that hands binary TPM output
//! onwards as text.

use crate::error::Result;

/// Encode bytes as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes.
///
/// Odd-length input is padded with an implicit leading zero nibble, so
/// `"abc"` decodes to `[0x0a, 0xbc]`.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 == 1 {
        let mut padded = String::with_capacity(s.len() + 1);
        padded.push('0');
        padded.push_str(s);
        Ok(hex::decode(padded)?)
    } else {
        Ok(hex::decode(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_even_length() {
        let data = [0x00u8, 0x01, 0xab, 0xff, 0x10];
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn odd_length_pads_leading_nibble() {
        assert_eq!(decode("abc").unwrap(), vec![0x0a, 0xbc]);
        assert_eq!(decode("1").unwrap(), vec![0x01]);
    }

    #[test]
    fn empty_is_empty() {
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn rejects_non_hex() {
        assert!(decode("zz").is_err());
    }
}
