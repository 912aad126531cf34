//! CRC-8 used by Sensirion sensors (polynomial 0x31, init 0xFF).
//!
//! Every Sensirion word on the wire is two data bytes followed by one CRC
//! byte, so the checksum is always computed over exactly two bytes.

const POLYNOMIAL: u8 = 0x31;
const SEED: u8 = 0xFF;

/// Size of one checked word on the wire: two data bytes plus the CRC.
pub const WORD_LEN: usize = 3;

const fn shift_in(mut crc: u8, byte: u8) -> u8 {
    crc ^= byte;
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ POLYNOMIAL
        } else {
            crc << 1
        };
        bit += 1;
    }
    crc
}

/// CRC-8 of a two-byte word.
pub const fn crc8(b0: u8, b1: u8) -> u8 {
    shift_in(shift_in(SEED, b0), b1)
}

/// Returns true when `word[2]` is the CRC of `word[0..2]`.
///
/// Slices shorter than [`WORD_LEN`] are rejected.
pub fn check_word(word: &[u8]) -> bool {
    match word {
        [d0, d1, crc, ..] => crc8(*d0, *d1) == *crc,
        _ => false,
    }
}

/// Encode a 16-bit value as a big-endian word followed by its CRC.
pub fn encode_word(value: u16) -> [u8; WORD_LEN] {
    let [hi, lo] = value.to_be_bytes();
    [hi, lo, crc8(hi, lo)]
}
