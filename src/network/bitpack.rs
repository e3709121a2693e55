//! Bit-level writer and reader for compact wire payloads.
//!
//! Bits are written least-significant first into consecutive bytes. Values
//! wider than one bit keep their own bit order, so a value written with
//! `write_bits(v, n)` reads back with `read_bits(n)`.

use crate::error::{BallisticsError, Result};

/// Packs up to eight flags into one byte, first flag in the lowest bit.
///
/// # Example
/// ```
/// use terminal_ballistics::network::bitpack::{pack_bits, unpack_bits};
///
/// let flags = pack_bits(&[true, false, true]).unwrap();
/// assert_eq!(flags, 0b101);
/// assert_eq!(unpack_bits(flags, 3), vec![true, false, true]);
/// ```
pub fn pack_bits(flags: &[bool]) -> Result<u8> {
    if flags.is_empty() || flags.len() > 8 {
        return Err(BallisticsError::Wire(format!("cannot pack {} flags into a byte", flags.len())));
    }
    Ok(flags
        .iter()
        .enumerate()
        .fold(0u8, |packed, (i, &flag)| packed | (u8::from(flag) << i)))
}

/// Unpacks `count` flags packed by [`pack_bits`].
pub fn unpack_bits(packed: u8, count: usize) -> Vec<bool> {
    (0..count.min(8)).map(|i| packed & (1 << i) != 0).collect()
}

/// Number of bits needed to hold every count up to `max`.
pub const fn count_bits(max: u64) -> u32 {
    u64::BITS - max.leading_zeros()
}

#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << offset;
            }
        }
        self.bit_len += 1;
    }

    /// Writes the low `count` bits of `value`.
    pub fn write_bits(&mut self, value: u64, count: u32) {
        for i in 0..count.min(64) {
            self.write_bit(value >> i & 1 == 1);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(u64::from(value), 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(u64::from(value), 16);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bits(value, 64);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .bytes
            .get(self.position / 8)
            .ok_or_else(|| BallisticsError::Wire(format!("buffer ended at bit {}", self.position)))?;
        let bit = byte >> (self.position % 8) & 1 == 1;
        self.position += 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..count.min(64) {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_bits(64)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn remaining_bits(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_every_flag_combination() {
        for count in 1..=8usize {
            for pattern in 0u16..(1 << count) {
                let flags: Vec<bool> = (0..count).map(|i| pattern & (1 << i) != 0).collect();
                let packed = pack_bits(&flags).unwrap();
                assert_eq!(unpack_bits(packed, count), flags);

                let plain = bincode::serialize(&flags).unwrap();
                assert!(std::mem::size_of_val(&packed) < plain.len());
            }
        }
    }

    #[test]
    fn test_pack_rejects_bad_lengths() {
        assert!(pack_bits(&[]).is_err());
        assert!(pack_bits(&[true; 9]).is_err());
    }

    #[test]
    fn test_count_bits() {
        assert_eq!(count_bits(63), 6);
        assert_eq!(count_bits(31), 5);
        assert_eq!(count_bits(1), 1);
    }

    #[test]
    fn test_mixed_widths_read_back() {
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        writer.write_bits(0b10110, 5);
        writer.write_u16(0xBEEF);
        writer.write_f64(-12.5);
        assert_eq!(writer.bit_len(), 1 + 5 + 16 + 64);

        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 11);
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(5).unwrap(), 0b10110);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_f64().unwrap(), -12.5);
        assert!(reader.remaining_bits() < 8);
    }

    #[test]
    fn test_reading_past_the_end_fails() {
        let mut reader = BitReader::new(&[0xFF]);
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
        assert!(matches!(reader.read_bit(), Err(BallisticsError::Wire(_))));
    }
}
