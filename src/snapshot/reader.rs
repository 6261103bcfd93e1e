//! Snapshot Byte Cursor
//!
//! Every read checks the remaining length first, so a short file surfaces as
//! [`SnapshotError::Truncated`] rather than a panic inside `Buf`.
//!
//! ## Length Encoding
//!
//! The two high bits of the first byte pick the form:
//!
//! | Bits | Meaning                                          |
//! |------|--------------------------------------------------|
//! | `00` | 6-bit length in the low bits                     |
//! | `01` | 14-bit length, low 6 bits + next byte (BE)       |
//! | `10` | `0x80`: u32 BE follows, `0x81`: u64 BE follows   |
//! | `11` | special: `0`/`1`/`2` = 8/16/32-bit integer (LE), `3` = LZF |

use crate::snapshot::{SnapshotError, SnapshotResult};
use bytes::{Buf, Bytes};

/// A length-encoded prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain length; for strings, this many raw bytes follow
    Length(u64),
    Int8,
    Int16,
    Int32,
    /// LZF-compressed string
    Lzf,
}

/// Result of reading one string field.
#[derive(Debug)]
pub enum Field {
    Decoded(Bytes),
    /// The field used an encoding we skip; the cursor is already past it
    Skipped(SnapshotError),
}

/// Cursor over an in-memory snapshot.
#[derive(Debug)]
pub struct SnapshotReader {
    data: Bytes,
    total: usize,
}

impl SnapshotReader {
    pub fn new(data: Bytes) -> Self {
        let total = data.len();
        Self { data, total }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.total - self.data.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.has_remaining()
    }

    fn ensure(&self, n: usize) -> SnapshotResult<()> {
        if self.data.remaining() < n {
            return Err(SnapshotError::Truncated {
                offset: self.offset(),
                needed: n - self.data.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> SnapshotResult<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_u32_le(&mut self) -> SnapshotResult<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    pub fn read_u64_le(&mut self) -> SnapshotResult<u64> {
        self.ensure(8)?;
        Ok(self.data.get_u64_le())
    }

    /// Takes `n` raw bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> SnapshotResult<Bytes> {
        self.ensure(n)?;
        Ok(self.data.split_to(n))
    }

    pub fn skip(&mut self, n: usize) -> SnapshotResult<()> {
        self.ensure(n)?;
        self.data.advance(n);
        Ok(())
    }

    /// Reads a length-encoded prefix.
    pub fn read_encoding(&mut self) -> SnapshotResult<Encoding> {
        let offset = self.offset();
        let first = self.read_u8()?;

        match first >> 6 {
            0b00 => Ok(Encoding::Length(u64::from(first & 0x3F))),
            0b01 => {
                let next = self.read_u8()?;
                Ok(Encoding::Length(
                    (u64::from(first & 0x3F) << 8) | u64::from(next),
                ))
            }
            0b10 => match first {
                0x80 => {
                    self.ensure(4)?;
                    Ok(Encoding::Length(u64::from(self.data.get_u32())))
                }
                0x81 => {
                    self.ensure(8)?;
                    Ok(Encoding::Length(self.data.get_u64()))
                }
                _ => Err(SnapshotError::InvalidLength {
                    byte: first,
                    offset,
                }),
            },
            _ => match first & 0x3F {
                0 => Ok(Encoding::Int8),
                1 => Ok(Encoding::Int16),
                2 => Ok(Encoding::Int32),
                3 => Ok(Encoding::Lzf),
                _ => Err(SnapshotError::InvalidLength {
                    byte: first,
                    offset,
                }),
            },
        }
    }

    /// Reads a plain length; special forms are an error here.
    pub fn read_length(&mut self) -> SnapshotResult<u64> {
        let offset = self.offset();
        let first = self.data.first().copied().unwrap_or_default();
        match self.read_encoding()? {
            Encoding::Length(n) => Ok(n),
            _ => Err(SnapshotError::InvalidLength {
                byte: first,
                offset,
            }),
        }
    }

    /// Reads a string field.
    ///
    /// Integer forms are rendered as decimal text. An LZF string is skipped
    /// using its compressed length and reported as [`Field::Skipped`].
    pub fn read_string(&mut self) -> SnapshotResult<Field> {
        let offset = self.offset();

        let decoded = match self.read_encoding()? {
            Encoding::Length(n) => {
                let n = usize::try_from(n).map_err(|_| SnapshotError::Truncated {
                    offset,
                    needed: usize::MAX,
                })?;
                self.read_bytes(n)?
            }
            Encoding::Int8 => Bytes::from((self.read_u8()? as i8).to_string()),
            Encoding::Int16 => {
                self.ensure(2)?;
                Bytes::from(self.data.get_i16_le().to_string())
            }
            Encoding::Int32 => {
                self.ensure(4)?;
                Bytes::from(self.data.get_i32_le().to_string())
            }
            Encoding::Lzf => {
                let compressed_len = self.read_length()?;
                let _raw_len = self.read_length()?;
                let compressed_len =
                    usize::try_from(compressed_len).map_err(|_| SnapshotError::Truncated {
                        offset,
                        needed: usize::MAX,
                    })?;
                self.skip(compressed_len)?;
                return Ok(Field::Skipped(SnapshotError::UnsupportedEncoding {
                    offset,
                    kind: "LZF-compressed string",
                }));
            }
        };

        Ok(Field::Decoded(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8]) -> SnapshotReader {
        SnapshotReader::new(Bytes::copy_from_slice(bytes))
    }

    fn decoded(field: Field) -> Bytes {
        match field {
            Field::Decoded(b) => b,
            Field::Skipped(e) => panic!("unexpected skip: {}", e),
        }
    }

    #[test]
    fn test_six_bit_length() {
        assert_eq!(reader(&[0x0A]).read_length().unwrap(), 10);
        assert_eq!(reader(&[0x3F]).read_length().unwrap(), 63);
    }

    #[test]
    fn test_fourteen_bit_length() {
        assert_eq!(reader(&[0x42, 0xBC]).read_length().unwrap(), 700);
        assert_eq!(reader(&[0x7F, 0xFF]).read_length().unwrap(), 16383);
    }

    #[test]
    fn test_thirty_two_bit_length() {
        assert_eq!(
            reader(&[0x80, 0x00, 0x00, 0x42, 0x68]).read_length().unwrap(),
            17000
        );
    }

    #[test]
    fn test_sixty_four_bit_length() {
        let mut bytes = vec![0x81];
        bytes.extend_from_slice(&5_000_000_000u64.to_be_bytes());
        assert_eq!(reader(&bytes).read_length().unwrap(), 5_000_000_000);
    }

    #[test]
    fn test_invalid_length_forms() {
        assert!(matches!(
            reader(&[0x82]).read_length(),
            Err(SnapshotError::InvalidLength { byte: 0x82, offset: 0 })
        ));
        assert!(matches!(
            reader(&[0xC0, 0x01]).read_length(),
            Err(SnapshotError::InvalidLength { .. })
        ));
        assert!(matches!(
            reader(&[0xC4]).read_encoding(),
            Err(SnapshotError::InvalidLength { byte: 0xC4, .. })
        ));
    }

    #[test]
    fn test_plain_string() {
        let mut r = reader(b"\x05hello\x03abc");
        assert_eq!(decoded(r.read_string().unwrap()), Bytes::from("hello"));
        assert_eq!(decoded(r.read_string().unwrap()), Bytes::from("abc"));
        assert!(r.is_empty());
    }

    #[test]
    fn test_integer_strings() {
        assert_eq!(
            decoded(reader(&[0xC0, 0x7B]).read_string().unwrap()),
            Bytes::from("123")
        );
        assert_eq!(
            decoded(reader(&[0xC0, 0xFF]).read_string().unwrap()),
            Bytes::from("-1")
        );
        assert_eq!(
            decoded(reader(&[0xC1, 0x39, 0x30]).read_string().unwrap()),
            Bytes::from("12345")
        );
        assert_eq!(
            decoded(reader(&[0xC2, 0x87, 0xD6, 0x12, 0x00]).read_string().unwrap()),
            Bytes::from("1234567")
        );
    }

    #[test]
    fn test_lzf_string_is_skipped_by_declared_length() {
        // LZF marker, 4 compressed bytes, 10 raw bytes, then a trailing string
        let mut r = reader(&[0xC3, 0x04, 0x0A, 0xDE, 0xAD, 0xBE, 0xEF, 0x02, b'o', b'k']);

        match r.read_string().unwrap() {
            Field::Skipped(SnapshotError::UnsupportedEncoding { offset, .. }) => {
                assert_eq!(offset, 0)
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert_eq!(decoded(r.read_string().unwrap()), Bytes::from("ok"));
    }

    #[test]
    fn test_truncated_string() {
        let mut r = reader(b"\x05hel");
        assert!(matches!(
            r.read_string(),
            Err(SnapshotError::Truncated { offset: 1, needed: 2 })
        ));
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x6543_2100u32.to_le_bytes());
        bytes.extend_from_slice(&1_713_824_559_637u64.to_le_bytes());

        let mut r = reader(&bytes);
        assert_eq!(r.read_u32_le().unwrap(), 0x6543_2100);
        assert_eq!(r.read_u64_le().unwrap(), 1_713_824_559_637);
        assert_eq!(r.offset(), 12);
        assert!(matches!(r.read_u8(), Err(SnapshotError::Truncated { .. })));
    }
}
