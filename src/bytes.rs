//! Bounded, zero-copy primitive reads over a byte slice.
//!
//! [`ByteReader`] is the single place in the library where raw bytes become
//! integers, floats, and strings. Every other layer (chunk framing, metadata,
//! constant pools, event payloads) narrows a parent reader down to its own
//! region with [`ByteReader::slice`] and decodes inside those bounds, so a
//! corrupted length in one record can never read past its enclosing region.
//!
//! Readers carry the absolute file offset of their first byte. Errors report
//! positions in file coordinates, which is what you want when staring at a
//! hex dump of a broken recording.
//!
//! ## Integer encoding
//!
//! Multi-byte fixed-width values are big-endian. Variable-length integers use
//! a 7-bit continuation scheme capped at nine bytes: bytes one through eight
//! contribute seven low bits each (least significant group first) plus a
//! continuation flag in the high bit; if all eight flags were set, a ninth
//! byte is consumed whole as the top eight bits. A varint therefore never
//! encodes more than 64 bits and never occupies more than nine bytes.
//!
//! Varints carry unsigned magnitudes on the wire. Whether a value is
//! reinterpreted as two's-complement signed is decided by the field that owns
//! it, via [`ByteReader::read_varint`].

use std::borrow::Cow;

use crate::error::{ParflightError, Result};

/// Longest possible encoding of a variable-length integer, in bytes.
pub const MAX_VARINT_LEN: usize = 9;

/// String encoding discriminants, one per encoded string value.
pub mod strenc {
    /// Null reference.
    pub const NULL: u8 = 0;
    /// The empty string, no further bytes.
    pub const EMPTY: u8 = 1;
    /// Varint index into the string constant pool.
    pub const CONSTANT_POOL: u8 = 2;
    /// Varint byte length followed by UTF-8 bytes.
    pub const UTF8: u8 = 3;
    /// Varint element count followed by one varint code point each.
    pub const CHAR_ARRAY: u8 = 4;
    /// Varint byte length followed by Latin-1 bytes.
    pub const LATIN1: u8 = 5;
}

/// One decoded string value.
///
/// Null and empty are distinct on the wire and stay distinct here; a
/// [`PoolIndex`](StringValue::PoolIndex) defers to the string constant pool
/// and is resolved by the caller, which knows which pool applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringValue<'a> {
    /// A null reference.
    Null,
    /// The empty string.
    Empty,
    /// Reference into the string constant pool.
    PoolIndex(i64),
    /// An inline string. Borrows the input when it was valid UTF-8.
    Literal(Cow<'a, str>),
}

/// A bounds-checked cursor over a borrowed byte slice.
///
/// Reads advance an internal position and fail with
/// [`ParflightError::UnexpectedEndOfData`] instead of panicking when the
/// region is exhausted. The reader never copies payload bytes; slices handed
/// out borrow the underlying data.
///
/// ## Examples
///
/// ```rust
/// use parflight::bytes::ByteReader;
///
/// let mut r = ByteReader::new(&[0x12, 0x34, 0x85, 0x01]);
/// assert_eq!(r.read_u16()?, 0x1234);
/// assert_eq!(r.read_varuint()?, 133);
/// assert!(r.is_empty());
/// # Ok::<(), parflight::ParflightError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    mark: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `data` with file offset zero.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a reader over `data` whose first byte sits at absolute file
    /// offset `base`. Error positions are reported relative to that base.
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            pos: 0,
            mark: 0,
            base,
        }
    }

    /// Total length of the region, in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when no bytes remain to be read.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Current position within the region.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute file offset of the current position.
    pub fn absolute_position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves the cursor to `pos` within the region. Seeking to exactly the
    /// end is allowed; seeking past it is an error.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(ParflightError::UnexpectedEndOfData {
                offset: self.base + pos as u64,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Records the current position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    /// Rewinds the cursor to the last [`mark`](Self::mark) (or the start, if
    /// none was set).
    pub fn reset(&mut self) {
        self.pos = self.mark;
    }

    /// Advances past `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Consumes the next `n` bytes, or fails if fewer remain.
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(ParflightError::UnexpectedEndOfData {
                offset: self.absolute_position(),
            }),
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| ParflightError::Internal("fixed-width read length mismatch".into()))
    }

    /// Reads `n` raw bytes, borrowing from the underlying region.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads one unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads one signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian IEEE 754 single.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian IEEE 754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Reads a variable-length unsigned integer.
    ///
    /// Consumes at most [`MAX_VARINT_LEN`] bytes. The ninth byte, when
    /// present, is taken whole as bits 56..64, so the result is always an
    /// exact 64-bit value.
    pub fn read_varuint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in 0..8u32 {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * shift);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Ok(value | u64::from(self.read_u8()?) << 56)
    }

    /// Reads a variable-length integer and reinterprets the 64-bit pattern
    /// as two's-complement signed.
    pub fn read_varint(&mut self) -> Result<i64> {
        Ok(self.read_varuint()? as i64)
    }

    /// Reads a varint that will be used as a length or element count.
    ///
    /// Fails with [`ParflightError::MalformedVarint`] when the value exceeds
    /// `bound` (typically the bytes remaining in the region) or does not fit
    /// in `usize`. This is the guard that keeps a corrupted count from
    /// turning into a giant allocation.
    pub fn read_varuint_len(&mut self, bound: u64) -> Result<usize> {
        let at = self.absolute_position();
        let value = self.read_varuint()?;
        if value > bound {
            return Err(ParflightError::MalformedVarint { offset: at, value });
        }
        usize::try_from(value).map_err(|_| ParflightError::MalformedVarint { offset: at, value })
    }

    /// Creates a bounded sub-reader over `[offset, offset + len)` of this
    /// region, without copying. The sub-reader reports absolute positions.
    pub fn slice(&self, offset: usize, len: usize) -> Result<ByteReader<'a>> {
        let end = offset.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => Ok(ByteReader::with_base(
                &self.data[offset..end],
                self.base + offset as u64,
            )),
            None => Err(ParflightError::UnexpectedEndOfData {
                offset: self.base + offset as u64,
            }),
        }
    }

    /// Creates a sub-reader from `offset` to the end of this region.
    pub fn slice_from(&self, offset: usize) -> Result<ByteReader<'a>> {
        let len = self
            .data
            .len()
            .checked_sub(offset)
            .ok_or(ParflightError::UnexpectedEndOfData {
                offset: self.base + offset as u64,
            })?;
        self.slice(offset, len)
    }

    /// Reads one discriminated string value.
    ///
    /// UTF-8 literals borrow the input when valid (invalid sequences are
    /// replaced, not rejected). Char-array values map each varint code point
    /// through `char::from_u32`, substituting U+FFFD for surrogate or
    /// out-of-range code points. Latin-1 bytes map directly to the first 256
    /// code points.
    pub fn read_string(&mut self) -> Result<StringValue<'a>> {
        let at = self.absolute_position();
        let encoding = self.read_u8()?;
        match encoding {
            strenc::NULL => Ok(StringValue::Null),
            strenc::EMPTY => Ok(StringValue::Empty),
            strenc::CONSTANT_POOL => Ok(StringValue::PoolIndex(self.read_varint()?)),
            strenc::UTF8 => {
                let bound = self.remaining() as u64;
                let len = self.read_varuint_len(bound)?;
                let bytes = self.read_bytes(len)?;
                Ok(StringValue::Literal(String::from_utf8_lossy(bytes)))
            }
            strenc::CHAR_ARRAY => {
                let bound = self.remaining() as u64;
                let count = self.read_varuint_len(bound)?;
                let mut s = String::with_capacity(count);
                for _ in 0..count {
                    let point = self.read_varuint()?;
                    let ch = u32::try_from(point)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    s.push(ch);
                }
                Ok(StringValue::Literal(Cow::Owned(s)))
            }
            strenc::LATIN1 => {
                let bound = self.remaining() as u64;
                let len = self.read_varuint_len(bound)?;
                let bytes = self.read_bytes(len)?;
                let s: String = bytes.iter().map(|&b| char::from(b)).collect();
                Ok(StringValue::Literal(Cow::Owned(s)))
            }
            other => Err(ParflightError::UnsupportedStringEncoding {
                offset: at,
                encoding: other,
            }),
        }
    }

    /// Advances past one discriminated string value without materializing it.
    pub fn skip_string(&mut self) -> Result<()> {
        let at = self.absolute_position();
        let encoding = self.read_u8()?;
        match encoding {
            strenc::NULL | strenc::EMPTY => Ok(()),
            strenc::CONSTANT_POOL => self.read_varint().map(|_| ()),
            strenc::UTF8 | strenc::LATIN1 => {
                let bound = self.remaining() as u64;
                let len = self.read_varuint_len(bound)?;
                self.skip(len)
            }
            strenc::CHAR_ARRAY => {
                let bound = self.remaining() as u64;
                let count = self.read_varuint_len(bound)?;
                for _ in 0..count {
                    self.read_varuint()?;
                }
                Ok(())
            }
            other => Err(ParflightError::UnsupportedStringEncoding {
                offset: at,
                encoding: other,
            }),
        }
    }
}
