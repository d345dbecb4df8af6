//! The encode half of the codec.

use smallvec::SmallVec;

use super::decoder::Decoder;
use super::MAX_ENCODABLE_INT;
use crate::addr::Address;

/// Shortest legal length for a nested table added with
/// [`ByteBuffer::add_buffer`]. A member table shorter than this cannot even
/// hold its category tags, so appending one is a caller bug.
pub const MIN_TABLE_LEN: usize = 4;

/// A growable buffer of space-saving encoded values.
///
/// The buffer only ever appends; it grows by reallocation as needed and
/// never fails for capacity reasons. [`reset`](ByteBuffer::reset) empties
/// it while keeping the allocation, so one buffer can serve many
/// serialization units. The encoded contents can be decoded with a
/// [`Decoder`].
#[derive(Debug, Default)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn new() -> ByteBuffer {
        ByteBuffer {
            bytes: Vec::with_capacity(32),
        }
    }

    /// Number of encoded bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the buffer holds no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Clear the buffer, retaining its capacity.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    /// View the encoded bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy out the contents as an exact-length byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Append a byte as-is, with no encoding.
    #[inline]
    pub fn add_unencoded_byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append an unsigned byte value. Asserts `value <= 0xFF`.
    #[inline]
    pub fn add_unsigned_byte(&mut self, value: u32) {
        assert!(value <= 0xFF, "unsigned byte out of range: {value:#x}");
        self.bytes.push(value as u8);
    }

    /// Append an unsigned integer in the range `0..=0x0FFF_FFFF`.
    ///
    /// The value is encoded in 1 to 4 bytes, 7 bits per byte starting from
    /// the low end, with the high bit of every byte except the last set.
    /// Values outside the 28-bit domain are a precondition violation.
    pub fn add_unsigned_int(&mut self, value: u32) {
        assert!(
            value <= MAX_ENCODABLE_INT,
            "unsigned int out of encodable range: {value:#x}"
        );
        if value < 128 {
            /* 0xxxxxxx */
            self.bytes.push(value as u8);
        } else if value < 16384 {
            /* 1xxxxxxx 0xxxxxxx */
            self.bytes.push((value & 0x7F) as u8 | 0x80);
            self.bytes.push((value >> 7) as u8);
        } else if value < 2097152 {
            /* 1xxxxxxx 1xxxxxxx 0xxxxxxx */
            self.bytes.push((value & 0x7F) as u8 | 0x80);
            self.bytes.push(((value >> 7) & 0x7F) as u8 | 0x80);
            self.bytes.push((value >> 14) as u8);
        } else {
            /* 1xxxxxxx 1xxxxxxx 1xxxxxxx 0xxxxxxx */
            self.bytes.push((value & 0x7F) as u8 | 0x80);
            self.bytes.push(((value >> 7) & 0x7F) as u8 | 0x80);
            self.bytes.push(((value >> 14) & 0x7F) as u8 | 0x80);
            self.bytes.push((value >> 21) as u8);
        }
    }

    /// Append an unsigned integer known to fit 16 bits.
    ///
    /// Uses the same encoding as [`add_unsigned_int`](Self::add_unsigned_int);
    /// the 16-bit bound is what makes this usable as a string length
    /// prefix.
    pub fn add_unsigned_short(&mut self, value: u32) {
        assert!(value <= 0xFFFF, "unsigned short out of range: {value:#x}");
        self.add_unsigned_int(value);
    }

    /// Append one UTF-16 code unit in modified UTF-8 form.
    ///
    /// The 1-byte form is used only for `0x0001..=0x007F`. The code unit 0
    /// takes the 2-byte form `[0xC0, 0x80]` so encoded strings never
    /// contain a raw zero byte; changing this breaks compatibility with
    /// every existing image.
    pub fn add_code_unit(&mut self, c: u16) {
        if (0x0001..=0x007F).contains(&c) {
            /* 0xxxxxxx */
            self.bytes.push(c as u8);
        } else if c > 0x07FF {
            /* 1110xxxx 10xxxxxx 10xxxxxx */
            self.bytes.push(0xE0 | (c >> 12) as u8);
            self.bytes.push(0x80 | ((c >> 6) & 0x3F) as u8);
            self.bytes.push(0x80 | (c & 0x3F) as u8);
        } else {
            /* 110xxxxx 10xxxxxx */
            self.bytes.push(0xC0 | ((c >> 6) & 0x1F) as u8);
            self.bytes.push(0x80 | (c & 0x3F) as u8);
        }
    }

    /// Append a string: its UTF-16 code-unit count as an unsigned short,
    /// then each code unit in modified UTF-8 form.
    ///
    /// In debug builds the freshly written bytes are decoded again and
    /// compared against the source string; a mismatch means the encoder
    /// and decoder have drifted apart and is a fatal internal error.
    pub fn add_utf8(&mut self, s: &str) {
        let start = self.bytes.len();
        let units: SmallVec<[u16; 32]> = s.encode_utf16().collect();
        self.add_unsigned_short(units.len() as u32);
        for &c in &units {
            self.add_code_unit(c);
        }
        debug_assert!(
            self.equals_encoded_string(&units, start),
            "string encoder self-check failed"
        );
    }

    /// Decode the string encoded at `pos` and compare it to `units`.
    fn equals_encoded_string(&self, units: &[u16], pos: usize) -> bool {
        let mut decoder = Decoder::from_slice(&self.bytes, pos);
        if decoder.read_unsigned_short() as usize != units.len() {
            return false;
        }
        units.iter().all(|&c| decoder.read_code_unit() == c)
    }

    /// Append another buffer's contents, prefixed by their byte length
    /// encoded with [`add_unsigned_int`](Self::add_unsigned_int).
    ///
    /// Used to nest one symbol table inside another. A degenerate nested
    /// buffer (no longer than [`MIN_TABLE_LEN`]) is a precondition
    /// violation.
    pub fn add_buffer(&mut self, buf: &ByteBuffer) {
        assert!(buf.len() > MIN_TABLE_LEN, "invalid member length");
        self.add_unsigned_int(buf.len() as u32);
        self.bytes.extend_from_slice(&buf.bytes);
    }

    /// Copy the buffer's contents into live memory at `oop + offset`.
    ///
    /// # Safety
    ///
    /// The destination range `[oop + offset, oop + offset + len)` must be
    /// writable and not concurrently accessed.
    pub unsafe fn write_to_memory(&self, oop: Address, offset: usize) {
        for (i, &b) in self.bytes.iter().enumerate() {
            oop.write_byte(offset + i, b);
        }
    }
}
