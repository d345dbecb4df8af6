//! Pointer rewriting over an oop map.
//!
//! One pass serves both directions: the writer maps actual addresses to
//! canonical ones before serializing, and the loader maps canonical
//! addresses back to actual ones after acquiring the memory. A marked word
//! holding the null pointer stays null.

use crate::oopmap::OopMap;

/// Read the pointer word at byte `offset`.
pub(crate) fn read_word(bytes: &[u8], offset: usize, word_size: usize, big_endian: bool) -> u64 {
    let mut value = 0u64;
    if big_endian {
        for i in 0..word_size {
            value = (value << 8) | bytes[offset + i] as u64;
        }
    } else {
        for i in (0..word_size).rev() {
            value = (value << 8) | bytes[offset + i] as u64;
        }
    }
    value
}

/// Write the pointer word at byte `offset`.
pub(crate) fn write_word(
    bytes: &mut [u8],
    offset: usize,
    word_size: usize,
    big_endian: bool,
    value: u64,
) {
    for i in 0..word_size {
        let shift = if big_endian {
            (word_size - 1 - i) * 8
        } else {
            i * 8
        };
        bytes[offset + i] = (value >> shift) as u8;
    }
}

/// Rewrite every word the oop map marks, applying `map` to its value.
pub(crate) fn relocate(
    memory: &mut [u8],
    oop_map: &OopMap,
    word_size: usize,
    big_endian: bool,
    map: impl Fn(u64) -> u64,
) {
    for word_index in oop_map.set_bits() {
        let offset = word_index * word_size;
        assert!(
            offset + word_size <= memory.len(),
            "oop map marks a word outside the memory region"
        );
        let value = read_word(memory, offset, word_size, big_endian);
        if value != 0 {
            write_word(memory, offset, word_size, big_endian, map(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_round_trip_both_endians() {
        let mut bytes = vec![0u8; 16];
        for &big_endian in &[false, true] {
            write_word(&mut bytes, 8, 8, big_endian, 0x1122_3344_5566_7788);
            assert_eq!(
                read_word(&bytes, 8, 8, big_endian),
                0x1122_3344_5566_7788
            );
        }
    }

    #[test]
    fn test_32_bit_words() {
        let mut bytes = vec![0u8; 8];
        write_word(&mut bytes, 4, 4, true, 0xCAFE_F00D);
        assert_eq!(&bytes[4..], &[0xCA, 0xFE, 0xF0, 0x0D]);
        assert_eq!(read_word(&bytes, 4, 4, true), 0xCAFE_F00D);
    }

    #[test]
    fn test_relocate_adjusts_only_marked_words() {
        let mut memory = vec![0u8; 32];
        write_word(&mut memory, 0, 8, false, 0x100);
        write_word(&mut memory, 8, 8, false, 0x200);
        write_word(&mut memory, 16, 8, false, 0x300);

        let mut map = OopMap::for_memory(32, 8);
        map.set(0);
        map.set(2);

        relocate(&mut memory, &map, 8, false, |v| v + 0x1000);

        assert_eq!(read_word(&memory, 0, 8, false), 0x1100);
        assert_eq!(read_word(&memory, 8, 8, false), 0x200);
        assert_eq!(read_word(&memory, 16, 8, false), 0x1300);
    }

    #[test]
    fn test_relocate_leaves_null_pointers_alone() {
        let mut memory = vec![0u8; 16];
        let mut map = OopMap::for_memory(16, 8);
        map.set(0);

        relocate(&mut memory, &map, 8, false, |v| v + 0x1000);
        assert_eq!(read_word(&memory, 0, 8, false), 0);
    }
}
