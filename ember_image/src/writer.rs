//! Serializing an object memory to an image.

use std::io::{self, Write};

use ember_core::{Address, ByteBuffer, BYTES_PER_WORD};

use crate::format::{oop_map_size_in_bytes, Attributes, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::memory::ObjectMemory;
use crate::oopmap::OopMap;
use crate::relocate;

/// The product of serializing an object graph, ready to be written out.
///
/// `memory` holds the graph with its pointers still relative to `start`;
/// the writer relocates them to canonical form in place before they reach
/// the sink.
#[derive(Debug)]
pub struct ControlBlock {
    /// The serialized object graph.
    pub memory: Vec<u8>,
    /// The address the pointers in `memory` are currently relative to.
    pub start: Address,
    /// Oop map describing which words of `memory` are pointers.
    pub oop_map: OopMap,
    /// Byte offset of the graph's root within `memory`.
    pub root: usize,
    /// Optional per-byte type classification of `memory`.
    pub type_map: Option<Vec<u8>>,
}

/// Writes object-memory images to a byte sink.
pub struct ImageWriter<'a, W: Write> {
    sink: &'a mut W,
    written: usize,
    trace: bool,
}

impl<'a, W: Write> ImageWriter<'a, W> {
    /// Create a writer over `sink`.
    pub fn new(sink: &'a mut W) -> ImageWriter<'a, W> {
        ImageWriter {
            sink,
            written: 0,
            trace: false,
        }
    }

    /// Enable per-field trace output on stderr.
    pub fn with_trace(mut self, trace: bool) -> ImageWriter<'a, W> {
        self.trace = trace;
        self
    }

    /// Write a serialized object memory as a complete image.
    ///
    /// The pointers in `cb.memory` are relocated to canonical form in
    /// place: self-referencing pointers become offsets from the end of the
    /// parent's canonical range, pointers into the parent chain become the
    /// parent's canonical addresses. The memory region is written in host
    /// byte order and word width, which the attribute mask declares.
    pub fn save(
        &mut self,
        uri: &str,
        cb: &mut ControlBlock,
        parent: Option<&ObjectMemory>,
    ) -> io::Result<()> {
        let size = cb.memory.len();
        assert!(
            size % BYTES_PER_WORD == 0,
            "memory region must be a whole number of words"
        );
        assert!(cb.root <= size, "root offset outside the memory region");
        assert_eq!(
            cb.oop_map.size_in_bytes(),
            oop_map_size_in_bytes(size, BYTES_PER_WORD),
            "oop map does not cover the memory region"
        );
        if let Some(type_map) = &cb.type_map {
            assert_eq!(type_map.len(), size, "type map must cover every memory byte");
        }

        if self.trace {
            eprintln!("Saving object memory to {uri}");
        }

        self.write_u32(MAGIC, "magic")?;
        self.write_u16(MINOR_VERSION, "minor_version")?;
        self.write_u16(MAJOR_VERSION, "major_version")?;

        let attributes = Attributes::host(cb.type_map.is_some());
        self.write_u32(attributes.bits(), "attributes")?;

        match parent {
            None => {
                self.write_u32(0, "parent_hash")?;
                self.write_utf8("", "parent_uri")?;
            }
            Some(parent) => {
                self.write_u32(parent.hash(), "parent_hash")?;
                self.write_utf8(parent.uri(), "parent_uri")?;
            }
        }

        self.write_u32(cb.root as u32, "root")?;
        self.write_u32(size as u32, "size")?;
        self.write_all(cb.oop_map.as_bytes(), Some("oopmap"))?;

        relocate_to_canonical(cb, parent);

        // Pad so the memory region lands on a word boundary within the
        // image.
        let pad = (BYTES_PER_WORD - self.written % BYTES_PER_WORD) % BYTES_PER_WORD;
        for _ in 0..pad {
            self.write_all(&[0], None)?;
        }

        self.write_all(&cb.memory, Some("memory"))?;

        if let Some(type_map) = &cb.type_map {
            self.write_all(type_map, Some("typemap"))?;
        }

        self.sink.flush()?;
        if self.trace {
            eprintln!("Saved object memory to {uri}");
        }
        Ok(())
    }

    /// Total bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_all(&mut self, bytes: &[u8], label: Option<&str>) -> io::Result<()> {
        self.sink.write_all(bytes)?;
        self.written += bytes.len();
        if self.trace {
            if let Some(label) = label {
                eprintln!("{label}:{{wrote {} bytes}}", bytes.len());
            }
        }
        Ok(())
    }

    fn write_u16(&mut self, value: u16, label: &str) -> io::Result<()> {
        self.sink.write_all(&value.to_be_bytes())?;
        self.written += 2;
        if self.trace {
            eprintln!("{label}:{value}");
        }
        Ok(())
    }

    fn write_u32(&mut self, value: u32, label: &str) -> io::Result<()> {
        self.sink.write_all(&value.to_be_bytes())?;
        self.written += 4;
        if self.trace {
            eprintln!("{label}:{value}");
        }
        Ok(())
    }

    fn write_utf8(&mut self, s: &str, label: &str) -> io::Result<()> {
        let mut buf = ByteBuffer::new();
        buf.add_utf8(s);
        self.sink.write_all(buf.as_slice())?;
        self.written += buf.len();
        if self.trace {
            eprintln!("{label}:\"{s}\"");
        }
        Ok(())
    }
}

/// Rewrite the pointers in `cb.memory` from actual to canonical form.
fn relocate_to_canonical(cb: &mut ControlBlock, parent: Option<&ObjectMemory>) {
    let actual_start = cb.start.as_usize();
    let size = cb.memory.len();
    let canonical_start = parent.map_or(0, ObjectMemory::canonical_end);

    let oop_map = cb.oop_map.clone();
    relocate::relocate(
        &mut cb.memory,
        &oop_map,
        BYTES_PER_WORD,
        cfg!(target_endian = "big"),
        |value| {
            let a = value as usize;
            if a >= actual_start && a < actual_start + size {
                return (a - actual_start + canonical_start) as u64;
            }
            for mem in parent.into_iter().flat_map(ObjectMemory::chain) {
                if mem.contains(Address::from_usize(a)) {
                    return (a - mem.start().as_usize() + mem.canonical_start()) as u64;
                }
            }
            panic!("pointer {a:#x} outside the object memory chain");
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocate::{read_word, write_word};

    fn word_sized_memory(words: usize) -> Vec<u8> {
        vec![0u8; words * BYTES_PER_WORD]
    }

    #[test]
    fn test_header_layout_is_byte_exact() {
        let mut memory = word_sized_memory(2);
        write_word(
            &mut memory,
            0,
            BYTES_PER_WORD,
            cfg!(target_endian = "big"),
            0x10008,
        );
        let mut oop_map = OopMap::for_memory(memory.len(), BYTES_PER_WORD);
        oop_map.set(0);

        let mut cb = ControlBlock {
            memory,
            start: Address::from_usize(0x10000),
            oop_map,
            root: BYTES_PER_WORD,
            type_map: None,
        };

        let mut out = Vec::new();
        ImageWriter::new(&mut out).save("suite", &mut cb, None).unwrap();

        // magic
        assert_eq!(&out[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        // minor 1, major 1
        assert_eq!(&out[4..8], &[0, 1, 0, 1]);
        // attributes: no typemap; width and endianness of this host
        let attrs = u32::from_be_bytes(out[8..12].try_into().unwrap());
        assert_eq!(Attributes::from_bits(attrs), Attributes::host(false));
        // parent hash 0, empty parent uri (one varint zero byte)
        assert_eq!(&out[12..16], &[0, 0, 0, 0]);
        assert_eq!(out[16], 0x00);
        // root, size
        assert_eq!(
            u32::from_be_bytes(out[17..21].try_into().unwrap()),
            BYTES_PER_WORD as u32
        );
        assert_eq!(
            u32::from_be_bytes(out[21..25].try_into().unwrap()),
            (2 * BYTES_PER_WORD) as u32
        );
        // oop map: word 0 marked
        assert_eq!(out[25], 0x01);
        // padding puts the memory region on a word boundary
        let memory_offset = out.len() - 2 * BYTES_PER_WORD;
        assert_eq!(memory_offset % BYTES_PER_WORD, 0);
    }

    #[test]
    fn test_save_relocates_self_pointer_to_canonical() {
        // Word 0 points at word 1 of the same region (actual address
        // 0x10000 + one word); canonically that is offset one word from 0.
        let mut memory = word_sized_memory(2);
        write_word(
            &mut memory,
            0,
            BYTES_PER_WORD,
            cfg!(target_endian = "big"),
            (0x10000 + BYTES_PER_WORD) as u64,
        );
        let mut oop_map = OopMap::for_memory(memory.len(), BYTES_PER_WORD);
        oop_map.set(0);

        let mut cb = ControlBlock {
            memory,
            start: Address::from_usize(0x10000),
            oop_map,
            root: 0,
            type_map: None,
        };

        let mut out = Vec::new();
        ImageWriter::new(&mut out).save("suite", &mut cb, None).unwrap();

        assert_eq!(
            read_word(&cb.memory, 0, BYTES_PER_WORD, cfg!(target_endian = "big")),
            BYTES_PER_WORD as u64
        );
    }

    #[test]
    #[should_panic(expected = "root offset outside the memory region")]
    fn test_bad_root_offset_is_fatal() {
        let mut cb = ControlBlock {
            memory: word_sized_memory(1),
            start: Address::from_usize(0x10000),
            oop_map: OopMap::for_memory(BYTES_PER_WORD, BYTES_PER_WORD),
            root: 2 * BYTES_PER_WORD,
            type_map: None,
        };
        let mut out = Vec::new();
        let _ = ImageWriter::new(&mut out).save("suite", &mut cb, None);
    }

    #[test]
    #[should_panic(expected = "type map must cover every memory byte")]
    fn test_short_type_map_is_fatal() {
        let mut cb = ControlBlock {
            memory: word_sized_memory(2),
            start: Address::from_usize(0x10000),
            oop_map: OopMap::for_memory(2 * BYTES_PER_WORD, BYTES_PER_WORD),
            root: 0,
            type_map: Some(vec![0; 3]),
        };
        let mut out = Vec::new();
        let _ = ImageWriter::new(&mut out).save("suite", &mut cb, None);
    }
}
