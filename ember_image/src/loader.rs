//! Loading object-memory images.
//!
//! The loader drives an [`ImageReader`] through the format's fields in
//! declared order, acquires the memory region (copying it, or referencing
//! it in place when the reader exposes addresses), verifies the parent
//! linkage, and relocates the recorded pointers to the region's actual
//! address.
//!
//! Integrity failures — a parent that is not loaded, or whose hash does
//! not match the one the image was built against — are the one error
//! class the surrounding runtime is expected to branch on: they reject
//! the load instead of crashing the VM.

use std::fmt;
use std::sync::Arc;

use ember_core::{ByteSource, Decoder, BYTES_PER_WORD};

use crate::format::{oop_map_size_in_bytes, Attributes, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::memory::{MemoryRegion, ObjectMemory};
use crate::oopmap::OopMap;
use crate::reader::ImageReader;
use crate::registry::ImageRegistry;
use crate::relocate;

/// Why an image was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The stream does not begin with the image magic number.
    BadMagic(u32),
    /// The image was produced by an incompatible format version.
    UnsupportedVersion {
        /// Minor version found in the image.
        minor: u16,
        /// Major version found in the image.
        major: u16,
    },
    /// The image targets a different word width than this host.
    WrongWordSize {
        /// Word size (in bytes) the image was built for.
        image: usize,
    },
    /// The image's memory region is in the wrong byte order for this host.
    WrongEndian,
    /// The image names a parent that has not been loaded.
    ParentNotLoaded(String),
    /// The loaded parent is not the one this image was built against.
    ParentHashMismatch {
        /// The parent's identifying string.
        uri: String,
        /// Hash recorded in the image header.
        expected: u32,
        /// Hash of the parent actually loaded.
        actual: u32,
    },
    /// The stream ended before the declared contents.
    Truncated,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::BadMagic(magic) => write!(f, "bad image magic number: {magic:#010x}"),
            LoadError::UnsupportedVersion { minor, major } => {
                write!(f, "unsupported image format version {major}.{minor}")
            }
            LoadError::WrongWordSize { image } => {
                write!(
                    f,
                    "image targets {}-bit systems, host words are {} bytes",
                    image * 8,
                    BYTES_PER_WORD
                )
            }
            LoadError::WrongEndian => write!(f, "image byte order does not match this host"),
            LoadError::ParentNotLoaded(uri) => write!(f, "parent image not loaded: {uri}"),
            LoadError::ParentHashMismatch {
                uri,
                expected,
                actual,
            } => write!(
                f,
                "parent image {uri} has hash {actual:#010x}, expected {expected:#010x}"
            ),
            LoadError::Truncated => write!(f, "image truncated"),
        }
    }
}

impl std::error::Error for LoadError {}

/// A fully loaded image: the header fields plus the registered memory.
#[derive(Debug)]
pub struct ObjectMemoryImage {
    minor: u16,
    major: u16,
    attributes: Attributes,
    parent_hash: u32,
    parent_uri: String,
    type_map: Option<Vec<u8>>,
    memory: Arc<ObjectMemory>,
}

impl ObjectMemoryImage {
    /// Format minor version the image was written with.
    pub fn minor(&self) -> u16 {
        self.minor
    }

    /// Format major version the image was written with.
    pub fn major(&self) -> u16 {
        self.major
    }

    /// The attribute mask.
    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    /// True iff the memory region is big-endian (attribute bit 0x04,
    /// independent of the other attribute bits).
    pub fn is_big_endian(&self) -> bool {
        self.attributes.is_big_endian()
    }

    /// Hash of the parent recorded in the header.
    pub fn parent_hash(&self) -> u32 {
        self.parent_hash
    }

    /// Identifying string of the parent recorded in the header (empty for
    /// the root image).
    pub fn parent_uri(&self) -> &str {
        &self.parent_uri
    }

    /// The per-byte type map, when the image carries one.
    pub fn type_map(&self) -> Option<&[u8]> {
        self.type_map.as_deref()
    }

    /// The loaded, relocated object memory.
    pub fn memory(&self) -> &Arc<ObjectMemory> {
        &self.memory
    }
}

/// Adapts an [`ImageReader`] to the codec's byte-source capability for the
/// embedded parent-uri string. Truncation mid-string is a malformed
/// stream, which the codec treats as fatal.
struct ReaderSource<'a, R: ImageReader> {
    reader: &'a mut R,
}

impl<R: ImageReader> ByteSource for ReaderSource<'_, R> {
    fn next_byte(&mut self) -> u8 {
        self.reader
            .read_byte()
            .expect("malformed stream: image truncated inside a string")
    }

    fn position(&self) -> usize {
        self.reader.position()
    }
}

/// Loads one image from an [`ImageReader`].
pub struct ImageLoader<R: ImageReader> {
    reader: R,
    trace: bool,
}

impl<R: ImageReader> ImageLoader<R> {
    /// Create a loader over `reader`.
    pub fn new(reader: R) -> ImageLoader<R> {
        ImageLoader {
            reader,
            trace: false,
        }
    }

    /// Enable per-field trace output on stderr.
    pub fn with_trace(mut self, trace: bool) -> ImageLoader<R> {
        self.trace = trace;
        self
    }

    /// Load, verify, relocate and register the image as `uri`.
    ///
    /// The image's parent (when it has one) is resolved through
    /// `registry`, and the loaded memory is registered there under `uri`
    /// so later images can name it as *their* parent.
    pub fn load(
        mut self,
        uri: &str,
        registry: &ImageRegistry,
    ) -> Result<ObjectMemoryImage, LoadError> {
        if self.trace {
            eprintln!("Loading object memory from {uri}");
        }

        let magic = self.read_u32("magic")?;
        if magic != MAGIC {
            return Err(LoadError::BadMagic(magic));
        }

        let minor = self.read_u16("minor_version")?;
        let major = self.read_u16("major_version")?;
        if major != MAJOR_VERSION || minor != MINOR_VERSION {
            return Err(LoadError::UnsupportedVersion { minor, major });
        }

        let attributes = Attributes::from_bits(self.read_u32("attributes")?);
        let word_size = attributes.word_size();
        if word_size != BYTES_PER_WORD {
            return Err(LoadError::WrongWordSize { image: word_size });
        }
        if attributes.is_big_endian() != cfg!(target_endian = "big") {
            return Err(LoadError::WrongEndian);
        }

        let parent_hash = self.read_u32("parent_hash")?;
        let parent_uri = self.read_string("parent_uri");

        let root = self.read_u32("root")? as usize;
        let size = self.read_u32("size")? as usize;

        let oop_map = OopMap::from_bytes(
            self.reader
                .read_bytes(oop_map_size_in_bytes(size, word_size))?,
        );

        // The padding between the oop map and the memory region is
        // whatever brings the stream position to the image's declared
        // word boundary, not a fixed count.
        let pad = (word_size - self.reader.position() % word_size) % word_size;
        self.reader.skip(pad)?;

        let parent = if parent_uri.is_empty() {
            None
        } else {
            let parent = registry
                .lookup(&parent_uri)
                .ok_or_else(|| LoadError::ParentNotLoaded(parent_uri.clone()))?;
            if parent.hash() != parent_hash {
                return Err(LoadError::ParentHashMismatch {
                    uri: parent_uri.clone(),
                    expected: parent_hash,
                    actual: parent.hash(),
                });
            }
            Some(parent)
        };

        // Memory acquisition: reference the reader's range in place when
        // it has one (the pointers there are already actual addresses),
        // otherwise copy and relocate below.
        let (mut region, in_place) = match self.reader.current_address() {
            Some(address) => {
                self.reader.skip(size)?;
                // Safety: the reader's construction contract keeps its
                // backing range valid.
                (unsafe { MemoryRegion::mapped(address, size) }, true)
            }
            None => (MemoryRegion::owned(self.reader.read_bytes(size)?), false),
        };
        if self.trace {
            eprintln!("memory:{{{} bytes at {}}}", size, region.start());
        }

        let type_map = if attributes.has_type_map() {
            Some(self.reader.read_bytes(size)?)
        } else {
            None
        };

        if !in_place {
            relocate_from_canonical(&mut region, &oop_map, parent.as_deref(), attributes);
        }

        let memory = Arc::new(ObjectMemory::new(uri, region, root, parent));
        registry.register(memory.clone());

        if self.trace {
            eprintln!("Loaded object memory from {uri}");
        }

        Ok(ObjectMemoryImage {
            minor,
            major,
            attributes,
            parent_hash,
            parent_uri,
            type_map,
            memory,
        })
    }

    fn read_u16(&mut self, label: &str) -> Result<u16, LoadError> {
        let value = self.reader.read_u16()?;
        if self.trace {
            eprintln!("{label}:{value}");
        }
        Ok(value)
    }

    fn read_u32(&mut self, label: &str) -> Result<u32, LoadError> {
        let value = self.reader.read_u32()?;
        if self.trace {
            eprintln!("{label}:{value}");
        }
        Ok(value)
    }

    fn read_string(&mut self, label: &str) -> String {
        let mut decoder = Decoder::new(ReaderSource {
            reader: &mut self.reader,
        });
        let value = decoder.read_string();
        if self.trace {
            eprintln!("{label}:\"{value}\"");
        }
        value
    }
}

/// Rewrite the region's pointers from canonical to actual addresses.
fn relocate_from_canonical(
    region: &mut MemoryRegion,
    oop_map: &OopMap,
    parent: Option<&ObjectMemory>,
    attributes: Attributes,
) {
    let actual_start = region.start().as_usize();
    let size = region.len();
    let canonical_start = parent.map_or(0, ObjectMemory::canonical_end);

    relocate::relocate(
        region.bytes_mut(),
        oop_map,
        attributes.word_size(),
        attributes.is_big_endian(),
        |value| {
            let c = value as usize;
            if c >= canonical_start && c < canonical_start + size {
                return (c - canonical_start + actual_start) as u64;
            }
            for mem in parent.into_iter().flat_map(ObjectMemory::chain) {
                if mem.canonical_contains(c) {
                    return (c - mem.canonical_start() + mem.start().as_usize()) as u64;
                }
            }
            panic!("canonical pointer {c:#x} outside the object memory chain");
        },
    );
}
