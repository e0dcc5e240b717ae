//! Executable image parsing.
//!
//! Turns the raw bytes of an ELF32 little-endian executable into an
//! [`ExecutableLayout`]: the entry address plus one [`SegmentDescriptor`] per
//! program header, in table order.
//!
//! The image is untrusted. Every offset and count taken from it is checked
//! against the image length and the layout capacity before it is used, and
//! all arithmetic on header values is overflow-checked.
//!
//! ## Format
//!
//! File header (52 bytes):
//! - `e_ident`: magic `\x7fELF`, class (1 = 32-bit), data (1 = little-endian)
//! - `e_entry` at 24, `e_phoff` at 28 (u32)
//! - `e_phentsize` at 42, `e_phnum` at 44 (u16)
//!
//! Program header (at least 32 bytes each):
//! - `p_offset` at 4, `p_vaddr` at 8, `p_filesz` at 16, `p_memsz` at 20,
//!   `p_flags` at 24 (u32)

use crate::config::UserModeConfig;
use kernel_api::{ExecutableLayout, SegmentDescriptor, SegmentFlags, MAX_SEGMENTS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ELF magic number: "\x7fELF"
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Size of the ELF32 file header
pub const ELF32_HEADER_SIZE: usize = 52;

/// Minimum size of one ELF32 program header
pub const ELF32_PHDR_SIZE: usize = 32;

const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const PT_LOAD: u32 = 1;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const E_ENTRY: usize = 24;
const E_PHOFF: usize = 28;
const E_PHENTSIZE: usize = 42;
const E_PHNUM: usize = 44;

const P_TYPE: usize = 0;
const P_OFFSET: usize = 4;
const P_VADDR: usize = 8;
const P_FILESZ: usize = 16;
const P_MEMSZ: usize = 20;
const P_FLAGS: usize = 24;

/// Errors that can occur while parsing an executable
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseError {
    /// Header fields are inconsistent or not an ELF32 little-endian image
    #[error("Malformed executable header: {0}")]
    MalformedHeader(String),

    /// Header or segment data extends past the end of the image
    #[error("Truncated image: need {needed} bytes, have {available}")]
    TruncatedImage { needed: u64, available: u64 },

    /// More program headers than the layout can hold
    #[error("Too many segments: {count} declared, capacity is {capacity}")]
    TooManySegments { count: usize, capacity: usize },

    /// Entry address violates the instruction-set alignment
    #[error("Entry address {entry:#x} is not {alignment}-byte aligned")]
    UnalignedEntry { entry: u64, alignment: u64 },
}

/// Executable parser
///
/// Pure: no I/O, no side effects beyond the returned value.
#[derive(Debug, Clone)]
pub struct ExecutableParser {
    entry_alignment: u64,
}

impl ExecutableParser {
    pub fn new() -> Self {
        Self::with_config(&UserModeConfig::default())
    }

    /// # Panics
    ///
    /// If `config.entry_alignment` is not a power of two.
    pub fn with_config(config: &UserModeConfig) -> Self {
        assert!(
            config.entry_alignment.is_power_of_two(),
            "entry alignment {} is not a power of two",
            config.entry_alignment
        );
        Self {
            entry_alignment: config.entry_alignment,
        }
    }

    /// Parses an executable image into its layout
    pub fn parse(&self, image: &[u8]) -> Result<ExecutableLayout, ParseError> {
        let available = image.len() as u64;

        if image.len() < ELF32_HEADER_SIZE {
            return Err(ParseError::TruncatedImage {
                needed: ELF32_HEADER_SIZE as u64,
                available,
            });
        }

        if image[..4] != ELF_MAGIC {
            return Err(ParseError::MalformedHeader(format!(
                "bad magic {:02x?}",
                &image[..4]
            )));
        }
        if image[EI_CLASS] != ELFCLASS32 {
            return Err(ParseError::MalformedHeader(format!(
                "unsupported class {}",
                image[EI_CLASS]
            )));
        }
        if image[EI_DATA] != ELFDATA2LSB {
            return Err(ParseError::MalformedHeader(format!(
                "unsupported data encoding {}",
                image[EI_DATA]
            )));
        }

        let header = FileHeader::read(image)?;

        if (header.phentsize as usize) < ELF32_PHDR_SIZE {
            return Err(ParseError::MalformedHeader(format!(
                "program header entry size {} is below {}",
                header.phentsize, ELF32_PHDR_SIZE
            )));
        }

        // Capacity first: an oversized count must never reach the copy loop.
        let count = header.phnum as usize;
        if count > MAX_SEGMENTS {
            return Err(ParseError::TooManySegments {
                count,
                capacity: MAX_SEGMENTS,
            });
        }

        let table_end = (header.phnum as u64)
            .checked_mul(header.phentsize as u64)
            .and_then(|size| size.checked_add(header.phoff))
            .unwrap_or(u64::MAX);
        if table_end > available {
            return Err(ParseError::TruncatedImage {
                needed: table_end,
                available,
            });
        }

        if header.entry % self.entry_alignment != 0 {
            return Err(ParseError::UnalignedEntry {
                entry: header.entry,
                alignment: self.entry_alignment,
            });
        }

        let mut layout = ExecutableLayout::new(header.entry);
        for index in 0..count {
            // In range: index < phnum and the whole table fits in the image.
            let start = header.phoff as usize + index * header.phentsize as usize;
            let entry = &image[start..start + ELF32_PHDR_SIZE];
            let segment = ProgramHeader::read(entry)?.validate(index, available)?;

            if layout.try_push(segment).is_err() {
                return Err(ParseError::TooManySegments {
                    count,
                    capacity: MAX_SEGMENTS,
                });
            }
        }

        log::debug!(
            "parsed executable: entry={:#x}, {} segment(s), {} bytes",
            layout.entry_address(),
            layout.len(),
            available
        );

        Ok(layout)
    }
}

impl Default for ExecutableParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses an executable with the default configuration
pub fn parse_executable(image: &[u8]) -> Result<ExecutableLayout, ParseError> {
    ExecutableParser::new().parse(image)
}

struct FileHeader {
    entry: u64,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
}

impl FileHeader {
    fn read(image: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            entry: read_u32(image, E_ENTRY)? as u64,
            phoff: read_u32(image, E_PHOFF)? as u64,
            phentsize: read_u16(image, E_PHENTSIZE)?,
            phnum: read_u16(image, E_PHNUM)?,
        })
    }
}

struct ProgramHeader {
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
    flags: u32,
}

impl ProgramHeader {
    fn read(entry: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            offset: read_u32(entry, P_OFFSET)? as u64,
            vaddr: read_u32(entry, P_VADDR)? as u64,
            filesz: read_u32(entry, P_FILESZ)? as u64,
            memsz: read_u32(entry, P_MEMSZ)? as u64,
            flags: read_u32(entry, P_FLAGS)?,
        })
    }

    fn validate(self, index: usize, available: u64) -> Result<SegmentDescriptor, ParseError> {
        let end = self.offset.checked_add(self.filesz).unwrap_or(u64::MAX);
        if end > available {
            return Err(ParseError::TruncatedImage {
                needed: end,
                available,
            });
        }

        if self.filesz > self.memsz {
            return Err(ParseError::MalformedHeader(format!(
                "segment {} has file size {:#x} larger than memory size {:#x}",
                index, self.filesz, self.memsz
            )));
        }

        Ok(SegmentDescriptor {
            offset_in_file: self.offset,
            length_in_file: self.filesz,
            start_address: self.vaddr,
            size_in_memory: self.memsz,
            protection: SegmentFlags::from_bits(self.flags),
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    data.get(offset..offset + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or(ParseError::TruncatedImage {
            needed: (offset + 2) as u64,
            available: data.len() as u64,
        })
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ParseError::TruncatedImage {
            needed: (offset + 4) as u64,
            available: data.len() as u64,
        })
}

/// Builds ELF32 images for tests and the simulated filesystem
///
/// Segments are written exactly where they are declared; the program-header
/// table goes after the last segment unless placed explicitly. Header fields
/// can be overridden to produce deliberately broken images.
#[derive(Debug, Clone)]
pub struct ElfImageBuilder {
    entry: u64,
    segments: Vec<BuiltSegment>,
    phoff: Option<u64>,
    phnum: Option<u16>,
    phentsize: u16,
    magic: [u8; 4],
    class: u8,
}

#[derive(Debug, Clone)]
struct BuiltSegment {
    offset: u64,
    data: Vec<u8>,
    vaddr: u64,
    memsz: u64,
    flags: SegmentFlags,
}

impl ElfImageBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            segments: Vec::new(),
            phoff: None,
            phnum: None,
            phentsize: ELF32_PHDR_SIZE as u16,
            magic: ELF_MAGIC,
            class: ELFCLASS32,
        }
    }

    /// Adds a segment at an explicit file offset, filled with a byte pattern
    pub fn segment(
        self,
        offset: u64,
        length_in_file: u64,
        vaddr: u64,
        size_in_memory: u64,
        flags: SegmentFlags,
    ) -> Self {
        let data = (0..length_in_file)
            .map(|i| (offset.wrapping_add(i) % 251) as u8)
            .collect();
        self.segment_at(offset, data, vaddr, size_in_memory, flags)
    }

    /// Adds a segment holding `data`, placed after everything written so far
    pub fn segment_with_data(
        self,
        data: Vec<u8>,
        vaddr: u64,
        size_in_memory: u64,
        flags: SegmentFlags,
    ) -> Self {
        let offset = align4(self.data_end());
        self.segment_at(offset, data, vaddr, size_in_memory, flags)
    }

    fn segment_at(
        mut self,
        offset: u64,
        data: Vec<u8>,
        vaddr: u64,
        memsz: u64,
        flags: SegmentFlags,
    ) -> Self {
        self.segments.push(BuiltSegment {
            offset,
            data,
            vaddr,
            memsz,
            flags,
        });
        self
    }

    /// Places the program-header table at `offset`
    pub fn program_header_offset(mut self, offset: u64) -> Self {
        self.phoff = Some(offset);
        self
    }

    /// Declares `count` program headers regardless of how many were added
    pub fn declared_segment_count(mut self, count: u16) -> Self {
        self.phnum = Some(count);
        self
    }

    pub fn program_header_size(mut self, size: u16) -> Self {
        self.phentsize = size;
        self
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    pub fn class(mut self, class: u8) -> Self {
        self.class = class;
        self
    }

    fn data_end(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.offset + s.data.len() as u64)
            .max()
            .unwrap_or(0)
            .max(ELF32_HEADER_SIZE as u64)
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = self.phoff.unwrap_or_else(|| align4(self.data_end()));
        let phentsize = self.phentsize as u64;
        let table_end = phoff + phentsize * self.segments.len() as u64;
        let len = table_end.max(self.data_end()) as usize;

        let mut image = vec![0u8; len];
        image[..4].copy_from_slice(&self.magic);
        image[EI_CLASS] = self.class;
        image[EI_DATA] = ELFDATA2LSB;
        image[6] = 1; // EI_VERSION
        put_u16(&mut image, 16, 2); // ET_EXEC
        put_u16(&mut image, 18, 3); // EM_386
        put_u32(&mut image, 20, 1);
        put_u32(&mut image, E_ENTRY, self.entry as u32);
        put_u32(&mut image, E_PHOFF, phoff as u32);
        put_u16(&mut image, 40, ELF32_HEADER_SIZE as u16);
        put_u16(&mut image, E_PHENTSIZE, self.phentsize);
        let phnum = self.phnum.unwrap_or(self.segments.len() as u16);
        put_u16(&mut image, E_PHNUM, phnum);

        for segment in &self.segments {
            let start = segment.offset as usize;
            image[start..start + segment.data.len()].copy_from_slice(&segment.data);
        }

        for (index, segment) in self.segments.iter().enumerate() {
            let base = (phoff + index as u64 * phentsize) as usize;
            put_u32(&mut image, base + P_TYPE, PT_LOAD);
            put_u32(&mut image, base + P_OFFSET, segment.offset as u32);
            put_u32(&mut image, base + P_VADDR, segment.vaddr as u32);
            put_u32(&mut image, base + 12, segment.vaddr as u32);
            put_u32(&mut image, base + P_FILESZ, segment.data.len() as u32);
            put_u32(&mut image, base + P_MEMSZ, segment.memsz as u32);
            put_u32(&mut image, base + P_FLAGS, segment.flags.bits());
            put_u32(&mut image, base + 28, 4);
        }

        image
    }
}

fn align4(value: u64) -> u64 {
    (value + 3) & !3
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
