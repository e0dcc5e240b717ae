//! Parsed executable layout

use core_types::MemoryPerms;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Fixed capacity of an [`ExecutableLayout`]
///
/// An image declaring more program headers than this is rejected rather
/// than truncated.
pub const MAX_SEGMENTS: usize = 3;

/// Segment protection bits, as stored in an ELF program header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SegmentFlags(u32);

impl SegmentFlags {
    pub const EXECUTE: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const READ: u32 = 4;

    /// Wraps raw `p_flags` bits; unknown bits are kept
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Read + execute (text)
    pub const fn rx() -> Self {
        Self(Self::READ | Self::EXECUTE)
    }

    /// Read + write (data, bss)
    pub const fn rw() -> Self {
        Self(Self::READ | Self::WRITE)
    }

    pub fn to_memory_perms(&self) -> MemoryPerms {
        MemoryPerms {
            read: self.0 & Self::READ != 0,
            write: self.0 & Self::WRITE != 0,
            execute: self.0 & Self::EXECUTE != 0,
        }
    }
}

impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_memory_perms())
    }
}

/// One loadable segment of an executable
///
/// Bytes `[offset_in_file, offset_in_file + length_in_file)` of the image
/// are copied to `start_address`; the rest of `size_in_memory` is
/// zero-filled by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub offset_in_file: u64,
    pub length_in_file: u64,
    pub start_address: u64,
    pub size_in_memory: u64,
    pub protection: SegmentFlags,
}

impl SegmentDescriptor {
    /// Image bytes backing this segment
    ///
    /// Only meaningful for descriptors produced by the parser, which has
    /// already checked that the range does not overflow.
    pub fn file_range(&self) -> Range<u64> {
        self.offset_in_file..self.offset_in_file + self.length_in_file
    }

    /// Bytes to zero-fill after the file-backed part
    pub fn zero_fill_len(&self) -> u64 {
        self.size_in_memory.saturating_sub(self.length_in_file)
    }
}

/// Entry address plus the ordered segment list of an executable
///
/// Segment order is load order and is never changed after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableLayout {
    entry_address: u64,
    segments: [SegmentDescriptor; MAX_SEGMENTS],
    count: usize,
}

impl ExecutableLayout {
    /// Creates an empty layout
    pub fn new(entry_address: u64) -> Self {
        Self {
            entry_address,
            segments: [SegmentDescriptor::default(); MAX_SEGMENTS],
            count: 0,
        }
    }

    /// Appends a segment, handing it back if the layout is full
    pub fn try_push(&mut self, segment: SegmentDescriptor) -> Result<(), SegmentDescriptor> {
        if self.count == MAX_SEGMENTS {
            return Err(segment);
        }
        self.segments[self.count] = segment;
        self.count += 1;
        Ok(())
    }

    pub fn entry_address(&self) -> u64 {
        self.entry_address
    }

    /// Segments in program-header order
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: u64) -> SegmentDescriptor {
        SegmentDescriptor {
            offset_in_file: 0,
            length_in_file: 0x10,
            start_address: start,
            size_in_memory: 0x20,
            protection: SegmentFlags::rw(),
        }
    }

    #[test]
    fn test_layout_preserves_push_order() {
        let mut layout = ExecutableLayout::new(0x1000);
        layout.try_push(segment(0x3000)).unwrap();
        layout.try_push(segment(0x1000)).unwrap();

        let starts: Vec<u64> = layout.segments().iter().map(|s| s.start_address).collect();
        assert_eq!(starts, vec![0x3000, 0x1000]);
        assert_eq!(layout.entry_address(), 0x1000);
    }

    #[test]
    fn test_layout_rejects_past_capacity() {
        let mut layout = ExecutableLayout::new(0);
        for i in 0..MAX_SEGMENTS {
            layout.try_push(segment(i as u64 * 0x1000)).unwrap();
        }
        let extra = segment(0xdead_0000);
        assert_eq!(layout.try_push(extra), Err(extra));
        assert_eq!(layout.len(), MAX_SEGMENTS);
    }

    #[test]
    fn test_segment_flags_to_perms() {
        assert_eq!(SegmentFlags::rx().to_memory_perms(), MemoryPerms::read_execute());
        assert_eq!(SegmentFlags::rw().to_memory_perms(), MemoryPerms::read_write());
        assert_eq!(format!("{}", SegmentFlags::from_bits(7)), "RWX");
    }

    #[test]
    fn test_segment_zero_fill() {
        let seg = segment(0x1000);
        assert_eq!(seg.file_range(), 0..0x10);
        assert_eq!(seg.zero_fill_len(), 0x10);
    }
}
