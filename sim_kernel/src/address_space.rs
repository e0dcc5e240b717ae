//! Simulated user address spaces
//!
//! Each space is a set of byte-addressable regions backed by host memory.
//! Physical memory is modelled as a page budget: creating a space costs one
//! page for its page directory, and every mapped region costs the pages it
//! spans. Running out of budget is how the simulation produces
//! [`LoadError::OutOfMemory`].
//!
//! ## Design
//!
//! - Regions never overlap within a space
//! - Everything below [`USER_SPACE_END`] is user-accessible
//! - Destroying a space returns all of its pages to the budget

pub use core_types::USER_SPACE_END;

use core_types::{page_align_down, page_align_up, AddressSpaceId, MemoryPerms, PAGE_SIZE};
use kernel_api::LoadError;
use std::collections::HashMap;

/// Pages charged for the page directory of a new space
const DIRECTORY_PAGES: u64 = 1;

/// A mapped region of a user address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    /// Position in load order (segments first, then the stack)
    pub index: usize,
    pub start: u64,
    pub perms: MemoryPerms,
    bytes: Vec<u8>,
}

impl MappedRegion {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn end(&self) -> u64 {
        self.start + self.size()
    }

    pub fn contains(&self, address: u64, len: u64) -> bool {
        address >= self.start
            && address
                .checked_add(len)
                .map_or(false, |end| end <= self.end())
    }

    fn overlaps(&self, start: u64, size: u64) -> bool {
        start < self.end() && self.start < start + size
    }

    fn pages(&self) -> u64 {
        pages_spanned(self.start, self.size())
    }
}

/// A simulated user address space
#[derive(Debug, Clone)]
pub struct AddressSpace {
    pub space_id: AddressSpaceId,
    regions: Vec<MappedRegion>,
}

impl AddressSpace {
    fn new() -> Self {
        Self {
            space_id: AddressSpaceId::new(),
            regions: Vec::new(),
        }
    }

    /// Regions in mapping order
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    /// Finds the region holding `address`
    pub fn find_region(&self, address: u64) -> Option<&MappedRegion> {
        self.regions.iter().find(|r| r.contains(address, 1))
    }

    /// Reads user memory; `None` unless the whole range lies in one region
    pub fn read(&self, address: u64, len: u64) -> Option<&[u8]> {
        let region = self.regions.iter().find(|r| r.contains(address, len))?;
        let offset = (address - region.start) as usize;
        region.bytes.get(offset..offset + len as usize)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> bool {
        let len = data.len() as u64;
        let Some(region) = self.regions.iter_mut().find(|r| r.contains(address, len)) else {
            return false;
        };
        let offset = (address - region.start) as usize;
        region.bytes[offset..offset + data.len()].copy_from_slice(data);
        true
    }

    /// Pages held by this space, page directory included
    pub fn pages(&self) -> u64 {
        DIRECTORY_PAGES + self.regions.iter().map(MappedRegion::pages).sum::<u64>()
    }
}

/// Address space events for auditing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpaceEvent {
    /// Address space created
    SpaceCreated { space_id: AddressSpaceId },
    /// Region mapped into a space
    RegionMapped {
        space_id: AddressSpaceId,
        index: usize,
        start: u64,
        size_bytes: u64,
        permissions: MemoryPerms,
    },
    /// Mapping refused
    MappingFailed {
        space_id: AddressSpaceId,
        error: LoadError,
    },
    /// Address space destroyed
    SpaceDestroyed {
        space_id: AddressSpaceId,
        pages_freed: u64,
    },
}

/// Audit log for address space operations
#[derive(Debug, Clone)]
pub struct AddressSpaceAuditLog {
    events: Vec<AddressSpaceEvent>,
}

impl AddressSpaceAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Records an event
    pub fn record(&mut self, event: AddressSpaceEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[AddressSpaceEvent] {
        &self.events
    }

    /// Clears all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&AddressSpaceEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&AddressSpaceEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

impl Default for AddressSpaceAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Address space manager for the simulated kernel
pub struct AddressSpaceManager {
    spaces: HashMap<AddressSpaceId, AddressSpace>,
    /// Total pages available, `None` for unlimited
    page_budget: Option<u64>,
    pages_in_use: u64,
    audit_log: AddressSpaceAuditLog,
}

impl AddressSpaceManager {
    /// Creates a manager with unlimited memory
    pub fn new() -> Self {
        Self {
            spaces: HashMap::new(),
            page_budget: None,
            pages_in_use: 0,
            audit_log: AddressSpaceAuditLog::new(),
        }
    }

    /// Creates a manager that can hand out at most `pages` pages
    pub fn with_page_budget(pages: u64) -> Self {
        Self {
            page_budget: Some(pages),
            ..Self::new()
        }
    }

    pub fn set_page_budget(&mut self, pages: Option<u64>) {
        self.page_budget = pages;
    }

    pub fn pages_in_use(&self) -> u64 {
        self.pages_in_use
    }

    /// Creates an empty address space
    pub fn create_address_space(&mut self) -> Result<AddressSpaceId, LoadError> {
        self.charge(DIRECTORY_PAGES)?;

        let space = AddressSpace::new();
        let space_id = space.space_id;
        self.spaces.insert(space_id, space);
        self.audit_log
            .record(AddressSpaceEvent::SpaceCreated { space_id });

        Ok(space_id)
    }

    /// Maps a zero-filled region of `size` bytes at `start`
    pub fn map_region(
        &mut self,
        space_id: AddressSpaceId,
        index: usize,
        start: u64,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<(), LoadError> {
        let result = self.try_map_region(space_id, index, start, size, perms);
        match &result {
            Ok(()) => self.audit_log.record(AddressSpaceEvent::RegionMapped {
                space_id,
                index,
                start,
                size_bytes: size,
                permissions: perms,
            }),
            Err(error) => self.audit_log.record(AddressSpaceEvent::MappingFailed {
                space_id,
                error: error.clone(),
            }),
        }
        result
    }

    fn try_map_region(
        &mut self,
        space_id: AddressSpaceId,
        index: usize,
        start: u64,
        size: u64,
        perms: MemoryPerms,
    ) -> Result<(), LoadError> {
        let out_of_range = LoadError::SegmentOutOfRange { index, start, size };
        let end = start.checked_add(size).ok_or(out_of_range.clone())?;
        if end > USER_SPACE_END {
            return Err(out_of_range);
        }

        let space = self.spaces.get(&space_id).ok_or(LoadError::OutOfMemory)?;
        if let Some(existing) = space.regions.iter().find(|r| r.overlaps(start, size)) {
            return Err(LoadError::OverlappingSegments {
                first: existing.index,
                second: index,
            });
        }

        self.charge(pages_spanned(start, size))?;

        let region = MappedRegion {
            index,
            start,
            perms,
            bytes: vec![0; size as usize],
        };
        if let Some(space) = self.spaces.get_mut(&space_id) {
            space.regions.push(region);
        }
        Ok(())
    }

    /// Copies `data` into mapped memory; false if the range is not mapped
    pub fn write(&mut self, space_id: AddressSpaceId, address: u64, data: &[u8]) -> bool {
        self.spaces
            .get_mut(&space_id)
            .map_or(false, |space| space.write(address, data))
    }

    pub fn space(&self, space_id: AddressSpaceId) -> Option<&AddressSpace> {
        self.spaces.get(&space_id)
    }

    pub fn live_spaces(&self) -> usize {
        self.spaces.len()
    }

    /// Destroys a space and returns its pages to the budget
    ///
    /// Returns the number of pages freed, or `None` for an unknown space.
    pub fn destroy_address_space(&mut self, space_id: AddressSpaceId) -> Option<u64> {
        let space = self.spaces.remove(&space_id)?;
        let pages_freed = space.pages();
        self.pages_in_use -= pages_freed;

        self.audit_log.record(AddressSpaceEvent::SpaceDestroyed {
            space_id,
            pages_freed,
        });

        Some(pages_freed)
    }

    /// Returns the audit log (test-only)
    pub fn audit_log(&self) -> &AddressSpaceAuditLog {
        &self.audit_log
    }

    /// Clears the audit log (test-only)
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    fn charge(&mut self, pages: u64) -> Result<(), LoadError> {
        let wanted = self.pages_in_use + pages;
        if matches!(self.page_budget, Some(budget) if wanted > budget) {
            return Err(LoadError::OutOfMemory);
        }
        self.pages_in_use = wanted;
        Ok(())
    }
}

impl Default for AddressSpaceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn pages_spanned(start: u64, size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    let first = page_align_down(start);
    let last = page_align_up(start + size).unwrap_or(u64::MAX);
    (last - first) / PAGE_SIZE
}
