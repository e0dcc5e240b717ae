//! Simulated program loader
//!
//! Builds a process context out of a parsed executable: one address space,
//! each segment mapped and filled in load order, then a user stack with the
//! argument block at its top. Any failure part way through tears down what
//! was built so far before the error is returned.

use crate::address_space::{AddressSpaceManager, USER_SPACE_END};
use core_types::{AddressSpaceId, ContextId, MemoryPerms};
use kernel_api::{ContextDestroyer, ExecutableLayout, LoadError, ProcessContext, ProgramLoader};
use std::collections::HashSet;
use user_process::config::argument_block_size;
use user_process::UserModeConfig;

/// Top of the user stack in every address space
pub const USER_STACK_TOP: u64 = USER_SPACE_END;

/// Loader backed by an [`AddressSpaceManager`]
pub struct SimLoader {
    spaces: AddressSpaceManager,
    user_stack_size: u64,
    max_command_line: usize,
    live_contexts: HashSet<ContextId>,
}

impl SimLoader {
    pub fn new(config: &UserModeConfig) -> Self {
        Self::with_spaces(config, AddressSpaceManager::new())
    }

    pub fn with_spaces(config: &UserModeConfig, spaces: AddressSpaceManager) -> Self {
        Self {
            spaces,
            user_stack_size: config.user_stack_size,
            max_command_line: config.max_command_line,
            live_contexts: HashSet::new(),
        }
    }

    pub fn spaces(&self) -> &AddressSpaceManager {
        &self.spaces
    }

    pub fn spaces_mut(&mut self) -> &mut AddressSpaceManager {
        &mut self.spaces
    }

    /// Contexts created and not yet destroyed
    pub fn live_contexts(&self) -> usize {
        self.live_contexts.len()
    }

    pub fn is_live(&self, context: ContextId) -> bool {
        self.live_contexts.contains(&context)
    }

    fn populate(
        &mut self,
        space_id: AddressSpaceId,
        image: &[u8],
        layout: &ExecutableLayout,
        command_line: &str,
    ) -> Result<(u64, u64), LoadError> {
        for (index, segment) in layout.segments().iter().enumerate() {
            if segment.size_in_memory == 0 {
                continue;
            }
            self.spaces.map_region(
                space_id,
                index,
                segment.start_address,
                segment.size_in_memory,
                segment.protection.to_memory_perms(),
            )?;

            let out_of_range = LoadError::SegmentOutOfRange {
                index,
                start: segment.start_address,
                size: segment.size_in_memory,
            };
            let range = segment.file_range();
            let data = image
                .get(range.start as usize..range.end as usize)
                .ok_or(out_of_range.clone())?;
            if !self.spaces.write(space_id, segment.start_address, data) {
                return Err(out_of_range);
            }
        }

        let stack_base = USER_STACK_TOP
            .checked_sub(self.user_stack_size)
            .ok_or(LoadError::OutOfMemory)?;
        self.spaces.map_region(
            space_id,
            layout.len(),
            stack_base,
            self.user_stack_size,
            MemoryPerms::read_write(),
        )?;

        // NUL-terminated command line at the very top of the stack; the
        // initial stack pointer sits just below it.
        let too_large = LoadError::ArgumentsTooLarge {
            len: command_line.len(),
            max: self.max_command_line,
        };
        let argument_block = argument_block_size(command_line.len())
            .and_then(|size| USER_STACK_TOP.checked_sub(size))
            .filter(|address| *address >= stack_base)
            .ok_or(too_large.clone())?;
        let mut block = command_line.as_bytes().to_vec();
        block.push(0);
        if !self.spaces.write(space_id, argument_block, &block) {
            return Err(too_large);
        }

        Ok((argument_block, argument_block))
    }
}

impl ProgramLoader for SimLoader {
    fn load_user_program(
        &mut self,
        image: &[u8],
        layout: &ExecutableLayout,
        command_line: &str,
    ) -> Result<ProcessContext, LoadError> {
        if command_line.len() > self.max_command_line {
            return Err(LoadError::ArgumentsTooLarge {
                len: command_line.len(),
                max: self.max_command_line,
            });
        }

        let space_id = self.spaces.create_address_space()?;
        let (stack_pointer, argument_block) =
            match self.populate(space_id, image, layout, command_line) {
                Ok(addresses) => addresses,
                Err(err) => {
                    self.spaces.destroy_address_space(space_id);
                    log::debug!("load failed, released {}: {}", space_id, err);
                    return Err(err);
                }
            };

        let context = ProcessContext::new(
            space_id,
            layout.entry_address(),
            stack_pointer,
            argument_block,
            command_line.to_string(),
        );
        self.live_contexts.insert(context.id());
        log::debug!(
            "loaded context {} in {} ({} pages in use)",
            context.id(),
            space_id,
            self.spaces.pages_in_use()
        );

        Ok(context)
    }
}

impl ContextDestroyer for SimLoader {
    fn destroy_context(&mut self, context: ProcessContext) {
        assert!(
            self.live_contexts.remove(&context.id()),
            "context {} destroyed twice",
            context.id()
        );
        let freed = self.spaces.destroy_address_space(context.address_space());
        log::debug!(
            "destroyed context {}, freed {} pages",
            context.id(),
            freed.unwrap_or(0)
        );
    }
}
