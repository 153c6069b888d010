/// First-fit range tracker over a bounded index space.
///
/// Hands out contiguous runs of units (quads, in the combiner) and takes
/// them back. Live blocks are never moved; freed runs are merged with
/// free neighbours so that a later block can span them.

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Opaque handle to a tracked block
    ///
    /// Generational: once a block is freed its handle never resolves again,
    /// even after a new block reuses the same slot.
    pub struct BlockHandle;
}

/// Physical placement of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    pub start_index: u32,
    pub length: u32,
}

impl BlockLayout {
    pub fn new(start_index: u32, length: u32) -> Self {
        Self { start_index, length }
    }

    /// One past the last unit
    pub fn end(&self) -> u32 {
        self.start_index + self.length
    }
}

/// Free-list allocator for block layouts
pub struct FreeListTracker {
    capacity: u32,
    /// Sorted by start, never adjacent to each other
    free_ranges: Vec<BlockLayout>,
    blocks: SlotMap<BlockHandle, BlockLayout>,
    free_capacity: u32,
}

impl FreeListTracker {
    pub fn new(capacity: u32) -> Self {
        let free_ranges = if capacity > 0 {
            vec![BlockLayout::new(0, capacity)]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            free_ranges,
            blocks: SlotMap::with_key(),
            free_capacity: capacity,
        }
    }

    // ===== QUERIES =====

    /// Whether a block of `size` units would be placed right now
    pub fn can_fit(&self, size: u32) -> bool {
        size > 0 && self.free_ranges.iter().any(|r| r.length >= size)
    }

    /// Current placement of a live block
    pub fn layout_for_block(&self, handle: BlockHandle) -> Option<BlockLayout> {
        self.blocks.get(handle).copied()
    }

    pub fn contains(&self, handle: BlockHandle) -> bool {
        self.blocks.contains_key(handle)
    }

    /// Total units
    pub fn capacity(&self) -> u32 { self.capacity }

    /// Units not held by any block (possibly fragmented)
    pub fn free_capacity(&self) -> u32 { self.free_capacity }

    /// Number of live blocks
    pub fn block_count(&self) -> usize { self.blocks.len() }

    /// Longest contiguous free run
    pub fn largest_free_range(&self) -> u32 {
        self.free_ranges.iter().map(|r| r.length).max().unwrap_or(0)
    }

    /// One past the highest unit held by a live block
    pub fn high_water_mark(&self) -> u32 {
        self.blocks.values().map(|b| b.end()).max().unwrap_or(0)
    }

    // ===== TRACKING =====

    /// Reserve the first free run that fits `size` units
    ///
    /// Returns `None` for zero-sized blocks and when no run is large enough.
    pub fn track_block(&mut self, size: u32) -> Option<BlockHandle> {
        if size == 0 {
            return None;
        }

        let index = self.free_ranges.iter().position(|r| r.length >= size)?;
        let range = &mut self.free_ranges[index];
        let layout = BlockLayout::new(range.start_index, size);
        if range.length == size {
            self.free_ranges.remove(index);
        } else {
            range.start_index += size;
            range.length -= size;
        }

        self.free_capacity -= size;
        Some(self.blocks.insert(layout))
    }

    /// Release a block, returning the run it held
    ///
    /// Unknown or already-freed handles return `None`.
    pub fn free_block(&mut self, handle: BlockHandle) -> Option<BlockLayout> {
        let layout = self.blocks.remove(handle)?;
        self.insert_free_range(layout);
        self.free_capacity += layout.length;
        Some(layout)
    }

    fn insert_free_range(&mut self, freed: BlockLayout) {
        let index = self.free_ranges.partition_point(|r| r.start_index < freed.start_index);

        debug_assert!(index == 0 || self.free_ranges[index - 1].end() <= freed.start_index,
            "freed range overlaps the previous free range");
        debug_assert!(index == self.free_ranges.len() || freed.end() <= self.free_ranges[index].start_index,
            "freed range overlaps the next free range");

        let joins_prev = index > 0 && self.free_ranges[index - 1].end() == freed.start_index;
        let joins_next = index < self.free_ranges.len()
            && freed.end() == self.free_ranges[index].start_index;

        match (joins_prev, joins_next) {
            (true, true) => {
                let next = self.free_ranges.remove(index);
                self.free_ranges[index - 1].length += freed.length + next.length;
            }
            (true, false) => {
                self.free_ranges[index - 1].length += freed.length;
            }
            (false, true) => {
                let next = &mut self.free_ranges[index];
                next.start_index = freed.start_index;
                next.length += freed.length;
            }
            (false, false) => {
                self.free_ranges.insert(index, freed);
            }
        }
    }
}

#[cfg(test)]
#[path = "free_list_tracker_tests.rs"]
mod tests;
