//! Address arithmetic over the configured region.
//!
//! A block starts with one brand word, followed by `entries_per_block` slots
//! of (mark word, payload) pairs. All functions are pure; the only state is
//! the validated configuration.

use embedded_nor::{BlockIndex, ByteAddress, PageIndex};

use crate::Config;

/// Validated layout of one instance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    page_size: u32,
    word_size: u32,
    start_page: u32,
    pages_per_block: u32,
    block_count: u16,
    element_size: u32,
}

impl Layout {
    /// Validate a configuration and capture it. `None` when the configuration
    /// is rejected: fewer than two blocks, zero geometry, an unsupported word
    /// size, or no room for a single slot per block.
    pub fn new(config: &Config) -> Option<Self> {
        if !config.is_valid() {
            return None;
        }
        let layout = Layout {
            page_size: config.page_size,
            word_size: config.word_size,
            start_page: config.start_page,
            pages_per_block: config.pages_per_block,
            block_count: config.block_count,
            element_size: config.element_size,
        };
        // the whole region must be addressable without overflowing u32
        let block_size = config.page_size.checked_mul(config.pages_per_block)?;
        let region = block_size.checked_mul(config.block_count as u32)?;
        let start = config.start_page.checked_mul(config.page_size)?;
        start.checked_add(region)?;
        if layout.entries_per_block() == 0 {
            return None;
        }
        Some(layout)
    }

    pub fn word_size(&self) -> usize {
        self.word_size as usize
    }

    pub fn element_size(&self) -> usize {
        self.element_size as usize
    }

    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    pub fn pages_per_block(&self) -> u32 {
        self.pages_per_block
    }

    pub fn block_size(&self) -> u32 {
        self.page_size * self.pages_per_block
    }

    /// Slots that fit in one block after the brand word.
    pub fn entries_per_block(&self) -> u32 {
        (self.block_size() - self.word_size) / (self.word_size + self.element_size)
    }

    /// First byte of the region.
    pub fn start_address(&self) -> ByteAddress {
        ByteAddress::new(self.start_page * self.page_size)
    }

    /// One past the last byte of the region.
    pub fn end_address(&self) -> ByteAddress {
        self.start_address() + self.block_count as u32 * self.block_size()
    }

    /// First byte of the given block.
    pub fn block_address(&self, block: BlockIndex) -> ByteAddress {
        self.start_address() + block.as_u16() as u32 * self.block_size()
    }

    /// The brand word sits at the very start of a block.
    pub fn brand_address(&self, block: BlockIndex) -> ByteAddress {
        self.block_address(block)
    }

    /// Mark word of slot `id`: the brand word, then `id` whole slots.
    pub fn mark_address(&self, block: BlockIndex, id: u32) -> ByteAddress {
        self.block_address(block) + self.word_size + id * (self.word_size + self.element_size)
    }

    /// Payload bytes of slot `id`, directly after its mark.
    pub fn entry_address(&self, block: BlockIndex, id: u32) -> ByteAddress {
        self.mark_address(block, id) + self.word_size
    }

    /// Device page `page` within the given block.
    pub fn block_page(&self, block: BlockIndex, page: u32) -> PageIndex {
        PageIndex::new(self.start_page) + block.as_page_index(self.pages_per_block).as_u32() + page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            page_size: 128,
            word_size: 2,
            start_page: 0,
            pages_per_block: 1,
            block_count: 2,
            element_size: 40,
        }
    }

    #[test]
    fn example_geometry() {
        let layout = Layout::new(&config()).unwrap();
        assert_eq!(layout.entries_per_block(), 3);
        assert_eq!(layout.block_size(), 128);
        assert_eq!(layout.end_address().as_u32(), 256);

        let b0 = BlockIndex::new(0);
        let b1 = BlockIndex::new(1);
        assert_eq!(layout.brand_address(b0).as_u32(), 0);
        assert_eq!(layout.mark_address(b0, 0).as_u32(), 2);
        assert_eq!(layout.entry_address(b0, 0).as_u32(), 4);
        assert_eq!(layout.mark_address(b0, 1).as_u32(), 44);
        assert_eq!(layout.entry_address(b0, 2).as_u32(), 88);
        // the last slot ends exactly at the block boundary
        assert_eq!((layout.entry_address(b0, 2) + 40).as_u32(), 128);
        assert_eq!(layout.brand_address(b1).as_u32(), 128);
        assert_eq!(layout.block_page(b1, 0).as_u32(), 1);
    }

    #[test]
    fn start_page_offsets_the_region() {
        let layout = Layout::new(&Config {
            start_page: 3,
            ..config()
        })
        .unwrap();
        assert_eq!(layout.start_address().as_u32(), 3 * 128);
        assert_eq!(layout.brand_address(BlockIndex::new(1)).as_u32(), 3 * 128 + 128);
        assert_eq!(layout.block_page(BlockIndex::new(1), 0).as_u32(), 4);
    }

    #[test]
    fn rejects_bad_configurations() {
        for bad in [
            Config {
                block_count: 1,
                ..config()
            },
            Config {
                page_size: 0,
                ..config()
            },
            Config {
                pages_per_block: 0,
                ..config()
            },
            Config {
                word_size: 3,
                ..config()
            },
            Config {
                word_size: 0,
                ..config()
            },
            Config {
                element_size: 0,
                ..config()
            },
            Config {
                element_size: crate::MAX_ELEMENT_SIZE as u32 + 1,
                ..config()
            },
            Config {
                page_size: 129,
                ..config()
            },
            // no room for a single slot
            Config {
                page_size: 32,
                element_size: 31,
                ..config()
            },
        ] {
            assert!(Layout::new(&bad).is_none(), "{:?}", bad);
        }
    }
}
