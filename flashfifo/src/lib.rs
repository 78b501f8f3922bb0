#![no_std]

mod fmt;

mod adapter;
mod config;
mod layout;

pub use config::Config;

use core::fmt::Debug;

use embedded_nor::{BlockIndex, NorFlash, NorFlashError, NorFlashErrorKind};
use layout::Layout;
use thiserror::Error;

/// Largest supported programming word, in bytes.
pub const MAX_WORD_SIZE: usize = 4;

/// Largest supported record payload, in bytes. Bounds the instance-owned
/// scratch buffer; the engine never allocates.
pub const MAX_ELEMENT_SIZE: usize = 128;

/// Brand byte of the active block. A block whose first word is made of this
/// byte receives all writes; any other first word, in particular the erased
/// pattern, marks the block inactive.
const BRAND_BYTE: u8 = 0x00;

#[derive(Debug, Error)]
pub enum Error<F: NorFlash> {
    /// The memory capability reported a failure. The in-memory queue state is
    /// left untouched; the medium stays recoverable.
    #[error("flash operation failed")]
    Flash(F::Error),
    /// The configuration was rejected, or does not fit the device.
    #[error("invalid instance configuration")]
    InvalidConfig,
    /// Nothing left to read or mark.
    #[error("no unread entries")]
    Empty,
    /// The active block is at capacity. Never returned by
    /// [`FlashFifo::write_entry`], which rotates instead; kept for callers
    /// that treat [`FlashFifo::is_full`] as an error.
    #[error("active block is full")]
    Full,
    /// The entry buffer does not match the configured element size.
    #[error("buffer does not fit the configured element size")]
    BufferSize,
}

impl<F> NorFlashError for Error<F>
where
    F: NorFlash + Debug,
{
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::Flash(e) => e.kind(),
            Error::InvalidConfig => NorFlashErrorKind::Other,
            Error::Empty => NorFlashErrorKind::Other,
            Error::Full => NorFlashErrorKind::Other,
            Error::BufferSize => NorFlashErrorKind::Other,
        }
    }
}

/// Read cursor over the active block, independent of the writer.
///
/// Created by [`FlashFifo::reader`] at the current head. Reading advances the
/// cursor but consumes nothing, and slots already consumed by
/// [`FlashFifo::mark_entry`] after the cursor was created are still returned
/// in written order. A block rotation renumbers slots and silently
/// invalidates every existing cursor; create a fresh one after any write
/// that may have rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reader {
    id: u32,
}

/// Persistent bounded FIFO of fixed-size records on NOR flash.
///
/// The configured region is divided into blocks rotated round-robin. The
/// block whose first word equals the brand pattern is the active block; it
/// holds `size` slots of (mark word, payload) pairs after the brand. A slot
/// is written once, then consumed by programming its mark word. When the
/// active block fills up, unconsumed slots migrate to the next block, the
/// next block is branded and the old one erased.
///
/// State is reconstructed from the raw medium on [`FlashFifo::init`], so the
/// queue survives power loss without a separate metadata region: `head` is
/// the first unmarked slot, `tail` the first empty one.
#[derive(Debug)]
pub struct FlashFifo<F> {
    flash: F,
    layout: Layout,
    /// Block currently receiving writes.
    active_block: BlockIndex,
    /// First unconsumed slot.
    head: u32,
    /// First empty slot, i.e. slots written into the active block so far.
    tail: u32,
    /// Slot capacity of one block.
    size: u32,
    scratch: [u8; MAX_WORD_SIZE + MAX_ELEMENT_SIZE],
}

impl<F> FlashFifo<F>
where
    F: NorFlash,
{
    /// Bind a flash device and recover the queue stored in the configured
    /// region.
    ///
    /// Recovery performs no writes when the region holds exactly one active
    /// block. A region with none (first use) or several (corrupted by a
    /// power cut between re-branding and erasing) is reformatted: every page
    /// is erased and block 0 branded, explicitly dropping whatever the
    /// region held.
    pub fn init(flash: F, config: &Config) -> Result<Self, Error<F>> {
        let layout = Layout::new(config).ok_or(Error::InvalidConfig)?;
        let mut fifo = FlashFifo {
            flash,
            layout,
            active_block: BlockIndex::new(0),
            head: 0,
            tail: 0,
            size: layout.entries_per_block(),
            scratch: [0; MAX_WORD_SIZE + MAX_ELEMENT_SIZE],
        };
        if fifo.layout.end_address().as_u32() > fifo.flash.capacity() {
            return Err(Error::InvalidConfig);
        }
        info!(
            "fifo region: {} blocks of {} bytes, {} slots per block",
            config.block_count,
            fifo.layout.block_size(),
            fifo.size
        );

        let (branded, last) = fifo.scan_branded_blocks().map_err(Error::Flash)?;
        match branded {
            1 => fifo.active_block = last,
            0 => {
                info!("no active block, formatting region");
                fifo.format().map_err(Error::Flash)?;
            }
            n => {
                warn!("{} blocks branded active, reformatting, entries are lost", n);
                fifo.format().map_err(Error::Flash)?;
            }
        }

        fifo.head = fifo.find_head().map_err(Error::Flash)?;
        fifo.tail = fifo.find_tail(fifo.head).map_err(Error::Flash)?;
        debug!(
            "recovered block {}: head {} tail {}",
            fifo.active_block.as_u16(),
            fifo.head,
            fifo.tail
        );
        Ok(fifo)
    }

    /// Hand the flash device back.
    pub fn release(self) -> F {
        self.flash
    }

    /// Shared access to the underlying device, e.g. for diagnostics.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// A fresh cursor at the oldest unconsumed entry.
    pub fn reader(&self) -> Reader {
        Reader { id: self.head }
    }

    /// No unconsumed entries.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// The active block has no empty slot left. Advisory: the next
    /// [`FlashFifo::write_entry`] still succeeds by rotating first.
    pub fn is_full(&self) -> bool {
        self.tail == self.size
    }

    /// Unconsumed entries in the active block.
    pub fn len(&self) -> u32 {
        self.tail - self.head
    }

    /// Slot capacity of one block.
    pub fn capacity(&self) -> u32 {
        self.size
    }

    /// Copy the entry under the cursor into `buffer` and advance the cursor.
    ///
    /// `buffer` must hold at least one element. Fails with [`Error::Empty`]
    /// once the cursor has passed the last written slot.
    pub fn read_entry(
        &mut self,
        reader: &mut Reader,
        buffer: &mut [u8],
    ) -> Result<(), Error<F>> {
        let len = self.layout.element_size();
        if buffer.len() < len {
            return Err(Error::BufferSize);
        }
        if reader.id >= self.tail {
            return Err(Error::Empty);
        }
        let offset = self.layout.entry_address(self.active_block, reader.id);
        self.flash
            .read(offset.as_u32(), &mut buffer[..len])
            .map_err(Error::Flash)?;
        reader.id += 1;
        Ok(())
    }

    /// Append one entry. `entry` must be exactly one element.
    ///
    /// The payload is programmed into the first empty slot; its mark stays
    /// erased, which is what makes the slot live. Filling the last slot
    /// triggers a rotation before returning, so the queue is always ready
    /// for the next write.
    pub fn write_entry(&mut self, entry: &[u8]) -> Result<(), Error<F>> {
        if entry.len() != self.layout.element_size() {
            return Err(Error::BufferSize);
        }
        // only reachable by recovering a region that filled up right before
        // losing power; rotate to make room before touching the medium
        if self.tail == self.size {
            self.clean_up().map_err(Error::Flash)?;
        }
        let offset = self.layout.entry_address(self.active_block, self.tail);
        adapter::program_bytes(&mut self.flash, self.layout.word_size(), offset, entry)
            .map_err(Error::Flash)?;
        self.tail += 1;
        if self.tail == self.size {
            self.clean_up().map_err(Error::Flash)?;
        }
        Ok(())
    }

    /// Consume the oldest entry by programming its mark word.
    ///
    /// A power cut between the program and the in-memory increment is
    /// harmless: recovery sees the mark on the medium and places head past
    /// the slot.
    pub fn mark_entry(&mut self) -> Result<(), Error<F>> {
        if self.is_empty() {
            return Err(Error::Empty);
        }
        let word_size = self.layout.word_size();
        let mark = [!F::ERASE_BYTE; MAX_WORD_SIZE];
        let offset = self.layout.mark_address(self.active_block, self.head);
        adapter::program_bytes(&mut self.flash, word_size, offset, &mark[..word_size])
            .map_err(Error::Flash)?;
        self.head += 1;
        Ok(())
    }

    /// Whether the block's first word is all brand bytes.
    fn block_is_branded(&mut self, block: BlockIndex) -> Result<bool, F::Error> {
        let word = &mut self.scratch[..self.layout.word_size()];
        self.flash
            .read(self.layout.brand_address(block).as_u32(), word)?;
        Ok(is_filled(word, BRAND_BYTE))
    }

    /// Count branded blocks; also reports the last one found.
    fn scan_branded_blocks(&mut self) -> Result<(u16, BlockIndex), F::Error> {
        let mut branded = 0;
        let mut last = BlockIndex::new(0);
        for index in 0..self.layout.block_count() {
            let block = BlockIndex::new(index);
            if self.block_is_branded(block)? {
                branded += 1;
                last = block;
            }
        }
        Ok((branded, last))
    }

    /// Erase the whole region and brand block 0 as the active block.
    fn format(&mut self) -> Result<(), F::Error> {
        for index in 0..self.layout.block_count() {
            self.erase_block(BlockIndex::new(index))?;
        }
        self.brand_block(BlockIndex::new(0))?;
        self.active_block = BlockIndex::new(0);
        Ok(())
    }

    fn erase_block(&mut self, block: BlockIndex) -> Result<(), F::Error> {
        for page in 0..self.layout.pages_per_block() {
            self.flash.erase(self.layout.block_page(block, page))?;
        }
        Ok(())
    }

    fn brand_block(&mut self, block: BlockIndex) -> Result<(), F::Error> {
        let word_size = self.layout.word_size();
        let brand = [BRAND_BYTE; MAX_WORD_SIZE];
        adapter::program_bytes(
            &mut self.flash,
            word_size,
            self.layout.brand_address(block),
            &brand[..word_size],
        )
    }

    /// A slot is consumed once its whole mark word is programmed. A partial
    /// mark (power cut mid-program on a device where the mark straddles
    /// words) counts as unconsumed and is simply re-marked later.
    fn entry_is_marked(&mut self, id: u32) -> Result<bool, F::Error> {
        let word = &mut self.scratch[..self.layout.word_size()];
        self.flash
            .read(self.layout.mark_address(self.active_block, id).as_u32(), word)?;
        Ok(is_filled(word, !F::ERASE_BYTE))
    }

    /// Unconsumed and never written: every payload byte still erased.
    fn entry_is_empty(&mut self, id: u32) -> Result<bool, F::Error> {
        if self.entry_is_marked(id)? {
            return Ok(false);
        }
        let payload = &mut self.scratch[..self.layout.element_size()];
        self.flash
            .read(self.layout.entry_address(self.active_block, id).as_u32(), payload)?;
        Ok(is_filled(payload, F::ERASE_BYTE))
    }

    /// First unconsumed slot, or `size` when every slot is marked.
    fn find_head(&mut self) -> Result<u32, F::Error> {
        for id in 0..self.size {
            if !self.entry_is_marked(id)? {
                return Ok(id);
            }
        }
        Ok(self.size)
    }

    /// First empty slot at or after `from`, or `size` when the block is full.
    fn find_tail(&mut self, from: u32) -> Result<u32, F::Error> {
        for id in from..self.size {
            if self.entry_is_empty(id)? {
                return Ok(id);
            }
        }
        Ok(self.size)
    }

    /// Rotate to the next block: migrate unconsumed slots, brand the new
    /// block, erase the old one.
    ///
    /// A full block with no consumer progress still has to make room, so the
    /// oldest entry is dropped on the floor. A power cut anywhere in here
    /// leaves a recoverable medium: before the brand the old block is still
    /// the only active one, after it either both are branded (recovery
    /// reformats, dropping the queue) or the erase already removed the old
    /// brand.
    fn clean_up(&mut self) -> Result<(), F::Error> {
        let next = self.active_block.next_wrapping(self.layout.block_count());
        // an interrupted rotation can leave a partial copy in an unbranded
        // block; scrub it before programming over it
        self.erase_block(next)?;
        let mut src = self.head;
        if self.tail - self.head == self.size {
            src += 1;
        }
        let live = self.tail - src;
        debug!(
            "rotating block {} -> {}, migrating {} entries",
            self.active_block.as_u16(),
            next.as_u16(),
            live
        );
        for id in 0..live {
            self.copy_entry(src + id, next, id)?;
        }
        self.brand_block(next)?;
        self.erase_block(self.active_block)?;
        self.active_block = next;
        self.head = 0;
        self.tail = live;
        Ok(())
    }

    /// Migrate one payload. The destination mark stays erased, so migrated
    /// entries land as fresh unconsumed slots.
    fn copy_entry(
        &mut self,
        src_id: u32,
        destination: BlockIndex,
        dst_id: u32,
    ) -> Result<(), F::Error> {
        let payload = &mut self.scratch[..self.layout.element_size()];
        self.flash.read(
            self.layout.entry_address(self.active_block, src_id).as_u32(),
            payload,
        )?;
        adapter::program_bytes(
            &mut self.flash,
            self.layout.word_size(),
            self.layout.entry_address(destination, dst_id),
            payload,
        )
    }
}

fn is_filled(bytes: &[u8], value: u8) -> bool {
    bytes.iter().all(|&byte| byte == value)
}
