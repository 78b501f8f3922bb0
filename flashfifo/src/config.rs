use crate::MAX_ELEMENT_SIZE;

/// Geometry and record shape of one queue instance.
///
/// The queue occupies `block_count * pages_per_block` consecutive pages
/// starting at `start_page`. Several instances may share one device as long
/// as their page ranges do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Erase page size of the device in bytes. Must be a multiple of
    /// `word_size`.
    pub page_size: u32,
    /// Programming granularity of the device in bytes: 1, 2 or 4.
    pub word_size: u32,
    /// First device page of the region allocated to this instance.
    pub start_page: u32,
    /// Pages grouped into one rotation block.
    pub pages_per_block: u32,
    /// Blocks in the region. Rotation needs at least 2.
    pub block_count: u16,
    /// Payload size of one record in bytes, at most [`MAX_ELEMENT_SIZE`].
    pub element_size: u32,
}

impl Config {
    pub(crate) fn is_valid(&self) -> bool {
        self.block_count >= 2
            && self.page_size != 0
            && self.pages_per_block != 0
            && matches!(self.word_size, 1 | 2 | 4)
            && self.page_size % self.word_size == 0
            && self.element_size != 0
            && self.element_size as usize <= MAX_ELEMENT_SIZE
    }
}
