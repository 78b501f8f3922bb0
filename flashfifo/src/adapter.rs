//! Word-granular byte writes.
//!
//! The device programs whole words at aligned offsets, but slots are packed
//! back to back and their stride need not be a multiple of the word size.
//! [`program_bytes`] covers the requested span with word-aligned windows: a
//! window fully inside the span is programmed straight from the caller's
//! bytes; an edge window is composed by reading the neighboring medium bytes
//! and overlaying the new ones. Re-programming a byte with its current value
//! never clears a bit it still has set, so composing with already-programmed
//! neighbors is as legal as composing with erased ones.

use embedded_nor::{ByteAddress, NorFlash};

use crate::MAX_WORD_SIZE;

/// Program an arbitrary byte range through word-sized operations.
pub(crate) fn program_bytes<F: NorFlash>(
    flash: &mut F,
    word_size: usize,
    offset: ByteAddress,
    data: &[u8],
) -> Result<(), F::Error> {
    debug_assert!(word_size <= MAX_WORD_SIZE);

    let mut word = [0u8; MAX_WORD_SIZE];
    let start = offset.as_u32() as usize;
    let end = start + data.len();
    let mut window = start - start % word_size;
    while window < end {
        let word = &mut word[..word_size];
        if window >= start && window + word_size <= end {
            word.copy_from_slice(&data[window - start..window - start + word_size]);
        } else {
            flash.read(window as u32, word)?;
            let lo = window.max(start);
            let hi = (window + word_size).min(end);
            word[lo - window..hi - window].copy_from_slice(&data[lo - start..hi - start]);
        }
        flash.program(window as u32, word)?;
        window += word_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_nor::test::VirtualNorFlash;
    use test_log::test;

    #[test]
    fn aligned_span_is_programmed_directly() {
        let mut flash = VirtualNorFlash::<64, 2, 2>::new();
        program_bytes(&mut flash, 2, ByteAddress::new(4), &[1, 2, 3, 4]).unwrap();
        assert_eq!(&flash.page(0)[4..8], &[1, 2, 3, 4]);
        assert_eq!(flash.program_ops(), 2);
        assert!(flash.page(0)[..4].iter().all(|&b| b == 0xFF));
        assert!(flash.page(0)[8..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn unaligned_edges_compose_with_the_medium() {
        let mut flash = VirtualNorFlash::<64, 2, 2>::new();
        program_bytes(&mut flash, 2, ByteAddress::new(1), &[0xA0, 0xA1, 0xA2]).unwrap();
        assert_eq!(&flash.page(0)[..6], &[0xFF, 0xA0, 0xA1, 0xA2, 0xFF, 0xFF]);
    }

    #[test]
    fn sub_word_write_inside_one_window() {
        let mut flash = VirtualNorFlash::<64, 2, 4>::new();
        program_bytes(&mut flash, 4, ByteAddress::new(5), &[0xB0, 0xB1]).unwrap();
        assert_eq!(
            &flash.page(0)[4..8],
            &[0xFF, 0xB0, 0xB1, 0xFF],
            "only the covered bytes change"
        );
        assert_eq!(flash.program_ops(), 1);
    }

    #[test]
    fn adjacent_spans_may_share_a_window() {
        let mut flash = VirtualNorFlash::<64, 2, 2>::new();
        // two back-to-back 3-byte records: the second write re-programs the
        // word already holding the first record's last byte
        program_bytes(&mut flash, 2, ByteAddress::new(0), &[1, 2, 3]).unwrap();
        program_bytes(&mut flash, 2, ByteAddress::new(3), &[4, 5, 6]).unwrap();
        assert_eq!(&flash.page(0)[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn word_size_one_never_reads_back() {
        let mut flash = VirtualNorFlash::<64, 2, 1>::new();
        program_bytes(&mut flash, 1, ByteAddress::new(7), &[9, 8]).unwrap();
        assert_eq!(&flash.page(0)[7..9], &[9, 8]);
        assert_eq!(flash.program_ops(), 2);
    }
}
