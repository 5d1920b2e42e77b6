//! Packed hit words.
//!
//! Modules and CMMs report per-threshold hit multiplicities packed into a single integer,
//! `MULTIPLICITY_BITS` per threshold, threshold 0 in the lowest bits. RoIs report a plain
//! bitfield with one pass/fail bit per threshold. All multiplicity arithmetic saturates at
//! `MAX_MULTIPLICITY`, as the hardware does.
use bitvec::prelude::*;

use super::constants::{MAX_MULTIPLICITY, MULTIPLICITY_BITS};

/// Extract the multiplicity of one threshold from a hit word
pub fn multiplicity(word: u32, threshold: usize) -> u32 {
    (word >> (threshold * MULTIPLICITY_BITS)) & MAX_MULTIPLICITY
}

/// Return the hit word with the multiplicity of one threshold replaced
pub fn with_multiplicity(word: u32, threshold: usize, value: u32) -> u32 {
    let shift = threshold * MULTIPLICITY_BITS;
    (word & !(MAX_MULTIPLICITY << shift)) | (value.min(MAX_MULTIPLICITY) << shift)
}

/// Add two hit words threshold by threshold, saturating every field
pub fn add_multiplicities(lhs: u32, rhs: u32, n_thresholds: usize) -> u32 {
    (0..n_thresholds).fold(0, |word, thr| {
        let sum = multiplicity(lhs, thr) + multiplicity(rhs, thr);
        with_multiplicity(word, thr, sum)
    })
}

/// Count one more hit for every threshold bit set in an RoI hit pattern.
///
/// `first_bit` selects which slice of the RoI bitfield maps onto thresholds
/// `0..n_thresholds` of the hit word.
pub fn count_roi_hits(word: u32, roi_hits: u32, first_bit: usize, n_thresholds: usize) -> u32 {
    let pattern = roi_hits >> first_bit;
    pattern.view_bits::<Lsb0>()[..n_thresholds]
        .iter_ones()
        .fold(word, |acc, thr| {
            with_multiplicity(acc, thr, multiplicity(acc, thr) + 1)
        })
}

/// Bit pattern with bit `i` set for every threshold `i` passed by `value`
pub fn threshold_bits<F>(thresholds: &[u32], passes: F) -> u32
where
    F: Fn(u32) -> bool,
{
    let mut bits = 0u32;
    for (idx, thr) in thresholds.iter().enumerate().take(32) {
        if passes(*thr) {
            bits.view_bits_mut::<Lsb0>().set(idx, true);
        }
    }
    bits
}
