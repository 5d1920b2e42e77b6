use bitvec::prelude::*;

use super::merge::Outcome;

/// Per-location error bitmasks of one event.
///
/// A location is `crate * entities_per_crate + index`; every bit is one summary error
/// category. Match outcomes land in the match bits, every other outcome in the mismatch
/// bits. Setting a bit is an OR, so repeating it changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorVector {
    match_bits: Vec<u32>,
    mismatch_bits: Vec<u32>,
}

impl ErrorVector {
    pub fn new(n_locations: usize) -> Self {
        Self {
            match_bits: vec![0; n_locations],
            mismatch_bits: vec![0; n_locations],
        }
    }

    pub fn len(&self) -> usize {
        self.match_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.match_bits.is_empty()
    }

    pub fn set_match(&mut self, location: usize, bit: usize) {
        Self::set(&mut self.match_bits, location, bit);
    }

    pub fn set_mismatch(&mut self, location: usize, bit: usize) {
        Self::set(&mut self.mismatch_bits, location, bit);
    }

    /// Set `bit` in the vector the outcome belongs to
    pub fn record(&mut self, location: usize, bit: usize, outcome: Outcome) {
        if outcome.is_match() {
            self.set_match(location, bit);
        } else {
            self.set_mismatch(location, bit);
        }
    }

    fn set(bits: &mut [u32], location: usize, bit: usize) {
        match bits.get_mut(location) {
            Some(word) => word.view_bits_mut::<Lsb0>().set(bit, true),
            None => spdlog::warn!("Error location {location} is out of range; bit {bit} dropped"),
        }
    }

    pub fn match_bits(&self) -> &[u32] {
        &self.match_bits
    }

    pub fn mismatch_bits(&self) -> &[u32] {
        &self.mismatch_bits
    }

    /// Whether any location has the mismatch bit of this category
    pub fn any_mismatch(&self, bit: usize) -> bool {
        self.mismatch_bits
            .iter()
            .any(|word| word.view_bits::<Lsb0>()[bit])
    }

    /// Categories with a mismatch at one location
    pub fn mismatches_at(&self, location: usize) -> Vec<usize> {
        self.mismatch_bits
            .get(location)
            .map(|word| word.view_bits::<Lsb0>().iter_ones().collect())
            .unwrap_or_default()
    }

    /// Categories with a match at one location
    pub fn matches_at(&self, location: usize) -> Vec<usize> {
        self.match_bits
            .get(location)
            .map(|word| word.view_bits::<Lsb0>().iter_ones().collect())
            .unwrap_or_default()
    }

    /// OR the mismatch bits of every location into its crate's word of `crate_words`
    pub fn fold_into_crates(&self, locations_per_crate: usize, crate_words: &mut [u32]) {
        for (location, word) in self.mismatch_bits.iter().enumerate() {
            if let Some(crate_word) = crate_words.get_mut(location / locations_per_crate) {
                *crate_word |= *word;
            }
        }
    }
}
