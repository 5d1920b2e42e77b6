//! Sorted-merge comparison of a simulated and a hardware entity map.
//!
//! Both maps are walked once in ascending key order. Every key present on at least one
//! side is visited exactly once with whatever each side holds for it; the stage callback
//! then classifies the payloads with [`classify`] and does its histogram fills and error
//! bits.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::key_map::{EntityKey, KeyedEntityMap};

/// Result of comparing one simulated payload with one hardware payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Match,
    Mismatch,
    SimOnly,
    DataOnly,
}

impl Outcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// A comparable payload. Zero means "not present" for comparison purposes.
pub trait Payload: Copy + PartialEq {
    fn is_zero(&self) -> bool;
}

impl Payload for u32 {
    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl Payload for i32 {
    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl<T: Payload, const N: usize> Payload for [T; N] {
    fn is_zero(&self) -> bool {
        self.iter().all(Payload::is_zero)
    }
}

/// Classify a simulated payload against a hardware payload.
///
/// An absent entity is passed in as a zero payload. Two zero payloads yield `None`: nothing
/// is filled and no bit is set for them.
pub fn classify<P: Payload>(sim: P, data: P) -> Option<Outcome> {
    match (sim.is_zero(), data.is_zero()) {
        (true, true) => None,
        (false, true) => Some(Outcome::SimOnly),
        (true, false) => Some(Outcome::DataOnly),
        (false, false) if sim == data => Some(Outcome::Match),
        (false, false) => Some(Outcome::Mismatch),
    }
}

/// [`classify`] after applying the same mask to both hit words
pub fn classify_masked(sim: u32, data: u32, mask: u32) -> Option<Outcome> {
    classify(sim & mask, data & mask)
}

/// Walk two maps in merged key order.
///
/// `visit` receives the key and the entity each side holds for it. Keys held by neither
/// map are never visited; the walk ends when both maps are exhausted.
pub fn merge_compare<'a, S, D, F>(
    sim: &KeyedEntityMap<'a, S>,
    data: &KeyedEntityMap<'a, D>,
    mut visit: F,
) where
    F: FnMut(EntityKey, Option<&'a S>, Option<&'a D>),
{
    let mut sim_iter = sim.iter().peekable();
    let mut data_iter = data.iter().peekable();

    loop {
        // An exhausted side orders after every key
        let order = match (sim_iter.peek(), data_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((sim_key, _)), Some((data_key, _))) => sim_key.cmp(data_key),
        };

        match order {
            Ordering::Greater => {
                if let Some((key, entity)) = data_iter.next() {
                    visit(key, None, Some(entity));
                }
            }
            Ordering::Less => {
                if let Some((key, entity)) = sim_iter.next() {
                    visit(key, Some(entity), None);
                }
            }
            Ordering::Equal => {
                if let (Some((key, sim_entity)), Some((_, data_entity))) =
                    (sim_iter.next(), data_iter.next())
                {
                    visit(key, Some(sim_entity), Some(data_entity));
                }
            }
        }
    }
}

/// Outcome tally of one stage, kept for the pipeline report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub matched: u64,
    pub mismatched: u64,
    pub sim_only: u64,
    pub data_only: u64,
    pub ignored: u64,
}

impl OutcomeCounts {
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Match => self.matched += 1,
            Outcome::Mismatch => self.mismatched += 1,
            Outcome::SimOnly => self.sim_only += 1,
            Outcome::DataOnly => self.data_only += 1,
        }
    }

    pub fn disagreements(&self) -> u64 {
        self.mismatched + self.sim_only + self.data_only
    }
}
