//! Readout objects of the Cluster Processor system.
//!
//! These mirror what the bytestream decoder (or the offline simulation) writes into the
//! event store. They are plain immutable records; every accessor returns the peak slice.
use serde::{Deserialize, Serialize};

/// Pick the value of the peak slice, treating a missing slice as zero
pub(crate) fn peak_value<T: Copy + Default>(slices: &[T], peak: usize) -> T {
    slices.get(peak).copied().unwrap_or_default()
}

/// Pre-processor trigger tower, the common input of the CP and JEP systems.
///
/// Carries both the CP view (fine granularity) and the JEP view of its energy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerTower {
    pub eta: f64,
    pub phi: f64,
    pub cp_em_energy: u32,
    pub cp_had_energy: u32,
    pub jep_em_energy: u32,
    pub jep_had_energy: u32,
    #[serde(default)]
    pub em_error: u32,
    #[serde(default)]
    pub had_error: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpmTower {
    pub eta: f64,
    pub phi: f64,
    pub em_energy: Vec<u32>,
    pub had_energy: Vec<u32>,
    #[serde(default)]
    pub em_error: Vec<u32>,
    #[serde(default)]
    pub had_error: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl CpmTower {
    /// Single slice tower
    pub fn new(eta: f64, phi: f64, em_energy: u32, had_energy: u32) -> Self {
        Self {
            eta,
            phi,
            em_energy: vec![em_energy],
            had_energy: vec![had_energy],
            em_error: vec![0],
            had_error: vec![0],
            peak: 0,
        }
    }

    pub fn em_energy(&self) -> u32 {
        peak_value(&self.em_energy, self.peak)
    }

    pub fn had_energy(&self) -> u32 {
        peak_value(&self.had_energy, self.peak)
    }

    pub fn em_error(&self) -> u32 {
        peak_value(&self.em_error, self.peak)
    }

    pub fn had_error(&self) -> u32 {
        peak_value(&self.had_error, self.peak)
    }
}

/// One CP Region of Interest.
///
/// `hits` holds 16 threshold bits: EM/tau thresholds 0-7 in the low byte, 8-15 in the
/// high byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmRoi {
    pub crate_id: usize,
    pub cpm: usize,
    pub chip: usize,
    pub location: usize,
    pub hits: u32,
    #[serde(default)]
    pub error: u32,
}

impl CpmRoi {
    pub fn new(crate_id: usize, cpm: usize, chip: usize, location: usize, hits: u32) -> Self {
        Self {
            crate_id,
            cpm,
            chip,
            location,
            hits,
            error: 0,
        }
    }
}

/// Per-CPM hit multiplicities sent to the two CMMs of the crate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmHits {
    pub crate_id: usize,
    pub module: usize,
    pub hit_word0: Vec<u32>,
    pub hit_word1: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl CpmHits {
    pub fn new(crate_id: usize, module: usize, hit_word0: u32, hit_word1: u32) -> Self {
        Self {
            crate_id,
            module,
            hit_word0: vec![hit_word0],
            hit_word1: vec![hit_word1],
            peak: 0,
        }
    }

    pub fn hit_word0(&self) -> u32 {
        peak_value(&self.hit_word0, self.peak)
    }

    pub fn hit_word1(&self) -> u32 {
        peak_value(&self.hit_word1, self.peak)
    }
}

/// Data ids of the CMM-CP readout beyond the per-module entries
pub mod cmm_cp_data_id {
    pub const REMOTE_0: usize = 15;
    pub const REMOTE_1: usize = 16;
    pub const REMOTE_2: usize = 17;
    pub const LOCAL: usize = 18;
    pub const TOTAL: usize = 19;
}

/// CMM-CP readout entry: module hits as received (data ids 1-14) or one of the sums
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmmCpHits {
    pub crate_id: usize,
    pub data_id: usize,
    pub hit_word0: Vec<u32>,
    pub hit_word1: Vec<u32>,
    #[serde(default)]
    pub error0: Vec<u32>,
    #[serde(default)]
    pub error1: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl CmmCpHits {
    pub fn new(crate_id: usize, data_id: usize, hit_word0: u32, hit_word1: u32) -> Self {
        Self {
            crate_id,
            data_id,
            hit_word0: vec![hit_word0],
            hit_word1: vec![hit_word1],
            error0: vec![0],
            error1: vec![0],
            peak: 0,
        }
    }

    pub fn hit_word0(&self) -> u32 {
        peak_value(&self.hit_word0, self.peak)
    }

    pub fn hit_word1(&self) -> u32 {
        peak_value(&self.hit_word1, self.peak)
    }
}

/// ROD status header. Only the fields the monitors act on are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RodHeader {
    pub crate_id: usize,
    #[serde(default)]
    pub source_id: u32,
    #[serde(default)]
    pub limited_roi_set: bool,
}
