//! Readout objects of the Jet/Energy Processor system.
use serde::{Deserialize, Serialize};

use super::cp_entities::peak_value;

/// 0.2 x 0.2 jet element, summed from trigger towers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JetElement {
    pub eta: f64,
    pub phi: f64,
    pub em_energy: Vec<u32>,
    pub had_energy: Vec<u32>,
    #[serde(default)]
    pub em_error: Vec<u32>,
    #[serde(default)]
    pub had_error: Vec<u32>,
    #[serde(default)]
    pub link_error: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl JetElement {
    pub fn new(eta: f64, phi: f64, em_energy: u32, had_energy: u32) -> Self {
        Self {
            eta,
            phi,
            em_energy: vec![em_energy],
            had_energy: vec![had_energy],
            em_error: vec![0],
            had_error: vec![0],
            link_error: vec![0],
            peak: 0,
        }
    }

    pub fn em_energy(&self) -> u32 {
        peak_value(&self.em_energy, self.peak)
    }

    pub fn had_energy(&self) -> u32 {
        peak_value(&self.had_energy, self.peak)
    }

    pub fn energy(&self) -> u32 {
        self.em_energy().saturating_add(self.had_energy())
    }
}

/// Jet RoI. The low `JET_THRESHOLDS` bits of `hits` are the main jet thresholds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JemRoi {
    pub crate_id: usize,
    pub jem: usize,
    pub frame: usize,
    pub location: usize,
    pub hits: u32,
    #[serde(default)]
    pub error: u32,
}

impl JemRoi {
    pub fn new(crate_id: usize, jem: usize, frame: usize, location: usize, hits: u32) -> Self {
        Self {
            crate_id,
            jem,
            frame,
            location,
            hits,
            error: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JemHits {
    pub crate_id: usize,
    pub module: usize,
    pub jet_hits: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl JemHits {
    pub fn new(crate_id: usize, module: usize, jet_hits: u32) -> Self {
        Self {
            crate_id,
            module,
            jet_hits: vec![jet_hits],
            peak: 0,
        }
    }

    pub fn jet_hits(&self) -> u32 {
        peak_value(&self.jet_hits, self.peak)
    }
}

/// Per-JEM energy sums
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JemEtSums {
    pub crate_id: usize,
    pub module: usize,
    pub ex: Vec<i32>,
    pub ey: Vec<i32>,
    pub et: Vec<i32>,
    #[serde(default)]
    pub peak: usize,
}

impl JemEtSums {
    pub fn new(crate_id: usize, module: usize, ex: i32, ey: i32, et: i32) -> Self {
        Self {
            crate_id,
            module,
            ex: vec![ex],
            ey: vec![ey],
            et: vec![et],
            peak: 0,
        }
    }

    /// `[ex, ey, et]` of the peak slice
    pub fn sums(&self) -> [i32; 3] {
        [
            peak_value(&self.ex, self.peak),
            peak_value(&self.ey, self.peak),
            peak_value(&self.et, self.peak),
        ]
    }
}

/// Data ids of the CMM-Jet readout beyond the per-module entries (0-15)
pub mod cmm_jet_data_id {
    pub const REMOTE: usize = 16;
    pub const LOCAL: usize = 17;
    pub const TOTAL: usize = 18;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmmJetHits {
    pub crate_id: usize,
    pub data_id: usize,
    pub hits: Vec<u32>,
    #[serde(default)]
    pub error: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl CmmJetHits {
    pub fn new(crate_id: usize, data_id: usize, hits: u32) -> Self {
        Self {
            crate_id,
            data_id,
            hits: vec![hits],
            error: vec![0],
            peak: 0,
        }
    }

    pub fn hits(&self) -> u32 {
        peak_value(&self.hits, self.peak)
    }
}

/// Data ids of the CMM-Energy readout beyond the per-module entries (0-15).
///
/// The map entries carry their threshold bits in the `et` field.
pub mod cmm_energy_data_id {
    pub const REMOTE: usize = 16;
    pub const LOCAL: usize = 17;
    pub const TOTAL: usize = 18;
    pub const SUM_ET_MAP: usize = 19;
    pub const MISSING_ET_MAP: usize = 20;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmmEtSums {
    pub crate_id: usize,
    pub data_id: usize,
    pub ex: Vec<i32>,
    pub ey: Vec<i32>,
    pub et: Vec<i32>,
    #[serde(default)]
    pub error: Vec<u32>,
    #[serde(default)]
    pub peak: usize,
}

impl CmmEtSums {
    pub fn new(crate_id: usize, data_id: usize, ex: i32, ey: i32, et: i32) -> Self {
        Self {
            crate_id,
            data_id,
            ex: vec![ex],
            ey: vec![ey],
            et: vec![et],
            error: vec![0],
            peak: 0,
        }
    }

    pub fn sums(&self) -> [i32; 3] {
        [
            peak_value(&self.ex, self.peak),
            peak_value(&self.ey, self.peak),
            peak_value(&self.et, self.peak),
        ]
    }

    pub fn et(&self) -> i32 {
        peak_value(&self.et, self.peak)
    }
}

/// Energy RoI sent by the system CMM to the central trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmmRoi {
    pub ex: i32,
    pub ey: i32,
    pub et: i32,
    pub sum_et_hits: u32,
    pub missing_et_hits: u32,
}

impl CmmRoi {
    /// Everything the RoI carries, in the order it is compared
    pub fn payload(&self) -> [i32; 5] {
        [
            self.ex,
            self.ey,
            self.et,
            self.sum_et_hits as i32,
            self.missing_et_hits as i32,
        ]
    }
}
