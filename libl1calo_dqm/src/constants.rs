// Hardware layout of the L1Calo Cluster Processor (CP) and Jet/Energy Processor (JEP)
// systems as seen by the readout. Only the numbers needed to build keys and error
// locations live here.

// CP system
pub const CP_CRATES: usize = 4;
pub const CPM_MODULES: usize = 14; // numbered 1..=14 in the readout
pub const CPM_CHIPS: usize = 8;
pub const CPM_ROI_LOCATIONS: usize = 4;
pub const CP_THRESHOLDS_PER_WORD: usize = 8;
pub const CP_SYSTEM_CRATE: usize = 3;

// JEP system
pub const JEP_CRATES: usize = 2;
pub const JEM_MODULES: usize = 16; // numbered 0..=15 in the readout
pub const JEM_ROI_FRAMES: usize = 8;
pub const JEM_ROI_LOCATIONS: usize = 4;
pub const JET_THRESHOLDS: usize = 8;
pub const JEP_SYSTEM_CRATE: usize = 1;

/// Two CMMs sit in every processor crate
pub const CMMS_PER_CRATE: usize = 2;

/// Width of a single threshold multiplicity inside a hit word
pub const MULTIPLICITY_BITS: usize = 3;
pub const MAX_MULTIPLICITY: u32 = (1 << MULTIPLICITY_BITS) - 1;

/// Composite keys of CMM objects are `crate * CMM_KEY_STRIDE + data_id`
pub const CMM_KEY_STRIDE: u32 = 100;

// Trigger tower grid used by the CP system
pub const CP_TOWER_ETA_MIN: f64 = -2.5;
pub const CP_TOWER_ETA_MAX: f64 = 2.5;
pub const CP_TOWER_ETA_WIDTH: f64 = 0.1;
pub const CP_TOWER_PHI_BINS: u32 = 64;
/// Eta coverage of one CPM; module 1 starts at this edge
pub const CPM_ETA_EDGE: f64 = -2.8;
pub const CPM_ETA_WIDTH: f64 = 0.4;

// Jet element grid used by the JEP system
pub const JE_ETA_MIN: f64 = -3.2;
pub const JE_ETA_MAX: f64 = 3.2;
pub const JE_ETA_WIDTH: f64 = 0.2;
pub const JE_PHI_BINS: u32 = 32;
pub const JE_ETA_BINS_PER_JEM: u32 = 4;
pub const JEMS_PER_QUADRANT: usize = 8;

// Names the per-crate mismatch vectors are published under
pub const CPM_MISMATCH_VECTOR: &str = "L1CaloCPMMismatchVector";
pub const JEM_MISMATCH_VECTOR: &str = "L1CaloJEMMismatchVector";

/// Default number of event numbers sampled per mismatch category in one run
pub const DEFAULT_MAX_SAMPLE_EVENTS: usize = 10;

/// Saturation value of a jet element energy
pub const JET_ELEMENT_MAX_ENERGY: u32 = 1023;
