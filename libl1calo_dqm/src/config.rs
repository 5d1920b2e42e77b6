use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{CPM_MISMATCH_VECTOR, DEFAULT_MAX_SAMPLE_EVENTS, JEM_MISMATCH_VECTOR};
use super::error::ConfigError;

/// An eta/phi coordinate, used to name known-bad towers and elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub eta: f64,
    pub phi: f64,
}

/// Store locations and comparison options of the CP monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpmConfig {
    pub trigger_tower_location: String,
    pub cpm_tower_location: String,
    pub cpm_roi_location: String,
    pub cpm_hits_location: String,
    pub cmm_cp_hits_location: String,
    pub rod_header_location: String,
    pub mismatch_vector_location: String,
    /// Where the replay tool finds the RoIs of the offline cluster finder
    pub sim_roi_location: String,
    /// Only the RoI thresholds set here take part in the comparison
    pub roi_threshold_mask: Option<u32>,
    pub ignored_em_towers: Vec<Coordinate>,
    pub ignored_had_towers: Vec<Coordinate>,
}

impl Default for CpmConfig {
    fn default() -> Self {
        Self {
            trigger_tower_location: String::from("TriggerTowers"),
            cpm_tower_location: String::from("CPMTowers"),
            cpm_roi_location: String::from("CPMRoIs"),
            cpm_hits_location: String::from("CPMHits"),
            cmm_cp_hits_location: String::from("CMMCPHits"),
            rod_header_location: String::from("CPRoIRODHeaders"),
            mismatch_vector_location: String::from(CPM_MISMATCH_VECTOR),
            sim_roi_location: String::from("CPMRoIsSim"),
            roi_threshold_mask: None,
            ignored_em_towers: Vec::new(),
            ignored_had_towers: Vec::new(),
        }
    }
}

/// Store locations and comparison options of the JEP monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JepConfig {
    pub trigger_tower_location: String,
    pub jet_element_location: String,
    pub jem_roi_location: String,
    pub jem_hits_location: String,
    pub jem_et_sums_location: String,
    pub cmm_jet_hits_location: String,
    pub cmm_et_sums_location: String,
    pub cmm_roi_location: String,
    pub rod_header_location: String,
    pub mismatch_vector_location: String,
    pub sim_roi_location: String,
    pub roi_threshold_mask: Option<u32>,
    pub ignored_em_elements: Vec<Coordinate>,
    pub ignored_had_elements: Vec<Coordinate>,
    pub sum_et_thresholds: Vec<u32>,
    pub missing_et_thresholds: Vec<u32>,
}

impl Default for JepConfig {
    fn default() -> Self {
        Self {
            trigger_tower_location: String::from("TriggerTowers"),
            jet_element_location: String::from("JetElements"),
            jem_roi_location: String::from("JEMRoIs"),
            jem_hits_location: String::from("JEMHits"),
            jem_et_sums_location: String::from("JEMEtSums"),
            cmm_jet_hits_location: String::from("CMMJetHits"),
            cmm_et_sums_location: String::from("CMMEtSums"),
            cmm_roi_location: String::from("CMMRoIs"),
            rod_header_location: String::from("JEPRoIRODHeaders"),
            mismatch_vector_location: String::from(JEM_MISMATCH_VECTOR),
            sim_roi_location: String::from("JEMRoIsSim"),
            roi_threshold_mask: None,
            ignored_em_elements: Vec::new(),
            ignored_had_elements: Vec::new(),
            sum_et_thresholds: vec![100, 200, 300, 400, 500, 600, 700, 800],
            missing_et_thresholds: vec![20, 30, 40, 50, 60, 70, 80, 100],
        }
    }
}

/// Structure representing the application configuration. Contains pathing, run and
/// comparison information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub event_path: PathBuf,
    pub report_path: PathBuf,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub n_threads: i32,
    /// When false only the remote sums are compared
    pub compare_with_sim: bool,
    #[serde(default = "default_max_sample_events")]
    pub max_sample_events: usize,
    #[serde(default)]
    pub cpm: CpmConfig,
    #[serde(default)]
    pub jep: JepConfig,
}

fn default_max_sample_events() -> usize {
    DEFAULT_MAX_SAMPLE_EVENTS
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            event_path: PathBuf::from("None"),
            report_path: PathBuf::from("None"),
            first_run_number: 0,
            last_run_number: 0,
            n_threads: 1,
            compare_with_sim: true,
            max_sample_events: DEFAULT_MAX_SAMPLE_EVENTS,
            cpm: CpmConfig::default(),
            jep: JepConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check if a specific run exists by evaluating the existance of its run file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.event_path
            .join(format!("{}.yml", self.get_run_str(run_number)))
            .exists()
    }

    /// Get the path to the event file of a run
    pub fn get_run_file(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let run_file = self
            .event_path
            .join(format!("{}.yml", self.get_run_str(run_number)));
        if run_file.exists() {
            Ok(run_file)
        } else {
            Err(ConfigError::BadFilePath(run_file))
        }
    }

    /// Get the path to the output report of a run
    pub fn get_report_file(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let report_file = self
            .report_path
            .join(format!("{}_dqm.yml", self.get_run_str(run_number)));
        if self.report_path.exists() {
            Ok(report_file)
        } else {
            Err(ConfigError::BadFilePath(self.report_path.clone()))
        }
    }

    /// Construct the run string
    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number:0>4}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
