//! # l1calo_dqm
//!
//! l1calo_dqm is a Sim-vs-BS data quality monitor for the Cluster Processor (CP) and
//! Jet/Energy Processor (JEP) systems of a level-1 calorimeter trigger, written in Rust.
//! For every event it re-simulates each stage of the trigger pipeline from the hardware
//! readout of the stage before it and compares the result, entity by entity, with what the
//! hardware actually read out. Disagreements are histogrammed, flagged per crate in a
//! mismatch vector published back to the event store, and summarised per run.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, you will
//! need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./l1calo_dqm_cli` from the top
//! level repository. To use the CLI see the `l1calo_dqm_cli` README.
//!
//! ## Library
//!
//! The monitors are [`cpm_monitor::CpmSimBsMonitor`] and [`jep_monitor::JepSimBsMonitor`].
//! Both take an [`store::EventStore`] to read the event from and publish to, and a
//! [`histogram::HistogramSink`] to fill. The simulation of every stage is a
//! [`simulation::StageSimulator`], so any `Fn(&[I]) -> Vec<O>` can stand in for a stage;
//! RoI finding must always be supplied by the caller.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows (collection locations of the
//! `cpm` and `jep` sections can be left out to take the defaults):
//!
//! ```yml
//! event_path: /path/to/run/files
//! report_path: /path/to/reports
//! first_run_number: 0
//! last_run_number: 0
//! n_threads: 1
//! compare_with_sim: true
//! max_sample_events: 10
//! cpm:
//!   roi_threshold_mask: null
//!   ignored_em_towers:
//!     - {eta: 0.05, phi: 0.05}
//!   ignored_had_towers: []
//! jep:
//!   roi_threshold_mask: null
//!   ignored_em_elements: []
//!   ignored_had_elements: []
//!   sum_et_thresholds: [100, 200, 300, 400, 500, 600, 700, 800]
//!   missing_et_thresholds: [20, 30, 40, 50, 60, 70, 80, 100]
//! ```
//!
//! With `compare_with_sim: false` only the remote sums are compared.
//!
//! ## Run files
//!
//! A run file `run_NNNN.yml` in `event_path` is a YAML list of event records. Each record
//! holds the event number and the collections of the event, keyed by location, plus the
//! RoIs of the offline finders under `CPMRoIsSim` and `JEMRoIsSim`:
//!
//! ```yml
//! - event_number: 1
//!   collections:
//!     CPMRoIs:
//!       kind: CpmRois
//!       items:
//!         - {crate_id: 0, cpm: 8, chip: 0, location: 0, hits: 1}
//! ```
//!
//! ## Output
//!
//! Each run produces a report `run_NNNN_dqm.yml` in `report_path` with the per-category
//! run summary of both monitors and the entries of every histogram.
pub mod config;
pub mod constants;
pub mod cp_entities;
pub mod cpm_monitor;
pub mod error;
pub mod error_vector;
pub mod histogram;
pub mod hit_word;
pub mod jep_entities;
pub mod jep_monitor;
pub mod key_map;
pub mod merge;
pub mod pipeline;
pub mod process;
pub mod simulation;
pub mod store;
pub mod worker_status;
