//! Jet/Energy Processor Sim-vs-BS monitor.
//!
//! Same scheme as the CP monitor, over the jet element grid. The JEP has two crates of
//! 16 JEMs; each crate has a jet CMM (index 0) and an energy CMM (index 1). Crate 1 is
//! the system crate and receives the remote sums of crate 0.
use bit_set::BitSet;
use fxhash::FxHashSet;

use super::config::{Config, Coordinate, JepConfig};
use super::constants::*;
use super::cp_entities::{RodHeader, TriggerTower};
use super::cpm_monitor::limited_roi_crates;
use super::error::MonitorError;
use super::error_vector::ErrorVector;
use super::histogram::{stage_hists, HistogramSink, StageHists};
use super::jep_entities::{
    cmm_energy_data_id, cmm_jet_data_id, CmmEtSums, CmmJetHits, CmmRoi, JemEtSums, JemHits,
    JemRoi, JetElement,
};
use super::key_map::{
    cmm_key, crate_module_key, jem_element_location, EntityKey, KeyedEntityMap, JET_ELEMENT_GRID,
};
use super::merge::{classify, classify_masked, merge_compare, Outcome, Payload};
use super::pipeline::{
    EventSummary, Pipeline, PipelineState, RunSummary, StageRecorder, StageStatus,
    SummaryCategory, SummaryHists,
};
use super::simulation::{BoxedSimulator, EtMapSimulator, JepSimulators};
use super::store::{retrieve, EventStore};

/// Summary error categories of the JEP monitor, in bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JepSummaryError {
    EMElementMismatch,
    HadElementMismatch,
    RoIMismatch,
    JEMHitsMismatch,
    CMMJetHitsMismatch,
    LocalJetMismatch,
    RemoteJetMismatch,
    TotalJetMismatch,
    JEMEtSumsMismatch,
    CMMEtSumsMismatch,
    LocalEnergyMismatch,
    RemoteEnergyMismatch,
    TotalEnergyMismatch,
    SumEtMismatch,
    MissingEtMismatch,
    EnergyRoIMismatch,
}

impl SummaryCategory for JepSummaryError {
    const ALL: &'static [Self] = &[
        Self::EMElementMismatch,
        Self::HadElementMismatch,
        Self::RoIMismatch,
        Self::JEMHitsMismatch,
        Self::CMMJetHitsMismatch,
        Self::LocalJetMismatch,
        Self::RemoteJetMismatch,
        Self::TotalJetMismatch,
        Self::JEMEtSumsMismatch,
        Self::CMMEtSumsMismatch,
        Self::LocalEnergyMismatch,
        Self::RemoteEnergyMismatch,
        Self::TotalEnergyMismatch,
        Self::SumEtMismatch,
        Self::MissingEtMismatch,
        Self::EnergyRoIMismatch,
    ];
    const SAMPLED: &'static [Self] = &[
        Self::EMElementMismatch,
        Self::HadElementMismatch,
        Self::RoIMismatch,
        Self::JEMHitsMismatch,
        Self::CMMJetHitsMismatch,
        Self::JEMEtSumsMismatch,
        Self::CMMEtSumsMismatch,
    ];

    fn bit(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::EMElementMismatch => "EM je",
            Self::HadElementMismatch => "Had je",
            Self::RoIMismatch => "RoIs",
            Self::JEMHitsMismatch => "JEMHits",
            Self::CMMJetHitsMismatch => "CMMHits",
            Self::LocalJetMismatch => "LocalJet",
            Self::RemoteJetMismatch => "RemoteJet",
            Self::TotalJetMismatch => "TotalJet",
            Self::JEMEtSumsMismatch => "JEMEtSums",
            Self::CMMEtSumsMismatch => "CMMEtSums",
            Self::LocalEnergyMismatch => "LocalEnergy",
            Self::RemoteEnergyMismatch => "RemoteEnergy",
            Self::TotalEnergyMismatch => "TotalEnergy",
            Self::SumEtMismatch => "SumEtMap",
            Self::MissingEtMismatch => "MissingEtMap",
            Self::EnergyRoIMismatch => "EnergyRoI",
        }
    }
}

const EM_ELEMENT_HISTS: StageHists = stage_hists!("jem_em_je");
const HAD_ELEMENT_HISTS: StageHists = stage_hists!("jem_had_je");
const ROI_HISTS: StageHists = stage_hists!("jem_roi");
const JEM_HITS_HISTS: StageHists = stage_hists!("jem_hits");
const JEM_ENERGY_HISTS: StageHists = stage_hists!("jem_energy");
const CMM_JET_HITS_HISTS: StageHists = StageHists {
    matched: "cmm_jet_hits_jem_eq_cmm",
    mismatched: "cmm_jet_hits_jem_ne_cmm",
    sim_only: "cmm_jet_hits_jem_no_cmm",
    data_only: "cmm_jet_hits_cmm_no_jem",
    ignored: "cmm_jet_hits_ignored",
};
const CMM_ENERGY_HISTS: StageHists = StageHists {
    matched: "cmm_energy_jem_eq_cmm",
    mismatched: "cmm_energy_jem_ne_cmm",
    sim_only: "cmm_energy_jem_no_cmm",
    data_only: "cmm_energy_cmm_no_jem",
    ignored: "cmm_energy_ignored",
};
const SUM_ET_MAP_HISTS: StageHists = stage_hists!("cmm_sum_et_map");
const MISSING_ET_MAP_HISTS: StageHists = stage_hists!("cmm_missing_et_map");
const ENERGY_ROI_HISTS: StageHists = stage_hists!("cmm_energy_roi");
const SUMMARY_HISTS: SummaryHists = SummaryHists {
    summary: "jem_sim_ne_data_summary",
    sample: "jem_sim_ne_data_events",
    sim_eq_data: "jem_sim_eq_data_overview",
    sim_ne_data: "jem_sim_ne_data_overview",
};

const MODULE_LOCATIONS: usize = JEP_CRATES * JEM_MODULES;
const CMM_LOCATIONS: usize = JEP_CRATES * CMMS_PER_CRATE;
const JET_CMM: usize = 0;
const ENERGY_CMM: usize = 1;
const SYSTEM_ENERGY_CMM_LOCATION: usize = JEP_SYSTEM_CRATE * CMMS_PER_CRATE + ENERGY_CMM;
/// The crate whose local sums the system crate receives as remote sums
const REMOTE_SOURCE_CRATE: usize = (JEP_SYSTEM_CRATE + 1) % JEP_CRATES;

/// Common view of the two CMM readouts
trait CmmEntry {
    type Payload: Payload + Default;
    fn crate_id(&self) -> usize;
    fn data_id(&self) -> usize;
    fn payload(&self) -> Self::Payload;
}

impl CmmEntry for CmmJetHits {
    type Payload = u32;

    fn crate_id(&self) -> usize {
        self.crate_id
    }

    fn data_id(&self) -> usize {
        self.data_id
    }

    fn payload(&self) -> u32 {
        self.hits()
    }
}

impl CmmEntry for CmmEtSums {
    type Payload = [i32; 3];

    fn crate_id(&self) -> usize {
        self.crate_id
    }

    fn data_id(&self) -> usize {
        self.data_id
    }

    fn payload(&self) -> [i32; 3] {
        self.sums()
    }
}

/// One of the six CMM sum comparisons
struct SumStage {
    name: &'static str,
    hists: StageHists,
    error: JepSummaryError,
    data_id: usize,
    cmm: usize,
    remote: bool,
}

const LOCAL_JET_STAGE: SumStage = SumStage {
    name: "cmm_local_jet_hits",
    hists: stage_hists!("cmm_local_jet"),
    error: JepSummaryError::LocalJetMismatch,
    data_id: cmm_jet_data_id::LOCAL,
    cmm: JET_CMM,
    remote: false,
};
const REMOTE_JET_STAGE: SumStage = SumStage {
    name: "cmm_remote_jet_hits",
    hists: stage_hists!("cmm_remote_jet"),
    error: JepSummaryError::RemoteJetMismatch,
    data_id: cmm_jet_data_id::REMOTE,
    cmm: JET_CMM,
    remote: true,
};
const TOTAL_JET_STAGE: SumStage = SumStage {
    name: "cmm_total_jet_hits",
    hists: stage_hists!("cmm_total_jet"),
    error: JepSummaryError::TotalJetMismatch,
    data_id: cmm_jet_data_id::TOTAL,
    cmm: JET_CMM,
    remote: false,
};
const LOCAL_ENERGY_STAGE: SumStage = SumStage {
    name: "cmm_local_energy",
    hists: stage_hists!("cmm_local_energy"),
    error: JepSummaryError::LocalEnergyMismatch,
    data_id: cmm_energy_data_id::LOCAL,
    cmm: ENERGY_CMM,
    remote: false,
};
const REMOTE_ENERGY_STAGE: SumStage = SumStage {
    name: "cmm_remote_energy",
    hists: stage_hists!("cmm_remote_energy"),
    error: JepSummaryError::RemoteEnergyMismatch,
    data_id: cmm_energy_data_id::REMOTE,
    cmm: ENERGY_CMM,
    remote: true,
};
const TOTAL_ENERGY_STAGE: SumStage = SumStage {
    name: "cmm_total_energy",
    hists: stage_hists!("cmm_total_energy"),
    error: JepSummaryError::TotalEnergyMismatch,
    data_id: cmm_energy_data_id::TOTAL,
    cmm: ENERGY_CMM,
    remote: false,
};

/// Key of a jet RoI. RoIs addressed outside the JEP system have none.
pub fn jem_roi_key(roi: &JemRoi) -> Option<EntityKey> {
    let jem = jem_location(roi.crate_id, roi.jem)?;
    (roi.frame < JEM_ROI_FRAMES && roi.location < JEM_ROI_LOCATIONS).then(|| {
        ((jem * JEM_ROI_FRAMES + roi.frame) * JEM_ROI_LOCATIONS + roi.location) as EntityKey
    })
}

fn jem_location(crate_id: usize, jem: usize) -> Option<usize> {
    (crate_id < JEP_CRATES && jem < JEM_MODULES)
        .then(|| crate_module_key(crate_id, jem, JEM_MODULES) as usize)
}

fn jem_key(crate_id: usize, jem: usize) -> Option<EntityKey> {
    jem_location(crate_id, jem).map(|loc| loc as EntityKey)
}

/// CMM key of a module entry, for JEMs inside the JEP system only
fn jem_cmm_key(crate_id: usize, jem: usize) -> Option<EntityKey> {
    jem_location(crate_id, jem).map(|_| cmm_key(crate_id, jem))
}

fn cmm_location(crate_id: usize, cmm: usize) -> Option<usize> {
    (crate_id < JEP_CRATES).then(|| crate_id * CMMS_PER_CRATE + cmm)
}

/// Local, remote or total sums of one CMM kind, simulated from the CMM readout itself
fn compare_cmm_sums<T, H>(
    stage: &SumStage,
    simulator: &BoxedSimulator<T, T>,
    data: Option<&[T]>,
    errors: &mut ErrorVector,
    sink: &mut H,
    pipeline: &mut Pipeline,
) where
    T: CmmEntry,
    H: HistogramSink + ?Sized,
{
    let Some(data) = data else {
        pipeline.record(stage.name, StageStatus::Skipped);
        return;
    };
    let simulated = simulator.simulate(data);
    let key = |e: &T| {
        (e.crate_id() < JEP_CRATES && e.data_id() == stage.data_id)
            .then(|| cmm_key(e.crate_id(), e.data_id()))
    };
    let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
    let data_map = KeyedEntityMap::build_filtered(Some(data), key);

    let mut recorder = StageRecorder::new(stage.hists, stage.error.bit());
    merge_compare(&sim_map, &data_map, |_, sim, dat| {
        let Some(entry) = sim.or(dat) else {
            return;
        };
        let sim_sums = sim.map(T::payload).unwrap_or_default();
        let dat_sums = dat.map(T::payload).unwrap_or_default();
        let Some(outcome) = classify(sim_sums, dat_sums) else {
            return;
        };
        // Remote sums are blamed on the crate that sent them
        let source = if stage.remote {
            REMOTE_SOURCE_CRATE
        } else {
            entry.crate_id()
        };
        let Some(loc) = cmm_location(source, stage.cmm) else {
            return;
        };
        recorder.record(sink, errors, outcome, loc, (source as i64, stage.cmm as i64));
    });
    pipeline.record(stage.name, recorder.status());
}

pub struct JepSimBsMonitor {
    config: JepConfig,
    compare_with_sim: bool,
    simulators: JepSimulators,
    ignored_em: FxHashSet<EntityKey>,
    ignored_had: FxHashSet<EntityKey>,
    run: RunSummary,
}

impl JepSimBsMonitor {
    /// Create the monitor at run start
    pub fn new(config: &Config, simulators: JepSimulators) -> Self {
        let element_keys = |coords: &[Coordinate]| {
            coords
                .iter()
                .map(|c| JET_ELEMENT_GRID.key(c.eta, c.phi))
                .collect::<FxHashSet<EntityKey>>()
        };
        Self {
            ignored_em: element_keys(&config.jep.ignored_em_elements),
            ignored_had: element_keys(&config.jep.ignored_had_elements),
            config: config.jep.clone(),
            compare_with_sim: config.compare_with_sim,
            simulators,
            run: RunSummary::new::<JepSummaryError>(
                MODULE_LOCATIONS + CMM_LOCATIONS,
                config.max_sample_events,
            ),
        }
    }

    /// Reference simulators with the given jet finder and the configured Et-map thresholds
    pub fn with_roi_finder<R>(config: &Config, finder: R) -> Self
    where
        R: Fn(&[JetElement]) -> Vec<JemRoi> + Send + 'static,
    {
        let et_maps = EtMapSimulator::new(
            config.jep.sum_et_thresholds.clone(),
            config.jep.missing_et_thresholds.clone(),
        );
        Self::new(config, JepSimulators::new(finder, et_maps))
    }

    /// Swap the jet finding strategy, e.g. between events of a replay
    pub fn set_roi_finder(&mut self, finder: BoxedSimulator<JetElement, JemRoi>) {
        self.simulators.rois = finder;
    }

    pub fn simulators_mut(&mut self) -> &mut JepSimulators {
        &mut self.simulators
    }

    pub fn run_summary(&self) -> &RunSummary {
        &self.run
    }

    /// Compare every stage of one event and publish the per-crate mismatch vector
    pub fn process_event<S, H>(
        &mut self,
        store: &mut S,
        sink: &mut H,
    ) -> Result<EventSummary, MonitorError>
    where
        S: EventStore + ?Sized,
        H: HistogramSink + ?Sized,
    {
        let event_number = store.event_number();
        let mut pipeline = Pipeline::new();
        let mut module_errors = ErrorVector::new(MODULE_LOCATIONS);
        let mut cmm_errors = ErrorVector::new(CMM_LOCATIONS);

        {
            let store: &S = store;
            let config = &self.config;
            let trigger_towers = retrieve::<TriggerTower, _>(store, &config.trigger_tower_location);
            let elements = retrieve::<JetElement, _>(store, &config.jet_element_location);
            let rois = retrieve::<JemRoi, _>(store, &config.jem_roi_location);
            let jem_hits = retrieve::<JemHits, _>(store, &config.jem_hits_location);
            let jem_sums = retrieve::<JemEtSums, _>(store, &config.jem_et_sums_location);
            let cmm_jets = retrieve::<CmmJetHits, _>(store, &config.cmm_jet_hits_location);
            let cmm_energy = retrieve::<CmmEtSums, _>(store, &config.cmm_et_sums_location);
            let cmm_rois = retrieve::<CmmRoi, _>(store, &config.cmm_roi_location);
            let limited = limited_roi_crates(
                retrieve::<RodHeader, _>(store, &config.rod_header_location),
                JEP_CRATES,
            );

            let sims = &self.simulators;
            let modules = &mut module_errors;
            let cmms = &mut cmm_errors;
            let pl = &mut pipeline;
            if self.compare_with_sim {
                self.compare_elements(trigger_towers, elements, modules, sink, pl);
                pl.advance(PipelineState::TowersCompared)?;

                self.compare_rois(elements, rois, &limited, modules, sink, pl);
                pl.advance(PipelineState::RoIsCompared)?;

                self.compare_jem_hits(rois, jem_hits, modules, sink, pl);
                self.compare_jem_energy(elements, jem_sums, modules, sink, pl);
                pl.advance(PipelineState::HitsCompared)?;

                self.compare_cmm_jet_hits(jem_hits, cmm_jets, modules, sink, pl);
                self.compare_cmm_energy(jem_sums, cmm_energy, modules, sink, pl);
                compare_cmm_sums(&LOCAL_JET_STAGE, &sims.jet_local_sums, cmm_jets, cmms, sink, pl);
                compare_cmm_sums(
                    &LOCAL_ENERGY_STAGE,
                    &sims.energy_local_sums,
                    cmm_energy,
                    cmms,
                    sink,
                    pl,
                );
                pl.advance(PipelineState::CrateSumsCompared)?;
            }

            compare_cmm_sums(&REMOTE_JET_STAGE, &sims.jet_remote_sums, cmm_jets, cmms, sink, pl);
            compare_cmm_sums(
                &REMOTE_ENERGY_STAGE,
                &sims.energy_remote_sums,
                cmm_energy,
                cmms,
                sink,
                pl,
            );
            if self.compare_with_sim {
                compare_cmm_sums(&TOTAL_JET_STAGE, &sims.jet_total_sums, cmm_jets, cmms, sink, pl);
                compare_cmm_sums(
                    &TOTAL_ENERGY_STAGE,
                    &sims.energy_total_sums,
                    cmm_energy,
                    cmms,
                    sink,
                    pl,
                );
                self.compare_et_maps(cmm_energy, cmms, sink, pl);
                self.compare_energy_roi(cmm_energy, cmm_rois, cmms, sink, pl);
            }
            pl.advance(PipelineState::SystemSumsCompared)?;
        }

        let mut crate_mismatches = vec![0u32; JEP_CRATES];
        module_errors.fold_into_crates(JEM_MODULES, &mut crate_mismatches);
        cmm_errors.fold_into_crates(CMMS_PER_CRATE, &mut crate_mismatches);
        store.publish(&self.config.mismatch_vector_location, crate_mismatches.clone())?;

        self.run.record_event::<JepSummaryError, _>(
            event_number,
            &[&module_errors, &cmm_errors],
            &SUMMARY_HISTS,
            sink,
        );
        pipeline.advance(PipelineState::Done)?;

        Ok(EventSummary {
            event_number,
            crate_mismatches,
            stages: pipeline.into_reports(),
        })
    }

    /// Trigger towers vs jet elements, EM and hadronic layers separately
    fn compare_elements<H: HistogramSink + ?Sized>(
        &self,
        trigger_towers: Option<&[TriggerTower]>,
        data: Option<&[JetElement]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("jem_em_elements", StageStatus::Skipped);
            pipeline.record("jem_had_elements", StageStatus::Skipped);
            return;
        };
        let simulated = self
            .simulators
            .elements
            .simulate(trigger_towers.unwrap_or_default());
        let element_key = |e: &JetElement| JET_ELEMENT_GRID.key(e.eta, e.phi);
        let sim_map = KeyedEntityMap::build(Some(simulated.as_slice()), element_key);
        let data_map = KeyedEntityMap::build(Some(data), element_key);

        let mut em = StageRecorder::new(EM_ELEMENT_HISTS, JepSummaryError::EMElementMismatch.bit());
        let mut had =
            StageRecorder::new(HAD_ELEMENT_HISTS, JepSummaryError::HadElementMismatch.bit());
        merge_compare(&sim_map, &data_map, |key, sim, dat| {
            let Some(element) = sim.or(dat) else {
                return;
            };
            let (crate_id, jem) = jem_element_location(element.eta, element.phi);
            let Some(loc) = jem_location(crate_id, jem) else {
                return;
            };
            let (eta_bin, phi_bin) = JET_ELEMENT_GRID.bins(key);
            let bin = (eta_bin as i64, phi_bin as i64);

            let sim_em = sim.map_or(0, |e| e.em_energy());
            let dat_em = dat.map_or(0, |e| e.em_energy());
            if let Some(outcome) = classify(sim_em, dat_em) {
                let ignored = self.ignored_em.contains(&key);
                em.record_ignorable(sink, errors, outcome, ignored, loc, bin);
            }

            let sim_had = sim.map_or(0, |e| e.had_energy());
            let dat_had = dat.map_or(0, |e| e.had_energy());
            if let Some(outcome) = classify(sim_had, dat_had) {
                let ignored = self.ignored_had.contains(&key);
                had.record_ignorable(sink, errors, outcome, ignored, loc, bin);
            }
        });
        pipeline.record("jem_em_elements", em.status());
        pipeline.record("jem_had_elements", had.status());
    }

    /// Jets found in the hardware jet elements vs JEM RoIs read out
    fn compare_rois<H: HistogramSink + ?Sized>(
        &self,
        elements: Option<&[JetElement]>,
        data: Option<&[JemRoi]>,
        limited: &BitSet,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("jem_rois", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.rois.simulate(elements.unwrap_or_default());
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), jem_roi_key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), jem_roi_key);
        let mask = self.config.roi_threshold_mask.unwrap_or(u32::MAX);

        let mut recorder = StageRecorder::new(ROI_HISTS, JepSummaryError::RoIMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(roi) = sim.or(dat) else {
                return;
            };
            let sim_hits = sim.map_or(0, |r| r.hits);
            let dat_hits = dat.map_or(0, |r| r.hits);
            let Some(outcome) = classify_masked(sim_hits, dat_hits, mask) else {
                return;
            };
            if outcome == Outcome::SimOnly && limited.contains(roi.crate_id) {
                return;
            }
            let Some(loc) = jem_location(roi.crate_id, roi.jem) else {
                return;
            };
            let y = roi.frame * JEM_ROI_LOCATIONS + roi.location;
            recorder.record(sink, errors, outcome, loc, (loc as i64, y as i64));
        });
        pipeline.record("jem_rois", recorder.status());
    }

    /// Jet multiplicities counted from the hardware RoIs vs JEM hits read out
    fn compare_jem_hits<H: HistogramSink + ?Sized>(
        &self,
        rois: Option<&[JemRoi]>,
        data: Option<&[JemHits]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("jem_hits", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.hits.simulate(rois.unwrap_or_default());
        let key = |h: &JemHits| jem_key(h.crate_id, h.module);
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), key);

        let mut recorder =
            StageRecorder::new(JEM_HITS_HISTS, JepSummaryError::JEMHitsMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(hits) = sim.or(dat) else {
                return;
            };
            let sim_word = sim.map_or(0, |h| h.jet_hits());
            let dat_word = dat.map_or(0, |h| h.jet_hits());
            let Some(outcome) = classify(sim_word, dat_word) else {
                return;
            };
            let Some(loc) = jem_location(hits.crate_id, hits.module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (hits.module as i64, hits.crate_id as i64));
        });
        pipeline.record("jem_hits", recorder.status());
    }

    /// Ex, Ey and Et summed from the hardware jet elements vs JEM energy sums read out
    fn compare_jem_energy<H: HistogramSink + ?Sized>(
        &self,
        elements: Option<&[JetElement]>,
        data: Option<&[JemEtSums]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("jem_energy", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.energy.simulate(elements.unwrap_or_default());
        let key = |s: &JemEtSums| jem_key(s.crate_id, s.module);
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), key);

        let mut recorder =
            StageRecorder::new(JEM_ENERGY_HISTS, JepSummaryError::JEMEtSumsMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(sums) = sim.or(dat) else {
                return;
            };
            let sim_sums = sim.map_or([0; 3], |s| s.sums());
            let dat_sums = dat.map_or([0; 3], |s| s.sums());
            let Some(outcome) = classify(sim_sums, dat_sums) else {
                return;
            };
            let Some(loc) = jem_location(sums.crate_id, sums.module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (sums.module as i64, sums.crate_id as i64));
        });
        pipeline.record("jem_energy", recorder.status());
    }

    /// Jet hits sent by the JEMs vs hits received by the jet CMMs
    fn compare_cmm_jet_hits<H: HistogramSink + ?Sized>(
        &self,
        jem_hits: Option<&[JemHits]>,
        data: Option<&[CmmJetHits]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cmm_jet_module_hits", StageStatus::Skipped);
            return;
        };
        let sent = KeyedEntityMap::build_filtered(jem_hits, |h: &JemHits| {
            jem_cmm_key(h.crate_id, h.module)
        });
        let received = KeyedEntityMap::build_filtered(Some(data), |c: &CmmJetHits| {
            jem_cmm_key(c.crate_id, c.data_id)
        });

        let mut recorder =
            StageRecorder::new(CMM_JET_HITS_HISTS, JepSummaryError::CMMJetHitsMismatch.bit());
        merge_compare(&sent, &received, |_, jem, cmm| {
            let (crate_id, module) = match (jem, cmm) {
                (Some(h), _) => (h.crate_id, h.module),
                (None, Some(c)) => (c.crate_id, c.data_id),
                (None, None) => return,
            };
            let jem_word = jem.map_or(0, |h| h.jet_hits());
            let cmm_word = cmm.map_or(0, |c| c.hits());
            let Some(outcome) = classify(jem_word, cmm_word) else {
                return;
            };
            let Some(loc) = jem_location(crate_id, module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (module as i64, crate_id as i64));
        });
        pipeline.record("cmm_jet_module_hits", recorder.status());
    }

    /// Energy sums sent by the JEMs vs sums received by the energy CMMs
    fn compare_cmm_energy<H: HistogramSink + ?Sized>(
        &self,
        jem_sums: Option<&[JemEtSums]>,
        data: Option<&[CmmEtSums]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cmm_energy_module_sums", StageStatus::Skipped);
            return;
        };
        let sent = KeyedEntityMap::build_filtered(jem_sums, |s: &JemEtSums| {
            jem_cmm_key(s.crate_id, s.module)
        });
        let received = KeyedEntityMap::build_filtered(Some(data), |c: &CmmEtSums| {
            jem_cmm_key(c.crate_id, c.data_id)
        });

        let mut recorder =
            StageRecorder::new(CMM_ENERGY_HISTS, JepSummaryError::CMMEtSumsMismatch.bit());
        merge_compare(&sent, &received, |_, jem, cmm| {
            let (crate_id, module) = match (jem, cmm) {
                (Some(s), _) => (s.crate_id, s.module),
                (None, Some(c)) => (c.crate_id, c.data_id),
                (None, None) => return,
            };
            let jem_sums = jem.map_or([0; 3], |s| s.sums());
            let cmm_sums = cmm.map_or([0; 3], |c| c.sums());
            let Some(outcome) = classify(jem_sums, cmm_sums) else {
                return;
            };
            let Some(loc) = jem_location(crate_id, module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (module as i64, crate_id as i64));
        });
        pipeline.record("cmm_energy_module_sums", recorder.status());
    }

    /// Sum-Et and missing-Et maps derived from the hardware system total vs the maps read out
    fn compare_et_maps<H: HistogramSink + ?Sized>(
        &self,
        data: Option<&[CmmEtSums]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cmm_sum_et_map", StageStatus::Skipped);
            pipeline.record("cmm_missing_et_map", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.et_maps.simulate(data);
        let key = |e: &CmmEtSums| {
            let is_map = e.data_id == cmm_energy_data_id::SUM_ET_MAP
                || e.data_id == cmm_energy_data_id::MISSING_ET_MAP;
            (is_map && e.crate_id == JEP_SYSTEM_CRATE).then(|| cmm_key(e.crate_id, e.data_id))
        };
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), key);

        let mut sum_et = StageRecorder::new(SUM_ET_MAP_HISTS, JepSummaryError::SumEtMismatch.bit());
        let mut missing_et =
            StageRecorder::new(MISSING_ET_MAP_HISTS, JepSummaryError::MissingEtMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(entry) = sim.or(dat) else {
                return;
            };
            let sim_bits = sim.map_or(0, |e| e.et());
            let dat_bits = dat.map_or(0, |e| e.et());
            let Some(outcome) = classify(sim_bits, dat_bits) else {
                return;
            };
            let recorder = if entry.data_id == cmm_energy_data_id::SUM_ET_MAP {
                &mut sum_et
            } else {
                &mut missing_et
            };
            recorder.record(
                sink,
                errors,
                outcome,
                SYSTEM_ENERGY_CMM_LOCATION,
                (JEP_SYSTEM_CRATE as i64, 0),
            );
        });
        pipeline.record("cmm_sum_et_map", sum_et.status());
        pipeline.record("cmm_missing_et_map", missing_et.status());
    }

    /// Energy RoI built from the hardware total and maps vs the CMM RoI read out
    fn compare_energy_roi<H: HistogramSink + ?Sized>(
        &self,
        cmm: Option<&[CmmEtSums]>,
        data: Option<&[CmmRoi]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cmm_energy_roi", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.energy_roi.simulate(cmm.unwrap_or_default());
        let sim_map = KeyedEntityMap::build(Some(simulated.as_slice()), |_| 0);
        let data_map = KeyedEntityMap::build(Some(data), |_| 0);

        let mut recorder =
            StageRecorder::new(ENERGY_ROI_HISTS, JepSummaryError::EnergyRoIMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let sim_payload = sim.map_or([0; 5], CmmRoi::payload);
            let dat_payload = dat.map_or([0; 5], CmmRoi::payload);
            if let Some(outcome) = classify(sim_payload, dat_payload) {
                recorder.record(
                    sink,
                    errors,
                    outcome,
                    SYSTEM_ENERGY_CMM_LOCATION,
                    (JEP_SYSTEM_CRATE as i64, 0),
                );
            }
        });
        pipeline.record("cmm_energy_roi", recorder.status());
    }
}
