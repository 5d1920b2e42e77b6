//! Cluster Processor Sim-vs-BS monitor.
//!
//! Re-simulates the CP chain stage by stage from the hardware readout of the stage before
//! it and compares the result with the readout of the stage itself:
//!
//! trigger towers -> CPM towers -> RoIs -> CPM hits -> CMM module hits -> local, remote and
//! total sums.
//!
//! Errors are collected per CPM (`crate * 14 + cpm - 1`) and per CMM (`crate * 2 + cmm`),
//! folded per crate at the end of the event and published to the store.
use bit_set::BitSet;
use fxhash::FxHashSet;

use super::config::{Config, Coordinate, CpmConfig};
use super::constants::*;
use super::cp_entities::{
    cmm_cp_data_id, CmmCpHits, CpmHits, CpmRoi, CpmTower, RodHeader, TriggerTower,
};
use super::error::MonitorError;
use super::error_vector::ErrorVector;
use super::histogram::{stage_hists, HistogramSink, StageHists};
use super::key_map::{
    cmm_key, cpm_tower_location, crate_module_key, EntityKey, KeyedEntityMap, CP_TOWER_GRID,
};
use super::merge::{classify, classify_masked, merge_compare, Outcome};
use super::pipeline::{
    EventSummary, Pipeline, PipelineState, RunSummary, StageRecorder, StageStatus,
    SummaryCategory, SummaryHists,
};
use super::simulation::{BoxedSimulator, CpSimulators};
use super::store::{retrieve, EventStore};

/// Summary error categories of the CP monitor, in bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpmSummaryError {
    EMTowerMismatch,
    HadTowerMismatch,
    RoIMismatch,
    CPMHitsMismatch,
    CMMHitsMismatch,
    LocalSumMismatch,
    RemoteSumMismatch,
    TotalSumMismatch,
}

impl SummaryCategory for CpmSummaryError {
    const ALL: &'static [Self] = &[
        Self::EMTowerMismatch,
        Self::HadTowerMismatch,
        Self::RoIMismatch,
        Self::CPMHitsMismatch,
        Self::CMMHitsMismatch,
        Self::LocalSumMismatch,
        Self::RemoteSumMismatch,
        Self::TotalSumMismatch,
    ];
    const SAMPLED: &'static [Self] = &[
        Self::EMTowerMismatch,
        Self::HadTowerMismatch,
        Self::RoIMismatch,
        Self::CPMHitsMismatch,
        Self::CMMHitsMismatch,
    ];

    fn bit(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::EMTowerMismatch => "EM tt",
            Self::HadTowerMismatch => "Had tt",
            Self::RoIMismatch => "RoIs",
            Self::CPMHitsMismatch => "CPMHits",
            Self::CMMHitsMismatch => "CMMHits",
            Self::LocalSumMismatch => "Local",
            Self::RemoteSumMismatch => "Remote",
            Self::TotalSumMismatch => "Total",
        }
    }
}

const EM_TOWER_HISTS: StageHists = stage_hists!("cpm_em_tt");
const HAD_TOWER_HISTS: StageHists = stage_hists!("cpm_had_tt");
const ROI_HISTS: StageHists = stage_hists!("cpm_roi");
const CPM_HITS_HISTS: StageHists = stage_hists!("cpm_hits");
const CMM_HITS_HISTS: StageHists = StageHists {
    matched: "cmm_hits_cpm_eq_cmm",
    mismatched: "cmm_hits_cpm_ne_cmm",
    sim_only: "cmm_hits_cpm_no_cmm",
    data_only: "cmm_hits_cmm_no_cpm",
    ignored: "cmm_hits_ignored",
};
const LOCAL_HISTS: StageHists = stage_hists!("cmm_local");
const REMOTE_HISTS: StageHists = stage_hists!("cmm_remote");
const TOTAL_HISTS: StageHists = stage_hists!("cmm_total");
const SUMMARY_HISTS: SummaryHists = SummaryHists {
    summary: "cpm_sim_ne_data_summary",
    sample: "cpm_sim_ne_data_events",
    sim_eq_data: "cpm_sim_eq_data_overview",
    sim_ne_data: "cpm_sim_ne_data_overview",
};

const MODULE_LOCATIONS: usize = CP_CRATES * CPM_MODULES;
const CMM_LOCATIONS: usize = CP_CRATES * CMMS_PER_CRATE;

/// One of the three CMM sum comparisons
struct SumStage {
    name: &'static str,
    hists: StageHists,
    error: CpmSummaryError,
    first_id: usize,
    last_id: usize,
}

const LOCAL_STAGE: SumStage = SumStage {
    name: "cmm_local_sums",
    hists: LOCAL_HISTS,
    error: CpmSummaryError::LocalSumMismatch,
    first_id: cmm_cp_data_id::LOCAL,
    last_id: cmm_cp_data_id::LOCAL,
};
const REMOTE_STAGE: SumStage = SumStage {
    name: "cmm_remote_sums",
    hists: REMOTE_HISTS,
    error: CpmSummaryError::RemoteSumMismatch,
    first_id: cmm_cp_data_id::REMOTE_0,
    last_id: cmm_cp_data_id::REMOTE_2,
};
const TOTAL_STAGE: SumStage = SumStage {
    name: "cmm_total_sums",
    hists: TOTAL_HISTS,
    error: CpmSummaryError::TotalSumMismatch,
    first_id: cmm_cp_data_id::TOTAL,
    last_id: cmm_cp_data_id::TOTAL,
};

impl SumStage {
    fn selects(&self, entry: &CmmCpHits) -> bool {
        (self.first_id..=self.last_id).contains(&entry.data_id)
    }

    /// Crate whose CMM is blamed for a disagreement. Remote sums are blamed on the crate
    /// that sent them.
    fn source_crate(&self, entry: &CmmCpHits) -> usize {
        if self.first_id == cmm_cp_data_id::REMOTE_0 {
            entry.data_id - cmm_cp_data_id::REMOTE_0
        } else {
            entry.crate_id
        }
    }
}

/// Key of an RoI. RoIs addressed outside the CP system have none and are not compared.
pub fn cpm_roi_key(roi: &CpmRoi) -> Option<EntityKey> {
    let cpm = cpm_location(roi.crate_id, roi.cpm)?;
    (roi.chip < CPM_CHIPS && roi.location < CPM_ROI_LOCATIONS)
        .then(|| ((cpm * CPM_CHIPS + roi.chip) * CPM_ROI_LOCATIONS + roi.location) as EntityKey)
}

fn cpm_location(crate_id: usize, cpm: usize) -> Option<usize> {
    (crate_id < CP_CRATES && (1..=CPM_MODULES).contains(&cpm))
        .then(|| crate_module_key(crate_id, cpm - 1, CPM_MODULES) as usize)
}

/// CMM key of a module entry, for CPMs inside the CP system only
fn cpm_cmm_key(crate_id: usize, cpm: usize) -> Option<EntityKey> {
    cpm_location(crate_id, cpm).map(|_| cmm_key(crate_id, cpm))
}

/// Crates of `0..n_crates` whose RoI readout was truncated this event
pub fn limited_roi_crates(headers: Option<&[RodHeader]>, n_crates: usize) -> BitSet {
    headers
        .unwrap_or_default()
        .iter()
        .filter(|h| h.limited_roi_set && h.crate_id < n_crates)
        .map(|h| h.crate_id)
        .collect()
}

pub struct CpmSimBsMonitor {
    config: CpmConfig,
    compare_with_sim: bool,
    simulators: CpSimulators,
    ignored_em: FxHashSet<EntityKey>,
    ignored_had: FxHashSet<EntityKey>,
    run: RunSummary,
}

impl CpmSimBsMonitor {
    /// Create the monitor at run start
    pub fn new(config: &Config, simulators: CpSimulators) -> Self {
        let tower_keys = |coords: &[Coordinate]| {
            coords
                .iter()
                .map(|c| CP_TOWER_GRID.key(c.eta, c.phi))
                .collect::<FxHashSet<EntityKey>>()
        };
        Self {
            ignored_em: tower_keys(&config.cpm.ignored_em_towers),
            ignored_had: tower_keys(&config.cpm.ignored_had_towers),
            config: config.cpm.clone(),
            compare_with_sim: config.compare_with_sim,
            simulators,
            run: RunSummary::new::<CpmSummaryError>(
                MODULE_LOCATIONS + CMM_LOCATIONS,
                config.max_sample_events,
            ),
        }
    }

    /// Swap the RoI finding strategy, e.g. between events of a replay
    pub fn set_roi_finder(&mut self, finder: BoxedSimulator<CpmTower, CpmRoi>) {
        self.simulators.rois = finder;
    }

    pub fn simulators_mut(&mut self) -> &mut CpSimulators {
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
            let trigger_towers =
                retrieve::<TriggerTower, _>(store, &self.config.trigger_tower_location);
            let cpm_towers = retrieve::<CpmTower, _>(store, &self.config.cpm_tower_location);
            let rois = retrieve::<CpmRoi, _>(store, &self.config.cpm_roi_location);
            let cpm_hits = retrieve::<CpmHits, _>(store, &self.config.cpm_hits_location);
            let cmm_hits = retrieve::<CmmCpHits, _>(store, &self.config.cmm_cp_hits_location);
            let limited = limited_roi_crates(
                retrieve::<RodHeader, _>(store, &self.config.rod_header_location),
                CP_CRATES,
            );

            let sims = &self.simulators;
            let modules = &mut module_errors;
            let cmms = &mut cmm_errors;
            let pl = &mut pipeline;
            if self.compare_with_sim {
                self.compare_towers(trigger_towers, cpm_towers, modules, sink, pl);
                pl.advance(PipelineState::TowersCompared)?;

                self.compare_rois(cpm_towers, rois, &limited, modules, sink, pl);
                pl.advance(PipelineState::RoIsCompared)?;

                self.compare_cpm_hits(rois, cpm_hits, modules, sink, pl);
                pl.advance(PipelineState::HitsCompared)?;

                self.compare_cmm_hits(cpm_hits, cmm_hits, modules, sink, pl);
                self.compare_sums(&LOCAL_STAGE, &sims.local_sums, cmm_hits, cmms, sink, pl);
                pl.advance(PipelineState::CrateSumsCompared)?;
            }

            self.compare_sums(&REMOTE_STAGE, &sims.remote_sums, cmm_hits, cmms, sink, pl);
            if self.compare_with_sim {
                self.compare_sums(&TOTAL_STAGE, &sims.total_sums, cmm_hits, cmms, sink, pl);
            }
            pl.advance(PipelineState::SystemSumsCompared)?;
        }

        let mut crate_mismatches = vec![0u32; CP_CRATES];
        module_errors.fold_into_crates(CPM_MODULES, &mut crate_mismatches);
        cmm_errors.fold_into_crates(CMMS_PER_CRATE, &mut crate_mismatches);
        store.publish(&self.config.mismatch_vector_location, crate_mismatches.clone())?;

        self.run.record_event::<CpmSummaryError, _>(
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

    /// Trigger towers vs CPM towers, EM and hadronic layers separately
    fn compare_towers<H: HistogramSink + ?Sized>(
        &self,
        trigger_towers: Option<&[TriggerTower]>,
        data: Option<&[CpmTower]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cpm_em_towers", StageStatus::Skipped);
            pipeline.record("cpm_had_towers", StageStatus::Skipped);
            return;
        };
        let simulated = self
            .simulators
            .towers
            .simulate(trigger_towers.unwrap_or_default());
        let tower_key = |t: &CpmTower| CP_TOWER_GRID.key(t.eta, t.phi);
        let sim_map = KeyedEntityMap::build(Some(simulated.as_slice()), tower_key);
        let data_map = KeyedEntityMap::build(Some(data), tower_key);

        let mut em = StageRecorder::new(EM_TOWER_HISTS, CpmSummaryError::EMTowerMismatch.bit());
        let mut had = StageRecorder::new(HAD_TOWER_HISTS, CpmSummaryError::HadTowerMismatch.bit());
        merge_compare(&sim_map, &data_map, |key, sim, dat| {
            let Some(tower) = sim.or(dat) else {
                return;
            };
            let (crate_id, cpm) = cpm_tower_location(tower.eta, tower.phi);
            let Some(loc) = cpm_location(crate_id, cpm) else {
                return;
            };
            let (eta_bin, phi_bin) = CP_TOWER_GRID.bins(key);
            let bin = (eta_bin as i64, phi_bin as i64);

            let sim_em = sim.map_or(0, |t| t.em_energy());
            let dat_em = dat.map_or(0, |t| t.em_energy());
            if let Some(outcome) = classify(sim_em, dat_em) {
                let ignored = self.ignored_em.contains(&key);
                em.record_ignorable(sink, errors, outcome, ignored, loc, bin);
            }

            let sim_had = sim.map_or(0, |t| t.had_energy());
            let dat_had = dat.map_or(0, |t| t.had_energy());
            if let Some(outcome) = classify(sim_had, dat_had) {
                let ignored = self.ignored_had.contains(&key);
                had.record_ignorable(sink, errors, outcome, ignored, loc, bin);
            }
        });
        pipeline.record("cpm_em_towers", em.status());
        pipeline.record("cpm_had_towers", had.status());
    }

    /// RoIs found in the hardware CPM towers vs RoIs read out.
    ///
    /// Only thresholds in the configured mask are compared. RoIs the hardware did not
    /// send are not counted against crates with a truncated RoI readout.
    fn compare_rois<H: HistogramSink + ?Sized>(
        &self,
        towers: Option<&[CpmTower]>,
        data: Option<&[CpmRoi]>,
        limited: &BitSet,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cpm_rois", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.rois.simulate(towers.unwrap_or_default());
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), cpm_roi_key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), cpm_roi_key);
        let mask = self.config.roi_threshold_mask.unwrap_or(u32::MAX);

        let mut recorder = StageRecorder::new(ROI_HISTS, CpmSummaryError::RoIMismatch.bit());
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
            let Some(loc) = cpm_location(roi.crate_id, roi.cpm) else {
                return;
            };
            let y = roi.chip * CPM_ROI_LOCATIONS + roi.location;
            recorder.record(sink, errors, outcome, loc, (loc as i64, y as i64));
        });
        pipeline.record("cpm_rois", recorder.status());
    }

    /// Hit multiplicities counted from the hardware RoIs vs CPM hits read out
    fn compare_cpm_hits<H: HistogramSink + ?Sized>(
        &self,
        rois: Option<&[CpmRoi]>,
        data: Option<&[CpmHits]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cpm_hits", StageStatus::Skipped);
            return;
        };
        let simulated = self.simulators.hits.simulate(rois.unwrap_or_default());
        let key = |h: &CpmHits| cpm_location(h.crate_id, h.module).map(|loc| loc as EntityKey);
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), key);

        let mut recorder =
            StageRecorder::new(CPM_HITS_HISTS, CpmSummaryError::CPMHitsMismatch.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(hits) = sim.or(dat) else {
                return;
            };
            let sim_words = sim.map_or([0; 2], |h| [h.hit_word0(), h.hit_word1()]);
            let dat_words = dat.map_or([0; 2], |h| [h.hit_word0(), h.hit_word1()]);
            let Some(outcome) = classify(sim_words, dat_words) else {
                return;
            };
            let Some(loc) = cpm_location(hits.crate_id, hits.module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (hits.module as i64, hits.crate_id as i64));
        });
        pipeline.record("cpm_hits", recorder.status());
    }

    /// Hits sent by the CPMs vs hits received by the CMMs
    fn compare_cmm_hits<H: HistogramSink + ?Sized>(
        &self,
        cpm_hits: Option<&[CpmHits]>,
        data: Option<&[CmmCpHits]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record("cmm_module_hits", StageStatus::Skipped);
            return;
        };
        let sent = KeyedEntityMap::build_filtered(cpm_hits, |h: &CpmHits| {
            cpm_cmm_key(h.crate_id, h.module)
        });
        // Sums share the readout with the module entries and are compared elsewhere
        let received = KeyedEntityMap::build_filtered(Some(data), |c: &CmmCpHits| {
            cpm_cmm_key(c.crate_id, c.data_id)
        });

        let mut recorder =
            StageRecorder::new(CMM_HITS_HISTS, CpmSummaryError::CMMHitsMismatch.bit());
        merge_compare(&sent, &received, |_, cpm, cmm| {
            let (crate_id, module) = match (cpm, cmm) {
                (Some(h), _) => (h.crate_id, h.module),
                (None, Some(c)) => (c.crate_id, c.data_id),
                (None, None) => return,
            };
            let cpm_words = cpm.map_or([0; 2], |h| [h.hit_word0(), h.hit_word1()]);
            let cmm_words = cmm.map_or([0; 2], |c| [c.hit_word0(), c.hit_word1()]);
            let Some(outcome) = classify(cpm_words, cmm_words) else {
                return;
            };
            let Some(loc) = cpm_location(crate_id, module) else {
                return;
            };
            recorder.record(sink, errors, outcome, loc, (module as i64, crate_id as i64));
        });
        pipeline.record("cmm_module_hits", recorder.status());
    }

    /// One of the CMM sum stages, simulated from the CMM readout itself.
    ///
    /// The two hit words belong to the two CMMs of a crate and are compared separately.
    fn compare_sums<H: HistogramSink + ?Sized>(
        &self,
        stage: &SumStage,
        simulator: &BoxedSimulator<CmmCpHits, CmmCpHits>,
        data: Option<&[CmmCpHits]>,
        errors: &mut ErrorVector,
        sink: &mut H,
        pipeline: &mut Pipeline,
    ) {
        let Some(data) = data else {
            pipeline.record(stage.name, StageStatus::Skipped);
            return;
        };
        let simulated = simulator.simulate(data);
        let key = |c: &CmmCpHits| {
            (c.crate_id < CP_CRATES && stage.selects(c)).then(|| cmm_key(c.crate_id, c.data_id))
        };
        let sim_map = KeyedEntityMap::build_filtered(Some(simulated.as_slice()), key);
        let data_map = KeyedEntityMap::build_filtered(Some(data), key);

        let mut recorder = StageRecorder::new(stage.hists, stage.error.bit());
        merge_compare(&sim_map, &data_map, |_, sim, dat| {
            let Some(entry) = sim.or(dat) else {
                return;
            };
            let source = stage.source_crate(entry);
            if source >= CP_CRATES {
                return;
            }
            let words = [
                (sim.map_or(0, |c| c.hit_word0()), dat.map_or(0, |c| c.hit_word0())),
                (sim.map_or(0, |c| c.hit_word1()), dat.map_or(0, |c| c.hit_word1())),
            ];
            for (cmm, (sim_word, dat_word)) in words.into_iter().enumerate() {
                if let Some(outcome) = classify(sim_word, dat_word) {
                    let loc = source * CMMS_PER_CRATE + cmm;
                    recorder.record(sink, errors, outcome, loc, (source as i64, cmm as i64));
                }
            }
        });
        pipeline.record(stage.name, recorder.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp_entities::cmm_cp_data_id::*;
    use crate::error::StoreError;
    use crate::histogram::HistogramBook;
    use crate::store::MemoryStore;

    // eta 0.05, phi 0.05 is read out by crate 0, CPM 8
    const ETA: f64 = 0.05;
    const PHI: f64 = 0.05;
    const CPM8_LOC: usize = 7;

    fn finder(rois: Vec<CpmRoi>) -> impl Fn(&[CpmTower]) -> Vec<CpmRoi> + Send + 'static {
        move |_: &[CpmTower]| rois.clone()
    }

    fn monitor_with(config: &Config, rois: Vec<CpmRoi>) -> CpmSimBsMonitor {
        CpmSimBsMonitor::new(config, CpSimulators::new(finder(rois)))
    }

    fn roi() -> CpmRoi {
        CpmRoi::new(0, 8, 0, 0, 0b1)
    }

    /// An event in which every stage agrees with its simulation
    fn matching_event(event_number: u64) -> MemoryStore {
        let config = CpmConfig::default();
        MemoryStore::new(event_number)
            .with(
                &config.trigger_tower_location,
                vec![TriggerTower {
                    eta: ETA,
                    phi: PHI,
                    cp_em_energy: 5,
                    cp_had_energy: 2,
                    ..Default::default()
                }],
            )
            .with(&config.cpm_tower_location, vec![CpmTower::new(ETA, PHI, 5, 2)])
            .with(&config.cpm_roi_location, vec![roi()])
            .with(&config.cpm_hits_location, vec![CpmHits::new(0, 8, 1, 0)])
            .with(
                &config.cmm_cp_hits_location,
                vec![
                    CmmCpHits::new(0, 8, 1, 0),
                    CmmCpHits::new(0, LOCAL, 1, 0),
                    CmmCpHits::new(3, REMOTE_0, 1, 0),
                    CmmCpHits::new(3, TOTAL, 1, 0),
                ],
            )
    }

    fn mismatch_vector(store: &MemoryStore) -> Vec<u32> {
        store
            .published(&CpmConfig::default().mismatch_vector_location)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_matching_event() {
        let mut monitor = monitor_with(&Config::default(), vec![roi()]);
        let mut store = matching_event(1);
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        assert_eq!(summary.crate_mismatches, vec![0; CP_CRATES]);
        assert_eq!(mismatch_vector(&store), vec![0; CP_CRATES]);
        assert_eq!(summary.stages.len(), 8);
        for report in &summary.stages {
            match report.status {
                StageStatus::Compared(counts) => {
                    assert_eq!(counts.disagreements(), 0, "{}", report.stage)
                }
                StageStatus::Skipped => panic!("{} skipped", report.stage),
            }
        }
        assert_eq!(book.entries(SUMMARY_HISTS.summary), 0);
        assert_eq!(book.count(CPM_HITS_HISTS.matched, 8, 0), 1);
        let run = monitor.run_summary();
        assert_eq!(run.events(), 1);
        assert_eq!(run.match_count(CPM8_LOC, CpmSummaryError::RoIMismatch.bit()), 1);
    }

    #[test]
    fn test_tower_mismatch() {
        let mut monitor = monitor_with(&Config::default(), vec![roi()]);
        let mut store = matching_event(4).with(
            &CpmConfig::default().cpm_tower_location,
            vec![CpmTower::new(ETA, PHI, 6, 2)],
        );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        let bit = CpmSummaryError::EMTowerMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![1u32 << bit, 0, 0, 0]);
        assert_eq!(book.count(EM_TOWER_HISTS.mismatched, 25, 0), 1);
        assert_eq!(book.count(HAD_TOWER_HISTS.matched, 25, 0), 1);
        assert_eq!(book.count(SUMMARY_HISTS.summary, bit as i64, 0), 1);
        assert_eq!(book.count(SUMMARY_HISTS.sample, 4, bit as i64), 1);
        assert_eq!(monitor.run_summary().mismatch_count(CPM8_LOC, bit), 1);
    }

    #[test]
    fn test_ignored_tower() {
        let mut config = Config::default();
        config.cpm.ignored_em_towers = vec![Coordinate { eta: ETA, phi: PHI }];
        let mut monitor = monitor_with(&config, vec![roi()]);
        let mut store = matching_event(1).with(
            &config.cpm.cpm_tower_location,
            vec![CpmTower::new(ETA, PHI, 6, 2)],
        );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        assert_eq!(summary.crate_mismatches, vec![0; CP_CRATES]);
        assert_eq!(book.count(EM_TOWER_HISTS.ignored, 25, 0), 1);
        assert_eq!(book.entries(EM_TOWER_HISTS.mismatched), 0);
        assert_eq!(book.entries(SUMMARY_HISTS.summary), 0);
    }

    #[test]
    fn test_limited_roi_crate_suppresses_missing_rois() {
        let config = Config::default();
        let sim_rois = vec![CpmRoi::new(0, 8, 0, 0, 0b1), CpmRoi::new(2, 3, 1, 1, 0b1)];
        let mut monitor = monitor_with(&config, sim_rois);
        let mut store = MemoryStore::new(9)
            .with::<CpmRoi>(&config.cpm.cpm_roi_location, vec![])
            .with(
                &config.cpm.rod_header_location,
                vec![RodHeader {
                    crate_id: 2,
                    source_id: 0x140012,
                    limited_roi_set: true,
                }],
            );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        let bit = CpmSummaryError::RoIMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![1u32 << bit, 0, 0, 0]);
        assert_eq!(book.entries(ROI_HISTS.sim_only), 1);
        assert_eq!(monitor.run_summary().mismatch_count(2 * CPM_MODULES + 2, bit), 0);
    }

    #[test]
    fn test_roi_threshold_mask() {
        let mut config = Config::default();
        let sim = vec![CpmRoi::new(0, 8, 0, 0, 0b0101)];
        let data = vec![CpmRoi::new(0, 8, 0, 0, 0b0001)];

        let mut unmasked = monitor_with(&config, sim.clone());
        let mut store = MemoryStore::new(1).with(&config.cpm.cpm_roi_location, data.clone());
        let summary = unmasked
            .process_event(&mut store, &mut HistogramBook::new())
            .unwrap();
        assert_eq!(summary.crate_mismatches[0], 1 << CpmSummaryError::RoIMismatch.bit());

        config.cpm.roi_threshold_mask = Some(0b0001);
        let mut masked = monitor_with(&config, sim);
        let mut store = MemoryStore::new(1).with(&config.cpm.cpm_roi_location, data);
        let summary = masked
            .process_event(&mut store, &mut HistogramBook::new())
            .unwrap();
        assert_eq!(summary.crate_mismatches, vec![0; CP_CRATES]);
    }

    #[test]
    fn test_hits_without_rois() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![]);
        let mut store = MemoryStore::new(12)
            .with::<CpmRoi>(&config.cpm.cpm_roi_location, vec![])
            .with(&config.cpm.cpm_hits_location, vec![CpmHits::new(1, 2, 1, 0)]);
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        let bit = CpmSummaryError::CPMHitsMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![0, 1u32 << bit, 0, 0]);
        assert_eq!(book.count(CPM_HITS_HISTS.data_only, 2, 1), 1);
        assert_eq!(book.count(SUMMARY_HISTS.summary, bit as i64, 0), 1);
        let run = monitor.run_summary();
        assert_eq!(run.mismatch_events(bit), 1);
        assert_eq!(run.sampled_events(bit), &[12]);
        assert_eq!(run.mismatch_count(CPM_MODULES + 1, bit), 1);
    }

    #[test]
    fn test_remote_sum_blames_source_crate() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![roi()]);
        let mut store = matching_event(1).with(
            &config.cpm.cmm_cp_hits_location,
            vec![
                CmmCpHits::new(0, 8, 1, 0),
                CmmCpHits::new(0, LOCAL, 1, 0),
                CmmCpHits::new(3, REMOTE_0, 2, 0),
                CmmCpHits::new(3, TOTAL, 1, 0),
            ],
        );
        let summary = monitor
            .process_event(&mut store, &mut HistogramBook::new())
            .unwrap();

        // The total is simulated from the corrupted remote sum, so it disagrees as well
        let remote = CpmSummaryError::RemoteSumMismatch.bit();
        let total = CpmSummaryError::TotalSumMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![1u32 << remote, 0, 0, 1 << total]);
        let run = monitor.run_summary();
        assert_eq!(run.mismatch_count(MODULE_LOCATIONS, remote), 1);
        assert_eq!(run.mismatch_count(MODULE_LOCATIONS + 3 * CMMS_PER_CRATE, total), 1);
        // Sums are not sampled
        assert!(run.sampled_events(remote).is_empty());
    }

    #[test]
    fn test_remote_sums_only() {
        let mut config = Config::default();
        config.compare_with_sim = false;
        let mut monitor = monitor_with(&config, vec![]);
        let mut store = matching_event(1).with(
            &config.cpm.cpm_tower_location,
            vec![CpmTower::new(ETA, PHI, 6, 2)],
        );
        let summary = monitor
            .process_event(&mut store, &mut HistogramBook::new())
            .unwrap();
        assert_eq!(summary.crate_mismatches, vec![0; CP_CRATES]);
        assert_eq!(summary.stages.len(), 1);
        assert_eq!(summary.stages[0].stage, "cmm_remote_sums");
    }

    #[test]
    fn test_empty_store_skips_every_stage() {
        let mut monitor = monitor_with(&Config::default(), vec![roi()]);
        let mut store = MemoryStore::new(3);
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        assert_eq!(summary.stages.len(), 8);
        assert!(summary
            .stages
            .iter()
            .all(|report| report.status == StageStatus::Skipped));
        assert_eq!(mismatch_vector(&store), vec![0; CP_CRATES]);
        assert!(book.is_empty());
        assert_eq!(monitor.run_summary().events(), 1);
    }

    #[test]
    fn test_repeatable_and_publishes_once() {
        let mut first = monitor_with(&Config::default(), vec![]);
        let mut second = monitor_with(&Config::default(), vec![]);
        let event = matching_event(7);

        let mut store = event.clone();
        let a = first.process_event(&mut store, &mut HistogramBook::new()).unwrap();
        let b = second
            .process_event(&mut event.clone(), &mut HistogramBook::new())
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.crate_mismatches, vec![0; CP_CRATES]);

        let again = first.process_event(&mut store, &mut HistogramBook::new());
        assert!(matches!(
            again,
            Err(MonitorError::PublishError(StoreError::DuplicateLocation(_)))
        ));
    }

    #[test]
    fn test_roi_keys_are_unique() {
        let mut keys = FxHashSet::default();
        for crate_id in 0..CP_CRATES {
            for cpm in 1..=CPM_MODULES {
                for chip in 0..CPM_CHIPS {
                    for location in 0..CPM_ROI_LOCATIONS {
                        let roi = CpmRoi::new(crate_id, cpm, chip, location, 1);
                        assert!(keys.insert(cpm_roi_key(&roi).unwrap()));
                    }
                }
            }
        }
        assert_eq!(cpm_roi_key(&CpmRoi::new(0, 0, 0, 0, 1)), None);
        assert_eq!(cpm_roi_key(&CpmRoi::new(0, 15, 0, 0, 1)), None);
        assert_eq!(cpm_roi_key(&CpmRoi::new(0, 1, CPM_CHIPS, 0, 1)), None);
        assert_eq!(cpm_roi_key(&CpmRoi::new(CP_CRATES, 1, 0, 0, 1)), None);
    }

    #[test]
    fn test_cmm_module_entry_without_cpm_hits() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![roi()]);
        // Crate 1 CMMs see CPM 3, which sent nothing; its sums are consistent
        let mut store = matching_event(5).with(
            &config.cpm.cmm_cp_hits_location,
            vec![
                CmmCpHits::new(0, 8, 1, 0),
                CmmCpHits::new(0, LOCAL, 1, 0),
                CmmCpHits::new(1, 3, 1, 0),
                CmmCpHits::new(1, LOCAL, 1, 0),
                CmmCpHits::new(3, REMOTE_0, 1, 0),
                CmmCpHits::new(3, REMOTE_1, 1, 0),
                CmmCpHits::new(3, TOTAL, 2, 0),
            ],
        );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        let bit = CpmSummaryError::CMMHitsMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![0, 1u32 << bit, 0, 0]);
        assert_eq!(book.count(CMM_HITS_HISTS.data_only, 3, 1), 1);
        assert_eq!(book.count(CMM_HITS_HISTS.matched, 8, 0), 1);
        let run = monitor.run_summary();
        assert_eq!(run.mismatch_count(CPM_MODULES + 2, bit), 1);
        assert_eq!(run.sampled_events(bit), &[5]);
    }

    #[test]
    fn test_cmm_module_hits_disagree() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![roi()]);
        // The CMM received multiplicity 2 from CPM 8, which sent 1; sums follow the CMM
        let mut store = matching_event(6).with(
            &config.cpm.cmm_cp_hits_location,
            vec![
                CmmCpHits::new(0, 8, 2, 0),
                CmmCpHits::new(0, LOCAL, 2, 0),
                CmmCpHits::new(3, REMOTE_0, 2, 0),
                CmmCpHits::new(3, TOTAL, 2, 0),
            ],
        );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        let bit = CpmSummaryError::CMMHitsMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![1u32 << bit, 0, 0, 0]);
        assert_eq!(book.count(CMM_HITS_HISTS.mismatched, 8, 0), 1);
        assert_eq!(monitor.run_summary().mismatch_count(CPM8_LOC, bit), 1);
    }

    #[test]
    fn test_local_sum_disagrees() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![roi()]);
        let mut store = matching_event(2).with(
            &config.cpm.cmm_cp_hits_location,
            vec![
                CmmCpHits::new(0, 8, 1, 0),
                CmmCpHits::new(0, LOCAL, 2, 0),
                CmmCpHits::new(3, REMOTE_0, 2, 0),
                CmmCpHits::new(3, TOTAL, 2, 0),
            ],
        );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        // Only the first hit word differs, so only CMM 0 of crate 0 is blamed
        let bit = CpmSummaryError::LocalSumMismatch.bit();
        assert_eq!(summary.crate_mismatches, vec![1u32 << bit, 0, 0, 0]);
        assert_eq!(book.count(LOCAL_HISTS.mismatched, 0, 0), 1);
        assert_eq!(book.entries(LOCAL_HISTS.data_only), 0);
        let run = monitor.run_summary();
        assert_eq!(run.mismatch_count(MODULE_LOCATIONS, bit), 1);
        assert_eq!(run.mismatch_count(MODULE_LOCATIONS + 1, bit), 0);
        assert!(run.sampled_events(bit).is_empty());
    }

    #[test]
    fn test_out_of_range_modules_are_not_keyed() {
        let config = Config::default();
        let mut monitor = monitor_with(&config, vec![CpmRoi::new(0, 1, 0, 0, 0b1)]);
        // A CPM 0 RoI or hit word would otherwise land on the key of CPM 1
        let mut store = MemoryStore::new(3)
            .with(
                &config.cpm.cpm_roi_location,
                vec![CpmRoi::new(0, 1, 0, 0, 0b1), CpmRoi::new(0, 0, 0, 0, 0b10)],
            )
            .with(
                &config.cpm.cpm_hits_location,
                vec![CpmHits::new(0, 1, 1, 0), CpmHits::new(0, 0, 2, 0)],
            );
        let mut book = HistogramBook::new();
        let summary = monitor.process_event(&mut store, &mut book).unwrap();

        assert_eq!(summary.crate_mismatches, vec![0; CP_CRATES]);
        assert_eq!(book.count(ROI_HISTS.matched, 0, 0), 1);
        assert_eq!(book.count(CPM_HITS_HISTS.matched, 1, 0), 1);
        assert_eq!(book.entries(ROI_HISTS.mismatched), 0);
        assert_eq!(book.entries(CPM_HITS_HISTS.mismatched), 0);
    }

    #[test]
    fn test_limited_roi_crates_are_bounded() {
        let header = |crate_id: usize, limited_roi_set: bool| RodHeader {
            crate_id,
            source_id: 0,
            limited_roi_set,
        };
        let headers = vec![header(usize::MAX, true), header(2, true), header(1, false)];
        let crates = limited_roi_crates(Some(headers.as_slice()), CP_CRATES);
        assert_eq!(crates.iter().collect::<Vec<usize>>(), vec![2]);
        assert!(limited_roi_crates(None, CP_CRATES).is_empty());
    }
}
