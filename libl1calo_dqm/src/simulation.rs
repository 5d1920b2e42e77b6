//! Per-stage simulation strategies.
//!
//! A stage simulator turns the hardware collection of the previous pipeline stage into
//! the collection the hardware of this stage should have produced. Any `Fn(&[I]) -> Vec<O>`
//! is a simulator. The arithmetic stages (tower and element building, hit counting, CMM
//! sums, Et maps) come with reference implementations here; RoI finding is always
//! supplied by the caller.
use std::collections::BTreeMap;

use super::constants::*;
use super::cp_entities::{cmm_cp_data_id, CmmCpHits, CpmHits, CpmRoi, CpmTower, TriggerTower};
use super::hit_word::{add_multiplicities, count_roi_hits, threshold_bits};
use super::jep_entities::{
    cmm_energy_data_id, cmm_jet_data_id, CmmEtSums, CmmJetHits, CmmRoi, JemEtSums, JemHits,
    JemRoi, JetElement,
};
use super::key_map::{jem_element_location, CP_TOWER_GRID, JET_ELEMENT_GRID};

pub trait StageSimulator<I, O> {
    fn simulate(&self, input: &[I]) -> Vec<O>;
}

impl<I, O, F> StageSimulator<I, O> for F
where
    F: Fn(&[I]) -> Vec<O>,
{
    fn simulate(&self, input: &[I]) -> Vec<O> {
        self(input)
    }
}

pub type BoxedSimulator<I, O> = Box<dyn StageSimulator<I, O> + Send>;

/// Simulation strategies of the CP pipeline, one per stage
pub struct CpSimulators {
    pub towers: BoxedSimulator<TriggerTower, CpmTower>,
    pub rois: BoxedSimulator<CpmTower, CpmRoi>,
    pub hits: BoxedSimulator<CpmRoi, CpmHits>,
    pub local_sums: BoxedSimulator<CmmCpHits, CmmCpHits>,
    pub remote_sums: BoxedSimulator<CmmCpHits, CmmCpHits>,
    pub total_sums: BoxedSimulator<CmmCpHits, CmmCpHits>,
}

impl CpSimulators {
    /// Reference implementations for every stage but RoI finding
    pub fn new<R>(roi_finder: R) -> Self
    where
        R: StageSimulator<CpmTower, CpmRoi> + Send + 'static,
    {
        Self {
            towers: Box::new(cpm_towers_from_trigger_towers),
            rois: Box::new(roi_finder),
            hits: Box::new(cpm_hits_from_rois),
            local_sums: Box::new(cmm_cp_local_sums),
            remote_sums: Box::new(cmm_cp_remote_sums),
            total_sums: Box::new(cmm_cp_total_sums),
        }
    }
}

/// Simulation strategies of the JEP pipeline, one per stage
pub struct JepSimulators {
    pub elements: BoxedSimulator<TriggerTower, JetElement>,
    pub rois: BoxedSimulator<JetElement, JemRoi>,
    pub hits: BoxedSimulator<JemRoi, JemHits>,
    pub energy: BoxedSimulator<JetElement, JemEtSums>,
    pub jet_local_sums: BoxedSimulator<CmmJetHits, CmmJetHits>,
    pub jet_remote_sums: BoxedSimulator<CmmJetHits, CmmJetHits>,
    pub jet_total_sums: BoxedSimulator<CmmJetHits, CmmJetHits>,
    pub energy_local_sums: BoxedSimulator<CmmEtSums, CmmEtSums>,
    pub energy_remote_sums: BoxedSimulator<CmmEtSums, CmmEtSums>,
    pub energy_total_sums: BoxedSimulator<CmmEtSums, CmmEtSums>,
    pub et_maps: BoxedSimulator<CmmEtSums, CmmEtSums>,
    pub energy_roi: BoxedSimulator<CmmEtSums, CmmRoi>,
}

impl JepSimulators {
    /// Reference implementations for every stage but jet finding
    pub fn new<R>(roi_finder: R, et_maps: EtMapSimulator) -> Self
    where
        R: StageSimulator<JetElement, JemRoi> + Send + 'static,
    {
        Self {
            elements: Box::new(jet_elements_from_trigger_towers),
            rois: Box::new(roi_finder),
            hits: Box::new(jem_hits_from_rois),
            energy: Box::new(jem_et_sums_from_elements),
            jet_local_sums: Box::new(cmm_jet_local_sums),
            jet_remote_sums: Box::new(cmm_jet_remote_sums),
            jet_total_sums: Box::new(cmm_jet_total_sums),
            energy_local_sums: Box::new(cmm_energy_local_sums),
            energy_remote_sums: Box::new(cmm_energy_remote_sums),
            energy_total_sums: Box::new(cmm_energy_total_sums),
            et_maps: Box::new(et_maps),
            energy_roi: Box::new(cmm_energy_roi),
        }
    }
}

// CP reference stages

/// CPM towers carry the CP energies of the trigger towers inside the CP eta coverage
pub fn cpm_towers_from_trigger_towers(towers: &[TriggerTower]) -> Vec<CpmTower> {
    towers
        .iter()
        .filter(|tt| CP_TOWER_GRID.contains(tt.eta))
        .filter(|tt| tt.cp_em_energy != 0 || tt.cp_had_energy != 0)
        .map(|tt| CpmTower::new(tt.eta, tt.phi, tt.cp_em_energy, tt.cp_had_energy))
        .collect()
}

/// Count RoI threshold bits into per-CPM multiplicities.
///
/// The low byte of an RoI feeds hit word 0, the high byte hit word 1.
pub fn cpm_hits_from_rois(rois: &[CpmRoi]) -> Vec<CpmHits> {
    let mut words: BTreeMap<(usize, usize), (u32, u32)> = BTreeMap::new();
    for roi in rois {
        let (w0, w1) = words.entry((roi.crate_id, roi.cpm)).or_default();
        *w0 = count_roi_hits(*w0, roi.hits, 0, CP_THRESHOLDS_PER_WORD);
        *w1 = count_roi_hits(*w1, roi.hits, CP_THRESHOLDS_PER_WORD, CP_THRESHOLDS_PER_WORD);
    }
    words
        .into_iter()
        .map(|((crate_id, module), (w0, w1))| CpmHits::new(crate_id, module, w0, w1))
        .collect()
}

fn add_cp_words(lhs: (u32, u32), rhs: &CmmCpHits) -> (u32, u32) {
    (
        add_multiplicities(lhs.0, rhs.hit_word0(), CP_THRESHOLDS_PER_WORD),
        add_multiplicities(lhs.1, rhs.hit_word1(), CP_THRESHOLDS_PER_WORD),
    )
}

/// Crate sums of the module hits received by each crate's CMMs
pub fn cmm_cp_local_sums(cmm: &[CmmCpHits]) -> Vec<CmmCpHits> {
    let mut sums: BTreeMap<usize, (u32, u32)> = BTreeMap::new();
    for entry in cmm.iter().filter(|e| (1..=CPM_MODULES).contains(&e.data_id)) {
        let sum = sums.entry(entry.crate_id).or_default();
        *sum = add_cp_words(*sum, entry);
    }
    sums.into_iter()
        .map(|(crate_id, (w0, w1))| CmmCpHits::new(crate_id, cmm_cp_data_id::LOCAL, w0, w1))
        .collect()
}

/// What the system CMMs should receive over the remote cables: every other crate's local sum
pub fn cmm_cp_remote_sums(cmm: &[CmmCpHits]) -> Vec<CmmCpHits> {
    cmm.iter()
        .filter(|e| e.data_id == cmm_cp_data_id::LOCAL)
        .filter(|e| e.crate_id < CP_CRATES && e.crate_id != CP_SYSTEM_CRATE)
        .map(|e| {
            CmmCpHits::new(
                CP_SYSTEM_CRATE,
                cmm_cp_data_id::REMOTE_0 + e.crate_id,
                e.hit_word0(),
                e.hit_word1(),
            )
        })
        .collect()
}

/// System total: local sum of the system crate plus the remote sums
pub fn cmm_cp_total_sums(cmm: &[CmmCpHits]) -> Vec<CmmCpHits> {
    let inputs: Vec<&CmmCpHits> = cmm
        .iter()
        .filter(|e| e.crate_id == CP_SYSTEM_CRATE)
        .filter(|e| {
            (cmm_cp_data_id::REMOTE_0..=cmm_cp_data_id::REMOTE_2).contains(&e.data_id)
                || e.data_id == cmm_cp_data_id::LOCAL
        })
        .collect();
    if inputs.is_empty() {
        return vec![];
    }
    let (w0, w1) = inputs.into_iter().fold((0, 0), add_cp_words);
    vec![CmmCpHits::new(CP_SYSTEM_CRATE, cmm_cp_data_id::TOTAL, w0, w1)]
}

// JEP reference stages

/// Sum the JEP energies of trigger towers into jet elements, saturating each layer
pub fn jet_elements_from_trigger_towers(towers: &[TriggerTower]) -> Vec<JetElement> {
    let mut sums: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    let mut centres: BTreeMap<u32, (f64, f64)> = BTreeMap::new();
    for tt in towers
        .iter()
        .filter(|tt| tt.jep_em_energy != 0 || tt.jep_had_energy != 0)
    {
        let key = JET_ELEMENT_GRID.key(tt.eta, tt.phi);
        let (em, had) = sums.entry(key).or_default();
        *em = em.saturating_add(tt.jep_em_energy).min(JET_ELEMENT_MAX_ENERGY);
        *had = had.saturating_add(tt.jep_had_energy).min(JET_ELEMENT_MAX_ENERGY);
        centres
            .entry(key)
            .or_insert_with(|| JET_ELEMENT_GRID.centre(tt.eta, tt.phi));
    }
    sums.into_iter()
        .filter_map(|(key, (em, had))| {
            let (eta, phi) = centres.get(&key)?;
            Some(JetElement::new(*eta, *phi, em, had))
        })
        .collect()
}

/// Count main jet threshold bits of the RoIs into per-JEM multiplicities
pub fn jem_hits_from_rois(rois: &[JemRoi]) -> Vec<JemHits> {
    let mut words: BTreeMap<(usize, usize), u32> = BTreeMap::new();
    for roi in rois {
        let word = words.entry((roi.crate_id, roi.jem)).or_default();
        *word = count_roi_hits(*word, roi.hits, 0, JET_THRESHOLDS);
    }
    words
        .into_iter()
        .map(|((crate_id, module), word)| JemHits::new(crate_id, module, word))
        .collect()
}

/// Per-JEM Ex, Ey and scalar Et of the jet elements it processes.
///
/// Float to int casts saturate, and so does the accumulation.
pub fn jem_et_sums_from_elements(elements: &[JetElement]) -> Vec<JemEtSums> {
    let mut sums: BTreeMap<(usize, usize), [i32; 3]> = BTreeMap::new();
    for element in elements.iter().filter(|e| e.energy() != 0) {
        let et = element.energy() as f64;
        let (_, phi) = JET_ELEMENT_GRID.centre(element.eta, element.phi);
        let sum = sums
            .entry(jem_element_location(element.eta, element.phi))
            .or_default();
        let element_sums = [
            (et * phi.cos()).round() as i32,
            (et * phi.sin()).round() as i32,
            et as i32,
        ];
        *sum = add_sums(*sum, element_sums);
    }
    sums.into_iter()
        .map(|((crate_id, module), [ex, ey, et])| JemEtSums::new(crate_id, module, ex, ey, et))
        .collect()
}

pub fn cmm_jet_local_sums(cmm: &[CmmJetHits]) -> Vec<CmmJetHits> {
    let mut sums: BTreeMap<usize, u32> = BTreeMap::new();
    for entry in cmm.iter().filter(|e| e.data_id < JEM_MODULES) {
        let sum = sums.entry(entry.crate_id).or_default();
        *sum = add_multiplicities(*sum, entry.hits(), JET_THRESHOLDS);
    }
    sums.into_iter()
        .map(|(crate_id, hits)| CmmJetHits::new(crate_id, cmm_jet_data_id::LOCAL, hits))
        .collect()
}

pub fn cmm_jet_remote_sums(cmm: &[CmmJetHits]) -> Vec<CmmJetHits> {
    cmm.iter()
        .filter(|e| e.data_id == cmm_jet_data_id::LOCAL && e.crate_id != JEP_SYSTEM_CRATE)
        .map(|e| CmmJetHits::new(JEP_SYSTEM_CRATE, cmm_jet_data_id::REMOTE, e.hits()))
        .collect()
}

pub fn cmm_jet_total_sums(cmm: &[CmmJetHits]) -> Vec<CmmJetHits> {
    let inputs: Vec<u32> = cmm
        .iter()
        .filter(|e| e.crate_id == JEP_SYSTEM_CRATE)
        .filter(|e| e.data_id == cmm_jet_data_id::LOCAL || e.data_id == cmm_jet_data_id::REMOTE)
        .map(|e| e.hits())
        .collect();
    if inputs.is_empty() {
        return vec![];
    }
    let total = inputs
        .into_iter()
        .fold(0, |acc, hits| add_multiplicities(acc, hits, JET_THRESHOLDS));
    vec![CmmJetHits::new(JEP_SYSTEM_CRATE, cmm_jet_data_id::TOTAL, total)]
}

/// Component-wise Ex, Ey, Et sum, saturating on corrupt readout
fn add_sums(lhs: [i32; 3], rhs: [i32; 3]) -> [i32; 3] {
    [
        lhs[0].saturating_add(rhs[0]),
        lhs[1].saturating_add(rhs[1]),
        lhs[2].saturating_add(rhs[2]),
    ]
}

pub fn cmm_energy_local_sums(cmm: &[CmmEtSums]) -> Vec<CmmEtSums> {
    let mut sums: BTreeMap<usize, [i32; 3]> = BTreeMap::new();
    for entry in cmm.iter().filter(|e| e.data_id < JEM_MODULES) {
        let sum = sums.entry(entry.crate_id).or_default();
        *sum = add_sums(*sum, entry.sums());
    }
    sums.into_iter()
        .map(|(crate_id, [ex, ey, et])| {
            CmmEtSums::new(crate_id, cmm_energy_data_id::LOCAL, ex, ey, et)
        })
        .collect()
}

pub fn cmm_energy_remote_sums(cmm: &[CmmEtSums]) -> Vec<CmmEtSums> {
    cmm.iter()
        .filter(|e| e.data_id == cmm_energy_data_id::LOCAL && e.crate_id != JEP_SYSTEM_CRATE)
        .map(|e| {
            let [ex, ey, et] = e.sums();
            CmmEtSums::new(JEP_SYSTEM_CRATE, cmm_energy_data_id::REMOTE, ex, ey, et)
        })
        .collect()
}

pub fn cmm_energy_total_sums(cmm: &[CmmEtSums]) -> Vec<CmmEtSums> {
    let inputs: Vec<[i32; 3]> = cmm
        .iter()
        .filter(|e| e.crate_id == JEP_SYSTEM_CRATE)
        .filter(|e| {
            e.data_id == cmm_energy_data_id::LOCAL || e.data_id == cmm_energy_data_id::REMOTE
        })
        .map(|e| e.sums())
        .collect();
    if inputs.is_empty() {
        return vec![];
    }
    let [ex, ey, et] = inputs.into_iter().fold([0; 3], add_sums);
    vec![CmmEtSums::new(
        JEP_SYSTEM_CRATE,
        cmm_energy_data_id::TOTAL,
        ex,
        ey,
        et,
    )]
}

/// Sum-Et and missing-Et threshold maps from the system total
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtMapSimulator {
    pub sum_et_thresholds: Vec<u32>,
    pub missing_et_thresholds: Vec<u32>,
}

impl EtMapSimulator {
    pub fn new(sum_et_thresholds: Vec<u32>, missing_et_thresholds: Vec<u32>) -> Self {
        Self {
            sum_et_thresholds,
            missing_et_thresholds,
        }
    }
}

impl StageSimulator<CmmEtSums, CmmEtSums> for EtMapSimulator {
    fn simulate(&self, input: &[CmmEtSums]) -> Vec<CmmEtSums> {
        let total = input
            .iter()
            .find(|e| e.crate_id == JEP_SYSTEM_CRATE && e.data_id == cmm_energy_data_id::TOTAL);
        let Some(total) = total else {
            return vec![];
        };
        let [ex, ey, et] = total.sums();
        let missing_sq = (ex as i64).pow(2) + (ey as i64).pow(2);
        let sum_hits = threshold_bits(&self.sum_et_thresholds, |thr| (et as i64) > (thr as i64));
        let missing_hits =
            threshold_bits(&self.missing_et_thresholds, |thr| missing_sq > (thr as i64).pow(2));
        vec![
            CmmEtSums::new(
                JEP_SYSTEM_CRATE,
                cmm_energy_data_id::SUM_ET_MAP,
                0,
                0,
                sum_hits as i32,
            ),
            CmmEtSums::new(
                JEP_SYSTEM_CRATE,
                cmm_energy_data_id::MISSING_ET_MAP,
                0,
                0,
                missing_hits as i32,
            ),
        ]
    }
}

/// Energy RoI the system CMM should send: the system total and both Et maps
pub fn cmm_energy_roi(cmm: &[CmmEtSums]) -> Vec<CmmRoi> {
    let system = |data_id: usize| {
        cmm.iter()
            .find(|e| e.crate_id == JEP_SYSTEM_CRATE && e.data_id == data_id)
    };
    let Some(total) = system(cmm_energy_data_id::TOTAL) else {
        return vec![];
    };
    let [ex, ey, et] = total.sums();
    let hits = |data_id: usize| system(data_id).map_or(0, |e| e.et() as u32);
    vec![CmmRoi {
        ex,
        ey,
        et,
        sum_et_hits: hits(cmm_energy_data_id::SUM_ET_MAP),
        missing_et_hits: hits(cmm_energy_data_id::MISSING_ET_MAP),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit_word::multiplicity;

    #[test]
    fn test_closure_is_simulator() {
        let finder = |towers: &[CpmTower]| -> Vec<CpmRoi> {
            towers
                .iter()
                .map(|_| CpmRoi::new(0, 1, 0, 0, 1))
                .collect()
        };
        let sims = CpSimulators::new(finder);
        let towers = vec![CpmTower::new(0.05, 0.05, 3, 0)];
        assert_eq!(sims.rois.simulate(&towers).len(), 1);
    }

    #[test]
    fn test_cpm_towers_cover_cp_eta_only() {
        let towers = vec![
            TriggerTower {
                eta: 0.05,
                phi: 0.05,
                cp_em_energy: 4,
                ..Default::default()
            },
            TriggerTower {
                eta: 3.05,
                phi: 0.05,
                cp_em_energy: 4,
                ..Default::default()
            },
            TriggerTower {
                eta: 1.05,
                phi: 0.05,
                ..Default::default()
            },
        ];
        let cpm = cpm_towers_from_trigger_towers(&towers);
        assert_eq!(cpm.len(), 1);
        assert_eq!(cpm[0].em_energy(), 4);
    }

    #[test]
    fn test_cpm_hits_from_rois() {
        let rois = vec![
            CpmRoi::new(1, 4, 0, 0, 0x0101),
            CpmRoi::new(1, 4, 3, 2, 0x0001),
            CpmRoi::new(2, 9, 0, 1, 0x8000),
        ];
        let hits = cpm_hits_from_rois(&rois);
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].crate_id, hits[0].module), (1, 4));
        assert_eq!(multiplicity(hits[0].hit_word0(), 0), 2);
        assert_eq!(multiplicity(hits[0].hit_word1(), 0), 1);
        assert_eq!(multiplicity(hits[1].hit_word1(), 7), 1);
    }

    #[test]
    fn test_cp_sums() {
        let cmm = vec![
            CmmCpHits::new(0, 1, 0b001, 0),
            CmmCpHits::new(0, 2, 0b010, 0b001),
            CmmCpHits::new(0, cmm_cp_data_id::LOCAL, 0b011, 0b001),
            CmmCpHits::new(3, 5, 0b001, 0),
            CmmCpHits::new(3, cmm_cp_data_id::LOCAL, 0b001, 0),
            CmmCpHits::new(3, cmm_cp_data_id::REMOTE_0, 0b011, 0b001),
        ];
        let local = cmm_cp_local_sums(&cmm);
        assert_eq!(local.len(), 2);
        assert_eq!(local[0].hit_word0(), 0b011);
        assert_eq!(local[0].hit_word1(), 0b001);

        let remote = cmm_cp_remote_sums(&cmm);
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].crate_id, CP_SYSTEM_CRATE);
        assert_eq!(remote[0].data_id, cmm_cp_data_id::REMOTE_0);

        let total = cmm_cp_total_sums(&cmm);
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].hit_word0(), 0b100);
        assert_eq!(total[0].hit_word1(), 0b001);
        assert!(cmm_cp_total_sums(&cmm[..3]).is_empty());
    }

    #[test]
    fn test_jet_elements_sum_towers() {
        let tt = |eta: f64, phi: f64, em: u32, had: u32| TriggerTower {
            eta,
            phi,
            jep_em_energy: em,
            jep_had_energy: had,
            ..Default::default()
        };
        let towers = vec![
            tt(0.05, 0.05, 2, 1),
            tt(0.15, 0.05, 3, 0),
            tt(0.25, 0.05, 1000, 0),
            tt(0.35, 0.05, 100, 0),
        ];
        let elements = jet_elements_from_trigger_towers(&towers);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].em_energy(), 5);
        assert_eq!(elements[0].had_energy(), 1);
        assert_eq!(elements[1].em_energy(), JET_ELEMENT_MAX_ENERGY);
    }

    #[test]
    fn test_jem_energy_sums() {
        // Phi bin 0 centre is close to 0, so Ey stays small
        let elements = vec![
            JetElement::new(0.1, 0.05, 10, 0),
            JetElement::new(0.3, 0.05, 0, 20),
        ];
        let sums = jem_et_sums_from_elements(&elements);
        assert_eq!(sums.len(), 1);
        let [ex, ey, et] = sums[0].sums();
        assert_eq!(et, 30);
        assert_eq!(ex, 10 + 20);
        assert_eq!(ey, 1 + 2);
    }

    #[test]
    fn test_jep_sums_and_maps() {
        let jets = vec![
            CmmJetHits::new(0, 3, 0b001),
            CmmJetHits::new(0, 4, 0b001),
            CmmJetHits::new(0, cmm_jet_data_id::LOCAL, 0b010),
            CmmJetHits::new(1, cmm_jet_data_id::LOCAL, 0b001),
            CmmJetHits::new(1, cmm_jet_data_id::REMOTE, 0b010),
        ];
        assert_eq!(cmm_jet_local_sums(&jets)[0].hits(), 0b010);
        assert_eq!(cmm_jet_remote_sums(&jets)[0].hits(), 0b010);
        assert_eq!(cmm_jet_total_sums(&jets)[0].hits(), 0b011);

        let energy = vec![
            CmmEtSums::new(0, 2, 5, -5, 10),
            CmmEtSums::new(0, 9, 1, 1, 2),
            CmmEtSums::new(0, cmm_energy_data_id::LOCAL, 6, -4, 12),
            CmmEtSums::new(1, cmm_energy_data_id::LOCAL, 30, 40, 80),
            CmmEtSums::new(1, cmm_energy_data_id::REMOTE, 6, -4, 12),
        ];
        assert_eq!(cmm_energy_local_sums(&energy)[0].sums(), [6, -4, 12]);
        assert_eq!(cmm_energy_remote_sums(&energy)[0].sums(), [6, -4, 12]);
        let total = cmm_energy_total_sums(&energy);
        assert_eq!(total[0].sums(), [36, 36, 92]);

        let maps = EtMapSimulator::new(vec![50, 90, 100], vec![10, 50, 60]).simulate(&total);
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].data_id, cmm_energy_data_id::SUM_ET_MAP);
        assert_eq!(maps[0].et(), 0b011);
        // |(36, 36)| is about 50.9
        assert_eq!(maps[1].et(), 0b011);

        let mut with_maps = total.clone();
        with_maps.extend(maps);
        let roi = cmm_energy_roi(&with_maps);
        assert_eq!(roi[0].payload(), [36, 36, 92, 0b011, 0b011]);
        assert!(cmm_energy_roi(&energy[..2]).is_empty());
    }

    #[test]
    fn test_corrupt_readout_saturates() {
        let energy = vec![
            CmmEtSums::new(0, 1, i32::MIN, 0, i32::MAX),
            CmmEtSums::new(0, 2, -1, 0, 1),
            CmmEtSums::new(0, cmm_energy_data_id::LOCAL, 0, 0, i32::MAX),
            CmmEtSums::new(1, cmm_energy_data_id::LOCAL, 0, 0, 1),
            CmmEtSums::new(1, cmm_energy_data_id::REMOTE, 0, 0, i32::MAX),
        ];
        assert_eq!(cmm_energy_local_sums(&energy)[0].sums(), [i32::MIN, 0, i32::MAX]);
        assert_eq!(cmm_energy_total_sums(&energy)[0].sums(), [0, 0, i32::MAX]);

        let element = JetElement::new(0.1, 0.05, u32::MAX, 1);
        assert_eq!(element.energy(), u32::MAX);
        let sums = jem_et_sums_from_elements(&[element.clone(), element]);
        assert_eq!(sums.len(), 1);
        assert_eq!(sums[0].sums()[2], i32::MAX);

        let tt = TriggerTower {
            eta: 0.05,
            phi: 0.05,
            jep_em_energy: u32::MAX,
            ..Default::default()
        };
        let elements = jet_elements_from_trigger_towers(&[tt.clone(), tt]);
        assert_eq!(elements[0].em_energy(), JET_ELEMENT_MAX_ENERGY);

        let cp = vec![CmmCpHits::new(usize::MAX, cmm_cp_data_id::LOCAL, 1, 0)];
        assert!(cmm_cp_remote_sums(&cp).is_empty());
    }
}
