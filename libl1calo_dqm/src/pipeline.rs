//! Per-event stage sequencing and run-level bookkeeping shared by the Sim-vs-BS monitors.
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use super::error::MonitorError;
use super::error_vector::ErrorVector;
use super::histogram::{HistogramSink, StageHists};
use super::merge::{Outcome, OutcomeCounts};

/// Position of an event in the comparison pipeline. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    TowersCompared,
    RoIsCompared,
    HitsCompared,
    CrateSumsCompared,
    SystemSumsCompared,
    Done,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::TowersCompared => "TowersCompared",
            Self::RoIsCompared => "RoIsCompared",
            Self::HitsCompared => "HitsCompared",
            Self::CrateSumsCompared => "CrateSumsCompared",
            Self::SystemSumsCompared => "SystemSumsCompared",
            Self::Done => "Done",
        }
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Compared(OutcomeCounts),
    /// The hardware collection of the stage was not in the store
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
}

/// One event's walk through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    state: PipelineState,
    reports: Vec<StageReport>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            reports: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Step forward. Steps may be skipped but never repeated or reversed.
    pub fn advance(&mut self, next: PipelineState) -> Result<(), MonitorError> {
        if next <= self.state {
            return Err(MonitorError::StageOutOfOrder(self.state.name(), next.name()));
        }
        self.state = next;
        Ok(())
    }

    pub fn record(&mut self, stage: &str, status: StageStatus) {
        if status == StageStatus::Skipped {
            spdlog::debug!("Stage {stage} skipped: hardware collection not found");
        }
        self.reports.push(StageReport {
            stage: stage.to_string(),
            status,
        });
    }

    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<StageReport> {
        self.reports
    }
}

/// Turns classified pairs of one stage into histogram fills, error bits and a tally
#[derive(Debug, Clone, Copy)]
pub struct StageRecorder {
    hists: StageHists,
    bit: usize,
    counts: OutcomeCounts,
}

impl StageRecorder {
    pub fn new(hists: StageHists, bit: usize) -> Self {
        Self {
            hists,
            bit,
            counts: OutcomeCounts::default(),
        }
    }

    /// One fill at `(x, y)` and the stage's bit at `location`
    pub fn record<H: HistogramSink + ?Sized>(
        &mut self,
        sink: &mut H,
        errors: &mut ErrorVector,
        outcome: Outcome,
        location: usize,
        (x, y): (i64, i64),
    ) {
        self.counts.add(outcome);
        self.hists.fill(sink, outcome, x, y);
        errors.record(location, self.bit, outcome);
    }

    /// As [`StageRecorder::record`], except that a disagreement on an ignore-listed entity
    /// goes to the ignored histogram and sets no bit
    pub fn record_ignorable<H: HistogramSink + ?Sized>(
        &mut self,
        sink: &mut H,
        errors: &mut ErrorVector,
        outcome: Outcome,
        ignored: bool,
        location: usize,
        (x, y): (i64, i64),
    ) {
        if ignored && !outcome.is_match() {
            self.counts.ignored += 1;
            self.hists.fill_ignored(sink, x, y);
        } else {
            self.record(sink, errors, outcome, location, (x, y));
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    pub fn status(&self) -> StageStatus {
        StageStatus::Compared(self.counts)
    }
}

/// A summary error category of a monitor. `bit` is its position in the error bitmasks.
pub trait SummaryCategory: Copy + PartialEq + 'static {
    const ALL: &'static [Self];
    /// Categories whose events are sampled into the mismatch-sample histogram
    const SAMPLED: &'static [Self];
    fn bit(self) -> usize;
    fn label(self) -> &'static str;
}

/// Names of the end-of-event histograms of one monitor
#[derive(Debug, Clone, Copy)]
pub struct SummaryHists {
    pub summary: &'static str,
    pub sample: &'static str,
    pub sim_eq_data: &'static str,
    pub sim_ne_data: &'static str,
}

/// Run-level state of one monitor: created at run start, updated once per event, read at
/// run end.
///
/// Locations are the module locations followed by the CMM locations.
#[derive(Debug, Clone)]
pub struct RunSummary {
    events: u64,
    labels: Vec<&'static str>,
    mismatch_events: Array1<u64>,
    match_table: Array2<u64>,
    mismatch_table: Array2<u64>,
    sampled_events: Vec<Vec<u64>>,
    max_sample_events: usize,
}

impl RunSummary {
    pub fn new<C: SummaryCategory>(n_locations: usize, max_sample_events: usize) -> Self {
        let n_bins = C::ALL.len();
        Self {
            events: 0,
            labels: C::ALL.iter().map(|c| c.label()).collect(),
            mismatch_events: Array1::zeros(n_bins),
            match_table: Array2::zeros((n_locations, n_bins)),
            mismatch_table: Array2::zeros((n_locations, n_bins)),
            sampled_events: vec![Vec::new(); n_bins],
            max_sample_events,
        }
    }

    /// End-of-event step: fill the summary, sample and location tables from the event's
    /// error vectors.
    ///
    /// A category counts once per event if any location of any vector had its mismatch bit.
    pub fn record_event<C, H>(
        &mut self,
        event_number: u64,
        vectors: &[&ErrorVector],
        hists: &SummaryHists,
        sink: &mut H,
    ) where
        C: SummaryCategory,
        H: HistogramSink + ?Sized,
    {
        self.events += 1;

        let mut offset = 0;
        for errors in vectors {
            for loc in 0..errors.len() {
                let row = offset + loc;
                for bit in errors.matches_at(loc) {
                    if let Some(count) = self.match_table.get_mut((row, bit)) {
                        *count += 1;
                    }
                    sink.fill_2d(hists.sim_eq_data, row as i64, bit as i64);
                }
                for bit in errors.mismatches_at(loc) {
                    if let Some(count) = self.mismatch_table.get_mut((row, bit)) {
                        *count += 1;
                    }
                    sink.fill_2d(hists.sim_ne_data, row as i64, bit as i64);
                }
            }
            offset += errors.len();
        }

        for category in C::ALL {
            let bit = category.bit();
            if !vectors.iter().any(|errors| errors.any_mismatch(bit)) {
                continue;
            }
            sink.fill(hists.summary, bit as i64);
            self.mismatch_events[bit] += 1;
            if C::SAMPLED.contains(category)
                && self.sampled_events[bit].len() < self.max_sample_events
            {
                self.sampled_events[bit].push(event_number);
                sink.fill_2d(hists.sample, event_number as i64, bit as i64);
            }
        }
    }

    pub fn events(&self) -> u64 {
        self.events
    }

    /// Number of events with a mismatch in the category at `bit`
    pub fn mismatch_events(&self, bit: usize) -> u64 {
        self.mismatch_events.get(bit).copied().unwrap_or(0)
    }

    pub fn sampled_events(&self, bit: usize) -> &[u64] {
        self.sampled_events
            .get(bit)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Events in which a location had a matching comparison in a category
    pub fn match_count(&self, location: usize, bit: usize) -> u64 {
        self.match_table.get((location, bit)).copied().unwrap_or(0)
    }

    /// Events in which a location had a disagreement in a category
    pub fn mismatch_count(&self, location: usize, bit: usize) -> u64 {
        self.mismatch_table.get((location, bit)).copied().unwrap_or(0)
    }

    /// Serializable digest for run reports
    pub fn report(&self) -> SummaryReport {
        let matches = self.match_table.sum_axis(Axis(0));
        let mismatches = self.mismatch_table.sum_axis(Axis(0));
        let categories = self
            .labels
            .iter()
            .enumerate()
            .map(|(bit, label)| {
                (
                    label.to_string(),
                    CategoryReport {
                        mismatch_events: self.mismatch_events[bit],
                        location_matches: matches[bit],
                        location_mismatches: mismatches[bit],
                        sampled_events: self.sampled_events[bit].clone(),
                    },
                )
            })
            .collect();
        SummaryReport {
            events: self.events,
            categories,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub mismatch_events: u64,
    pub location_matches: u64,
    pub location_mismatches: u64,
    pub sampled_events: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub events: u64,
    pub categories: BTreeMap<String, CategoryReport>,
}

/// What a monitor hands back for one processed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub event_number: u64,
    /// Per-crate OR of all mismatch bits, as published to the store
    pub crate_mismatches: Vec<u32>,
    pub stages: Vec<StageReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramBook;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestCategory {
        First,
        Second,
        Third,
    }

    impl SummaryCategory for TestCategory {
        const ALL: &'static [Self] = &[Self::First, Self::Second, Self::Third];
        const SAMPLED: &'static [Self] = &[Self::First, Self::Second];
        fn bit(self) -> usize {
            self as usize
        }
        fn label(self) -> &'static str {
            match self {
                Self::First => "First",
                Self::Second => "Second",
                Self::Third => "Third",
            }
        }
    }

    const HISTS: SummaryHists = SummaryHists {
        summary: "summary",
        sample: "sample",
        sim_eq_data: "eq",
        sim_ne_data: "ne",
    };

    #[test]
    fn test_pipeline_moves_forward() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        pipeline.advance(PipelineState::TowersCompared).unwrap();
        pipeline.advance(PipelineState::SystemSumsCompared).unwrap();
        assert!(pipeline.advance(PipelineState::RoIsCompared).is_err());
        assert!(pipeline.advance(PipelineState::SystemSumsCompared).is_err());
        pipeline.advance(PipelineState::Done).unwrap();
        pipeline.record("towers", StageStatus::Skipped);
        assert_eq!(pipeline.reports().len(), 1);
    }

    #[test]
    fn test_summary_counts_once_per_event() {
        let mut run = RunSummary::new::<TestCategory>(3, 10);
        let mut book = HistogramBook::new();
        let mut modules = ErrorVector::new(2);
        let mut cmms = ErrorVector::new(1);
        modules.set_mismatch(0, 1);
        modules.set_mismatch(1, 1);
        modules.set_match(1, 0);
        cmms.set_mismatch(0, 2);
        run.record_event::<TestCategory, _>(17, &[&modules, &cmms], &HISTS, &mut book);

        assert_eq!(run.events(), 1);
        assert_eq!(book.count("summary", 1, 0), 1);
        assert_eq!(book.count("summary", 2, 0), 1);
        assert_eq!(book.count("summary", 0, 0), 0);
        assert_eq!(run.mismatch_events(1), 1);
        assert_eq!(run.mismatch_count(2, 2), 1);
        assert_eq!(run.match_count(1, 0), 1);
        assert_eq!(book.count("ne", 2, 2), 1);
        // Third is not sampled
        assert_eq!(run.sampled_events(1), &[17]);
        assert!(run.sampled_events(2).is_empty());
        assert_eq!(book.count("sample", 17, 1), 1);
    }

    #[test]
    fn test_stage_recorder() {
        let hists = StageHists {
            matched: "eq",
            mismatched: "ne",
            sim_only: "sim_only",
            data_only: "data_only",
            ignored: "ignored",
        };
        let mut book = HistogramBook::new();
        let mut errors = ErrorVector::new(4);
        let mut recorder = StageRecorder::new(hists, 3);
        recorder.record(&mut book, &mut errors, Outcome::Match, 0, (1, 1));
        recorder.record_ignorable(&mut book, &mut errors, Outcome::Mismatch, true, 1, (2, 2));
        recorder.record_ignorable(&mut book, &mut errors, Outcome::Match, true, 2, (3, 3));
        recorder.record_ignorable(&mut book, &mut errors, Outcome::DataOnly, false, 3, (4, 4));

        assert_eq!(errors.match_bits(), &[0b1000, 0, 0b1000, 0]);
        assert_eq!(errors.mismatch_bits(), &[0, 0, 0, 0b1000]);
        assert_eq!(book.count("ignored", 2, 2), 1);
        assert_eq!(book.entries("ne"), 0);
        assert_eq!(book.count("data_only", 4, 4), 1);
        let counts = recorder.counts();
        assert_eq!((counts.matched, counts.ignored, counts.data_only), (2, 1, 1));
    }

    #[test]
    fn test_sample_bound() {
        let mut run = RunSummary::new::<TestCategory>(1, 2);
        let mut book = HistogramBook::new();
        let mut errors = ErrorVector::new(1);
        errors.set_mismatch(0, 0);
        for event in 0..5 {
            run.record_event::<TestCategory, _>(event, &[&errors], &HISTS, &mut book);
        }
        assert_eq!(run.mismatch_events(0), 5);
        assert_eq!(run.sampled_events(0), &[0, 1]);
        assert_eq!(book.entries("sample"), 2);
        let report = run.report();
        assert_eq!(report.events, 5);
        assert_eq!(report.categories["First"].location_mismatches, 5);
    }
}
