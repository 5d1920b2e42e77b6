use fxhash::FxHashMap;
use std::collections::BTreeMap;

use super::merge::Outcome;

/// Where the monitors send their fills. Booking and layout belong to the implementor.
pub trait HistogramSink {
    fn fill(&mut self, name: &str, bin: i64);
    fn fill_2d(&mut self, name: &str, x: i64, y: i64);
}

/// Histogram names of one comparison stage, one per classification outcome.
///
/// Ignore-listed entities that would otherwise count as a disagreement go to `ignored`.
#[derive(Debug, Clone, Copy)]
pub struct StageHists {
    pub matched: &'static str,
    pub mismatched: &'static str,
    pub sim_only: &'static str,
    pub data_only: &'static str,
    pub ignored: &'static str,
}

impl StageHists {
    pub fn name(&self, outcome: Outcome) -> &'static str {
        match outcome {
            Outcome::Match => self.matched,
            Outcome::Mismatch => self.mismatched,
            Outcome::SimOnly => self.sim_only,
            Outcome::DataOnly => self.data_only,
        }
    }

    /// Fill the histogram of a classified pair
    pub fn fill<H: HistogramSink + ?Sized>(&self, sink: &mut H, outcome: Outcome, x: i64, y: i64) {
        sink.fill_2d(self.name(outcome), x, y);
    }

    pub fn fill_ignored<H: HistogramSink + ?Sized>(&self, sink: &mut H, x: i64, y: i64) {
        sink.fill_2d(self.ignored, x, y);
    }
}

/// [`StageHists`] named `<prefix>_sim_eq_data`, `<prefix>_sim_ne_data` and so on
macro_rules! stage_hists {
    ($prefix:literal) => {
        $crate::histogram::StageHists {
            matched: concat!($prefix, "_sim_eq_data"),
            mismatched: concat!($prefix, "_sim_ne_data"),
            sim_only: concat!($prefix, "_sim_no_data"),
            data_only: concat!($prefix, "_data_no_sim"),
            ignored: concat!($prefix, "_ignored"),
        }
    };
}
pub(crate) use stage_hists;

/// In-memory counting sink. 1D fills are stored with `y = 0`.
#[derive(Debug, Clone, Default)]
pub struct HistogramBook {
    hists: FxHashMap<String, BTreeMap<(i64, i64), u64>>,
}

impl HistogramBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of one bin; unknown histograms and empty bins are zero
    pub fn count(&self, name: &str, x: i64, y: i64) -> u64 {
        self.hists
            .get(name)
            .and_then(|bins| bins.get(&(x, y)))
            .copied()
            .unwrap_or(0)
    }

    /// Sum over all bins of a histogram
    pub fn entries(&self, name: &str) -> u64 {
        self.hists
            .get(name)
            .map(|bins| bins.values().sum())
            .unwrap_or(0)
    }

    /// Entries of every filled histogram, ordered by name
    pub fn totals(&self) -> BTreeMap<String, u64> {
        self.hists
            .iter()
            .map(|(name, bins)| (name.clone(), bins.values().sum()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hists.is_empty()
    }
}

impl HistogramSink for HistogramBook {
    fn fill(&mut self, name: &str, bin: i64) {
        self.fill_2d(name, bin, 0);
    }

    fn fill_2d(&mut self, name: &str, x: i64, y: i64) {
        *self
            .hists
            .entry(name.to_string())
            .or_default()
            .entry((x, y))
            .or_insert(0) += 1;
    }
}
