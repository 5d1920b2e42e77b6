use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::mpsc::Sender;

use super::config::Config;
use super::cp_entities::{CpmRoi, CpmTower};
use super::cpm_monitor::CpmSimBsMonitor;
use super::error::{ProcessorError, RunFileError};
use super::histogram::HistogramBook;
use super::jep_entities::{JemRoi, JetElement};
use super::jep_monitor::JepSimBsMonitor;
use super::pipeline::SummaryReport;
use super::simulation::{BoxedSimulator, CpSimulators};
use super::store::{retrieve, MemoryStore, StoreEntity};
use super::worker_status::{WorkerPhase, WorkerStatus};

/// Everything a run leaves behind: both monitors' run summaries and the histogram totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_number: i32,
    pub events: u64,
    pub cpm_events_with_mismatch: u64,
    pub jep_events_with_mismatch: u64,
    pub cpm: SummaryReport,
    pub jep: SummaryReport,
    pub histograms: BTreeMap<String, u64>,
}

/// A run file is a YAML list of event records
pub fn read_run_file(path: &Path) -> Result<Vec<MemoryStore>, RunFileError> {
    if !path.exists() {
        return Err(RunFileError::BadFilePath(path.to_path_buf()));
    }
    let yaml_str = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str::<Vec<MemoryStore>>(&yaml_str)?)
}

/// RoI finding is not simulated here: the RoIs the offline finder stored with the event
/// are handed back whatever the input
fn replay_rois<I, O>(event: &MemoryStore, location: &str) -> BoxedSimulator<I, O>
where
    I: 'static,
    O: StoreEntity + Clone + Send + 'static,
{
    let rois = retrieve::<O, _>(event, location)
        .map(|rois| rois.to_vec())
        .unwrap_or_default();
    Box::new(move |_: &[I]| rois.clone())
}

/// The main loop of l1calo_dqm.
///
/// Replays every event of a run through both monitors and writes the run report.
pub fn process_run(
    config: &Config,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<RunReport, ProcessorError> {
    let run_path = config.get_run_file(run_number)?;
    let report_path = config.get_report_file(run_number)?;

    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        WorkerPhase::Loading,
    ))?;
    let events = read_run_file(&run_path)?;
    spdlog::info!("Loaded {} events from {}", events.len(), run_path.display());

    // Finders are swapped for the replayed RoIs of each event
    let no_cp_rois = |_: &[CpmTower]| Vec::<CpmRoi>::new();
    let no_jets = |_: &[JetElement]| Vec::<JemRoi>::new();
    let mut cpm = CpmSimBsMonitor::new(config, CpSimulators::new(no_cp_rois));
    let mut jep = JepSimBsMonitor::with_roi_finder(config, no_jets);
    let mut book = HistogramBook::new();
    let mut report = RunReport {
        run_number,
        ..Default::default()
    };

    let total_events = events.len();
    let flush_frac: f32 = 0.01;
    let flush_val = ((total_events as f32 * flush_frac) as usize).max(1);
    let mut count = 0;
    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        WorkerPhase::Monitoring,
    ))?;
    for (idx, mut event) in events.into_iter().enumerate() {
        cpm.set_roi_finder(replay_rois::<CpmTower, CpmRoi>(
            &event,
            &config.cpm.sim_roi_location,
        ));
        jep.set_roi_finder(replay_rois::<JetElement, JemRoi>(
            &event,
            &config.jep.sim_roi_location,
        ));

        let cpm_summary = cpm.process_event(&mut event, &mut book)?;
        let jep_summary = jep.process_event(&mut event, &mut book)?;
        if cpm_summary.crate_mismatches.iter().any(|word| *word != 0) {
            report.cpm_events_with_mismatch += 1;
            spdlog::debug!(
                "Event {}: CP crate mismatches {:?}",
                event.event_number,
                cpm_summary.crate_mismatches
            );
        }
        if jep_summary.crate_mismatches.iter().any(|word| *word != 0) {
            report.jep_events_with_mismatch += 1;
            spdlog::debug!(
                "Event {}: JEP crate mismatches {:?}",
                event.event_number,
                jep_summary.crate_mismatches
            );
        }

        count += 1;
        if count >= flush_val {
            count = 0;
            tx.send(WorkerStatus::new(
                (idx + 1) as f32 / total_events as f32,
                run_number,
                *worker_id,
                WorkerPhase::Monitoring,
            ))?;
        }
    }

    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        WorkerPhase::Reporting,
    ))?;
    report.events = total_events as u64;
    report.cpm = cpm.run_summary().report();
    report.jep = jep.run_summary().report();
    report.histograms = book.totals();
    serde_yaml::to_writer(File::create(&report_path)?, &report)?;
    spdlog::info!(
        "Run {run_number}: {} events, {} with CP mismatches, {} with JEP mismatches",
        report.events,
        report.cpm_events_with_mismatch,
        report.jep_events_with_mismatch
    );

    Ok(report)
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    for run in subset {
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            process_run(&config, run, &tx, &worker_id)?;
            spdlog::info!("Finished processing run {}.", run);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CpmConfig;
    use crate::error::ConfigError;
    use std::path::PathBuf;
    use std::sync::mpsc;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("l1calo_dqm_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_create_subsets() {
        let config = Config {
            first_run_number: 1,
            last_run_number: 5,
            n_threads: 2,
            ..Default::default()
        };
        assert_eq!(create_subsets(&config), vec![vec![1, 3, 5], vec![2, 4]]);

        let config = Config {
            first_run_number: 1,
            last_run_number: 1,
            n_threads: 3,
            ..Default::default()
        };
        let subsets = create_subsets(&config);
        assert_eq!(subsets.len(), 3);
        assert_eq!(subsets.iter().filter(|s| s.is_empty()).count(), 2);
    }

    #[test]
    fn test_missing_run_file() {
        let (tx, _rx) = mpsc::channel();
        let result = process_run(&Config::default(), 1, &tx, &0);
        assert!(matches!(
            result,
            Err(ProcessorError::ConfigError(ConfigError::BadFilePath(_)))
        ));
        assert!(read_run_file(Path::new("/not/a/run_0001.yml")).is_err());
    }

    #[test]
    fn test_replay_run() {
        let dir = scratch_dir("replay");
        let cpm = CpmConfig::default();
        let roi = CpmRoi::new(1, 3, 2, 1, 0b11);
        // The offline finder agrees with the hardware in the first event only
        let events = vec![
            MemoryStore::new(100)
                .with(&cpm.cpm_roi_location, vec![roi.clone()])
                .with(&cpm.sim_roi_location, vec![roi.clone()]),
            MemoryStore::new(101)
                .with::<CpmRoi>(&cpm.cpm_roi_location, vec![])
                .with(&cpm.sim_roi_location, vec![roi]),
        ];
        std::fs::write(
            dir.join("run_0007.yml"),
            serde_yaml::to_string(&events).unwrap(),
        )
        .unwrap();

        let config = Config {
            event_path: dir.clone(),
            report_path: dir.clone(),
            first_run_number: 7,
            last_run_number: 7,
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel();
        let report = process_run(&config, 7, &tx, &3).unwrap();

        assert_eq!(report.events, 2);
        assert_eq!(report.cpm_events_with_mismatch, 1);
        assert_eq!(report.jep_events_with_mismatch, 0);
        let rois = &report.cpm.categories["RoIs"];
        assert_eq!(rois.mismatch_events, 1);
        assert_eq!(rois.sampled_events, vec![101]);
        assert_eq!(report.histograms["cpm_roi_sim_eq_data"], 1);
        assert_eq!(report.histograms["cpm_roi_sim_no_data"], 1);

        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert!(statuses.iter().all(|s| s.worker_id == 3 && s.run_number == 7));
        assert_eq!(statuses.last().map(|s| s.phase), Some(WorkerPhase::Reporting));

        let written: RunReport = serde_yaml::from_str(
            &std::fs::read_to_string(config.get_report_file(7).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(written, report);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
