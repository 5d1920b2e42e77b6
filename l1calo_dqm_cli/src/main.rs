//! # l1calo_dqm_cli
//!
//! Part of the l1calo_dqm crate family.
//!
//! Replays run files through the CP and JEP Sim-vs-BS monitors from the command line.
//!
//! ## Use
//!
//! ```bash
//! l1calo_dqm_cli --path config.yml new
//! l1calo_dqm_cli --path config.yml
//! ```
//!
//! The first form writes a template configuration, the second processes the configured
//! run range with one worker (and one progress bar) per thread. Library output goes to
//! `./l1calo_dqm.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libl1calo_dqm::config::Config;
use libl1calo_dqm::process::{create_subsets, process_subset};
use libl1calo_dqm::worker_status::{WorkerPhase, WorkerStatus};

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Send the library's spdlog output to a log file
fn init_file_logging(path: PathBuf) -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(phase: WorkerPhase) -> ProgressStyle {
    let colour = match phase {
        WorkerPhase::Loading => "yellow",
        WorkerPhase::Monitoring => "cyan",
        WorkerPhase::Reporting => "green",
    };
    ProgressStyle::with_template(&format!(
        "{{prefix}} [{{bar:40.{colour}}}] {{pos:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() {
    // Create a cli
    let matches = Command::new("l1calo_dqm_cli")
        .about("Sim-vs-BS data quality monitor for the L1Calo CP and JEP systems")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let Some(config_path) = matches.get_one::<String>("path").map(PathBuf::from) else {
        log::error!("A configuration path is required");
        return;
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Event Path: {}", config.event_path.to_string_lossy());
    log::info!("Report Path: {}", config.report_path.to_string_lossy());
    log::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );
    log::info!("Compare With Simulation: {}", config.compare_with_sim);
    if !config.is_n_threads_valid() {
        log::error!("Number of threads must be at least 1, got {}", config.n_threads);
        return;
    }

    if let Err(e) = init_file_logging(PathBuf::from("./l1calo_dqm.log")) {
        log::warn!("Could not open the log file, library output is not saved: {e}");
    }
    spdlog::info!("Starting l1calo_dqm_cli");

    // Spawn the workers, one progress bar each
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = vec![];
    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
    for (idx, subset) in create_subsets(&config).into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(WorkerPhase::Loading));
        bar.set_prefix(format!("Worker {idx}"));
        bars.insert(idx, bar);

        let conf = config.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset)
        }));
    }
    // The workers now hold the only senders
    drop(tx);

    for status in rx.iter() {
        if let Some(bar) = bars.get(&status.worker_id) {
            bar.set_style(bar_style(status.phase));
            bar.set_message(format!("run {}", status.run_number));
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    for bar in bars.values() {
        bar.finish();
    }

    for worker in workers {
        match worker.join() {
            Ok(result) => match result {
                Ok(_) => log::info!("Worker complete"),
                Err(e) => log::error!("Processor error: {e}"),
            },
            Err(_) => log::error!("An error occured joining one of the workers!"),
        }
    }

    log::info!("Done.");
}
