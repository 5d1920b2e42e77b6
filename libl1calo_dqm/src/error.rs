use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("EventStore already holds an object at location {0}")]
    DuplicateLocation(String),
    #[error("EventStore location {0} holds a {1} collection, expected {2}")]
    WrongKind(String, &'static str, &'static str),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor failed to publish its mismatch vector: {0}")]
    PublishError(#[from] StoreError),
    #[error("Monitor was given a pipeline transition out of order -- from {0} to {1}")]
    StageOutOfOrder(&'static str, &'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum RunFileError {
    #[error("Could not open run file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Run file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Run file failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to run file error: {0}")]
    RunFileError(#[from] RunFileError),
    #[error("Processor failed due to Monitor error: {0}")]
    MonitorError(#[from] MonitorError),
    #[error("Processor failed to write the run report: {0}")]
    ReportError(#[from] serde_yaml::Error),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
