//! Logger initialization for the batch binary: terminal output for the
//! operator plus `./exporter.log` for post-run inspection.

use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILE: &str = "./exporter.log";

/// Initializes the combined terminal + file logger. The file logger is
/// dropped with a warning when the log file cannot be created, rather than
/// failing the run.
pub fn initialize() {
    let level = LevelFilter::Info;
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    match File::create(Path::new(LOG_FILE)) {
        Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
        Err(err) => eprintln!("Warning: could not create {LOG_FILE}: {err}"),
    }

    let _ = CombinedLogger::init(loggers);
}
