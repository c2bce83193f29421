//! voxfeed: drive the voice/media coordinator with JSON commands.

mod cli_utils;

use std::panic;

use anyhow::Result;
use clap::Parser;
use voxfeed::config::AppConfig;
use voxfeed::ipc::run_ipc_mode;
use voxfeed::{init_logging, init_tracing, log_debug, log_debug_content, log_file_path, log_panic};

use crate::cli_utils::list_input_devices;

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        log_debug(&format!("panic at {location}"));
        log_debug_content(&format!("panic: {info}"));
        previous(info);
    }));
}

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== VoxFeed Coordinator Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    run_ipc_mode(config)
}
