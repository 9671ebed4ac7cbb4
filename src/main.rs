//! `canvas-replay`: run a recorded canvas session headlessly and write the
//! exported generation inputs as PNG files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use inpaint_canvas::config::EditorConfig;
use inpaint_canvas::replay::{self, SessionScript};

/// Replay a canvas session script.
#[derive(Parser, Debug)]
#[command(
    name = "canvas-replay",
    about = "Replay a layered canvas session and export its composites",
    long_about = "Plays the actions of a JSON session script (strokes, keys, zoom,\n\
                  layer and selection edits) against a headless canvas and writes\n\
                  every composite and snapshot as PNG.\n\n\
                  Example:\n  \
                  canvas-replay session.json --output-dir out/"
)]
struct Args {
    /// Session script (JSON).
    #[arg(value_name = "SCRIPT.json")]
    script: PathBuf,

    /// Directory the exported images are written to.
    #[arg(short, long, default_value = "out", value_name = "DIR")]
    output_dir: PathBuf,

    /// Engine configuration file. Defaults to the user config file when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every replayed action.
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig, inpaint_canvas::config::ConfigError> {
    match path {
        Some(path) => EditorConfig::load(path),
        None => Ok(EditorConfig::load_from_default_path().unwrap_or_default()),
    }
}

/// Maximum log level for a configuration. None when `RUST_LOG` decides.
fn configured_level(verbose: bool, env_filter: bool, config: &EditorConfig) -> Option<LevelFilter> {
    if env_filter {
        None
    } else if verbose {
        Some(LevelFilter::Debug)
    } else {
        Some(config.log_level.to_level_filter())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Config loading logs, so the logger starts first at the default level.
    let env_filter = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .init();
    if let Some(level) = configured_level(args.verbose, env_filter, &EditorConfig::default()) {
        log::set_max_level(level);
    }

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = configured_level(args.verbose, env_filter, &config) {
        log::set_max_level(level);
    }

    let script = match SessionScript::load(&args.script) {
        Ok(script) => script,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let base_dir = args.script.parent().unwrap_or_else(|| Path::new("."));

    match replay::run_script(&script, config, base_dir, &args.output_dir) {
        Ok(summary) => {
            for file in &summary.files {
                println!("{}", file.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Replay failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
