//! Command dispatch for the joint cascade trainer.
//!
//! Usage:
//!   jda train     # train classifier and regressor from scratch
//!   jda resume    # continue from the checkpoint in the config
//!   jda live      # live demo with camera support
//!   jda fddb      # detection over FDDB

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use jda_core::diagnostics::{die, init_logging};
use jda_core::{config::DEFAULT_CONFIG_PATH, mining_pool, Config, Phase, Result};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "jda")]
#[command(author, version, about = "Joint Cascade Face Detection and Alignment", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train JDA classifier and regressor for face detection and alignment
    Train,
    /// Resume a previous training status
    Resume,
    /// Live demo with camera support
    Live,
    /// Detection over FDDB
    Fddb,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => return print_usage(),
    };
    let Some(command) = args.command else {
        return print_usage();
    };
    init_logging(args.verbose);

    if let Err(e) = run(&command, &args.config) {
        die(e);
    }
}

fn print_usage() {
    println!("{}", Args::command().render_help());
}

fn run(command: &Command, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    debug!("Loaded {}", config_path.display());

    match command {
        Command::Train => train(&config),
        Command::Resume => resume(&config),
        Command::Live => detection_driver("live", &config),
        Command::Fddb => detection_driver("fddb", &config),
    }
}

fn train(config: &Config) -> Result<()> {
    if config.phase != Phase::Train {
        warn!("phase is not \"train\" in the configuration");
    }
    log_plan(config)?;
    warn!("Cascade boosting driver is not linked into this build");
    Ok(())
}

fn resume(config: &Config) -> Result<()> {
    config.validate_checkpoint()?;
    let cp = config.checkpoint();
    info!(
        "Resume from stage {}, cart {}, model {}",
        cp.stage_idx,
        cp.cart_idx,
        cp.tmp_model.display()
    );
    if !cp.tmp_model.exists() {
        warn!("Temporary model {} not found", cp.tmp_model.display());
    }
    log_plan(config)?;
    warn!("Cascade boosting driver is not linked into this build");
    Ok(())
}

fn detection_driver(name: &str, config: &Config) -> Result<()> {
    info!(
        "Detection window {}x{}, step ({}, {}), scale {}",
        config.image_size.origin_w,
        config.image_size.origin_h,
        config.mining.x_step,
        config.mining.y_step,
        config.mining.scale_factor
    );
    warn!("{name} driver is not linked into this build");
    Ok(())
}

fn log_plan(config: &Config) -> Result<()> {
    info!(
        "T = {}, K = {}, landmark_n = {}, tree_depth = {}",
        config.t, config.k, config.landmark_n, config.tree_depth
    );
    for idx in 0..config.t {
        if let Some(s) = config.stage(idx) {
            info!(
                "Stage {}: feats = {}, neg/pos = {}, radius = {}, p = {}, recall = {}",
                idx + 1,
                s.feature_pool_size,
                s.neg_pos_ratio,
                s.random_sample_radius,
                s.classification_p,
                s.recall
            );
        }
    }
    let pool = mining_pool(config)?;
    info!("Mining pool: {} threads", pool.current_num_threads());
    Ok(())
}
