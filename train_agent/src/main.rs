//! Train a DRL local planner agent.
//!
//! ```bash
//! # new agent from the registry, four simulation namespaces
//! cargo run --release -p train_agent -- --agent AGENT_19 --n-envs 4 --tb --eval-log
//!
//! # custom MLP
//! cargo run --release -p train_agent -- --custom-mlp --body 256-128 --pi 256 --vf 16 --act-fn relu
//!
//! # resume an agent directory under <pkg>/agents
//! cargo run --release -p train_agent -- --load AGENT_19_2021_03_07__09_05 --n 1000000
//! ```
//!
//! Build with `--features wgpu` to train on the GPU; `--no-gpu` then forces the CPU.

#![recursion_limit = "256"]

mod cli;
mod run;

use anyhow::{Context, Result};
use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use clap::Parser;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::Args;
use nav_rl::ppo::{LearnOutcome, StopReason};

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// First Ctrl-C stops training after the current step; the second exits.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            log::warn!("Ctrl-C received, stopping after the current step and saving");
            log::warn!("Press Ctrl-C again to quit without saving");
            flag.store(true, Ordering::SeqCst);
        } else {
            log::error!("Quitting without saving");
            std::process::exit(130);
        }
    })
    .context("failed to install the Ctrl-C handler")?;
    Ok(interrupt)
}

#[cfg(feature = "wgpu")]
fn train(args: &Args, interrupt: &AtomicBool) -> Result<LearnOutcome> {
    use burn::backend::wgpu::{Wgpu, WgpuDevice};

    if args.no_gpu {
        log::info!("Using the ndarray backend");
        return run::run::<Autodiff<NdArray>>(args, NdArrayDevice::default(), interrupt);
    }
    let device = WgpuDevice::default();
    log::info!("Using the wgpu backend on {:?}", device);
    run::run::<Autodiff<Wgpu>>(args, device, interrupt)
}

#[cfg(not(feature = "wgpu"))]
fn train(args: &Args, interrupt: &AtomicBool) -> Result<LearnOutcome> {
    if !args.no_gpu {
        log::debug!("Built without the wgpu feature, using the ndarray backend");
    }
    run::run::<Autodiff<NdArray>>(args, NdArrayDevice::default(), interrupt)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    let interrupt = install_interrupt_handler()?;

    let outcome = train(&args, &interrupt)?;
    match outcome.stop {
        StopReason::Completed => log::info!("Training finished"),
        StopReason::Callback => log::info!("Training stopped early by evaluation"),
        StopReason::Interrupted => log::info!("Training interrupted"),
    }
    log::info!("Training script will be terminated");
    Ok(())
}
