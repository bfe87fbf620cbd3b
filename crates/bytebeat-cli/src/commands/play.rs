//! Live playback: stream raw PCM to stdout, reloading the formula on edits.

use super::common::{EngineArgs, build_renderer, load_startup_formula};
use bytebeat_config::{EngineConfig, ReloadStrategy};
use bytebeat_core::{
    BackgroundWatcher, MtimeWatcher, NeverReload, ReloadWatcher, SampleRenderer, SentinelWatcher,
};
use bytebeat_io::{PcmSample, StreamEngine, StreamSink};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Args)]
pub struct PlayArgs {
    /// Formula file
    #[arg(value_name = "FORMULA")]
    formula: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    /// How to watch for edits: mtime, sentinel, background or off
    #[arg(long, value_name = "STRATEGY")]
    reload: Option<ReloadStrategy>,

    /// Samples between reload checks [default: one buffer]
    #[arg(long, value_name = "N")]
    check_interval: Option<usize>,

    /// Sentinel file for --reload sentinel
    #[arg(long, value_name = "PATH")]
    sentinel: Option<PathBuf>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let mut config = args.engine.load_config()?;
    if let Some(strategy) = args.reload {
        config.reload.strategy = strategy;
    }
    if let Some(interval) = args.check_interval {
        config.reload.check_interval = Some(interval);
    }
    if let Some(sentinel) = args.sentinel {
        config.reload.sentinel_path = Some(sentinel);
    }

    let formula = load_startup_formula(&args.formula)?;
    if let Some(formula) = &formula {
        tracing::info!(path = %args.formula.display(), length = formula.len(), "formula loaded");
    }
    let renderer = build_renderer(formula, &config)?;
    let mut watcher = build_watcher(&args.formula, &config)?;

    tracing::info!(
        sample_rate = config.sample_rate,
        format = if config.float_output { "f32le" } else { "u8" },
        reload = %config.reload.strategy,
        "playing, press Ctrl+C to stop"
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if config.float_output {
        stream::<f32>(renderer, &mut watcher, &running)
    } else {
        stream::<u8>(renderer, &mut watcher, &running)
    }
}

fn stream<S: PcmSample>(
    renderer: SampleRenderer,
    watcher: &mut Box<dyn ReloadWatcher>,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let mut engine = StreamEngine::<S>::new(renderer);
    let mut sink = StreamSink::new(std::io::stdout().lock());
    let summary = engine.run(watcher, &mut sink, running)?;
    eprintln!(
        "Played {} samples in {} buffers ({} faults, {} reloads)",
        summary.samples, summary.buffers, summary.faults, summary.reloads
    );
    Ok(())
}

fn build_watcher(path: &Path, config: &EngineConfig) -> anyhow::Result<Box<dyn ReloadWatcher>> {
    let interval = config.check_interval();
    let watcher: Box<dyn ReloadWatcher> = match config.reload.strategy {
        ReloadStrategy::Mtime => Box::new(MtimeWatcher::new(path, interval)),
        ReloadStrategy::Sentinel => {
            let sentinel = config.sentinel_path();
            tracing::info!(sentinel = %sentinel.display(), "touch the sentinel to reload");
            Box::new(SentinelWatcher::new(path, sentinel, interval))
        }
        ReloadStrategy::Background => Box::new(BackgroundWatcher::spawn(
            MtimeWatcher::new(path, interval),
            Duration::from_millis(config.reload.period_ms.max(1)),
        )?),
        ReloadStrategy::Off => Box::new(NeverReload),
    };
    Ok(watcher)
}
