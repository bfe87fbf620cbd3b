//! Offline render to memory, flushed to stdout as raw PCM.

use super::common::{EngineArgs, LengthArgs, build_renderer, progress_bar, realtime_ratio};
use bytebeat_core::{Formula, SampleRenderer};
use bytebeat_io::{PcmSample, render_offline};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args)]
pub struct RenderArgs {
    /// Formula file
    #[arg(value_name = "FORMULA")]
    formula: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    length: LengthArgs,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let config = args.engine.load_config()?;
    let formula = Formula::load(&args.formula)?;
    tracing::info!(path = %args.formula.display(), length = formula.len(), "formula loaded");

    let total = args.length.total_samples(&config)?;
    let mut renderer = build_renderer(Some(formula), &config)?;

    if config.float_output {
        render_to_stdout::<f32>(&mut renderer, total)
    } else {
        render_to_stdout::<u8>(&mut renderer, total)
    }
}

fn render_to_stdout<S: PcmSample>(
    renderer: &mut SampleRenderer,
    total: usize,
) -> anyhow::Result<()> {
    let pb = progress_bar(total as u64)?;
    let started = Instant::now();
    let (buffer, summary) =
        render_offline::<S>(renderer, total, |done| pb.set_position(done as u64));
    let elapsed = started.elapsed().as_secs_f64();
    pb.finish_and_clear();

    match buffer.flush_to(&mut std::io::stdout().lock()) {
        Err(e) if e.is_broken_pipe() => tracing::info!("output closed by consumer"),
        result => result?,
    }

    eprintln!(
        "Rendered {:.2}s ({} samples, {} faults) in {:.3}s, {:.1}x realtime",
        buffer.duration_secs(),
        summary.samples,
        summary.faults,
        elapsed,
        realtime_ratio(buffer.duration_secs(), elapsed)
    );
    Ok(())
}
