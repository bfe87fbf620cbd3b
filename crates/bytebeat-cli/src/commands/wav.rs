//! Offline render written as a WAV file.

use super::common::{EngineArgs, LengthArgs, build_renderer, progress_bar, realtime_ratio};
use bytebeat_core::{Formula, SampleRenderer};
use bytebeat_io::{PcmSample, WavFormat, read_wav_info, render_offline, write_wav};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Args)]
pub struct WavArgs {
    /// Formula file
    #[arg(value_name = "FORMULA")]
    formula: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    length: LengthArgs,
}

pub fn run(args: WavArgs) -> anyhow::Result<()> {
    let config = args.engine.load_config()?;
    let formula = Formula::load(&args.formula)?;
    println!("Loaded {} ({} characters)", args.formula.display(), formula.len());

    let total = args.length.total_samples(&config)?;
    let mut renderer = build_renderer(Some(formula), &config)?;

    if config.float_output {
        render_to_file::<f32>(&mut renderer, total, &args.output)?;
    } else {
        render_to_file::<u8>(&mut renderer, total, &args.output)?;
    }

    let info = read_wav_info(&args.output)?;
    let format_str = match info.format {
        WavFormat::Pcm => "PCM",
        WavFormat::IeeeFloat => "IEEE Float",
    };
    println!("\nWrote {}", args.output.display());
    println!("  Format:      {} {}-bit", format_str, info.bits_per_sample);
    println!("  Sample Rate: {} Hz", info.sample_rate);
    println!(
        "  Duration:    {:.3}s ({} frames)",
        info.duration_secs, info.num_frames
    );
    Ok(())
}

fn render_to_file<S: PcmSample>(
    renderer: &mut SampleRenderer,
    total: usize,
    output: &Path,
) -> anyhow::Result<()> {
    let pb = progress_bar(total as u64)?;
    let started = Instant::now();
    let (buffer, summary) =
        render_offline::<S>(renderer, total, |done| pb.set_position(done as u64));
    let elapsed = started.elapsed().as_secs_f64();
    pb.finish_with_message("done");

    println!(
        "Rendered {} samples ({} faults), {:.1}x realtime",
        summary.samples,
        summary.faults,
        realtime_ratio(buffer.duration_secs(), elapsed)
    );
    write_wav(output, &buffer)?;
    Ok(())
}
