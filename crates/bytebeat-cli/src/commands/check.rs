//! Compile a formula and show what it produces.

use super::common::{EngineArgs, build_renderer};
use bytebeat_core::Formula;
use bytebeat_io::render_offline;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Formula file
    #[arg(value_name = "FORMULA")]
    formula: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    /// Number of output samples to print
    #[arg(short = 'n', long, default_value = "16")]
    samples: usize,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let config = args.engine.load_config()?;
    let formula = Formula::load(&args.formula)?;

    println!("Formula:   {}", formula.source());
    println!("Length:    {} characters", formula.len());
    let variables: Vec<&str> = formula.variable_names().collect();
    if variables.is_empty() {
        println!("Variables: none");
    } else {
        println!("Variables: {}", variables.join(", "));
    }
    let functions: Vec<&str> = formula.function_names().collect();
    if !functions.is_empty() {
        println!("Functions: {}", functions.join(", "));
    }

    let mut renderer = build_renderer(Some(formula), &config)?;
    let rendered: Vec<String> = if config.float_output {
        let (buffer, _) = render_offline::<f32>(&mut renderer, args.samples, |_| {});
        buffer.samples().iter().map(|s| format!("{s:.4}")).collect()
    } else {
        let (buffer, _) = render_offline::<u8>(&mut renderer, args.samples, |_| {});
        buffer.samples().iter().map(u8::to_string).collect()
    };
    println!("Samples:   {}", rendered.join(" "));

    if let Some(error) = renderer.state().last_error() {
        println!("Last error: {error}");
    }
    Ok(())
}
