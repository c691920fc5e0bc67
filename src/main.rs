//! `seqtrk` - validate and render track-triggering score documents.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Render a YAML score document to its XML element stream
#[derive(Parser, Debug)]
#[command(name = "seqtrk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track-triggering score engine for interactive MIDI performance", long_about = None)]
struct Args {
    /// Path to the YAML score document
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Write the XML here instead of stdout
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Only validate the document
    #[arg(long)]
    check: bool,

    /// Log construction and rendering details
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("Error reading file '{}'", args.input.display()))?;

    if args.check {
        let score = seqtrk::check_yaml(&source)
            .with_context(|| format!("Invalid score '{}'", args.input.display()))?;
        log::info!(
            "{}: {} channels, {} bound pitches",
            args.input.display(),
            score.seq.midi_channels().len(),
            score.seq.bound_pitches().len()
        );
        eprintln!("{} is valid", args.input.display());
        return Ok(());
    }

    let xml = seqtrk::render_yaml(&source)
        .with_context(|| format!("Rendering '{}' failed", args.input.display()))?;

    match &args.output {
        Some(path) => {
            fs::write(path, &xml)
                .with_context(|| format!("Error writing to '{}'", path.display()))?;
            eprintln!("Wrote XML to {}", path.display());
        }
        None => print!("{}", xml),
    }
    Ok(())
}
