use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use vgm_retune::{ClockProfile, VgmPipeline};

/// Clock-domain retuning and tick-quantization pipeline for SN76489 VGM logs.
#[derive(Parser)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Ntsc,
    Pal,
    Bbc,
}

impl From<Profile> for ClockProfile {
    fn from(p: Profile) -> Self {
        match p {
            Profile::Ntsc => ClockProfile::Ntsc,
            Profile::Pal => ClockProfile::Pal,
            Profile::Bbc => ClockProfile::Bbc,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Re-emit a VGM file unchanged, exercising the parse/write round trip.
    Roundtrip {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Retune a VGM file to a different clock domain and tick rate.
    Retune {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Target clock domain.
        #[arg(long, value_enum, default_value_t = Profile::Ntsc)]
        profile: Profile,
        /// Target tick rate in Hz; must evenly divide 44100.
        #[arg(long, default_value_t = 50)]
        rate: u32,
        /// Also write the compact packet-binary format alongside the VGM output.
        #[arg(long)]
        packets: Option<PathBuf>,
    },
    /// Dump header and GD3 metadata as JSON, for debugging a source file.
    Inspect {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Roundtrip { input, output } => {
            let bytes = fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let pipeline = VgmPipeline::from_bytes(&bytes)
                .with_context(|| format!("parsing {}", input.display()))?;
            fs::write(&output, pipeline.to_vgm_bytes())
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Commands::Retune {
            input,
            output,
            profile,
            rate,
            packets,
        } => {
            let bytes = fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut pipeline = VgmPipeline::from_bytes(&bytes)
                .with_context(|| format!("parsing {}", input.display()))?;

            pipeline
                .retune(profile.into(), rate)
                .context("retuning pipeline")?;

            fs::write(&output, pipeline.to_vgm_bytes())
                .with_context(|| format!("writing {}", output.display()))?;

            if let Some(packets_path) = packets {
                let title = pipeline.gd3.title_eng.clone();
                let author = pipeline.gd3.artist_eng.clone();
                let source_filename = input
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("input.vgm");
                let bin = pipeline
                    .to_packet_bytes(&title, &author, source_filename)
                    .context("emitting packet binary")?;
                fs::write(&packets_path, bin)
                    .with_context(|| format!("writing {}", packets_path.display()))?;
            }
        }
        Commands::Inspect { input } => {
            let bytes = fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let pipeline = VgmPipeline::from_bytes(&bytes)
                .with_context(|| format!("parsing {}", input.display()))?;

            let dump = serde_json::json!({
                "header": pipeline.header,
                "gd3": pipeline.gd3,
                "event_count": pipeline.events.len(),
            });
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
    }

    Ok(())
}
