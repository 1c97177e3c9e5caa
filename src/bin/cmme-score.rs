//! `cmme-score` lays out, exports and analyses JSON-encoded pieces.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use cmmescore::{
    build_sequence, generate_timemap, layout_piece, layout_to_json, render_page_to_svg,
    timemap::timemap_to_json, Config, PageOptions, Piece, ScoreRenderer, VariantAnalysisList,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// Playback/export settings as JSON; CMME_* environment variables override it
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the page layout as JSON
    Layout {
        piece: PathBuf,
        /// Page width in points
        #[clap(long)]
        width: Option<f64>,
        /// Page height in points
        #[clap(long)]
        height: Option<f64>,
    },
    /// Write one SVG file per page
    Svg {
        piece: PathBuf,
        #[clap(short, long)]
        out: PathBuf,
    },
    /// Export a Standard MIDI File
    Midi {
        piece: PathBuf,
        #[clap(short, long)]
        out: PathBuf,
    },
    /// Print the measure timemap as JSON
    Timemap { piece: PathBuf },
    /// List variant readings
    Variants { piece: PathBuf },
    /// Play through the first available MIDI output
    #[cfg(feature = "device")]
    Play {
        piece: PathBuf,
        /// 0-based measure to start from
        #[clap(short, long, default_value_t = 0)]
        measure: usize,
    },
}

fn read_piece(path: &Path) -> anyhow::Result<Piece> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => {
            let json = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            Config::from_json_str(&json)?
        }
        None => Config::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Layout { piece, width, height } => {
            let defaults = PageOptions::default();
            let options = PageOptions {
                page_width: width.unwrap_or(defaults.page_width),
                page_height: height.unwrap_or(defaults.page_height),
                ..defaults
            };
            let (_, layout) = layout_piece(&read_piece(&piece)?, options)?;
            println!("{}", layout_to_json(&layout)?);
        }
        Command::Svg { piece, out } => {
            let (score, layout) = layout_piece(&read_piece(&piece)?, PageOptions::default())?;
            std::fs::create_dir_all(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            for page in 0..layout.pages.len() {
                let path = out.join(format!("page-{:03}.svg", page + 1));
                std::fs::write(&path, render_page_to_svg(&score, &layout, page))
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            log::info!("wrote {} pages to {}", layout.pages.len(), out.display());
        }
        Command::Midi { piece, out } => {
            let score = ScoreRenderer::render(&read_piece(&piece)?)?;
            let sequence = build_sequence(&score, &config)?;
            sequence.save(&out)?;
        }
        Command::Timemap { piece } => {
            let score = ScoreRenderer::render(&read_piece(&piece)?)?;
            println!("{}", timemap_to_json(&generate_timemap(&score, &config)));
        }
        Command::Variants { piece } => {
            let score = ScoreRenderer::render(&read_piece(&piece)?)?;
            let list = VariantAnalysisList::new(&score);
            for report in &list {
                println!(
                    "m. {:<8} voice {:<2} {:<32} {} reading(s) [{}]",
                    report.measure_label,
                    report.voice + 1,
                    report.var_types.to_string(),
                    report.num_readings,
                    report.sources.join(", ")
                );
            }
        }
        #[cfg(feature = "device")]
        Command::Play { piece, measure } => play(&piece, measure, config)?,
    }
    Ok(())
}

#[cfg(feature = "device")]
fn play(piece: &Path, measure: usize, config: Config) -> anyhow::Result<()> {
    use cmmescore::playback::MidirProvider;
    use cmmescore::{MidiPlayer, PlayerEvent};

    let score = ScoreRenderer::render(&read_piece(piece)?)?;
    let sequence = build_sequence(&score, &config)?;
    let mut player = MidiPlayer::new(Box::new(MidirProvider::default()), config);
    let events = player.events();
    player.play_from_measure(&score, &sequence, measure)?;

    for event in events.iter() {
        match event {
            PlayerEvent::MeasureReached(m) => log::info!("measure {m}"),
            PlayerEvent::Finished => break,
            PlayerEvent::Failed(e) => return Err(e.into()),
        }
    }
    player.stop();
    Ok(())
}
