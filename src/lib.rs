//! cmmescore: page layout, MIDI sequencing and variant analysis for
//! mensural (CMME) scores.
//!
//! A `Piece` is rendered once into sections of measures; the page layout,
//! the MIDI sequence and the variant catalog are independent consumers of
//! that rendering.
//!
//! # Example
//! ```no_run
//! use cmmescore::{layout_piece, Config, PageOptions, Piece};
//!
//! let json = std::fs::read_to_string("piece.json").unwrap();
//! let piece: Piece = serde_json::from_str(&json).unwrap();
//! let (score, layout) = layout_piece(&piece, PageOptions::default()).unwrap();
//! println!("{} measures on {} pages", score.num_measures(), layout.pages.len());
//!
//! let sequence = cmmescore::build_sequence(&score, &Config::default()).unwrap();
//! sequence.save("piece.mid").unwrap();
//! ```

pub mod config;
pub mod error;
pub mod midi;
pub mod model;
pub mod playback;
pub mod proportion;
pub mod renderer;
pub mod timemap;
pub mod variants;

pub use config::Config;
pub use error::{
    ArithmeticError, ConfigError, ExportError, ModelError, PlaybackError, RenderError,
    SequenceError,
};
pub use midi::{build_sequence, MidiMessageKind, MidiTrack, Sequence, TimedMessage};
pub use model::*;
pub use playback::{DeviceProvider, MidiDevice, MidiPlayer, PlayerEvent};
pub use proportion::Proportion;
pub use renderer::{
    render_page_to_pdf_stream, render_page_to_svg, PageOptions, RenderedScore, ScoreLayout,
    ScorePageRenderer, ScoreRenderer,
};
pub use timemap::{generate_timemap, start_tick_for_measure, TimemapEntry};
pub use variants::{VariantAnalysisList, VariantReport, VariantType};

/// Render a piece into sections and pack it into pages.
pub fn layout_piece(
    piece: &Piece,
    options: PageOptions,
) -> Result<(RenderedScore, ScoreLayout), RenderError> {
    let score = ScoreRenderer::render(piece)?;
    let layout = ScorePageRenderer::new(&score, options).layout();
    log::debug!(
        "laid out {} measures in {} systems on {} pages",
        score.num_measures(),
        layout.systems.len(),
        layout.pages.len()
    );
    Ok((score, layout))
}

/// Render every page of a piece to SVG.
pub fn render_piece_to_svg(piece: &Piece, options: PageOptions) -> Result<Vec<String>, RenderError> {
    let (score, layout) = layout_piece(piece, options)?;
    Ok((0..layout.pages.len())
        .map(|p| render_page_to_svg(&score, &layout, p))
        .collect())
}

/// Convert a layout to a JSON string.
pub fn layout_to_json(layout: &ScoreLayout) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(layout)
}
