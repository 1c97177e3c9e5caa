//! Score renderer: turns a `Piece` into rendered sections, packs their
//! measures into systems and pages, and draws pages onto a surface.
//!
//! Layout is computed once from glyph metrics; drawing goes through the
//! `DrawingSurface` trait so the SVG preview and the PDF content stream
//! share every coordinate.

pub(crate) mod constants;
mod clef_set;
mod draw;
mod event_group;
mod measure;
mod notes;
mod page;
mod pdf;
mod section;
mod staff;
mod svg_builder;
mod ties;

pub use clef_set::RenderedClefSet;
pub use constants::{DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH};
pub use draw::{DrawingSurface, PathCmd};
pub use event_group::{
    ExtremeNote, GroupType, LigatureState, LigatureType, RenderedEventGroup, RenderedLigature,
    TieState,
};
pub use measure::{MeasureInfo, MeasureList};
pub use page::{
    MeasurePosition, PageOptions, RenderedScorePage, RenderedStaffSystem, ScoreLayout,
    ScorePageRenderer,
};
pub use pdf::PdfContentStream;
pub use section::{
    RenderedEvent, RenderedScore, RenderedSection, RenderedSectionParams, RenderedVoice,
    ScoreRenderer,
};
pub use svg_builder::SvgBuilder;

use svg_builder::empty_svg;

// ═══════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════

/// Draw one page of a laid-out score onto any surface.
pub fn draw_page<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    layout: &ScoreLayout,
    page: usize,
) {
    if page == 0 {
        staff::render_header(surface, score);
    }
    for system in layout.systems_on_page(page) {
        staff::render_staves(surface, score, system);
        staff::render_left_info(surface, score, system);
        staff::render_barlines(surface, system);
        let placements = notes::render_events(surface, score, system);
        ties::render_ligatures(surface, score, system, &placements);
        ties::render_ties(surface, score, system, &placements);
    }
}

/// Render one page to a self-contained SVG string.
pub fn render_page_to_svg(score: &RenderedScore, layout: &ScoreLayout, page: usize) -> String {
    if page >= layout.pages.len() {
        return empty_svg(&format!("No page {}", page + 1));
    }
    let mut svg = SvgBuilder::new(layout.options.page_width, layout.options.page_height);
    svg.rect(0.0, 0.0, layout.options.page_width, layout.options.page_height, "white");
    draw_page(&mut svg, score, layout, page);
    svg.build()
}

/// Render one page as PDF content-stream operators.
pub fn render_page_to_pdf_stream(
    score: &RenderedScore,
    layout: &ScoreLayout,
    page: usize,
) -> String {
    let mut pdf = PdfContentStream::new(layout.options.page_height);
    if page < layout.pages.len() {
        draw_page(&mut pdf, score, layout, page);
    }
    pdf.finish()
}
