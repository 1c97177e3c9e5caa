//! Shared constants for layout and drawing (all in points at scale 1.0).

// ── Page & margins ──────────────────────────────────────────────────
pub const DEFAULT_PAGE_WIDTH: f64 = 595.0;
pub const DEFAULT_PAGE_HEIGHT: f64 = 842.0;
pub(crate) const PAGE_MARGIN_LEFT: f64 = 40.0;
pub(crate) const PAGE_MARGIN_RIGHT: f64 = 30.0;
pub(crate) const PAGE_MARGIN_TOP: f64 = 40.0;
pub(crate) const PAGE_MARGIN_BOTTOM: f64 = 40.0;

// ── Staff dimensions ────────────────────────────────────────────────
pub(crate) const STAFF_LINE_SPACING: f64 = 8.0; // distance between staff lines
pub(crate) const STAFF_HEIGHT: f64 = 32.0; // 5 lines, 4 spaces
pub(crate) const STAFF_GAP: f64 = 40.0; // vertical gap between voices in a system
pub(crate) const SYSTEM_SPACING: f64 = 48.0; // vertical space between systems
pub(crate) const VOICE_NAME_WIDTH: f64 = 60.0; // label column on a page's first system
pub(crate) const LEFT_INFO_PAD: f64 = 6.0;

// ── Horizontal spacing inside a measure ─────────────────────────────
pub(crate) const MINIM_SPACE: f64 = 14.0; // time-proportional spacing per minim
pub(crate) const MEASURE_LEFT_PAD: f64 = 6.0;
pub(crate) const MEASURE_RIGHT_PAD: f64 = 6.0;
pub(crate) const EVENT_GAP: f64 = 4.0;

// ── Glyph widths ────────────────────────────────────────────────────
pub(crate) const CLEF_WIDTH: f64 = 14.0;
pub(crate) const SIGNATURE_ACCIDENTAL_WIDTH: f64 = 7.0;
pub(crate) const MENSURATION_WIDTH: f64 = 14.0;
pub(crate) const PROPORTION_WIDTH: f64 = 10.0;
pub(crate) const REST_WIDTH: f64 = 6.0;
pub(crate) const NOTEHEAD_WIDTH: f64 = 8.0;
pub(crate) const BREVE_WIDTH: f64 = 11.0;
pub(crate) const LONGA_WIDTH: f64 = 11.0;
pub(crate) const MAXIMA_WIDTH: f64 = 20.0;
pub(crate) const ACCIDENTAL_WIDTH: f64 = 6.0;
pub(crate) const STEM_LENGTH: f64 = 20.0;

// ── Line widths ─────────────────────────────────────────────────────
pub(crate) const STAFF_LINE_WIDTH: f64 = 0.6;
pub(crate) const BARLINE_WIDTH: f64 = 0.8;
pub(crate) const STEM_WIDTH: f64 = 0.9;
pub(crate) const BRACKET_WIDTH: f64 = 0.8;

// ── Colors ──────────────────────────────────────────────────────────
pub(crate) const NOTE_COLOR: &str = "#1a1a1a";
pub(crate) const STAFF_COLOR: &str = "#555555";
pub(crate) const BARLINE_COLOR: &str = "#333333";
pub(crate) const VARIANT_COLOR: &str = "#a03030";
pub(crate) const LABEL_COLOR: &str = "#1a1a1a";
