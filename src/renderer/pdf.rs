//! PDF content-stream back-end.
//!
//! Produces the page-description operators for one page; wrapping them in
//! a PDF file (objects, xref, fonts) is left to the host. Coordinates are
//! flipped so callers keep the top-left origin used everywhere else.

use std::fmt::Write as _;

use super::draw::{DrawingSurface, PathCmd};

pub struct PdfContentStream {
    ops: String,
    page_height: f64,
}

/// `#rrggbb` to PDF colour components; unknown strings become black.
fn rgb(color: &str) -> (f64, f64, f64) {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 {
        return (0.0, 0.0, 0.0);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map(|v| v as f64 / 255.0)
            .unwrap_or(0.0)
    };
    (channel(0), channel(2), channel(4))
}

fn escape(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

impl PdfContentStream {
    pub fn new(page_height: f64) -> Self {
        Self {
            ops: String::new(),
            page_height,
        }
    }

    fn y(&self, y: f64) -> f64 {
        self.page_height - y
    }

    fn stroke_color(&mut self, color: &str) {
        let (r, g, b) = rgb(color);
        let _ = writeln!(self.ops, "{:.3} {:.3} {:.3} RG", r, g, b);
    }

    fn fill_color(&mut self, color: &str) {
        let (r, g, b) = rgb(color);
        let _ = writeln!(self.ops, "{:.3} {:.3} {:.3} rg", r, g, b);
    }

    pub fn finish(self) -> String {
        self.ops
    }
}

impl DrawingSurface for PdfContentStream {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64) {
        self.stroke_color(color);
        let (y1, y2) = (self.y(y1), self.y(y2));
        let _ = writeln!(
            self.ops,
            "{:.2} w {:.2} {:.2} m {:.2} {:.2} l S",
            width, x1, y1, x2, y2
        );
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        self.fill_color(fill);
        let bottom = self.y(y + h);
        let _ = writeln!(self.ops, "{:.2} {:.2} {:.2} {:.2} re f", x, bottom, w, h);
    }

    fn path(&mut self, cmds: &[PathCmd], fill: Option<&str>, stroke: Option<(&str, f64)>) {
        if let Some(color) = fill {
            self.fill_color(color);
        }
        if let Some((color, width)) = stroke {
            self.stroke_color(color);
            let _ = writeln!(self.ops, "{:.2} w", width);
        }
        for cmd in cmds {
            match *cmd {
                PathCmd::MoveTo(x, y) => {
                    let y = self.y(y);
                    let _ = writeln!(self.ops, "{:.2} {:.2} m", x, y);
                }
                PathCmd::LineTo(x, y) => {
                    let y = self.y(y);
                    let _ = writeln!(self.ops, "{:.2} {:.2} l", x, y);
                }
                PathCmd::CurveTo(x1, y1, x2, y2, x, y) => {
                    let (y1, y2, y) = (self.y(y1), self.y(y2), self.y(y));
                    let _ = writeln!(
                        self.ops,
                        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c",
                        x1, y1, x2, y2, x, y
                    );
                }
                PathCmd::Close => self.ops.push_str("h\n"),
            }
        }
        let op = match (fill.is_some(), stroke.is_some()) {
            (true, true) => "B",
            (true, false) => "f",
            (false, true) => "S",
            (false, false) => "n",
        };
        self.ops.push_str(op);
        self.ops.push('\n');
    }

    fn text(&mut self, x: f64, y: f64, content: &str, size: f64, color: &str) {
        self.fill_color(color);
        let y = self.y(y);
        let _ = writeln!(
            self.ops,
            "BT /F1 {:.1} Tf {:.2} {:.2} Td ({}) Tj ET",
            size,
            x,
            y,
            escape(content)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_y_and_emits_operators() {
        let mut pdf = PdfContentStream::new(800.0);
        pdf.line(10.0, 100.0, 50.0, 100.0, "#000000", 1.0);
        pdf.rect(0.0, 0.0, 10.0, 20.0, "#ff0000");
        pdf.text(5.0, 10.0, "Cantus (I)", 9.0, "#000000");
        let out = pdf.finish();
        assert!(out.contains("10.00 700.00 m 50.00 700.00 l S"));
        assert!(out.contains("1.000 0.000 0.000 rg"));
        assert!(out.contains("0.00 780.00 10.00 20.00 re f"));
        assert!(out.contains("(Cantus \\(I\\)) Tj"));
    }
}
