//! Font selection for the report writer.
//!
//! The report only uses the PDF base-14 Helvetica faces, so nothing has to be
//! bundled or located on disk.  Layout needs text widths before any font is
//! installed; [`estimated_text_width`] provides them from average glyph
//! widths.

use printpdf::{BuiltinFont, IndirectFontRef, PdfDocumentReference};

use crate::elements::TextStyle;

/// Name of the font family used throughout the report.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Helvetica";

// Average advance of Helvetica glyphs in mixed-case prose, per point of size.
const AVERAGE_GLYPH_WIDTH: f64 = 0.5;

/// Fonts installed into one document.
#[derive(Clone, Debug)]
pub struct ReportFonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl ReportFonts {
    /// Returns the font matching `style`.
    pub fn for_style(&self, style: TextStyle) -> &IndirectFontRef {
        if style.is_bold() {
            &self.bold
        } else {
            &self.regular
        }
    }

    pub fn regular(&self) -> &IndirectFontRef {
        &self.regular
    }
}

/// Adds the regular and bold Helvetica faces to `document`.
pub fn install_default_fonts(
    document: &PdfDocumentReference,
) -> Result<ReportFonts, printpdf::Error> {
    Ok(ReportFonts {
        regular: document.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: document.add_builtin_font(BuiltinFont::HelveticaBold)?,
    })
}

/// Estimated width of `text` set in regular Helvetica at `font_size` points.
pub fn estimated_text_width(text: &str, font_size: f64) -> f64 {
    text.chars().count() as f64 * font_size * AVERAGE_GLYPH_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_scales_with_length_and_size() {
        assert_eq!(estimated_text_width("", 12.0), 0.0);
        assert_eq!(estimated_text_width("abcd", 10.0), 20.0);
        assert_eq!(estimated_text_width("abcd", 20.0), 40.0);
    }
}
