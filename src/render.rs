//! Serializes a [`LaidOutDocument`] into PDF bytes with `printpdf`.
//!
//! Layout works in points from the bottom-left corner, which is also the PDF
//! coordinate system; the only conversion needed is points to millimetres for
//! the `printpdf` API.

use std::fmt;
use std::io::BufWriter;

use printpdf::{
    Color, CustomPdfConformance, Image, Line, Mm, PdfConformance, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rgb,
};

use crate::elements::TextStyle;
use crate::fonts::{self, ReportFonts};
use crate::layout::{LaidOutDocument, Page, PageGeometry, Placement};

const MM_PER_INCH: f64 = 25.4;
const POINTS_PER_INCH: f64 = 72.0;
const RULE_THICKNESS_PT: f64 = 1.0;
const FOOTER_FONT_SIZE: f64 = 9.0;

fn mm_from_pt(value: f64) -> Mm {
    Mm(value * MM_PER_INCH / POINTS_PER_INCH)
}

/// Errors raised while serializing a laid-out document.
#[derive(Debug)]
pub enum WriteError {
    /// A base font could not be added to the document.
    Font(printpdf::Error),
    /// The document could not be serialized.
    Serialize(printpdf::Error),
    /// The in-memory buffer could not be flushed.
    Flush(std::io::Error),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Font(_) => write!(f, "Failed to add font {}", fonts::DEFAULT_FONT_FAMILY_NAME),
            Self::Serialize(_) => write!(f, "Failed to serialize PDF"),
            Self::Flush(_) => write!(f, "Failed to flush PDF buffer"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Font(err) | Self::Serialize(err) => Some(err),
            Self::Flush(err) => Some(err),
        }
    }
}

/// Options applied while writing the PDF.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Draw "Page N of M" centered in the bottom margin.
    pub page_numbers: bool,
}

fn new_document(title: &str, geometry: &PageGeometry) -> (PdfDocumentReference, PdfLayerReference) {
    let (document, page, layer) = PdfDocument::new(
        title,
        mm_from_pt(geometry.width),
        mm_from_pt(geometry.height),
        "Layer 1",
    );
    // No XMP packet and no ICC profile: both embed per-run identifiers.
    let document = document.with_conformance(PdfConformance::Custom(CustomPdfConformance {
        requires_icc_profile: false,
        requires_xmp_metadata: false,
        ..Default::default()
    }));
    let layer = document.get_page(page).get_layer(layer);
    (document, layer)
}

fn draw_page(layer: &PdfLayerReference, page: &Page, fonts: &ReportFonts) {
    for element in page.elements() {
        match &element.placement {
            Placement::Text { line, x, baseline } => {
                if line.text().is_empty() {
                    continue;
                }
                layer.use_text(
                    line.text(),
                    line.style().font_size(),
                    mm_from_pt(*x),
                    mm_from_pt(*baseline),
                    fonts.for_style(line.style()),
                );
            }
            Placement::Rule { x1, x2, y } => {
                layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
                layer.set_outline_thickness(RULE_THICKNESS_PT);
                layer.add_shape(Line {
                    points: vec![
                        (Point::new(mm_from_pt(*x1), mm_from_pt(*y)), false),
                        (Point::new(mm_from_pt(*x2), mm_from_pt(*y)), false),
                    ],
                    is_closed: false,
                    has_fill: false,
                    has_stroke: true,
                    is_clipping_path: false,
                });
            }
            Placement::Figure {
                figure,
                x,
                y,
                width,
                height,
                caption_baseline,
            } => {
                layer.use_text(
                    figure.caption(),
                    TextStyle::Body.font_size(),
                    mm_from_pt(*x),
                    mm_from_pt(*caption_baseline),
                    fonts.regular(),
                );

                // At 72 dpi one pixel is one point, so the scale maps pixels
                // straight onto the target box.
                let (px_width, px_height) = figure.image().dimensions();
                let scale_x = width / f64::from(px_width.max(1));
                let scale_y = height / f64::from(px_height.max(1));
                Image::from_dynamic_image(figure.image().as_dynamic_image()).add_to_layer(
                    layer.clone(),
                    Some(mm_from_pt(*x)),
                    Some(mm_from_pt(*y)),
                    None,
                    Some(scale_x),
                    Some(scale_y),
                    Some(POINTS_PER_INCH),
                );
            }
        }
    }
}

fn draw_footer(
    layer: &PdfLayerReference,
    geometry: &PageGeometry,
    number: usize,
    total: usize,
    fonts: &ReportFonts,
) {
    let text = format!("Page {} of {}", number, total);
    let width = fonts::estimated_text_width(&text, FOOTER_FONT_SIZE);
    let x = (geometry.width - width) / 2.0;
    let baseline = geometry.bottom_margin / 2.0;
    layer.use_text(
        text,
        FOOTER_FONT_SIZE,
        mm_from_pt(x),
        mm_from_pt(baseline),
        fonts.regular(),
    );
}

/// Writes every page of `document` and seals the result into a byte buffer.
pub fn write_pdf(
    title: &str,
    document: &LaidOutDocument,
    options: WriteOptions,
) -> Result<Vec<u8>, WriteError> {
    let geometry = *document.config().geometry();
    let (pdf, first_layer) = new_document(title, &geometry);
    let fonts = fonts::install_default_fonts(&pdf).map_err(WriteError::Font)?;
    let total = document.page_count();

    for page in document.pages() {
        let layer = if page.number() == 1 {
            first_layer.clone()
        } else {
            let (page_index, layer_index) = pdf.add_page(
                mm_from_pt(geometry.width),
                mm_from_pt(geometry.height),
                format!("Page {} Layer 1", page.number()),
            );
            pdf.get_page(page_index).get_layer(layer_index)
        };

        draw_page(&layer, page, &fonts);
        if options.page_numbers {
            draw_footer(&layer, &geometry, page.number(), total, &fonts);
        }
    }

    let mut writer = BufWriter::new(Vec::new());
    pdf.save(&mut writer).map_err(WriteError::Serialize)?;
    writer
        .into_inner()
        .map_err(|err| WriteError::Flush(err.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_convert_to_millimetres() {
        assert!((mm_from_pt(72.0).0 - 25.4).abs() < 1e-9);
        assert!((mm_from_pt(612.0).0 - 215.9).abs() < 1e-9);
    }

    #[test]
    fn writer_errors_keep_their_cause() {
        use std::error::Error;

        let cause = printpdf::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let err = WriteError::Serialize(cause);
        assert_eq!(err.to_string(), "Failed to serialize PDF");
        assert_eq!(err.source().map(|source| source.to_string()).as_deref(), Some("disk full"));
    }
}
