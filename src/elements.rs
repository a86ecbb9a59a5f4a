//! Drawable report elements and the helpers that prepare their content.
//!
//! Every element knows its vertical extent under a given
//! [`LayoutConfig`][crate::layout::LayoutConfig]; the paginator relies on that
//! number both to decide page breaks and to move its cursor.

use std::fmt;

use image::{DynamicImage, GenericImageView};

use crate::layout::LayoutConfig;

/// Decodes chart image bytes with descriptive errors.
pub fn decode_image_from_bytes(bytes: impl AsRef<[u8]>) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes.as_ref())
}

/// A decoded chart bitmap ready to be embedded.
#[derive(Clone)]
pub struct ChartImage {
    image: DynamicImage,
}

impl ChartImage {
    /// Decodes encoded image bytes (PNG in practice).
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, image::ImageError> {
        decode_image_from_bytes(bytes).map(Self::from_dynamic_image)
    }

    pub fn from_dynamic_image(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Pixel dimensions of the bitmap.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_dynamic_image(&self) -> &DynamicImage {
        &self.image
    }
}

impl fmt::Debug for ChartImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("ChartImage")
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

/// Typographic role of a text line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextStyle {
    /// Document title.
    Title,
    /// Line directly under the title.
    Subtitle,
    /// Heading that introduces a block.
    Heading,
    /// Regular line, such as a metric value.
    Body,
    /// One line of user commentary.
    Commentary,
}

impl TextStyle {
    /// Font size in points.
    pub fn font_size(self) -> f64 {
        match self {
            TextStyle::Title => 18.0,
            TextStyle::Subtitle | TextStyle::Heading | TextStyle::Body => 12.0,
            TextStyle::Commentary => 11.0,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, TextStyle::Title | TextStyle::Heading)
    }
}

/// A single line of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextLine {
    text: String,
    style: TextStyle,
}

impl TextLine {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> TextStyle {
        self.style
    }
}

/// A captioned chart image.  Figures are never split across pages.
#[derive(Clone, Debug)]
pub struct Figure {
    caption: String,
    image: ChartImage,
}

impl Figure {
    pub fn new(caption: impl Into<String>, image: ChartImage) -> Self {
        Self {
            caption: caption.into(),
            image,
        }
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn image(&self) -> &ChartImage {
        &self.image
    }
}

/// Anything the paginator can place on a page.
#[derive(Clone, Debug)]
pub enum Element {
    Text(TextLine),
    /// Horizontal rule across the content width.
    Rule,
    Figure(Figure),
}

impl Element {
    pub fn text(text: impl Into<String>, style: TextStyle) -> Self {
        Self::Text(TextLine::new(text, style))
    }

    pub fn figure(caption: impl Into<String>, image: ChartImage) -> Self {
        Self::Figure(Figure::new(caption, image))
    }

    /// Vertical space the element consumes, including the gap above it.
    pub fn extent(&self, config: &LayoutConfig) -> f64 {
        match self {
            Element::Text(line) => config.text_advance(line.style()),
            Element::Rule => config.rule_advance(),
            Element::Figure(_) => config.figure_extent(),
        }
    }

    /// Lowest cursor position at which the element may still start on the
    /// current page.
    pub fn threshold(&self, config: &LayoutConfig) -> f64 {
        config.geometry().bottom_margin + self.extent(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let buffer = ImageBuffer::from_fn(width, height, |x, _| Rgb([x as u8, 90, 160]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn chart_image_decodes_png() {
        let image = ChartImage::from_bytes(png(8, 4)).expect("decode");
        assert_eq!(image.dimensions(), (8, 4));
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(ChartImage::from_bytes(b"not a png").is_err());
        assert!(ChartImage::from_bytes(Vec::<u8>::new()).is_err());
    }

    #[test]
    fn figure_threshold_covers_full_height() {
        let config = LayoutConfig::default();
        let figure = Element::figure("Spend Over Time:", ChartImage::from_bytes(png(4, 2)).unwrap());
        let line = Element::text("Total Spend: $0.00", TextStyle::Body);

        assert_eq!(figure.extent(&config), 230.0);
        assert_eq!(figure.threshold(&config), 290.0);
        assert!(line.threshold(&config) < figure.threshold(&config));
    }
}
