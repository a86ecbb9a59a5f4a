//! Overflow-checked sequential layout of report elements onto fixed-size pages.
//!
//! The [`Paginator`] keeps a single cursor: the vertical position (in points,
//! measured from the bottom edge) still available on the current page.  Each
//! element is checked against its threshold before it is drawn, a new page is
//! started when it would overflow, and the cursor is moved down by the
//! element's extent.  Elements are never revisited, so layout is a single pass
//! over the input.

use std::fmt;

use crate::elements::{Element, Figure, TextLine, TextStyle};
use crate::fonts;

/// Page size and margins, in points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub top_margin: f64,
    pub bottom_margin: f64,
    pub left_margin: f64,
    pub right_margin: f64,
}

impl PageGeometry {
    /// US Letter with the report's default margins.
    pub const LETTER: PageGeometry = PageGeometry {
        width: 612.0,
        height: 792.0,
        top_margin: 60.0,
        bottom_margin: 60.0,
        left_margin: 72.0,
        right_margin: 72.0,
    };

    /// Cursor position at the top of an empty page.
    pub fn top(&self) -> f64 {
        self.height - self.top_margin
    }

    pub fn content_width(&self) -> f64 {
        self.width - self.left_margin - self.right_margin
    }

    pub fn content_height(&self) -> f64 {
        self.top() - self.bottom_margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Geometry plus the vertical advance of every element kind.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutConfig {
    geometry: PageGeometry,
    title_advance: f64,
    subtitle_advance: f64,
    heading_advance: f64,
    body_advance: f64,
    commentary_advance: f64,
    rule_advance: f64,
    caption_advance: f64,
    figure_width: f64,
    figure_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::LETTER,
            title_advance: 24.0,
            subtitle_advance: 26.0,
            heading_advance: 30.0,
            body_advance: 20.0,
            commentary_advance: 15.0,
            rule_advance: 20.0,
            caption_advance: 30.0,
            figure_width: 400.0,
            figure_height: 200.0,
        }
    }
}

impl LayoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page geometry and returns the updated configuration.
    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Sets the advance used by every line of `style`.
    pub fn with_text_advance(mut self, style: TextStyle, advance: f64) -> Self {
        match style {
            TextStyle::Title => self.title_advance = advance,
            TextStyle::Subtitle => self.subtitle_advance = advance,
            TextStyle::Heading => self.heading_advance = advance,
            TextStyle::Body => self.body_advance = advance,
            TextStyle::Commentary => self.commentary_advance = advance,
        }
        self
    }

    /// Sets the drawn figure size (the image, excluding its caption).
    pub fn with_figure_size(mut self, width: f64, height: f64) -> Self {
        self.figure_width = width;
        self.figure_height = height;
        self
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn text_advance(&self, style: TextStyle) -> f64 {
        match style {
            TextStyle::Title => self.title_advance,
            TextStyle::Subtitle => self.subtitle_advance,
            TextStyle::Heading => self.heading_advance,
            TextStyle::Body => self.body_advance,
            TextStyle::Commentary => self.commentary_advance,
        }
    }

    pub fn rule_advance(&self) -> f64 {
        self.rule_advance
    }

    pub fn figure_size(&self) -> (f64, f64) {
        (self.figure_width, self.figure_height)
    }

    /// Caption plus image height.
    pub fn figure_extent(&self) -> f64 {
        self.caption_advance + self.figure_height
    }

    fn caption_drop(&self) -> f64 {
        // caption baseline sits two thirds into the caption band
        self.caption_advance * 2.0 / 3.0
    }
}

/// What was drawn, with its final coordinates.
#[derive(Clone, Debug)]
pub enum Placement {
    Text {
        line: TextLine,
        x: f64,
        baseline: f64,
    },
    Rule {
        x1: f64,
        x2: f64,
        y: f64,
    },
    Figure {
        figure: Figure,
        x: f64,
        /// Bottom edge of the image.
        y: f64,
        width: f64,
        height: f64,
        caption_baseline: f64,
    },
}

/// An element placed on a page, with the vertical band it occupies.
#[derive(Clone, Debug)]
pub struct PlacedElement {
    /// Cursor position before the element.
    pub top: f64,
    /// Cursor position after the element.
    pub bottom: f64,
    pub placement: Placement,
}

/// A finished or in-progress page.
#[derive(Clone, Debug)]
pub struct Page {
    number: usize,
    cursor: f64,
    elements: Vec<PlacedElement>,
}

impl Page {
    fn new(number: usize, geometry: &PageGeometry) -> Self {
        Self {
            number,
            cursor: geometry.top(),
            elements: Vec::new(),
        }
    }

    /// One-based page number.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Cursor position after the last element on the page.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn elements(&self) -> &[PlacedElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Start page of a named section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionMark {
    pub title: String,
    /// One-based page number.
    pub page: usize,
}

/// Errors raised while laying out elements.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutError {
    /// The element is taller than the content area of an empty page.
    ElementTooTall { extent: f64, available: f64 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementTooTall { extent, available } => write!(
                f,
                "Element needs {:.1}pt but a page only has {:.1}pt of content height",
                extent, available
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// The laid-out document, ready to be serialized.
#[derive(Clone, Debug)]
pub struct LaidOutDocument {
    config: LayoutConfig,
    pages: Vec<Page>,
    sections: Vec<SectionMark>,
}

impl LaidOutDocument {
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn sections(&self) -> &[SectionMark] {
        &self.sections
    }
}

/// Places elements one after another, breaking pages on overflow.
#[derive(Debug)]
pub struct Paginator {
    config: LayoutConfig,
    finished: Vec<Page>,
    current: Page,
    sections: Vec<SectionMark>,
    pending_sections: Vec<String>,
}

impl Paginator {
    /// Creates a paginator positioned at the top of page one.
    pub fn new(config: LayoutConfig) -> Self {
        let current = Page::new(1, config.geometry());
        Self {
            config,
            finished: Vec::new(),
            current,
            sections: Vec::new(),
            pending_sections: Vec::new(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Remaining vertical position on the current page.
    pub fn cursor(&self) -> f64 {
        self.current.cursor
    }

    pub fn page_count(&self) -> usize {
        self.finished.len() + 1
    }

    /// Starts a named section at the page where the next element lands.
    pub fn begin_section(&mut self, title: impl Into<String>) {
        self.pending_sections.push(title.into());
    }

    fn break_page(&mut self) {
        let number = self.current.number + 1;
        let previous = std::mem::replace(
            &mut self.current,
            Page::new(number, self.config.geometry()),
        );
        log::debug!(
            "Page {} full at cursor {:.1}; starting page {}",
            previous.number,
            previous.cursor,
            number
        );
        self.finished.push(previous);
    }

    /// Places `element`, starting a new page first if it would overflow.
    pub fn place(&mut self, element: Element) -> Result<(), LayoutError> {
        let extent = element.extent(&self.config);
        let threshold = element.threshold(&self.config);

        if self.current.cursor < threshold && !self.current.is_empty() {
            self.break_page();
        }
        if self.current.cursor < threshold {
            return Err(LayoutError::ElementTooTall {
                extent,
                available: self.config.geometry().content_height(),
            });
        }

        for title in self.pending_sections.drain(..) {
            self.sections.push(SectionMark {
                title,
                page: self.current.number,
            });
        }

        let top = self.current.cursor;
        self.current.cursor -= extent;
        let bottom = self.current.cursor;
        let geometry = *self.config.geometry();

        let placement = match element {
            Element::Text(line) => Placement::Text {
                line,
                x: geometry.left_margin,
                baseline: bottom,
            },
            Element::Rule => Placement::Rule {
                x1: geometry.left_margin,
                x2: geometry.width - geometry.right_margin,
                y: bottom,
            },
            Element::Figure(figure) => {
                let (width, height) = self.config.figure_size();
                Placement::Figure {
                    figure,
                    x: geometry.left_margin,
                    y: bottom,
                    width,
                    height,
                    caption_baseline: top - self.config.caption_drop(),
                }
            }
        };

        self.current.elements.push(PlacedElement {
            top,
            bottom,
            placement,
        });
        Ok(())
    }

    /// Places every element in order, stopping at the first error.
    pub fn place_all<I>(&mut self, elements: I) -> Result<(), LayoutError>
    where
        I: IntoIterator<Item = Element>,
    {
        elements.into_iter().try_for_each(|element| self.place(element))
    }

    /// Seals the layout.  The current page is kept even if it is empty.
    pub fn finish(mut self) -> LaidOutDocument {
        self.finished.push(self.current);
        LaidOutDocument {
            config: self.config,
            pages: self.finished,
            sections: self.sections,
        }
    }
}

/// Splits `text` into lines that fit `max_width` points at `font_size`.
///
/// Explicit line breaks are kept (blank lines included); longer lines are
/// wrapped at spaces, and words wider than a full line are cut.
pub fn wrap_text(text: &str, max_width: f64, font_size: f64) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let raw = raw.trim_end();
        if raw.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if fonts::estimated_text_width(&candidate, font_size) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            let mut piece = String::new();
            for ch in word.chars() {
                piece.push(ch);
                if fonts::estimated_text_width(&piece, font_size) > max_width && piece.chars().count() > 1 {
                    piece.pop();
                    lines.push(std::mem::take(&mut piece));
                    piece.push(ch);
                }
            }
            current = piece;
        }

        lines.push(current);
    }

    lines
}
