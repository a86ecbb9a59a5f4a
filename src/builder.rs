//! Report construction: content in, sealed PDF bytes out.

use std::fmt;
use std::io::Cursor;

use crate::charts::ChartError;
use crate::layout::{LaidOutDocument, LayoutConfig, LayoutError, Paginator, SectionMark};
use crate::metrics::Metric;
use crate::model::ReportContent;
use crate::render::{self, WriteError, WriteOptions};

#[cfg(feature = "bookmarks")]
use crate::bookmarks::{self, BookmarkError};

/// File name offered when the report is downloaded.
pub const REPORT_FILE_NAME: &str = "dashboard_report.pdf";

/// Media type of the report bytes.
pub const REPORT_MEDIA_TYPE: &str = "application/pdf";

/// Errors that abort a single report request.
#[derive(Debug)]
pub enum ReportError {
    /// The chart image of a section could not be decoded.
    Image {
        metric: Metric,
        source: image::ImageError,
    },
    /// An element could not be placed.
    Layout(LayoutError),
    /// A static chart could not be drawn.
    Chart { metric: Metric, source: ChartError },
    /// The PDF writer failed.
    Pdf(WriteError),
    /// Section bookmarks could not be embedded.
    #[cfg(feature = "bookmarks")]
    Bookmarks(BookmarkError),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image { metric, .. } => write!(f, "Chart image for {} is not a valid image", metric),
            Self::Layout(err) => write!(f, "Report layout failed: {}", err),
            Self::Chart { metric, .. } => write!(f, "Failed to render the {} chart", metric),
            Self::Pdf(_) => write!(f, "Failed to write PDF"),
            #[cfg(feature = "bookmarks")]
            Self::Bookmarks(_) => write!(f, "Failed to embed section bookmarks"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image { source, .. } => Some(source),
            Self::Layout(err) => Some(err),
            Self::Chart { source, .. } => Some(source),
            Self::Pdf(err) => Some(err),
            #[cfg(feature = "bookmarks")]
            Self::Bookmarks(err) => Some(err),
        }
    }
}

impl From<WriteError> for ReportError {
    fn from(err: WriteError) -> Self {
        Self::Pdf(err)
    }
}

impl From<LayoutError> for ReportError {
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

#[cfg(feature = "bookmarks")]
impl From<BookmarkError> for ReportError {
    fn from(err: BookmarkError) -> Self {
        Self::Bookmarks(err)
    }
}

/// A finished report.  The bytes are never modified after rendering.
#[derive(Clone, Debug)]
pub struct RenderedReport {
    /// Complete PDF file.
    pub bytes: Vec<u8>,
    /// Number of pages in the document.
    pub page_count: usize,
    /// Start page of every metric section.
    pub sections: Vec<SectionMark>,
}

impl RenderedReport {
    /// Returns a reader positioned at the start of the PDF.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.bytes.as_slice())
    }

    /// Consumes the report into a reader positioned at the start of the PDF.
    pub fn into_reader(self) -> Cursor<Vec<u8>> {
        Cursor::new(self.bytes)
    }

    pub fn file_name(&self) -> &'static str {
        REPORT_FILE_NAME
    }

    pub fn media_type(&self) -> &'static str {
        REPORT_MEDIA_TYPE
    }
}

/// Lays out and renders [`ReportContent`] with configurable geometry.
#[derive(Clone, Debug, Default)]
pub struct ReportBuilder {
    layout: LayoutConfig,
    options: WriteOptions,
}

impl ReportBuilder {
    /// Creates a builder with US Letter geometry and no footer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the layout configuration used for every page.
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Enables or disables the "Page N of M" footer.
    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.options.page_numbers = enabled;
        self
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Runs the paginator over `content` without producing PDF bytes.
    pub fn layout(&self, content: &ReportContent) -> Result<LaidOutDocument, ReportError> {
        let mut paginator = Paginator::new(self.layout.clone());
        paginator.place_all(content.header_elements())?;

        for section in content.sections() {
            let elements = ReportContent::section_elements(section, &self.layout).map_err(
                |source| ReportError::Image {
                    metric: section.metric(),
                    source,
                },
            )?;
            paginator.begin_section(section.metric().to_string());
            paginator.place_all(elements)?;
        }

        Ok(paginator.finish())
    }

    /// Lays out and renders `content` into a sealed PDF.
    pub fn render(&self, content: &ReportContent) -> Result<RenderedReport, ReportError> {
        let document = self.layout(content)?;
        let bytes = render::write_pdf(content.title(), &document, self.options)?;

        log::info!(
            "Rendered report with {} sections on {} pages ({} bytes)",
            content.sections().len(),
            document.page_count(),
            bytes.len()
        );

        Ok(RenderedReport {
            bytes,
            page_count: document.page_count(),
            sections: document.sections().to_vec(),
        })
    }

    /// Renders `content` and adds an outline entry for every metric section.
    #[cfg(feature = "bookmarks")]
    pub fn render_with_bookmarks(
        &self,
        content: &ReportContent,
    ) -> Result<RenderedReport, ReportError> {
        let mut report = self.render(content)?;
        report.bytes = bookmarks::apply_section_bookmarks(&report.bytes, &report.sections)?;
        Ok(report)
    }
}
