//! Content of a dashboard report, independent of how it is laid out.
//!
//! The model is built with chained `with_*` calls and turned into flat lists
//! of [`Element`]s by [`ReportContent::header_elements`] and
//! [`ReportContent::section_elements`].  Chart images travel as encoded bytes
//! and are only decoded when the elements are produced.

use crate::charts::chart_title;
use crate::dataset::DateRange;
use crate::elements::{ChartImage, Element, TextStyle};
use crate::layout::{wrap_text, LayoutConfig};
use crate::metrics::{Metric, MetricsSummary};

/// Title printed at the top of every report.
pub const DEFAULT_REPORT_TITLE: &str = "Performance Dashboard Report";

/// Commentary and chart for one metric.
#[derive(Clone, Debug)]
pub struct MetricSection {
    metric: Metric,
    commentary: Option<String>,
    chart_png: Vec<u8>,
}

impl MetricSection {
    /// Creates a section showing the chart encoded in `chart_png`.
    pub fn new(metric: Metric, chart_png: Vec<u8>) -> Self {
        Self {
            metric,
            commentary: None,
            chart_png,
        }
    }

    /// Attaches commentary.  Blank text is treated as no commentary.
    pub fn with_commentary(mut self, commentary: impl Into<String>) -> Self {
        let commentary = commentary.into();
        self.commentary = if commentary.trim().is_empty() {
            None
        } else {
            Some(commentary)
        };
        self
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn commentary(&self) -> Option<&str> {
        self.commentary.as_deref()
    }

    pub fn chart_png(&self) -> &[u8] {
        &self.chart_png
    }

    /// Heading printed above the commentary.
    pub fn commentary_heading(&self) -> String {
        format!("Commentary for {}:", self.metric)
    }

    /// Caption printed above the chart.
    pub fn caption(&self) -> String {
        format!("{}:", chart_title(self.metric))
    }
}

/// Everything that goes into one report.
#[derive(Clone, Debug)]
pub struct ReportContent {
    title: String,
    date_range: Option<DateRange>,
    metrics: MetricsSummary,
    sections: Vec<MetricSection>,
}

impl Default for ReportContent {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_TITLE)
    }
}

impl ReportContent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date_range: None,
            metrics: MetricsSummary::default(),
            sections: Vec::new(),
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsSummary) -> Self {
        self.metrics = metrics;
        self
    }

    /// Appends a metric section.  Sections are printed in insertion order.
    pub fn with_section(mut self, section: MetricSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn add_section(&mut self, section: MetricSection) {
        self.sections.push(section);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    pub fn metrics(&self) -> &MetricsSummary {
        &self.metrics
    }

    pub fn sections(&self) -> &[MetricSection] {
        &self.sections
    }

    /// Header elements: title, date range, metric lines and the closing rule.
    pub fn header_elements(&self) -> Vec<Element> {
        let mut elements = vec![Element::text(self.title.as_str(), TextStyle::Title)];

        if let Some(range) = self.date_range {
            elements.push(Element::text(
                format!(
                    "Date Range: {} to {}",
                    range.start().format("%Y-%m-%d"),
                    range.end().format("%Y-%m-%d")
                ),
                TextStyle::Subtitle,
            ));
        }

        if !self.metrics.is_empty() {
            elements.push(Element::text("Main Metrics:", TextStyle::Heading));
            elements.extend(
                self.metrics
                    .entries()
                    .iter()
                    .map(|(label, value)| Element::text(format!("{label}: {value}"), TextStyle::Body)),
            );
            elements.push(Element::Rule);
        }

        elements
    }

    /// Elements of one section: commentary heading and lines, then the figure.
    ///
    /// The chart bytes are decoded here; an undecodable image is returned as
    /// an error.
    pub fn section_elements(
        section: &MetricSection,
        config: &LayoutConfig,
    ) -> Result<Vec<Element>, image::ImageError> {
        let mut elements = Vec::new();

        if let Some(commentary) = section.commentary() {
            elements.push(Element::text(section.commentary_heading(), TextStyle::Heading));
            let width = config.geometry().content_width();
            let size = TextStyle::Commentary.font_size();
            elements.extend(
                wrap_text(commentary, width, size)
                    .into_iter()
                    .map(|line| Element::text(line, TextStyle::Commentary)),
            );
        }

        let image = ChartImage::from_bytes(section.chart_png())?;
        elements.push(Element::figure(section.caption(), image));
        Ok(elements)
    }
}
