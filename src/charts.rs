//! Per-metric time series charts.
//!
//! Every chart starts from [`channel_series`], which groups the rows by channel
//! and sums each channel per day.  The interactive model and the static bitmap
//! are both derived from that single grouping so the two renderings never
//! disagree about rows or metric column.
//!
//! Axis labels on the static bitmap need a TrueType font.  The font named by
//! [`CHART_FONT_VAR`] is tried first, then a few common system locations.
//! Without a font the chart is drawn with its frame and lines only.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::NaiveDate;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use serde::Serialize;

use crate::dataset::DataRow;
use crate::forecast::{Forecast, ForecastPoint, ForecastTarget};
use crate::metrics::{format_grouped, Metric};

/// Pixel size of the static chart bitmap (2:1, matching the report figure).
pub const STATIC_CHART_SIZE: (u32, u32) = (800, 400);

/// Environment variable naming a TrueType font for static chart labels.
pub const CHART_FONT_VAR: &str = "DASHBOARD_CHART_FONT";

const CHART_MARGIN_PX: u32 = 16;
const LABEL_FONT: &str = "sans-serif";
const MAX_DATE_LABELS: usize = 8;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn register_label_font() -> bool {
    let configured = env::var_os(CHART_FONT_VAR).map(PathBuf::from);
    let candidates = configured
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = fs::read(&path) else {
            continue;
        };
        // plotters keeps registered fonts for the life of the process.
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        if register_font(LABEL_FONT, FontStyle::Normal, bytes).is_ok() {
            log::debug!("Chart labels use {}", path.display());
            return true;
        }
        log::warn!("Ignoring unreadable chart font {}", path.display());
    }

    log::warn!(
        "No chart label font found; set {} to draw axis labels",
        CHART_FONT_VAR
    );
    false
}

/// Whether static charts can be drawn with a caption and axis labels.
pub fn chart_labels_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(register_label_font)
}

/// A single `(date, value)` observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily totals of one metric for one channel, ordered by date.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelSeries {
    pub channel: String,
    pub points: Vec<ChartPoint>,
}

/// Groups `rows` by channel and sums `metric` per day.
///
/// Channels are ordered by name and points by date.  Missing cells are
/// skipped; a channel-day without any value has no point.
pub fn channel_series(rows: &[DataRow], metric: Metric) -> Vec<ChannelSeries> {
    let mut grouped: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for row in rows {
        let Some(value) = row.value(metric) else {
            continue;
        };
        *grouped
            .entry(row.channel.as_str())
            .or_default()
            .entry(row.date)
            .or_insert(0.0) += value;
    }

    grouped
        .into_iter()
        .map(|(channel, days)| ChannelSeries {
            channel: channel.to_string(),
            points: days
                .into_iter()
                .map(|(date, value)| ChartPoint { date, value })
                .collect(),
        })
        .collect()
}

/// Chart data handed to an on-screen frontend.
///
/// The frontend owns drawing and interaction; this crate only decides what is
/// plotted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InteractiveChart {
    pub metric: Metric,
    pub title: String,
    pub series: Vec<ChannelSeries>,
}

impl InteractiveChart {
    pub fn new(rows: &[DataRow], metric: Metric) -> Self {
        Self {
            metric,
            title: chart_title(metric),
            series: channel_series(rows, metric),
        }
    }

    /// Serializes the chart as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Title used for a metric chart on screen and in the report.
pub fn chart_title(metric: Metric) -> String {
    format!("{} Over Time", metric)
}

/// Forecast chart data handed to an on-screen frontend: the estimate line
/// with its lower/upper band, history first and the forecast days after it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastChart {
    pub target: ForecastTarget,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub history: Vec<ForecastPoint>,
    pub forecast: Vec<ForecastPoint>,
}

impl ForecastChart {
    pub fn new(target: ForecastTarget, forecast: &Forecast) -> Self {
        Self {
            target,
            title: format!("{} Prediction", target.metric()),
            x_label: "Date".to_string(),
            y_label: "Value".to_string(),
            history: forecast.history().to_vec(),
            forecast: forecast.future().to_vec(),
        }
    }

    /// Number of plotted days.
    pub fn len(&self) -> usize {
        self.history.len() + self.forecast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the chart as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Errors raised while drawing a static chart.
#[derive(Debug)]
pub enum ChartError {
    /// The plotting backend reported a failure.
    Draw(String),
    /// The pixel buffer did not match the requested dimensions.
    Buffer,
    /// PNG encoding failed.
    Encode(image::ImageError),
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draw(message) => write!(f, "Failed to draw chart: {message}"),
            Self::Buffer => write!(f, "Chart pixel buffer has unexpected size"),
            Self::Encode(_) => write!(f, "Failed to encode chart as PNG"),
        }
    }
}

impl std::error::Error for ChartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Draw(_) | Self::Buffer => None,
        }
    }
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err)
    }
}

fn draw_error(err: impl fmt::Display) -> ChartError {
    ChartError::Draw(err.to_string())
}

fn value_range(series: &[ChannelSeries]) -> (f64, f64) {
    let values = series
        .iter()
        .flat_map(|line| line.points.iter().map(|point| point.value));
    let (min, max) = values.fold((0.0_f64, 0.0_f64), |(min, max), value| {
        (min.min(value), max.max(value))
    });

    if max - min < f64::EPSILON {
        (min, min + 1.0)
    } else {
        let padding = (max - min) * 0.1;
        (if min < 0.0 { min - padding } else { min }, max + padding)
    }
}

struct ChartFrame<'a> {
    title: &'a str,
    y_desc: &'a str,
    dates: &'a [NaiveDate],
    x_max: usize,
    y_range: (f64, f64),
}

fn draw_lines(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    frame: &ChartFrame<'_>,
    series: &[ChannelSeries],
    labeled: bool,
) -> Result<(), ChartError> {
    let (y_min, y_max) = frame.y_range;
    let mut builder = ChartBuilder::on(root);
    builder.margin(CHART_MARGIN_PX);
    if labeled {
        builder
            .caption(frame.title, (LABEL_FONT, 22))
            .x_label_area_size(40)
            .y_label_area_size(80);
    }
    let mut chart = builder
        .build_cartesian_2d(0..frame.x_max, y_min..y_max)
        .map_err(draw_error)?;

    if labeled {
        let grid = RGBColor(225, 225, 225);
        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc(frame.y_desc)
            .x_labels(frame.dates.len().clamp(1, MAX_DATE_LABELS))
            .y_labels(8)
            .axis_style(ShapeStyle::from(&BLACK).stroke_width(1))
            .light_line_style(ShapeStyle::from(&WHITE))
            .bold_line_style(ShapeStyle::from(&grid).stroke_width(1))
            .label_style((LABEL_FONT, 13))
            .x_label_formatter(&|index| {
                frame
                    .dates
                    .get(*index)
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            })
            .y_label_formatter(&|value| format_grouped(*value))
            .draw()
            .map_err(draw_error)?;
    } else {
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(0, y_min), (frame.x_max, y_max)],
                BLACK.stroke_width(1),
            )))
            .map_err(draw_error)?;
    }

    for (index, line) in series.iter().enumerate() {
        let points = line.points.iter().filter_map(|point| {
            frame
                .dates
                .binary_search(&point.date)
                .ok()
                .map(|x| (x, point.value))
        });
        chart
            .draw_series(LineSeries::new(
                points,
                Palette99::pick(index).stroke_width(2),
            ))
            .map_err(draw_error)?;
    }

    Ok(())
}

fn draw_bitmap(
    rows: &[DataRow],
    metric: Metric,
    labeled: bool,
) -> Result<Vec<u8>, ChartError> {
    let series = channel_series(rows, metric);
    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|line| line.points.iter().map(|point| point.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let title = chart_title(metric);
    let frame = ChartFrame {
        title: &title,
        y_desc: metric.column_name(),
        dates: &dates,
        x_max: dates.len().saturating_sub(1).max(1),
        y_range: value_range(&series),
    };

    let (width, height) = STATIC_CHART_SIZE;
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_error)?;
        draw_lines(&root, &frame, &series, labeled)?;
        root.present().map_err(draw_error)?;
    }

    let image = RgbImage::from_raw(width, height, pixels).ok_or(ChartError::Buffer)?;
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// Renders the static chart for `metric` as PNG bytes.
///
/// The bitmap is drawn entirely in memory with one line per channel on a
/// shared date axis.  When a label font is available the chart carries its
/// title, date ticks and a value scale; otherwise only the frame and lines.
pub fn render_static_chart(rows: &[DataRow], metric: Metric) -> Result<Vec<u8>, ChartError> {
    let bytes = draw_bitmap(rows, metric, chart_labels_available())?;
    log::debug!("Rendered static {} chart ({} bytes)", metric, bytes.len());
    Ok(bytes)
}
