//! Performance dashboard: dataset loading, summary metrics, charts,
//! forecasts and a paginated PDF report.

pub mod builder;
pub mod charts;
pub mod dataset;
pub mod elements;
pub mod fonts;
pub mod forecast;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod render;
pub mod session;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;

pub use builder::{RenderedReport, ReportBuilder, ReportError, REPORT_FILE_NAME, REPORT_MEDIA_TYPE};
pub use dataset::{DataError, Dataset, DateRange};
pub use metrics::{calculate_metrics, Metric, METRIC_ORDER};
pub use session::{DashboardConfig, DashboardSession};
