//! Explicit dashboard state shared by every view.
//!
//! A [`DashboardSession`] owns the loaded dataset together with the user's
//! selections (date range, commentary, estimated spend) and the forecast
//! models.  Views read from it; nothing is kept between sessions.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::builder::{RenderedReport, ReportBuilder, ReportError};
use crate::charts::{render_static_chart, InteractiveChart};
use crate::dataset::{DataError, Dataset, DateRange, DATA_CUTOFF};
use crate::forecast::{
    forecast, Forecast, ForecastError, ForecastTarget, ModelError, TrendModel, FORECAST_TARGETS,
};
use crate::metrics::{calculate_metrics, Metric, MetricsSummary, METRIC_ORDER};
use crate::model::{MetricSection, ReportContent};

/// Environment variable holding the dataset path.
pub const DATA_PATH_VAR: &str = "DASHBOARD_DATA_PATH";

/// Environment variable holding the model artifact directory.
pub const MODELS_DIR_VAR: &str = "DASHBOARD_MODELS_DIR";

/// Model directory used when [`MODELS_DIR_VAR`] is not set.
pub const DEFAULT_MODELS_DIR: &str = "models";

/// Locations of the dashboard inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardConfig {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
}

impl DashboardConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, DataError> {
        let data_path = env::var_os(DATA_PATH_VAR)
            .filter(|value| !value.is_empty())
            .ok_or(DataError::MissingConfig(DATA_PATH_VAR))?;
        let models_dir = env::var_os(MODELS_DIR_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR));

        Ok(Self {
            data_path: PathBuf::from(data_path),
            models_dir,
        })
    }

    pub fn with_models_dir(mut self, models_dir: impl Into<PathBuf>) -> Self {
        self.models_dir = models_dir.into();
        self
    }
}

/// Loads every forecast model artifact from `dir`.
///
/// Each target is reported separately so one missing artifact does not hide
/// the others.
pub fn load_models(dir: &Path) -> Vec<(ForecastTarget, Result<TrendModel, ModelError>)> {
    FORECAST_TARGETS
        .iter()
        .map(|&target| (target, TrendModel::load(dir.join(target.artifact_name()))))
        .collect()
}

/// Fits every forecast model on `dataset` and writes the artifacts into `dir`.
pub fn train_models(
    dataset: &Dataset,
    dir: &Path,
) -> Result<Vec<(ForecastTarget, Result<PathBuf, ModelError>)>, ModelError> {
    fs::create_dir_all(dir).map_err(|source| ModelError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(FORECAST_TARGETS
        .iter()
        .map(|&target| {
            let path = dir.join(target.artifact_name());
            let result = TrendModel::fit(target, dataset.rows())
                .and_then(|model| model.save(&path))
                .map(|()| path);
            (target, result)
        })
        .collect())
}

/// State of one dashboard session.
#[derive(Clone, Debug)]
pub struct DashboardSession {
    dataset: Dataset,
    range: DateRange,
    commentary: BTreeMap<Metric, String>,
    estimated_spend: f64,
    models: Vec<(ForecastTarget, TrendModel)>,
}

impl DashboardSession {
    /// Starts a session covering the full date span of `dataset`.
    pub fn new(dataset: Dataset) -> Self {
        let range = dataset
            .date_bounds()
            .unwrap_or_else(|| DateRange::new(DATA_CUTOFF, DATA_CUTOFF));
        Self {
            dataset,
            range,
            commentary: BTreeMap::new(),
            estimated_spend: 0.0,
            models: Vec::new(),
        }
    }

    /// Loads the dataset named by `config` and starts a session over it.
    pub fn open(config: &DashboardConfig) -> Result<Self, DataError> {
        Ok(Self::new(Dataset::load(&config.data_path)?))
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_estimated_spend(mut self, spend: f64) -> Self {
        self.estimated_spend = spend;
        self
    }

    /// Adds forecast models; a later model for the same target replaces the earlier one.
    pub fn with_models(mut self, models: impl IntoIterator<Item = (ForecastTarget, TrendModel)>) -> Self {
        for (target, model) in models {
            self.models.retain(|(existing, _)| *existing != target);
            self.models.push((target, model));
        }
        self
    }

    pub fn set_range(&mut self, range: DateRange) {
        self.range = range;
    }

    /// Sets the commentary for `metric`; blank text clears it.
    pub fn set_commentary(&mut self, metric: Metric, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            self.commentary.remove(&metric);
        } else {
            self.commentary.insert(metric, text);
        }
    }

    pub fn set_estimated_spend(&mut self, spend: f64) {
        self.estimated_spend = spend;
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn commentary(&self, metric: Metric) -> Option<&str> {
        self.commentary.get(&metric).map(String::as_str)
    }

    pub fn estimated_spend(&self) -> f64 {
        self.estimated_spend
    }

    /// Rows inside the selected date range.
    pub fn filtered(&self) -> Dataset {
        self.dataset.filter(self.range)
    }

    /// Summary metrics of the selected range.
    pub fn metrics(&self) -> MetricsSummary {
        calculate_metrics(self.filtered().rows())
    }

    /// Interactive chart of every metric, serialized as JSON.
    ///
    /// A chart that cannot be serialized is logged and skipped.
    pub fn interactive_charts(&self) -> Vec<(Metric, String)> {
        let filtered = self.filtered();
        METRIC_ORDER
            .iter()
            .filter_map(|&metric| match InteractiveChart::new(filtered.rows(), metric).to_json() {
                Ok(json) => Some((metric, json)),
                Err(err) => {
                    log::warn!("Skipping {} chart: {}", metric, err);
                    None
                }
            })
            .collect()
    }

    /// Forecasts every loaded model `horizon` days ahead at the session's
    /// estimated spend.
    pub fn forecast_all(&self, horizon: usize) -> Vec<(ForecastTarget, Result<Forecast, ForecastError>)> {
        self.models
            .iter()
            .map(|(target, model)| (*target, forecast(model, horizon, self.estimated_spend)))
            .collect()
    }

    /// Collects everything the report shows for the selected range.
    pub fn report_content(&self) -> Result<ReportContent, ReportError> {
        let filtered = self.filtered();
        let mut content = ReportContent::default()
            .with_date_range(self.range)
            .with_metrics(calculate_metrics(filtered.rows()));

        for &metric in METRIC_ORDER.iter() {
            let chart = render_static_chart(filtered.rows(), metric)
                .map_err(|source| ReportError::Chart { metric, source })?;
            let mut section = MetricSection::new(metric, chart);
            if let Some(text) = self.commentary(metric) {
                section = section.with_commentary(text);
            }
            content.add_section(section);
        }

        Ok(content)
    }

    /// Builds and renders the report for the selected range.
    pub fn generate_report(&self, builder: &ReportBuilder) -> Result<RenderedReport, ReportError> {
        builder.render(&self.report_content()?)
    }
}
