//! Forecasting over pretrained models.
//!
//! A [`ForecastModel`] is opaque: it knows its training history and can
//! predict any frame of dates.  [`forecast`] extends that history by a horizon,
//! injects the planned spend for the future days, runs the model and trims the
//! output to [`ForecastPoint`] rows.

pub mod model;

use std::fmt;
use std::path::PathBuf;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

pub use model::{ForecastTarget, TrendModel, FORECAST_TARGETS};

/// Number of future days forecast when the caller does not choose.
pub const DEFAULT_HORIZON: usize = 7;

/// Longest horizon a forecast may request.
pub const MAX_HORIZON: usize = 366;

/// One day of training history together with the spend recorded that day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub spend: f64,
}

/// Dates handed to a model for prediction: the history followed by the
/// future days.
#[derive(Clone, Debug, PartialEq)]
pub struct FutureFrame {
    rows: Vec<HistoryPoint>,
    history_len: usize,
}

impl FutureFrame {
    /// Extends `history` by `horizon` days, each carrying `estimated_spend`.
    pub fn extend(
        history: &[HistoryPoint],
        horizon: usize,
        estimated_spend: f64,
    ) -> Result<Self, ForecastError> {
        if horizon > MAX_HORIZON {
            return Err(ForecastError::HorizonTooLong {
                requested: horizon,
                max: MAX_HORIZON,
            });
        }

        let last = history.last().ok_or_else(|| {
            ForecastError::MalformedHistory("model has no training history".to_string())
        })?;

        if let Some(pair) = history.windows(2).find(|pair| pair[0].date >= pair[1].date) {
            return Err(ForecastError::MalformedHistory(format!(
                "history dates are not strictly increasing at {}",
                pair[1].date
            )));
        }

        let mut rows = Vec::with_capacity(history.len() + horizon);
        rows.extend_from_slice(history);
        for offset in 1..=horizon as u64 {
            let date = last.date.checked_add_days(Days::new(offset)).ok_or_else(|| {
                ForecastError::MalformedHistory(format!(
                    "cannot extend {} by {} days",
                    last.date, offset
                ))
            })?;
            rows.push(HistoryPoint {
                date,
                spend: estimated_spend,
            });
        }

        Ok(Self {
            rows,
            history_len: history.len(),
        })
    }

    pub fn rows(&self) -> &[HistoryPoint] {
        &self.rows
    }

    /// Number of rows that come from the training history.
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Full model output for one frame row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    pub date: NaiveDate,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    /// Contribution of the time trend alone.
    pub trend: f64,
    /// Contribution of the spend regressor alone.
    pub spend_effect: f64,
}

/// Trimmed forecast row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Forecast output: history rows followed by `horizon` future rows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Forecast {
    points: Vec<ForecastPoint>,
    horizon: usize,
}

impl Forecast {
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Returns only the rows covering the training history.
    pub fn history(&self) -> &[ForecastPoint] {
        &self.points[..self.points.len() - self.horizon]
    }

    /// Returns only the future rows.
    pub fn future(&self) -> &[ForecastPoint] {
        &self.points[self.points.len() - self.horizon..]
    }
}

/// A pretrained forecasting model.
pub trait ForecastModel {
    /// Training history, oldest first.
    fn history(&self) -> &[HistoryPoint];

    /// Predicts every row of `frame`, in order.
    fn predict(&self, frame: &FutureFrame) -> Result<Vec<Prediction>, ModelError>;
}

/// Errors raised by model artifacts and model invocation.
#[derive(Debug)]
pub enum ModelError {
    /// The artifact could not be read or written.
    Io { path: PathBuf, source: std::io::Error },
    /// The artifact is not a valid model document.
    Format(serde_json::Error),
    /// Fitting a model failed.
    Training(String),
    /// The model could not produce predictions.
    Prediction(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, .. } => write!(f, "Failed to access model {}", path.display()),
            Self::Format(_) => write!(f, "Model artifact is malformed"),
            Self::Training(message) => write!(f, "Model training failed: {message}"),
            Self::Prediction(message) => write!(f, "Model prediction failed: {message}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Format(err) => Some(err),
            Self::Training(_) | Self::Prediction(_) => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err)
    }
}

/// Errors raised while producing a forecast.
#[derive(Debug)]
pub enum ForecastError {
    /// The model history cannot be extended.
    MalformedHistory(String),
    /// More future days were requested than [`MAX_HORIZON`].
    HorizonTooLong { requested: usize, max: usize },
    /// The model failed while predicting.
    Model(ModelError),
    /// The model returned a different number of rows than requested.
    PeriodMismatch { expected: usize, actual: usize },
    /// The model returned a row for a date that was not requested.
    DateMismatch {
        index: usize,
        expected: NaiveDate,
        actual: NaiveDate,
    },
}

impl fmt::Display for ForecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHistory(message) => write!(f, "Malformed model history: {message}"),
            Self::HorizonTooLong { requested, max } => write!(
                f,
                "Forecast horizon of {} days exceeds the maximum of {}",
                requested, max
            ),
            Self::Model(_) => write!(f, "Model invocation failed"),
            Self::PeriodMismatch { expected, actual } => write!(
                f,
                "Model returned {} periods but {} were requested",
                actual, expected
            ),
            Self::DateMismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "Model row {} is dated {} but {} was requested",
                index, actual, expected
            ),
        }
    }
}

impl std::error::Error for ForecastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Model(err) => Some(err),
            Self::MalformedHistory(_)
            | Self::HorizonTooLong { .. }
            | Self::PeriodMismatch { .. }
            | Self::DateMismatch { .. } => None,
        }
    }
}

impl From<ModelError> for ForecastError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

/// Forecasts `horizon` days past the model history.
///
/// `estimated_spend` is used as the spend regressor for every future day;
/// history rows keep the spend recorded during training.
pub fn forecast<M>(model: &M, horizon: usize, estimated_spend: f64) -> Result<Forecast, ForecastError>
where
    M: ForecastModel + ?Sized,
{
    let frame = FutureFrame::extend(model.history(), horizon, estimated_spend)?;
    let predictions = model.predict(&frame)?;

    if predictions.len() != frame.len() {
        return Err(ForecastError::PeriodMismatch {
            expected: frame.len(),
            actual: predictions.len(),
        });
    }

    let mut points = Vec::with_capacity(frame.len());
    for (index, (row, prediction)) in frame.rows().iter().zip(&predictions).enumerate() {
        if row.date != prediction.date {
            return Err(ForecastError::DateMismatch {
                index,
                expected: row.date,
                actual: prediction.date,
            });
        }
        points.push(ForecastPoint {
            date: prediction.date,
            estimate: prediction.estimate,
            lower: prediction.lower,
            upper: prediction.upper,
        });
    }

    log::info!(
        "Forecast {} days past {} history rows (estimated spend {:.2})",
        horizon,
        frame.history_len(),
        estimated_spend
    );

    Ok(Forecast { points, horizon })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        history: Vec<HistoryPoint>,
        drop_rows: usize,
        fail: bool,
    }

    impl FixedModel {
        fn with_days(days: u64) -> Self {
            let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
            let history = (0..days)
                .map(|offset| HistoryPoint {
                    date: start + Days::new(offset),
                    spend: 100.0,
                })
                .collect();
            Self {
                history,
                drop_rows: 0,
                fail: false,
            }
        }
    }

    impl ForecastModel for FixedModel {
        fn history(&self) -> &[HistoryPoint] {
            &self.history
        }

        fn predict(&self, frame: &FutureFrame) -> Result<Vec<Prediction>, ModelError> {
            if self.fail {
                return Err(ModelError::Prediction("stub failure".into()));
            }
            let keep = frame.len() - self.drop_rows;
            Ok(frame.rows()[..keep]
                .iter()
                .map(|row| Prediction {
                    date: row.date,
                    estimate: 42.0 + row.spend,
                    lower: 40.0,
                    upper: 44.0 + row.spend,
                    trend: 42.0,
                    spend_effect: row.spend,
                })
                .collect())
        }
    }

    #[test]
    fn forecast_extends_history_by_contiguous_days() {
        let model = FixedModel::with_days(10);
        let result = forecast(&model, DEFAULT_HORIZON, 250.0).expect("forecast");

        assert_eq!(result.points().len(), 10 + DEFAULT_HORIZON);
        let future = result.future();
        assert_eq!(future.len(), DEFAULT_HORIZON);
        assert_eq!(future[0].date, model.history.last().unwrap().date + Days::new(1));
        for pair in future.windows(2) {
            assert_eq!(pair[1].date, pair[0].date + Days::new(1));
        }
    }

    #[test]
    fn estimated_spend_reaches_future_rows_only() {
        let model = FixedModel::with_days(3);
        let result = forecast(&model, 2, 500.0).unwrap();
        let estimates: Vec<f64> = result.points().iter().map(|p| p.estimate).collect();
        assert_eq!(estimates, vec![142.0, 142.0, 142.0, 542.0, 542.0]);
    }

    #[test]
    fn history_and_future_split_the_points() {
        let model = FixedModel::with_days(4);
        let result = forecast(&model, 3, 0.0).unwrap();
        assert_eq!(result.history().len(), 4);
        assert_eq!(result.future().len(), 3);
        assert_eq!(result.history()[3].date, model.history[3].date);
    }

    #[test]
    fn oversized_horizon_is_rejected() {
        let model = FixedModel::with_days(3);
        let err = forecast(&model, usize::MAX, 0.0).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::HorizonTooLong { requested: usize::MAX, max: MAX_HORIZON }
        ));
        assert!(forecast(&model, MAX_HORIZON, 0.0).is_ok());
    }

    #[test]
    fn empty_history_is_malformed() {
        let model = FixedModel::with_days(0);
        let err = forecast(&model, DEFAULT_HORIZON, 0.0).unwrap_err();
        assert!(matches!(err, ForecastError::MalformedHistory(_)));
    }

    #[test]
    fn unordered_history_is_malformed() {
        let mut model = FixedModel::with_days(3);
        model.history.swap(0, 2);
        let err = forecast(&model, DEFAULT_HORIZON, 0.0).unwrap_err();
        assert!(matches!(err, ForecastError::MalformedHistory(_)));
    }

    #[test]
    fn short_model_output_is_reported() {
        let mut model = FixedModel::with_days(5);
        model.drop_rows = 2;
        let err = forecast(&model, DEFAULT_HORIZON, 0.0).unwrap_err();
        match err {
            ForecastError::PeriodMismatch { expected, actual } => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn model_failures_surface_as_model_errors() {
        let mut model = FixedModel::with_days(5);
        model.fail = true;
        let err = forecast(&model, DEFAULT_HORIZON, 0.0).unwrap_err();
        assert!(matches!(err, ForecastError::Model(ModelError::Prediction(_))));
        assert!(std::error::Error::source(&err).is_some());
    }
}
