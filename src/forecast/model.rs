//! Linear trend model with a spend regressor, stored as a JSON artifact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::{ForecastModel, FutureFrame, HistoryPoint, ModelError, Prediction};
use crate::dataset::DataRow;
use crate::metrics::Metric;

/// Fewest distinct days a model can be trained on.
pub const MIN_TRAINING_DAYS: usize = 5;

/// Coverage of the prediction interval.
pub const INTERVAL_WIDTH: f64 = 0.8;

/// Series the dashboard forecasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastTarget {
    Bookings,
    Cpb,
    Impressions,
}

/// Forecast targets in display order.
pub const FORECAST_TARGETS: [ForecastTarget; 3] = [
    ForecastTarget::Bookings,
    ForecastTarget::Cpb,
    ForecastTarget::Impressions,
];

impl ForecastTarget {
    pub fn metric(self) -> Metric {
        match self {
            ForecastTarget::Bookings => Metric::Bookings,
            ForecastTarget::Cpb => Metric::Cpb,
            ForecastTarget::Impressions => Metric::Impressions,
        }
    }

    /// File name of the model artifact inside the models directory.
    pub fn artifact_name(self) -> &'static str {
        match self {
            ForecastTarget::Bookings => "model_bookings.json",
            ForecastTarget::Cpb => "model_cpb.json",
            ForecastTarget::Impressions => "model_impressions.json",
        }
    }

    /// Ratios are averaged per day; counts are summed.
    fn averages_per_day(self) -> bool {
        matches!(self, ForecastTarget::Cpb)
    }
}

#[derive(Default)]
struct DailyTotals {
    target: f64,
    spend: f64,
    values: usize,
}

/// Daily `(date, target, spend)` aggregates.
///
/// Missing target cells are skipped and a day without any target value is left
/// out of training.  Missing spend counts as no spend.
fn daily_series(target: ForecastTarget, rows: &[DataRow]) -> Vec<(NaiveDate, f64, f64)> {
    let mut days: BTreeMap<NaiveDate, DailyTotals> = BTreeMap::new();
    for row in rows {
        let totals = days.entry(row.date).or_default();
        totals.spend += row.spend.unwrap_or(0.0);
        if let Some(value) = row.value(target.metric()) {
            totals.target += value;
            totals.values += 1;
        }
    }

    days.into_iter()
        .filter(|(_, totals)| totals.values > 0)
        .map(|(date, totals)| {
            let value = if target.averages_per_day() {
                totals.target / totals.values as f64
            } else {
                totals.target
            };
            (date, value, totals.spend)
        })
        .collect()
}

/// `estimate = intercept + trend_per_day * days + spend_coefficient * spend`
/// with a symmetric Student-t interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    target: ForecastTarget,
    origin: NaiveDate,
    intercept: f64,
    trend_per_day: f64,
    spend_coefficient: f64,
    residual_se: f64,
    interval_t: f64,
    history: Vec<HistoryPoint>,
}

impl TrendModel {
    /// Fits a model for `target` on the daily aggregates of `rows`.
    pub fn fit(target: ForecastTarget, rows: &[DataRow]) -> Result<Self, ModelError> {
        let series = daily_series(target, rows);
        let n = series.len();
        if n < MIN_TRAINING_DAYS {
            return Err(ModelError::Training(format!(
                "need at least {} days of data, got {}",
                MIN_TRAINING_DAYS, n
            )));
        }

        let origin = series[0].0;
        let days: Vec<f64> = series
            .iter()
            .map(|(date, _, _)| (*date - origin).num_days() as f64)
            .collect();
        let values: Vec<f64> = series.iter().map(|(_, value, _)| *value).collect();
        let spends: Vec<f64> = series.iter().map(|(_, _, spend)| *spend).collect();

        // A constant regressor makes the design matrix singular.
        let spend_varies = spends.iter().any(|spend| (spend - spends[0]).abs() > f64::EPSILON);
        let (formula, data) = if spend_varies {
            (
                "Y ~ T + S",
                vec![
                    ("Y".to_string(), values),
                    ("T".to_string(), days),
                    ("S".to_string(), spends.clone()),
                ],
            )
        } else {
            (
                "Y ~ T",
                vec![("Y".to_string(), values), ("T".to_string(), days)],
            )
        };

        let regression_data = RegressionDataBuilder::new()
            .build_from(data)
            .map_err(|e| ModelError::Training(format!("invalid regression data: {}", e)))?;
        let regression = FormulaRegressionBuilder::new()
            .data(&regression_data)
            .formula(formula)
            .fit()
            .map_err(|e| ModelError::Training(format!("regression failed: {}", e)))?;

        let params = regression.parameters();
        let intercept = params[0];
        let trend_per_day = params[1];
        let spend_coefficient = if spend_varies { params[2] } else { 0.0 };
        let residual_se = regression.scale().sqrt();

        let degrees_of_freedom = (n - params.len()) as f64;
        let t_dist = StudentsT::new(0.0, 1.0, degrees_of_freedom)
            .map_err(|e| ModelError::Training(format!("invalid t-distribution: {}", e)))?;
        let interval_t = t_dist.inverse_cdf(1.0 - (1.0 - INTERVAL_WIDTH) / 2.0);

        let history = series
            .iter()
            .map(|(date, _, spend)| HistoryPoint {
                date: *date,
                spend: *spend,
            })
            .collect();

        log::info!(
            "Trained {:?} model on {} days (trend {:.4}/day, spend coefficient {:.4})",
            target,
            n,
            trend_per_day,
            spend_coefficient
        );

        Ok(Self {
            target,
            origin,
            intercept,
            trend_per_day,
            spend_coefficient,
            residual_se: if residual_se.is_finite() { residual_se } else { 0.0 },
            interval_t,
            history,
        })
    }

    pub fn target(&self) -> ForecastTarget {
        self.target
    }

    pub fn trend_per_day(&self) -> f64 {
        self.trend_per_day
    }

    pub fn spend_coefficient(&self) -> f64 {
        self.spend_coefficient
    }

    /// Reads a model artifact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the model artifact to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ForecastModel for TrendModel {
    fn history(&self) -> &[HistoryPoint] {
        &self.history
    }

    fn predict(&self, frame: &FutureFrame) -> Result<Vec<Prediction>, ModelError> {
        let half_width = self.interval_t * self.residual_se;
        if !half_width.is_finite() {
            return Err(ModelError::Prediction(
                "prediction interval is not finite".to_string(),
            ));
        }

        frame
            .rows()
            .iter()
            .map(|row| {
                let days = (row.date - self.origin).num_days() as f64;
                let trend = self.intercept + self.trend_per_day * days;
                let spend_effect = self.spend_coefficient * row.spend;
                let estimate = trend + spend_effect;
                if !estimate.is_finite() {
                    return Err(ModelError::Prediction(format!(
                        "estimate for {} is not finite",
                        row.date
                    )));
                }
                Ok(Prediction {
                    date: row.date,
                    estimate,
                    lower: estimate - half_width,
                    upper: estimate + half_width,
                    trend,
                    spend_effect,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{forecast, DEFAULT_HORIZON};
    use chrono::Days;

    fn training_rows(days: u64) -> Vec<DataRow> {
        let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        (0..days)
            .map(|t| {
                let spend = 100.0 + ((t * 37) % 11) as f64 * 10.0;
                let noise = (((t * 7) % 5) as f64 - 2.0) * 0.1;
                DataRow {
                    date: start + Days::new(t),
                    channel: "Search".into(),
                    spend: Some(spend),
                    impressions: Some(1000.0),
                    bookings: Some(5.0 + 2.0 * t as f64 + 0.5 * spend + noise),
                    cpb: Some(20.0),
                    cpc: Some(0.5),
                }
            })
            .collect()
    }

    #[test]
    fn fit_recovers_trend_and_spend_effect() {
        let model = TrendModel::fit(ForecastTarget::Bookings, &training_rows(30)).expect("fit");
        assert!((model.trend_per_day() - 2.0).abs() < 0.1);
        assert!((model.spend_coefficient() - 0.5).abs() < 0.05);
        assert_eq!(model.history().len(), 30);
    }

    #[test]
    fn fit_requires_minimum_history() {
        let err = TrendModel::fit(ForecastTarget::Bookings, &training_rows(3)).unwrap_err();
        assert!(matches!(err, ModelError::Training(_)));
    }

    #[test]
    fn cpb_is_averaged_per_day() {
        let mut rows = training_rows(2);
        let mut second_channel = rows[0].clone();
        second_channel.channel = "Social".into();
        second_channel.cpb = Some(40.0);
        rows.push(second_channel);

        let series = daily_series(ForecastTarget::Cpb, &rows);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].1, 30.0);
    }

    #[test]
    fn missing_cells_are_left_out_of_training() {
        let mut rows = training_rows(3);
        let mut blank = rows[1].clone();
        blank.channel = "Social".into();
        blank.cpb = None;
        blank.spend = None;
        rows.push(blank);
        rows[2].cpb = None;

        let series = daily_series(ForecastTarget::Cpb, &rows);
        let dates: Vec<NaiveDate> = series.iter().map(|(date, _, _)| *date).collect();
        assert_eq!(dates, vec![rows[0].date, rows[1].date]);
        // The blank Social row neither dilutes the average nor adds spend.
        assert_eq!(series[1].1, 20.0);
        assert_eq!(series[1].2, rows[1].spend.unwrap());
    }

    #[test]
    fn trained_model_forecasts_with_ordered_bounds() {
        let model = TrendModel::fit(ForecastTarget::Bookings, &training_rows(30)).unwrap();
        let result = forecast(&model, DEFAULT_HORIZON, 150.0).unwrap();
        assert_eq!(result.points().len(), 30 + DEFAULT_HORIZON);
        for point in result.points() {
            assert!(point.lower <= point.estimate && point.estimate <= point.upper);
        }
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let model = TrendModel::fit(ForecastTarget::Bookings, &training_rows(10)).unwrap();
        let path = std::env::temp_dir().join(format!(
            "dashboard_report_model_{}.json",
            std::process::id()
        ));
        model.save(&path).unwrap();
        let loaded = TrendModel::load(&path);
        let _ = fs::remove_file(&path);

        let loaded = loaded.unwrap();
        assert_eq!(loaded.target(), ForecastTarget::Bookings);
        assert_eq!(loaded.history(), model.history());
        assert!((loaded.trend_per_day() - model.trend_per_day()).abs() < 1e-9);
    }

    #[test]
    fn missing_artifact_is_an_io_error() {
        let err = TrendModel::load("/__dashboard_report_missing__/model.json").unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }
}
