//! Summary metrics computed over a filtered dataset.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DataRow;

/// Metrics tracked by the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Spend,
    Impressions,
    Bookings,
    #[serde(rename = "CPB")]
    Cpb,
    #[serde(rename = "CPC")]
    Cpc,
}

/// Display and report order of the metrics.
///
/// Chart listings and report sections both iterate this constant.
pub const METRIC_ORDER: [Metric; 5] = [
    Metric::Spend,
    Metric::Impressions,
    Metric::Bookings,
    Metric::Cpb,
    Metric::Cpc,
];

impl Metric {
    /// Column header of the metric in the dataset.
    pub fn column_name(self) -> &'static str {
        match self {
            Metric::Spend => "Spend",
            Metric::Impressions => "Impressions",
            Metric::Bookings => "Bookings",
            Metric::Cpb => "CPB",
            Metric::Cpc => "CPC",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Error returned when a metric name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownMetric(pub String);

impl fmt::Display for UnknownMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown metric {:?}; expected one of Spend, Impressions, Bookings, CPB, CPC",
            self.0
        )
    }
}

impl std::error::Error for UnknownMetric {}

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METRIC_ORDER
            .iter()
            .copied()
            .find(|metric| metric.column_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// Placeholder shown for an average over zero rows.
pub const NOT_AVAILABLE: &str = "N/A";

/// Ordered list of labeled, formatted summary values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    entries: Vec<(String, String)>,
}

impl MetricsSummary {
    /// Returns the `(label, value)` pairs in display order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Looks up the formatted value for `label`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// `Sum for f64` starts from -0.0, which would print as "-0.00".
fn sum(rows: &[DataRow], metric: Metric) -> f64 {
    rows.iter()
        .filter_map(|row| row.value(metric))
        .fold(0.0, |total, value| total + value)
}

fn mean(rows: &[DataRow], metric: Metric) -> Option<f64> {
    let (total, count) = rows
        .iter()
        .filter_map(|row| row.value(metric))
        .fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

/// Computes the dashboard summary for `rows`.
///
/// Missing cells are skipped.  Totals over zero values are `0`; averages over
/// zero values are undefined and reported as [`NOT_AVAILABLE`].
pub fn calculate_metrics(rows: &[DataRow]) -> MetricsSummary {
    let currency_mean = |metric| match mean(rows, metric) {
        Some(value) => format!("${:.2}", value),
        None => NOT_AVAILABLE.to_string(),
    };

    let entries = vec![
        (
            "Total Spend".to_string(),
            format!("${}", format_grouped(sum(rows, Metric::Spend))),
        ),
        (
            "Total Impressions".to_string(),
            format_grouped(sum(rows, Metric::Impressions)),
        ),
        (
            "Total Bookings".to_string(),
            format!("{:.2}", sum(rows, Metric::Bookings)),
        ),
        (
            "Average Cost Per Booking (CPB)".to_string(),
            currency_mean(Metric::Cpb),
        ),
        (
            "Average Cost Per Click (CPC)".to_string(),
            currency_mean(Metric::Cpc),
        ),
    ];

    MetricsSummary { entries }
}

/// Formats `value` with two decimals and `,` thousands separators.
pub fn format_grouped(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (integer, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value.is_sign_negative() && formatted.bytes().any(|b| b != b'0' && b != b'.') {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, spend: f64, impressions: f64, bookings: f64, cpb: f64, cpc: f64) -> DataRow {
        DataRow {
            date: NaiveDate::from_ymd_opt(2023, 3, day).unwrap(),
            channel: "Search".into(),
            spend: Some(spend),
            impressions: Some(impressions),
            bookings: Some(bookings),
            cpb: Some(cpb),
            cpc: Some(cpc),
        }
    }

    #[test]
    fn grouped_formatting() {
        assert_eq!(format_grouped(0.0), "0.00");
        assert_eq!(format_grouped(999.999), "1,000.00");
        assert_eq!(format_grouped(1234567.891), "1,234,567.89");
        assert_eq!(format_grouped(-1234.5), "-1,234.50");
        assert_eq!(format_grouped(-0.001), "0.00");
    }

    #[test]
    fn sums_and_means_follow_rows() {
        let rows = vec![
            row(1, 1000.25, 120000.0, 3.0, 10.0, 0.5),
            row(2, 500.50, 80000.0, 4.5, 20.0, 1.5),
        ];
        let summary = calculate_metrics(&rows);

        assert_eq!(summary.len(), 5);
        assert_eq!(summary.get("Total Spend"), Some("$1,500.75"));
        assert_eq!(summary.get("Total Impressions"), Some("200,000.00"));
        assert_eq!(summary.get("Total Bookings"), Some("7.50"));
        assert_eq!(summary.get("Average Cost Per Booking (CPB)"), Some("$15.00"));
        assert_eq!(summary.get("Average Cost Per Click (CPC)"), Some("$1.00"));
    }

    #[test]
    fn labels_keep_display_order() {
        let labels: Vec<_> = calculate_metrics(&[])
            .entries()
            .iter()
            .map(|(label, _)| label.clone())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Total Spend",
                "Total Impressions",
                "Total Bookings",
                "Average Cost Per Booking (CPB)",
                "Average Cost Per Click (CPC)",
            ]
        );
    }

    #[test]
    fn empty_range_uses_zero_totals_and_unavailable_averages() {
        let summary = calculate_metrics(&[]);
        assert_eq!(summary.get("Total Spend"), Some("$0.00"));
        assert_eq!(summary.get("Total Impressions"), Some("0.00"));
        assert_eq!(summary.get("Total Bookings"), Some("0.00"));
        assert_eq!(summary.get("Average Cost Per Booking (CPB)"), Some(NOT_AVAILABLE));
        assert_eq!(summary.get("Average Cost Per Click (CPC)"), Some(NOT_AVAILABLE));
    }

    #[test]
    fn empty_total_is_positive_zero() {
        assert!(!sum(&[], Metric::Bookings).is_sign_negative());
        assert_eq!(calculate_metrics(&[]).get("Total Bookings"), Some("0.00"));
    }

    #[test]
    fn missing_values_are_skipped() {
        let mut zero_bookings = row(2, 50.0, 1000.0, 0.0, 0.0, 0.5);
        zero_bookings.cpb = None;
        let mut no_spend = row(3, 0.0, 500.0, 2.0, 30.0, 1.5);
        no_spend.spend = None;
        let rows = vec![row(1, 100.0, 2000.0, 5.0, 20.0, 1.0), zero_bookings, no_spend];

        let summary = calculate_metrics(&rows);
        assert_eq!(summary.get("Total Spend"), Some("$150.00"));
        assert_eq!(summary.get("Total Bookings"), Some("7.00"));
        // CPB averages the two present cells, not all three rows.
        assert_eq!(summary.get("Average Cost Per Booking (CPB)"), Some("$25.00"));
        assert_eq!(summary.get("Average Cost Per Click (CPC)"), Some("$1.00"));
    }

    #[test]
    fn all_missing_average_is_unavailable() {
        let mut only = row(1, 10.0, 100.0, 0.0, 0.0, 0.1);
        only.cpb = None;
        let summary = calculate_metrics(&[only]);
        assert_eq!(summary.get("Average Cost Per Booking (CPB)"), Some(NOT_AVAILABLE));
        assert_eq!(summary.get("Average Cost Per Click (CPC)"), Some("$0.10"));
    }

    #[test]
    fn metric_names_parse_case_insensitively() {
        assert_eq!("cpb".parse::<Metric>(), Ok(Metric::Cpb));
        assert_eq!(" Spend ".parse::<Metric>(), Ok(Metric::Spend));
        assert!("Clicks".parse::<Metric>().is_err());
    }
}
