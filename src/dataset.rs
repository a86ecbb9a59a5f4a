//! Loading and filtering of the tabular advertising dataset.
//!
//! The dataset is a CSV file with one row per date and channel.  Rows dated
//! before [`DATA_CUTOFF`] are dropped while loading so every consumer works on
//! the same history.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::metrics::Metric;

/// Earliest date kept when loading a dataset.
pub const DATA_CUTOFF: NaiveDate = match NaiveDate::from_ymd_opt(2023, 3, 1) {
    Some(date) => date,
    None => panic!("invalid cutoff date"),
};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A single dataset row: one channel on one day.
///
/// A blank measure cell is `None`.  Days without bookings have no cost per
/// booking, so missing values are expected in real exports.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRow {
    pub date: NaiveDate,
    pub channel: String,
    pub spend: Option<f64>,
    pub impressions: Option<f64>,
    pub bookings: Option<f64>,
    pub cpb: Option<f64>,
    pub cpc: Option<f64>,
}

impl DataRow {
    /// Returns the value of the column backing `metric`, if present.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Spend => self.spend,
            Metric::Impressions => self.impressions,
            Metric::Bookings => self.bookings,
            Metric::Cpb => self.cpb,
            Metric::Cpc => self.cpc,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Channel")]
    channel: String,
    #[serde(rename = "Spend")]
    spend: Option<f64>,
    #[serde(rename = "Impressions")]
    impressions: Option<f64>,
    #[serde(rename = "Bookings")]
    bookings: Option<f64>,
    #[serde(rename = "CPB")]
    cpb: Option<f64>,
    #[serde(rename = "CPC")]
    cpc: Option<f64>,
}

/// Errors raised while loading the dataset.
#[derive(Debug)]
pub enum DataError {
    /// The environment variable naming the dataset path is not set.
    MissingConfig(&'static str),
    /// The dataset file could not be opened.
    Io { path: PathBuf, source: std::io::Error },
    /// A record could not be parsed as a dataset row.
    Csv(csv::Error),
    /// The `Date` column held a value that is not a calendar date.
    InvalidDate { line: usize, value: String },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConfig(var) => {
                write!(f, "Dataset path is not configured; set {var} or pass --data")
            }
            Self::Io { path, .. } => write!(f, "Failed to open dataset {}", path.display()),
            Self::Csv(_) => write!(f, "Failed to parse dataset record"),
            Self::InvalidDate { line, value } => {
                write!(f, "Invalid date {:?} on line {}", value, line)
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv(err) => Some(err),
            Self::MissingConfig(_) | Self::InvalidDate { .. } => None,
        }
    }
}

impl From<csv::Error> for DataError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|stamp| stamp.date())
}

/// Inclusive range of calendar dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range covering `start..=end`.
    ///
    /// A range whose start lies after its end is valid and matches nothing.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The loaded dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<DataRow>,
}

impl Dataset {
    /// Wraps already parsed rows without applying the cutoff.
    pub fn from_rows(rows: impl Into<Vec<DataRow>>) -> Self {
        Self { rows: rows.into() }
    }

    /// Loads the CSV file at `path`, dropping rows before [`DATA_CUTOFF`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file)?;
        log::info!(
            "Loaded {} rows from {}",
            dataset.rows.len(),
            path.display()
        );
        Ok(dataset)
    }

    /// Parses CSV content from any reader, dropping rows before [`DATA_CUTOFF`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        let mut dropped = 0usize;

        for (index, record) in reader.deserialize::<RawRow>().enumerate() {
            let raw = record?;
            let date = parse_date(&raw.date).ok_or_else(|| DataError::InvalidDate {
                // header occupies line 1
                line: index + 2,
                value: raw.date.clone(),
            })?;

            if date < DATA_CUTOFF {
                dropped += 1;
                continue;
            }

            rows.push(DataRow {
                date,
                channel: raw.channel,
                spend: raw.spend,
                impressions: raw.impressions,
                bookings: raw.bookings,
                cpb: raw.cpb,
                cpc: raw.cpc,
            });
        }

        if dropped > 0 {
            log::debug!("Dropped {} rows dated before {}", dropped, DATA_CUTOFF);
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the earliest and latest dates present, if any.
    pub fn date_bounds(&self) -> Option<DateRange> {
        let min = self.rows.iter().map(|row| row.date).min()?;
        let max = self.rows.iter().map(|row| row.date).max()?;
        Some(DateRange::new(min, max))
    }

    /// Returns the rows whose date falls within `range`.
    pub fn filter(&self, range: DateRange) -> Dataset {
        Dataset {
            rows: self
                .rows
                .iter()
                .filter(|row| range.contains(row.date))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const SAMPLE: &str = "\
Date,Channel,Spend,Impressions,Bookings,CPB,CPC
2023-02-27,Search,10,100,1,10,0.1
2023-03-01,Search,20,200,2,10,0.2
2023-03-02 00:00:00,Social,30,300,3,10,0.3
2023-03-05,Search,40,400,4,10,0.4
";

    #[test]
    fn load_drops_rows_before_cutoff() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes()).expect("parse sample");
        assert_eq!(dataset.len(), 3);
        assert!(dataset.rows().iter().all(|row| row.date >= DATA_CUTOFF));
        assert_eq!(dataset.rows()[1].date, date(2023, 3, 2));
        assert_eq!(dataset.rows()[1].channel, "Social");
    }

    #[test]
    fn invalid_date_reports_line() {
        let input = "Date,Channel,Spend,Impressions,Bookings,CPB,CPC\nyesterday,Search,1,1,1,1,1\n";
        let err = Dataset::from_reader(input.as_bytes()).unwrap_err();
        match err {
            DataError::InvalidDate { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_measure_cells_are_missing_values() {
        let input = "\
Date,Channel,Spend,Impressions,Bookings,CPB,CPC
2023-03-01,Search,12.5,300,0,,0.1
2023-03-02,Search,,400,2,6,
";
        let dataset = Dataset::from_reader(input.as_bytes()).expect("blank cells load");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].cpb, None);
        assert_eq!(dataset.rows()[0].value(Metric::Bookings), Some(0.0));
        assert_eq!(dataset.rows()[1].spend, None);
        assert_eq!(dataset.rows()[1].cpc, None);
    }

    #[test]
    fn non_numeric_measure_is_a_csv_error() {
        let input = "Date,Channel,Spend,Impressions,Bookings,CPB,CPC\n2023-03-01,Search,ten,1,1,1,1\n";
        let err = Dataset::from_reader(input.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Csv(_)));
    }

    #[test]
    fn missing_column_is_a_csv_error() {
        let input = "Date,Channel,Spend\n2023-03-01,Search,1\n";
        let err = Dataset::from_reader(input.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Csv(_)));
    }

    #[test]
    fn filter_is_inclusive_and_idempotent() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let range = DateRange::new(date(2023, 3, 1), date(2023, 3, 2));

        let once = dataset.filter(range);
        let twice = once.filter(range);

        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn inverted_range_matches_nothing() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let range = DateRange::new(date(2023, 3, 5), date(2023, 3, 1));
        assert!(dataset.filter(range).is_empty());
    }

    #[test]
    fn date_bounds_cover_all_rows() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let bounds = dataset.date_bounds().unwrap();
        assert_eq!(bounds.start(), date(2023, 3, 1));
        assert_eq!(bounds.end(), date(2023, 3, 5));
        assert!(Dataset::default().date_bounds().is_none());
    }
}
