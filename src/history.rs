//! Historical trend aggregation for charting.
//!
//! Loads the last N days of temperature and humidity measurements, drops
//! rows whose humidity lies outside the 5th..95th percentile of the window
//! (the same mask removes the paired temperature), and averages what is left
//! per hour of day.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{Days, Local, NaiveDate};
use serde::Serialize;

use crate::domain::Metric;
use crate::error::HistoryError;
use crate::measurements::{MeasurementLog, MeasurementRecord, DATE_FORMAT};

/// share of rows trimmed from each side of the humidity distribution
pub const OUTLIER_FRACTION: f64 = 0.05;

/// longest window a single request may span (about ten years)
pub const MAX_WINDOW_DAYS: u64 = 3660;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyMean {
    pub hour: u8,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDataset {
    pub title: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// rows left after outlier removal
    pub rows: usize,
    pub hourly_humidity: Vec<HourlyMean>,
    pub hourly_temperature: Vec<HourlyMean>,
}

/// a humidity sample and the temperature written alongside it
#[derive(Debug, Clone, Copy, PartialEq)]
struct Row {
    hour: u8,
    humidity: f64,
    temperature: f64,
}

/// "14:32:07" -> 14
fn hour_of(time: &str) -> Option<u8> {
    let hour: u8 = time.split(':').next()?.trim().parse().ok()?;
    (hour < 24).then_some(hour)
}

/// percentile with linear interpolation between closest ranks
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

/// Parse a day count typed by the user.
pub fn parse_days(input: &str) -> Result<i64, HistoryError> {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|days| *days > 0)
        .ok_or_else(|| HistoryError::Input(input.to_string()))
}

pub struct HistoryAggregator {
    log: MeasurementLog,
}

impl HistoryAggregator {
    pub fn new(log: MeasurementLog) -> Self {
        Self { log }
    }

    /// Aggregate the window ending today.
    pub fn build(&self, number_of_days: i64) -> Result<HistoryDataset, HistoryError> {
        self.build_until(number_of_days, Local::now().date_naive())
    }

    /// Aggregate the window `[today - (number_of_days - 1), today]`.
    pub fn build_until(
        &self,
        number_of_days: i64,
        today: NaiveDate,
    ) -> Result<HistoryDataset, HistoryError> {
        if number_of_days <= 0 {
            return Err(HistoryError::Input(number_of_days.to_string()));
        }

        let span = (number_of_days as u64).min(MAX_WINDOW_DAYS);
        let dates: Vec<NaiveDate> = (0..span)
            .map_while(|back| today.checked_sub_days(Days::new(back)))
            .collect();
        let from = dates.last().copied().unwrap_or(today);

        let rows = self.load_rows(&dates)?;
        if rows.is_empty() {
            return Err(HistoryError::Data {
                from: from.format(DATE_FORMAT).to_string(),
                to: today.format(DATE_FORMAT).to_string(),
            });
        }

        let rows = trim_outliers(rows);
        let (hourly_humidity, hourly_temperature) = hourly_means(&rows);

        let title = if number_of_days == 1 {
            "Today's data".to_string()
        } else {
            format!(
                "Data from {} to {}",
                from.format(DATE_FORMAT),
                today.format(DATE_FORMAT)
            )
        };

        tracing::debug!(rows = rows.len(), %from, %today, "History aggregated");
        Ok(HistoryDataset {
            title,
            from,
            to: today,
            rows: rows.len(),
            hourly_humidity,
            hourly_temperature,
        })
    }

    /// Pair each humidity line with the temperature line written in the same
    /// tick, matched on `(date, time)`.
    fn load_rows(&self, dates: &[NaiveDate]) -> Result<Vec<Row>, HistoryError> {
        let mut rows = Vec::new();

        for date in dates {
            let humidity = self.read_day(Metric::Humidity, *date)?;
            let temperature = self.read_day(Metric::Temperature, *date)?;

            let mut by_time: HashMap<(NaiveDate, &str), VecDeque<f64>> = HashMap::new();
            for t in &temperature {
                by_time
                    .entry((t.date, t.time.as_str()))
                    .or_default()
                    .push_back(t.value);
            }

            let before = rows.len();
            for h in &humidity {
                let Some(temperature) = by_time
                    .get_mut(&(h.date, h.time.as_str()))
                    .and_then(VecDeque::pop_front)
                else {
                    continue;
                };
                if let Some(hour) = hour_of(&h.time) {
                    rows.push(Row {
                        hour,
                        humidity: h.value,
                        temperature,
                    });
                }
            }

            let paired = rows.len() - before;
            if paired != humidity.len() || paired != temperature.len() {
                tracing::warn!(
                    %date,
                    humidity = humidity.len(),
                    temperature = temperature.len(),
                    paired,
                    "Unpaired measurements ignored"
                );
            }
        }

        Ok(rows)
    }

    fn read_day(
        &self,
        metric: Metric,
        date: NaiveDate,
    ) -> Result<Vec<MeasurementRecord>, HistoryError> {
        let mut records = Vec::new();
        for path in self.log.list_files(metric, &[date]) {
            records.extend(MeasurementLog::read_records(&path)?);
        }
        Ok(records)
    }
}

/// keep rows whose humidity is within [p5, p95] of the whole window
fn trim_outliers(rows: Vec<Row>) -> Vec<Row> {
    let mut humidity: Vec<f64> = rows.iter().map(|r| r.humidity).collect();
    humidity.sort_by(f64::total_cmp);

    let low = percentile(&humidity, OUTLIER_FRACTION);
    let high = percentile(&humidity, 1.0 - OUTLIER_FRACTION);

    rows.into_iter()
        .filter(|r| r.humidity >= low && r.humidity <= high)
        .collect()
}

fn hourly_means(rows: &[Row]) -> (Vec<HourlyMean>, Vec<HourlyMean>) {
    let mut buckets: BTreeMap<u8, (f64, f64, usize)> = BTreeMap::new();
    for row in rows {
        let bucket = buckets.entry(row.hour).or_default();
        bucket.0 += row.humidity;
        bucket.1 += row.temperature;
        bucket.2 += 1;
    }

    buckets
        .into_iter()
        .map(|(hour, (humidity, temperature, n))| {
            let n = n as f64;
            (
                HourlyMean { hour, value: humidity / n },
                HourlyMean { hour, value: temperature / n },
            )
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn write(log: &MeasurementLog, date: NaiveDate, samples: &[(u32, u32, f32, f32)]) {
        for (h, m, temperature, humidity) in samples {
            let time = NaiveTime::from_hms_opt(*h, *m, 0).unwrap();
            log.append(date, Metric::Temperature, time, *temperature).unwrap();
            log.append(date, Metric::Humidity, time, *humidity).unwrap();
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [9.0, 10.0, 10.0, 11.0, 11.0, 12.0, 12.0, 13.0, 90.0];
        assert_close(percentile(&sorted, 0.05), 9.4);
        assert_close(percentile(&sorted, 0.95), 59.2);
        assert_close(percentile(&[42.0], 0.05), 42.0);
    }

    #[test]
    fn outliers_are_removed_with_their_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path());
        write(
            &log,
            today(),
            &[
                (14, 0, 20.0, 10.0),
                (14, 5, 21.0, 12.0),
                (14, 10, 22.0, 11.0),
                (14, 15, 99.0, 90.0),
                (14, 20, 5.0, 9.0),
                (15, 0, 23.0, 13.0),
                (15, 5, 20.0, 10.0),
                (15, 10, 21.0, 11.0),
                (15, 15, 22.0, 12.0),
            ],
        );

        let dataset = HistoryAggregator::new(log).build_until(1, today()).unwrap();
        assert_eq!(dataset.title, "Today's data");
        assert_eq!(dataset.rows, 7);

        let hours: Vec<u8> = dataset.hourly_humidity.iter().map(|p| p.hour).collect();
        assert_eq!(hours, vec![14, 15]);
        let temp_hours: Vec<u8> = dataset.hourly_temperature.iter().map(|p| p.hour).collect();
        assert_eq!(temp_hours, hours);

        assert_close(dataset.hourly_humidity[0].value, 11.0);
        assert_close(dataset.hourly_temperature[0].value, 21.0);
        assert_close(dataset.hourly_humidity[1].value, 11.5);
        assert_close(dataset.hourly_temperature[1].value, 21.5);
    }

    fn write_raw(log: &MeasurementLog, metric: Metric, lines: &[&str]) {
        std::fs::create_dir_all(log.dir()).unwrap();
        let body: String = lines.iter().map(|l| format!("2024-05-10;{l}\n")).collect();
        std::fs::write(log.file_path(metric, today()), body).unwrap();
    }

    #[test]
    fn missing_temperature_line_does_not_shift_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path());
        write_raw(&log, Metric::Temperature, &["11:00:00;30"]);
        write_raw(&log, Metric::Humidity, &["10:00:00;50", "11:00:00;60"]);

        let dataset = HistoryAggregator::new(log).build_until(1, today()).unwrap();
        assert_eq!(dataset.rows, 1);
        assert_eq!(dataset.hourly_humidity, vec![HourlyMean { hour: 11, value: 60.0 }]);
        assert_eq!(dataset.hourly_temperature, vec![HourlyMean { hour: 11, value: 30.0 }]);
    }

    #[test]
    fn non_finite_humidity_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path());
        write_raw(&log, Metric::Temperature, &["10:00:00;20", "10:05:00;21", "10:10:00;22"]);
        write_raw(&log, Metric::Humidity, &["10:00:00;40", "10:05:00;40", "10:10:00;NaN"]);

        let dataset = HistoryAggregator::new(log).build_until(1, today()).unwrap();
        assert_eq!(dataset.rows, 2);
        assert_close(dataset.hourly_humidity[0].value, 40.0);
        assert_close(dataset.hourly_temperature[0].value, 20.5);
    }

    #[test]
    fn window_spans_requested_days() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path());
        let yesterday = today().pred_opt().unwrap();
        let long_ago = today().checked_sub_days(Days::new(5)).unwrap();

        write(&log, yesterday, &[(9, 0, 18.0, 50.0)]);
        write(&log, today(), &[(9, 30, 20.0, 50.0)]);
        write(&log, long_ago, &[(9, 0, 40.0, 50.0)]);

        let dataset = HistoryAggregator::new(log).build_until(2, today()).unwrap();
        assert_eq!(dataset.title, "Data from 2024-05-09 to 2024-05-10");
        assert_eq!(dataset.from, yesterday);
        assert_eq!(dataset.rows, 2);
        assert_close(dataset.hourly_temperature[0].value, 19.0);
    }

    #[test]
    fn missing_files_are_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = HistoryAggregator::new(MeasurementLog::new(dir.path()));
        assert!(matches!(
            aggregator.build_until(1, today()),
            Err(HistoryError::Data { .. })
        ));
    }

    #[test]
    fn non_positive_days_are_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = HistoryAggregator::new(MeasurementLog::new(dir.path()));
        for days in [0, -3] {
            assert!(matches!(
                aggregator.build_until(days, today()),
                Err(HistoryError::Input(_))
            ));
        }
    }

    #[test]
    fn parses_user_input() {
        assert_eq!(parse_days(" 3 ").unwrap(), 3);
        for bad in ["0", "-3", "abc", "", "2.5"] {
            assert!(matches!(parse_days(bad), Err(HistoryError::Input(_))), "{bad}");
        }
    }

    #[test]
    fn hour_truncation() {
        assert_eq!(hour_of("14:32:07"), Some(14));
        assert_eq!(hour_of("09:00:00"), Some(9));
        assert_eq!(hour_of("24:00:00"), None);
        assert_eq!(hour_of("xx"), None);
    }
}
