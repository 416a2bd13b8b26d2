//! Append-only measurement log, one text file per metric per calendar day.
//!
//! Layout: `<dir>/<metric>_<YYYY-MM-DD>.txt`, each line `date;time;value`.
//! Every append writes a whole line in one call, so readers (history requests)
//! never need to coordinate with the sampling loop.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};

use crate::domain::Metric;
use crate::error::LogError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One parsed line of a measurement file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub date: NaiveDate,
    /// `HH:MM:SS` as written
    pub time: String,
    pub value: f64,
}

impl MeasurementRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().split(';');
        let date = NaiveDate::parse_from_str(parts.next()?, DATE_FORMAT).ok()?;
        let time = parts.next()?.to_string();
        let value = parts
            .next()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { date, time, value })
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementLog {
    dir: PathBuf,
}

impl MeasurementLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, metric: Metric, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.txt", metric.as_str(), date.format(DATE_FORMAT)))
    }

    /// Append one `date;time;value` line and flush it.
    pub fn append(
        &self,
        date: NaiveDate,
        metric: Metric,
        time: NaiveTime,
        value: f32,
    ) -> Result<(), LogError> {
        let path = self.file_path(metric, date);
        let io_err = |source| LogError {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        let line = format!(
            "{};{};{}\n",
            date.format(DATE_FORMAT),
            time.format(TIME_FORMAT),
            value
        );
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)
    }

    /// Files that exist for `metric` on the given days, in the order of `dates`.
    pub fn list_files(&self, metric: Metric, dates: &[NaiveDate]) -> Vec<PathBuf> {
        dates
            .iter()
            .map(|date| self.file_path(metric, *date))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Read every well-formed line of a measurement file. Malformed lines are
    /// skipped with a warning.
    pub fn read_records(path: &Path) -> Result<Vec<MeasurementRecord>, LogError> {
        let content = fs::read_to_string(path).map_err(|source| LogError {
            path: path.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match MeasurementRecord::parse(line) {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!(file = %path.display(), line = idx + 1, "Skipping malformed measurement line");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn appends_lines_to_per_day_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path().join("measures"));

        log.append(day(3), Metric::Temperature, at(14, 32, 7), 21.5).unwrap();
        log.append(day(3), Metric::Temperature, at(14, 33, 7), 21.0).unwrap();
        log.append(day(3), Metric::Humidity, at(14, 32, 7), 45.0).unwrap();

        let path = log.file_path(Metric::Temperature, day(3));
        assert!(path.ends_with("temperature_2024-05-03.txt"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2024-05-03;14:32:07;21.5\n2024-05-03;14:33:07;21\n"
        );

        let records = MeasurementLog::read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, "14:32:07");
        assert_eq!(records[1].value, 21.0);
    }

    #[test]
    fn list_files_skips_missing_days() {
        let dir = tempfile::tempdir().unwrap();
        let log = MeasurementLog::new(dir.path());

        log.append(day(1), Metric::Humidity, at(8, 0, 0), 40.0).unwrap();
        log.append(day(3), Metric::Humidity, at(8, 0, 0), 41.0).unwrap();
        log.append(day(2), Metric::Temperature, at(8, 0, 0), 20.0).unwrap();

        let files = log.list_files(Metric::Humidity, &[day(3), day(2), day(1)]);
        assert_eq!(
            files,
            vec![
                log.file_path(Metric::Humidity, day(3)),
                log.file_path(Metric::Humidity, day(1)),
            ]
        );
        assert!(log.list_files(Metric::Humidity, &[day(9)]).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("humidity_2024-05-01.txt");
        fs::write(
            &path,
            "2024-05-01;10:00:00;40\ngarbage\n2024-05-01;10:05:00;abc\n\n2024-05-01;10:10:00;42.5\n",
        )
        .unwrap();

        let records = MeasurementLog::read_records(&path).unwrap();
        let values: Vec<f64> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![40.0, 42.5]);
    }

    #[test]
    fn non_finite_values_are_malformed() {
        for value in ["NaN", "inf", "-inf"] {
            let line = format!("2024-05-01;10:00:00;{value}");
            assert_eq!(MeasurementRecord::parse(&line), None, "{value}");
        }
        assert!(MeasurementRecord::parse("2024-05-01;10:00:00;-3.5").is_some());
    }
}
