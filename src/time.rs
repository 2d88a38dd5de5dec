// src/time.rs
//! Conversion between absolute sample positions and calendar time.
//!
//! An absolute position counts sample periods since 1970-01-01T00:00:00Z, so
//! `position / sample_rate` is a Unix time in seconds. Integer-valued rates use
//! exact integer arithmetic; other rates fall back to a floating remainder.

use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

const PICOS_PER_SECOND: u64 = 1_000_000_000_000;

/// Calendar time of one sample, at picosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Picoseconds past `second`
    pub picosecond: u64,
}

/// Convert an absolute sample position to calendar fields.
pub fn sample_to_calendar(absolute_sample: u64, sample_rate: f64) -> Result<SampleTime> {
    let (unix_second, picosecond) = split_seconds(absolute_sample, sample_rate)?;
    SampleTime::from_unix(unix_second, picosecond)
}

/// Whole Unix seconds and leftover picoseconds for a sample position
pub(crate) fn split_seconds(absolute_sample: u64, sample_rate: f64) -> Result<(i64, u64)> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(ArchiveError::Time(format!("sample rate {} is not positive", sample_rate)));
    }

    let (mut unix_second, mut picosecond) = if let Some(rate) = integral_rate(sample_rate) {
        let second = absolute_sample / rate;
        let remainder = absolute_sample % rate;
        let picos = (remainder as u128 * PICOS_PER_SECOND as u128 + rate as u128 / 2) / rate as u128;
        (second, picos as u64)
    } else {
        let samples = absolute_sample as f64;
        let second = (samples / sample_rate).trunc();
        let remainder = samples - second * sample_rate;
        let picos = ((remainder / sample_rate) * PICOS_PER_SECOND as f64).round();
        (second as u64, picos.max(0.0) as u64)
    };

    if picosecond >= PICOS_PER_SECOND {
        unix_second += 1;
        picosecond -= PICOS_PER_SECOND;
    }

    let unix_second = i64::try_from(unix_second)
        .map_err(|_| ArchiveError::Time(format!("sample {} is past the calendar range", absolute_sample)))?;
    Ok((unix_second, picosecond))
}

/// The rate as an integer when it has no fractional part
fn integral_rate(sample_rate: f64) -> Option<u64> {
    if sample_rate.fract() == 0.0 && sample_rate >= 1.0 && sample_rate < u64::MAX as f64 {
        Some(sample_rate as u64)
    } else {
        None
    }
}

impl SampleTime {
    pub fn from_unix(unix_second: i64, picosecond: u64) -> Result<Self> {
        let dt = DateTime::<Utc>::from_timestamp(unix_second, 0)
            .ok_or_else(|| ArchiveError::Time(format!("unix second {} out of range", unix_second)))?;

        Ok(SampleTime {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            picosecond,
        })
    }

    /// Whole seconds since the Unix epoch
    pub fn unix_seconds(&self) -> Result<i64> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .ok_or_else(|| ArchiveError::Time(format!("invalid date {}-{}-{}", self.year, self.month, self.day)))?;
        let datetime = date
            .and_hms_opt(self.hour, self.minute, self.second)
            .ok_or_else(|| ArchiveError::Time(format!("invalid time {}:{}:{}", self.hour, self.minute, self.second)))?;
        Ok(datetime.and_utc().timestamp())
    }

    /// Milliseconds past the second, truncated
    pub fn millisecond(&self) -> u64 {
        self.picosecond / 1_000_000_000
    }

    /// Reconstruct the absolute sample position at `sample_rate`.
    ///
    /// Exact for integer-valued rates.
    pub fn to_sample(&self, sample_rate: f64) -> Result<u64> {
        let seconds = self.unix_seconds()?;
        let seconds = u64::try_from(seconds)
            .map_err(|_| ArchiveError::Time(format!("{} is before the epoch", seconds)))?;

        if let Some(rate) = integral_rate(sample_rate) {
            let within = (self.picosecond as u128 * rate as u128 + PICOS_PER_SECOND as u128 / 2)
                / PICOS_PER_SECOND as u128;
            Ok(seconds * rate + within as u64)
        } else {
            let within = (self.picosecond as f64 / PICOS_PER_SECOND as f64) * sample_rate;
            Ok((seconds as f64 * sample_rate + within).round() as u64)
        }
    }

    /// As a `chrono` timestamp, at microsecond precision
    pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
        let seconds = self.unix_seconds()?;
        let micros = (self.picosecond / 1_000_000) as u32;
        DateTime::<Utc>::from_timestamp(seconds, micros * 1000)
            .ok_or_else(|| ArchiveError::Time(format!("unix second {} out of range", seconds)))
    }

    /// Fixed-width `YYYY-MM-DDTHH:MM:SS` form used for directory names
    pub fn directory_name(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2014-03-09T12:30:30Z
    const MARCH_9_2014: u64 = 1_394_368_230;

    #[test]
    fn test_whole_second_has_no_remainder() {
        let rate = 10.0;
        let start = MARCH_9_2014 * 10;
        let t = sample_to_calendar(start, rate).unwrap();
        assert_eq!((t.year, t.month, t.day), (2014, 3, 9));
        assert_eq!((t.hour, t.minute, t.second), (12, 30, 30));
        assert_eq!(t.picosecond, 0);
        assert_eq!(t.directory_name(), "2014-03-09T12:30:30");
    }

    #[test]
    fn test_sub_second_picoseconds() {
        let t = sample_to_calendar(MARCH_9_2014 * 100 + 1, 100.0).unwrap();
        assert_eq!(t.second, 30);
        assert_eq!(t.picosecond, 10_000_000_000);
        assert_eq!(t.millisecond(), 10);
    }

    #[test]
    fn test_round_trip_integer_rates() {
        for rate in [1.0, 100.0, 1.0e6, 25.0e6] {
            for offset in [0u64, 1, 7, 999, 123_456] {
                let sample = MARCH_9_2014 * rate as u64 + offset;
                let t = sample_to_calendar(sample, rate).unwrap();
                assert_eq!(t.to_sample(rate).unwrap(), sample, "rate {} offset {}", rate, offset);
            }
        }
    }

    #[test]
    fn test_fractional_rate_uses_float_remainder() {
        // 2.5 samples per second: sample 5 is exactly 2 s, sample 6 is 2.4 s
        let t = sample_to_calendar(5, 2.5).unwrap();
        assert_eq!(t.second, 2);
        assert_eq!(t.picosecond, 0);

        let t = sample_to_calendar(6, 2.5).unwrap();
        assert_eq!(t.second, 2);
        assert_eq!(t.picosecond, 400_000_000_000);
        assert_eq!(t.to_sample(2.5).unwrap(), 6);
    }

    #[test]
    fn test_to_datetime() {
        let t = sample_to_calendar(MARCH_9_2014 * 1000 + 250, 1000.0).unwrap();
        let dt = t.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), MARCH_9_2014 as i64);
        assert_eq!(dt.timestamp_subsec_micros(), 250_000);
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(sample_to_calendar(10, 0.0).is_err());
        assert!(sample_to_calendar(10, f64::NAN).is_err());
    }
}
