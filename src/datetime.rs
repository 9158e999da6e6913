//! Conversions between API timestamps, epoch seconds and hour indices

use core::fmt::Write;

use chrono::{DateTime, Datelike, Timelike};
use heapless::String;

use crate::error::TimestampError;
use crate::model::Hour;

pub const SECS_PER_HOUR: u64 = 3_600;

/// `YYYY-MM-DDTHH:MM:00.000Z`
pub type ApiTime = String<24>;

const MONTH_LENGTHS: [[i64; 12]; 2] = [
    [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
    [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31],
];

fn digits(field: &[u8]) -> Result<i64, TimestampError> {
    field.iter().try_fold(0i64, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + i64::from(b - b'0'))
        } else {
            Err(TimestampError::Digits)
        }
    })
}

/// Parse the date and hour of an API timestamp (`2025-12-13T23:00:00.000Z`)
/// into an hour index. Minutes and everything after them are ignored.
///
/// Leap years follow the plain four-year rule, so dates in 2100 from March on
/// come out one day late. Every date from 1970 through 2099 is exact.
pub fn parse_iso_hour(timestamp: &str) -> Result<Hour, TimestampError> {
    let bytes = timestamp.as_bytes();
    if bytes.len() < 13 {
        return Err(TimestampError::Length);
    }
    for (offset, expected) in [(4, b'-'), (7, b'-'), (10, b'T')] {
        if bytes[offset] != expected {
            return Err(TimestampError::Separator(offset));
        }
    }

    let year = digits(&bytes[0..4])?;
    let month = digits(&bytes[5..7])?;
    let day = digits(&bytes[8..10])?;
    let hour = digits(&bytes[11..13])?;

    if year < 1970 || !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 {
        return Err(TimestampError::OutOfRange);
    }

    let leap = usize::from(year % 4 == 0);
    let mut days = 365 * (year - 1970) + (year - 1969) / 4;
    days += MONTH_LENGTHS[leap][..(month - 1) as usize].iter().sum::<i64>();
    days += day - 1;

    Hour::try_from(days * 24 + hour).map_err(|_| TimestampError::OutOfRange)
}

/// Epoch seconds at the start of `hour`.
pub const fn hour_start_secs(hour: Hour) -> u64 {
    hour as u64 * SECS_PER_HOUR
}

/// Format epoch seconds the way the tariff API expects its range bounds.
pub fn format_api_time(epoch_secs: u64) -> Result<ApiTime, TimestampError> {
    let secs = i64::try_from(epoch_secs).map_err(|_| TimestampError::OutOfRange)?;
    let time = DateTime::from_timestamp(secs, 0).ok_or(TimestampError::OutOfRange)?;

    let mut out = ApiTime::new();
    write!(
        out,
        "{:04}-{:02}-{:02}T{:02}:{:02}:00.000Z",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute()
    )
    .map_err(|_| TimestampError::OutOfRange)?;
    Ok(out)
}
