//! Refresh cycle: request construction, payload parsing and the swap into the
//! price store.
//!
//! The network side is not modelled here. The caller performs a single GET on
//! [`request_url`] and hands the outcome to [`apply_fetch`] (or to
//! [`parse_fetch`] and [`commit`] when the store sits behind a lock). A failed transfer
//! or an unusable document leaves the store exactly as it was. A good document
//! is parsed into a fresh table first and swapped in afterwards, so readers
//! never see a half-filled window.

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt::Write;

use heapless::String;
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};

use crate::config::{FETCH_WINDOW_HOURS, MAX_PRICES};
use crate::datetime::{ApiTime, SECS_PER_HOUR, format_api_time, hour_start_secs, parse_iso_hour};
use crate::error::{FetchError, ParseError, TransportError, UrlError};
use crate::model::{Hour, HourPrice, Price};
use crate::prices::{PriceStore, PriceTable};

pub const MAX_URL_LEN: usize = 192;

pub type RequestUrl = String<MAX_URL_LEN>;

/// Bounds of one tariff request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestWindow {
    pub start: ApiTime,
    pub end: ApiTime,
}

#[derive(Deserialize)]
struct TariffDocument<'a> {
    #[serde(borrow)]
    data: Vec<TariffPoint<'a>>,
}

#[derive(Deserialize)]
struct TariffPoint<'a> {
    #[serde(borrow)]
    date: Cow<'a, str>,
    values: TariffValues,
}

#[derive(Deserialize)]
struct TariffValues {
    #[serde(rename = "allInPrijs", deserialize_with = "truncated_price")]
    all_in_price: Price,
}

/// Accept integer or fractional prices; fractions are truncated toward zero.
fn truncated_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Price, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    let value = number
        .as_i64()
        .or_else(|| number.as_f64().map(|float| float as i64))
        .unwrap_or(0);
    Ok(value.clamp(i64::from(Price::MIN), i64::from(Price::MAX)) as Price)
}

/// Window starting at the top of `current_hour` and spanning the fetch window.
pub fn request_window(current_hour: Hour) -> Result<RequestWindow, UrlError> {
    let start = hour_start_secs(current_hour);
    let end = start + u64::from(FETCH_WINDOW_HOURS) * SECS_PER_HOUR;
    Ok(RequestWindow {
        start: format_api_time(start)?,
        end: format_api_time(end)?,
    })
}

/// `<base>&startDate=<start>&endDate=<end>`
pub fn request_url(base: &str, current_hour: Hour) -> Result<RequestUrl, UrlError> {
    let window = request_window(current_hour)?;
    let mut url = RequestUrl::new();
    write!(url, "{}&startDate={}&endDate={}", base, window.start, window.end)
        .map_err(|_| UrlError::TooLong(MAX_URL_LEN))?;
    Ok(url)
}

/// Parse a tariff document into a table, keeping records in payload order.
/// Records past the table capacity are dropped.
pub fn parse_payload(body: &[u8]) -> Result<PriceTable, ParseError> {
    let document: TariffDocument<'_> =
        serde_json::from_slice(body).map_err(|_| ParseError::Json)?;

    let mut table = PriceTable::new();
    for point in &document.data {
        let record = HourPrice::new(parse_iso_hour(&point.date)?, point.values.all_in_price);
        if table.push(record).is_err() {
            break;
        }
        debug!("price {} for hour {}", record.price, record.hour);
    }

    if document.data.len() > MAX_PRICES {
        debug!("dropped {} records past capacity", document.data.len() - MAX_PRICES);
    }
    Ok(table)
}

/// Turn the outcome of a tariff fetch into a table ready to install, without
/// touching the store.
pub fn parse_fetch(fetched: Result<&[u8], TransportError>) -> Result<PriceTable, FetchError> {
    fetched
        .map_err(FetchError::from)
        .and_then(|body| parse_payload(body).map_err(FetchError::from))
        .inspect_err(|err| warn!("price refresh failed, keeping previous prices: {}", err))
}

/// Install a parsed table. Returns the number of hours now stored.
pub fn commit(store: &mut PriceStore, table: PriceTable) -> usize {
    let stored = table.len();
    store.replace(table);
    info!(
        "price table updated with {} hours, average now {}",
        stored,
        store.average()
    );
    stored
}

/// Run one refresh cycle over the outcome of a tariff fetch.
pub fn apply_fetch(
    store: &mut PriceStore,
    fetched: Result<&[u8], TransportError>,
) -> Result<usize, FetchError> {
    let table = parse_fetch(fetched)?;
    Ok(commit(store, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TARIFF_API_URL;
    use alloc::format;
    use alloc::string::String as StdString;

    fn document(points: &[(&str, &str)]) -> StdString {
        let body: Vec<StdString> = points
            .iter()
            .map(|(date, price)| {
                format!(r#"{{"date":"{date}","values":{{"allInPrijs":{price}}}}}"#)
            })
            .collect();
        format!(r#"{{"data":[{}]}}"#, body.join(","))
    }

    #[test]
    fn window_spans_two_days() {
        let hour = parse_iso_hour("2025-12-13T23:00:00.000Z").unwrap();
        let window = request_window(hour).unwrap();
        assert_eq!(window.start.as_str(), "2025-12-13T23:00:00.000Z");
        assert_eq!(window.end.as_str(), "2025-12-15T23:00:00.000Z");
    }

    #[test]
    fn url_carries_both_bounds() {
        let hour = parse_iso_hour("2026-01-01T00:00:00.000Z").unwrap();
        let url = request_url(TARIFF_API_URL, hour).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.anwb.nl/energy/energy-services/v2/tarieven/electricity?interval=HOUR\
             &startDate=2026-01-01T00:00:00.000Z&endDate=2026-01-03T00:00:00.000Z"
        );
    }

    #[test]
    fn url_too_long_for_buffer() {
        let base = "x".repeat(MAX_URL_LEN);
        assert_eq!(request_url(&base, 0), Err(UrlError::TooLong(MAX_URL_LEN)));
    }

    #[test]
    fn parses_records_in_order() {
        let body = document(&[
            ("1970-01-05T04:00:00.000Z", "30"),
            ("1970-01-05T05:00:00.000Z", "10"),
            ("1970-01-05T06:00:00.000Z", "50"),
        ]);
        let table = parse_payload(body.as_bytes()).unwrap();
        assert_eq!(
            table.as_slice(),
            &[
                HourPrice::new(100, 30),
                HourPrice::new(101, 10),
                HourPrice::new(102, 50)
            ]
        );
    }

    #[test]
    fn fractional_prices_truncate() {
        let body = document(&[
            ("2025-06-01T10:00:00.000Z", "23.97"),
            ("2025-06-01T11:00:00.000Z", "-4.5"),
        ]);
        let table = parse_payload(body.as_bytes()).unwrap();
        assert_eq!(table[0].price, 23);
        assert_eq!(table[1].price, -4);
    }

    #[test]
    fn escaped_date_is_accepted() {
        let body = br#"{"data":[{"date":"1970-01-01T01:00:00.000\u005A","values":{"allInPrijs":7}}]}"#;
        let table = parse_payload(body).unwrap();
        assert_eq!(table.as_slice(), &[HourPrice::new(1, 7)]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let body = br#"{"meta":{"source":"x"},"data":[{"date":"1970-01-01T01:00:00.000Z","values":{"allInPrijs":7,"marketPrice":3}}]}"#;
        let table = parse_payload(body).unwrap();
        assert_eq!(table.as_slice(), &[HourPrice::new(1, 7)]);
    }

    #[test]
    fn missing_data_array_is_a_parse_error() {
        assert_eq!(parse_payload(br#"{"prices":[]}"#), Err(ParseError::Json));
        assert_eq!(parse_payload(b"<html>"), Err(ParseError::Json));
        assert_eq!(
            parse_payload(br#"{"data":[{"date":"1970-01-01T01:00:00.000Z"}]}"#),
            Err(ParseError::Json)
        );
    }

    #[test]
    fn bad_timestamp_rejects_payload() {
        let body = document(&[
            ("2025-06-01T10:00:00.000Z", "20"),
            ("not a date", "21"),
        ]);
        assert!(matches!(
            parse_payload(body.as_bytes()),
            Err(ParseError::Timestamp(_))
        ));
    }

    #[test]
    fn refresh_replaces_table_and_average() {
        let mut store = PriceStore::new();
        let body = document(&[("1970-01-05T04:00:00.000Z", "10")]);
        assert_eq!(apply_fetch(&mut store, Ok(body.as_bytes())), Ok(1));
        assert_eq!(store.average(), 23);
        assert_eq!(store.lookup(100), Some(10));
    }

    #[test]
    fn transport_failure_keeps_state() {
        let mut store = PriceStore::new();
        let body = document(&[("1970-01-05T04:00:00.000Z", "10")]);
        apply_fetch(&mut store, Ok(body.as_bytes())).unwrap();

        let result = apply_fetch(&mut store, Err(TransportError::Status(503)));
        assert_eq!(
            result,
            Err(FetchError::Transport(TransportError::Status(503)))
        );
        assert_eq!(store.average(), 23);
        assert_eq!(store.lookup(100), Some(10));
    }

    #[test]
    fn parse_failure_keeps_state() {
        let mut store = PriceStore::new();
        let body = document(&[("1970-01-05T04:00:00.000Z", "10")]);
        apply_fetch(&mut store, Ok(body.as_bytes())).unwrap();

        let result = apply_fetch(&mut store, Ok(b"{\"data\": [1, 2".as_slice()));
        assert_eq!(result, Err(FetchError::Parse(ParseError::Json)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.average(), 23);
    }

    #[test]
    fn empty_data_clears_table_keeps_average() {
        let mut store = PriceStore::new();
        let body = document(&[("1970-01-05T04:00:00.000Z", "10")]);
        apply_fetch(&mut store, Ok(body.as_bytes())).unwrap();

        assert_eq!(apply_fetch(&mut store, Ok(br#"{"data":[]}"#.as_slice())), Ok(0));
        assert!(store.is_empty());
        assert_eq!(store.lowest(), None);
        assert_eq!(store.average(), 23);
    }
}
