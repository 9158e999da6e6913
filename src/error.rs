//! Error types for the tariff refresh cycle

use thiserror::Error;

/// Failure to get a payload from the tariff API at all.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("DNS lookup failed")]
    Dns,
    #[error("connection failed")]
    Connect,
    #[error("TLS handshake failed")]
    Tls,
    #[error("request failed")]
    Request,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("response body does not fit the receive buffer")]
    BodyTooLarge,
}

/// Timestamp that does not match `YYYY-MM-DDTHH`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp too short")]
    Length,
    #[error("unexpected separator at offset {0}")]
    Separator(usize),
    #[error("non-digit character in date field")]
    Digits,
    #[error("date field out of range")]
    OutOfRange,
}

/// Payload received but not usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid tariff document")]
    Json,
    #[error("bad record timestamp: {0}")]
    Timestamp(#[from] TimestampError),
}

/// Why a refresh left the price store untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),
}

/// Wall clock sync rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("time {0} is before the plausible range")]
    Implausible(u64),
}

/// Request URL could not be built.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlError {
    #[error("request bound cannot be formatted: {0}")]
    Time(#[from] TimestampError),
    #[error("request URL does not fit {0} bytes")]
    TooLong(usize),
}
