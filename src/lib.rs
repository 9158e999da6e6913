//! Dynamic-tariff battery controller.
//!
//! The price tracking, date math and charge/discharge decisions are plain
//! `no_std` code that runs (and is tested) on the host. The ESP32 drivers and
//! network tasks sit behind the `firmware` feature.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod datetime;
pub mod error;
pub mod ingest;
pub mod logic;
pub mod model;
pub mod prices;
pub mod traits;

#[cfg(feature = "firmware")]
pub mod hardware;
#[cfg(feature = "firmware")]
pub mod net;
