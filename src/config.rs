//! Device configuration constants

use crate::model::Price;

// Tariff API

pub const TARIFF_API_URL: &str =
    "https://api.anwb.nl/energy/energy-services/v2/tarieven/electricity?interval=HOUR";

/// Hours of prices requested per fetch, counted from the start of the current hour.
pub const FETCH_WINDOW_HOURS: u32 = 48;

// Price store

/// Three days of hourly prices.
pub const MAX_PRICES: usize = 72;

/// Running average seed, €0.25 in API units.
pub const INITIAL_AVERAGE_PRICE: Price = 25;

/// Weight of the running average against one new batch of prices.
pub const AVERAGE_HISTORY_WEIGHT: i64 = 10;

// Refresh cadence

/// Refetch when fewer priced hours than this lie ahead.
pub const MIN_FUTURE_HOURS: usize = 12;

/// Refetch at least this often even if enough hours are known.
pub const REFRESH_INTERVAL_HOURS: u32 = 6;

// Voltage sensing
// Divider: 100k (R1) and 15k (R2), ratio = (R1 + R2) / R2

pub const VOLTAGE_DIVIDER_RATIO: f32 = 7.666;
pub const ADC_RESOLUTION: f32 = 4095.0;
pub const ADC_REFERENCE_V: f32 = 3.3;

// Battery thresholds (21V battery system)

pub const BATTERY_MAX_V: f32 = 21.0;
pub const BATTERY_MIN_V: f32 = 17.5;
pub const CHARGING_RESUME_V: f32 = 19.5;

// Discharge PWM (LEDC)

pub const PWM_FREQ_HZ: u32 = 5_000;

/// Battery thresholds used by the charge controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    /// Stop charging at or above this voltage.
    pub max_volts: f32,
    /// Stop discharging at or below this voltage.
    pub min_volts: f32,
    /// Only start charging in a cheap hour below this voltage.
    pub resume_volts: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_volts: BATTERY_MAX_V,
            min_volts: BATTERY_MIN_V,
            resume_volts: CHARGING_RESUME_V,
        }
    }
}
