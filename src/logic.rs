//! Business logic layer (hardware-independent)

use core::fmt::Write;

use log::{debug, info};

use crate::config::{
    ADC_REFERENCE_V, ADC_RESOLUTION, ControlConfig, MIN_FUTURE_HOURS, REFRESH_INTERVAL_HOURS,
    VOLTAGE_DIVIDER_RATIO,
};
use crate::model::{Hour, PriceClass};
use crate::prices::PriceStore;
use crate::traits::{BatterySensor, ChargeOutputs, StatusLed};

/// Convert a raw 12-bit ADC reading behind the voltage divider to battery volts.
pub fn adc_to_battery_volts(raw: u16) -> f32 {
    f32::from(raw) / ADC_RESOLUTION * ADC_REFERENCE_V * VOLTAGE_DIVIDER_RATIO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Charging,
    Discharging,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Idle => "Idle",
            Mode::Charging => "Charging",
            Mode::Discharging => "Discharging",
        }
    }
}

/// Inverted discharge duty: the optocoupler pulls the driver's DIM pin low at
/// full duty, which switches the driver off.
pub fn discharge_duty_pct(mode: Mode) -> u8 {
    match mode {
        Mode::Discharging => 0,
        _ => 100,
    }
}

/// Charge/discharge state machine
pub struct ChargeController {
    config: ControlConfig,
    mode: Mode,
}

impl ChargeController {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            mode: Mode::Idle,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decide the mode for this hour's price class and the battery voltage.
    ///
    /// Charging only starts below the resume voltage but, once running, keeps
    /// going up to the maximum while the hour stays cheapest. Discharging runs
    /// in the most expensive hour until the minimum voltage is reached.
    pub fn update(&mut self, class: PriceClass, volts: f32) -> Mode {
        let cfg = &self.config;
        let next = match class {
            PriceClass::Cheapest
                if volts < cfg.max_volts
                    && (self.mode == Mode::Charging || volts < cfg.resume_volts) =>
            {
                Mode::Charging
            }
            PriceClass::MostExpensive if volts > cfg.min_volts => Mode::Discharging,
            _ => Mode::Idle,
        };

        if next != self.mode {
            info!(
                "mode {} -> {} at {}V ({:?})",
                self.mode.as_str(),
                next.as_str(),
                volts,
                class
            );
        }
        self.mode = next;
        next
    }

    /// Status line logged after every control step
    pub fn format_status(&self, volts: f32, class: PriceClass) -> heapless::String<48> {
        let mut buffer = heapless::String::new();
        let _ = write!(buffer, "{:.2}V {} ({:?})", volts, self.mode.as_str(), class);
        buffer
    }
}

/// When to ask the tariff API for a new window
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub min_future_hours: usize,
    pub interval_hours: Hour,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            min_future_hours: MIN_FUTURE_HOURS,
            interval_hours: REFRESH_INTERVAL_HOURS,
        }
    }
}

impl RefreshPolicy {
    pub fn should_refresh(
        &self,
        current_hour: Hour,
        last_success: Option<Hour>,
        future_hours: usize,
    ) -> bool {
        match last_success {
            None => true,
            Some(last) => {
                future_hours < self.min_future_hours
                    || current_hour.saturating_sub(last) >= self.interval_hours
            }
        }
    }
}

/// Read the battery, classify the hour and drive the power stages.
/// Without a known hour the price class is neutral.
pub fn control_step<S, O, L>(
    sensor: &mut S,
    outputs: &mut O,
    led: &mut L,
    controller: &mut ChargeController,
    store: &PriceStore,
    hour: Option<Hour>,
) -> Result<Mode, &'static str>
where
    S: BatterySensor,
    O: ChargeOutputs,
    L: StatusLed,
{
    let volts = sensor.read_volts()?;
    let class = hour.map_or(PriceClass::Neutral, |hour| store.classify(hour));
    let mode = controller.update(class, volts);

    outputs.set_charging(mode == Mode::Charging)?;
    outputs.set_discharge_duty(discharge_duty_pct(mode))?;
    led.set(mode == Mode::Charging)?;

    debug!("{}", controller.format_status(volts, class));
    Ok(mode)
}
