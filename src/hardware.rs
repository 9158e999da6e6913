use esp_hal::{
    Blocking,
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    gpio::{AnyPin, DriveMode, Level, Output, OutputConfig},
    ledc::{
        LSGlobalClkSource, Ledc, LowSpeed,
        channel::{self, Channel, ChannelIFace},
        timer::{self, Timer, TimerIFace},
    },
    peripherals::{ADC1, GPIO34, LEDC},
    time::Rate,
};

use crate::config::PWM_FREQ_HZ;
use crate::logic::adc_to_battery_volts;
use crate::traits::{BatterySensor, ChargeOutputs, StatusLed};

/// Oneshot conversions averaged per voltage reading.
const ADC_SAMPLES: u32 = 16;

// Relay modules are active-low, MOSFET gates active-high, the LED active-low.
const RELAY_ON: Level = Level::Low;
const RELAY_OFF: Level = Level::High;
const MOSFET_ON: Level = Level::High;
const MOSFET_OFF: Level = Level::Low;
const LED_ON: Level = Level::Low;
const LED_OFF: Level = Level::High;

/// Battery voltage behind the divider on GPIO34 (ADC1_CH6)
pub struct Esp32Battery<'a> {
    adc: Adc<'a, ADC1<'a>, Blocking>,
    pin: AdcPin<GPIO34<'a>, ADC1<'a>>,
}

impl<'a> Esp32Battery<'a> {
    pub fn new(adc1: ADC1<'a>, sense: GPIO34<'a>) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin(sense, Attenuation::_11dB);
        let adc = Adc::new(adc1, config);
        Self { adc, pin }
    }

    pub fn read_raw(&mut self) -> Result<u16, &'static str> {
        let mut sum = 0u32;
        for _ in 0..ADC_SAMPLES {
            let sample =
                nb::block!(self.adc.read_oneshot(&mut self.pin)).map_err(|_| "ADC read failed")?;
            sum += u32::from(sample);
        }
        Ok((sum / ADC_SAMPLES) as u16)
    }
}

impl BatterySensor for Esp32Battery<'_> {
    fn read_volts(&mut self) -> Result<f32, &'static str> {
        self.read_raw().map(adc_to_battery_volts)
    }
}

/// LEDC peripheral with its slow clock sourced from APB.
pub fn init_ledc<'a>(ledc: LEDC<'a>) -> Ledc<'a> {
    let mut ledc = Ledc::new(ledc);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    ledc
}

/// 8-bit, 5 kHz timer shared by all discharge channels.
pub fn discharge_timer<'a>(ledc: &Ledc<'a>) -> Result<Timer<'a, LowSpeed>, &'static str> {
    let mut timer = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty8Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(PWM_FREQ_HZ),
        })
        .map_err(|_| "Failed to configure PWM timer")?;
    Ok(timer)
}

/// One discharge driver channel, starting at 100% duty (driver off).
pub fn discharge_channel<'a, P>(
    ledc: &Ledc<'a>,
    timer: &'a Timer<'a, LowSpeed>,
    number: channel::Number,
    pin: P,
) -> Result<Channel<'a, LowSpeed>, &'static str>
where
    P: Into<AnyPin<'a>>,
{
    let mut channel = ledc.channel(number, pin.into());
    channel
        .configure(channel::config::Config {
            timer,
            duty_pct: 100,
            drive_mode: DriveMode::PushPull,
        })
        .map_err(|_| "Failed to configure PWM channel")?;
    Ok(channel)
}

/// Charger relay, four charging gates and four discharge channels
pub struct Esp32Outputs<'a> {
    relay: Output<'a>,
    gates: [Output<'a>; 4],
    discharge: [Channel<'a, LowSpeed>; 4],
}

impl<'a> Esp32Outputs<'a> {
    pub fn new<RELAY, G0, G1, G2, G3>(
        relay_gpio: RELAY,
        gate_gpios: (G0, G1, G2, G3),
        discharge: [Channel<'a, LowSpeed>; 4],
    ) -> Self
    where
        RELAY: Into<AnyPin<'a>>,
        G0: Into<AnyPin<'a>>,
        G1: Into<AnyPin<'a>>,
        G2: Into<AnyPin<'a>>,
        G3: Into<AnyPin<'a>>,
    {
        let gate = |pin: AnyPin<'a>| Output::new(pin, MOSFET_OFF, OutputConfig::default());

        Self {
            relay: Output::new(relay_gpio.into(), RELAY_OFF, OutputConfig::default()),
            gates: [
                gate(gate_gpios.0.into()),
                gate(gate_gpios.1.into()),
                gate(gate_gpios.2.into()),
                gate(gate_gpios.3.into()),
            ],
            discharge,
        }
    }
}

impl ChargeOutputs for Esp32Outputs<'_> {
    fn set_charging(&mut self, on: bool) -> Result<(), &'static str> {
        let (relay, gate) = if on {
            (RELAY_ON, MOSFET_ON)
        } else {
            (RELAY_OFF, MOSFET_OFF)
        };
        for output in self.gates.iter_mut() {
            output.set_level(gate);
        }
        self.relay.set_level(relay);
        Ok(())
    }

    fn set_discharge_duty(&mut self, duty_pct: u8) -> Result<(), &'static str> {
        for channel in self.discharge.iter() {
            channel
                .set_duty(duty_pct)
                .map_err(|_| "Failed to set PWM duty")?;
        }
        Ok(())
    }
}

/// Built-in LED on GPIO2
pub struct Esp32Led<'a> {
    pin: Output<'a>,
}

impl<'a> Esp32Led<'a> {
    pub fn new<P: Into<AnyPin<'a>>>(gpio: P) -> Self {
        Self {
            pin: Output::new(gpio.into(), LED_OFF, OutputConfig::default()),
        }
    }
}

impl StatusLed for Esp32Led<'_> {
    fn set(&mut self, on: bool) -> Result<(), &'static str> {
        self.pin.set_level(if on { LED_ON } else { LED_OFF });
        Ok(())
    }
}
