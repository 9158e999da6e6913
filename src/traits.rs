//! Hardware abstraction traits

/// Trait for the battery voltage sensor
pub trait BatterySensor {
    /// Read the battery voltage in volts
    fn read_volts(&mut self) -> Result<f32, &'static str>;
}

/// Trait for the charge and discharge power stages
pub trait ChargeOutputs {
    /// Switch the charger relay and every charging gate together
    fn set_charging(&mut self, on: bool) -> Result<(), &'static str>;

    /// Set the discharge PWM duty in percent. The driver is wired inverted, so
    /// 100 means no discharge current.
    fn set_discharge_duty(&mut self, duty_pct: u8) -> Result<(), &'static str>;
}

/// Trait for the status indicator
pub trait StatusLed {
    fn set(&mut self, on: bool) -> Result<(), &'static str>;
}
