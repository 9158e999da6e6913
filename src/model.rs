// Model of the data tracked by the price store

/// Hours elapsed since 1970-01-01T00:00Z.
pub type Hour = u32;

/// Tariff in API units (hundredths of a euro, so `25` is €0.25).
pub type Price = i32;

/// One priced hour as delivered by the tariff API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourPrice {
    pub hour: Hour,
    pub price: Price,
}

impl HourPrice {
    pub const fn new(hour: Hour, price: Price) -> Self {
        Self { hour, price }
    }
}

/// Where an hour sits relative to the stored window and the running average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceClass {
    /// Cheapest stored hour and below the running average.
    Cheapest,
    /// Most expensive stored hour and above the running average.
    MostExpensive,
    Neutral,
}
