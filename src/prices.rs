//! Hourly price table and running average

use core::fmt::{self, Write};

use heapless::Vec;

use crate::config::{AVERAGE_HISTORY_WEIGHT, INITIAL_AVERAGE_PRICE, MAX_PRICES};
use crate::model::{Hour, HourPrice, Price, PriceClass};

/// Prices in arrival order. Hours are neither sorted nor deduplicated.
pub type PriceTable = Vec<HourPrice, MAX_PRICES>;

/// Price window plus the running average the control loop classifies against.
#[derive(Debug, Clone)]
pub struct PriceStore {
    table: PriceTable,
    average: Price,
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceStore {
    pub const fn new() -> Self {
        Self::with_average(INITIAL_AVERAGE_PRICE)
    }

    pub const fn with_average(seed: Price) -> Self {
        Self {
            table: Vec::new(),
            average: seed,
        }
    }

    pub fn average(&self) -> Price {
        self.average
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn capacity(&self) -> usize {
        MAX_PRICES
    }

    pub fn records(&self) -> &[HourPrice] {
        &self.table
    }

    /// Price of the first record for `hour`.
    pub fn lookup(&self, hour: Hour) -> Option<Price> {
        self.table
            .iter()
            .find(|record| record.hour == hour)
            .map(|record| record.price)
    }

    pub fn lowest(&self) -> Option<Price> {
        self.table.iter().map(|record| record.price).min()
    }

    pub fn highest(&self) -> Option<Price> {
        self.table.iter().map(|record| record.price).max()
    }

    /// Number of records strictly after `current`.
    pub fn count_future_hours(&self, current: Hour) -> usize {
        self.table
            .iter()
            .filter(|record| record.hour > current)
            .count()
    }

    pub fn reset(&mut self) {
        self.table.clear();
    }

    /// Fold the stored prices into the running average, history weighted 10:1
    /// against the whole batch. An empty table leaves the average as it is.
    pub fn update_average(&mut self) {
        let (sum, count) = self
            .table
            .iter()
            .fold((0i64, 0i64), |(sum, count), record| {
                (sum + i64::from(record.price), count + 1)
            });

        let weighted = AVERAGE_HISTORY_WEIGHT * i64::from(self.average) + sum;
        // A weighted mean of i32 values stays within i32.
        self.average = (weighted / (AVERAGE_HISTORY_WEIGHT + count)) as Price;
    }

    /// Install a freshly ingested table and fold it into the average once.
    pub fn replace(&mut self, table: PriceTable) {
        self.table = table;
        self.update_average();
    }

    /// True when `hour` is the cheapest stored hour and below the average.
    pub fn price_is_lowest(&self, hour: Hour) -> bool {
        match self.lookup(hour) {
            Some(price) => price < self.average && Some(price) == self.lowest(),
            None => false,
        }
    }

    /// True when `hour` is the most expensive stored hour and above the average.
    pub fn price_is_highest(&self, hour: Hour) -> bool {
        match self.lookup(hour) {
            Some(price) => price > self.average && Some(price) == self.highest(),
            None => false,
        }
    }

    pub fn classify(&self, hour: Hour) -> PriceClass {
        if self.price_is_lowest(hour) {
            PriceClass::Cheapest
        } else if self.price_is_highest(hour) {
            PriceClass::MostExpensive
        } else {
            PriceClass::Neutral
        }
    }

    /// Human readable dump of the extremes, the average and every slot.
    pub fn write_debug<W: Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "lowest: ")?;
        write_price(out, self.lowest())?;
        write!(out, "\nhighest: ")?;
        write_price(out, self.highest())?;
        writeln!(out)?;
        writeln!(out, "capacity: {}", self.capacity())?;
        writeln!(out, "average: {}", self.average)?;
        writeln!(out, "prices:")?;
        for index in 0..self.capacity() {
            match self.table.get(index) {
                Some(record) => writeln!(out, "{} {} {}", index, record.hour, record.price)?,
                None => writeln!(out, "{} - -", index)?,
            }
        }
        Ok(())
    }
}

fn write_price<W: Write>(out: &mut W, price: Option<Price>) -> fmt::Result {
    match price {
        Some(price) => write!(out, "{}", price),
        None => write!(out, "-"),
    }
}

impl fmt::Display for PriceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_debug(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(records: &[(Hour, Price)]) -> PriceTable {
        records
            .iter()
            .map(|&(hour, price)| HourPrice::new(hour, price))
            .collect()
    }

    fn store(records: &[(Hour, Price)]) -> PriceStore {
        let mut store = PriceStore::new();
        store.replace(table(records));
        store
    }

    #[test]
    fn three_hour_window() {
        let store = store(&[(100, 30), (101, 10), (102, 50)]);
        assert_eq!(store.lowest(), Some(10));
        assert_eq!(store.highest(), Some(50));
        assert_eq!(store.lookup(101), Some(10));
        assert_eq!(store.lookup(103), None);
        assert_eq!(store.count_future_hours(100), 2);
        assert_eq!(store.count_future_hours(102), 0);
    }

    #[test]
    fn reset_clears_every_query() {
        let mut store = store(&[(100, 30), (101, 10)]);
        let average = store.average();
        store.reset();
        assert_eq!(store.lowest(), None);
        assert_eq!(store.highest(), None);
        assert_eq!(store.count_future_hours(0), 0);
        assert_eq!(store.lookup(100), None);
        assert_eq!(store.average(), average);
    }

    #[test]
    fn lookup_returns_first_duplicate() {
        let store = store(&[(5, 40), (5, 12)]);
        assert_eq!(store.lookup(5), Some(40));
        assert_eq!(store.lowest(), Some(12));
    }

    #[test]
    fn hour_zero_is_a_real_record() {
        let store = store(&[(0, 3), (1, 90)]);
        assert_eq!(store.lowest(), Some(3));
        assert_eq!(store.lookup(0), Some(3));
    }

    #[test]
    fn average_smooths_toward_history() {
        let store = store(&[(100, 10)]);
        assert_eq!(store.average(), 23);
    }

    #[test]
    fn average_truncates_toward_zero() {
        let mut store = PriceStore::with_average(-5);
        store.replace(table(&[(1, -1)]));
        // (-50 - 1) / 11 = -4.63..
        assert_eq!(store.average(), -4);
    }

    #[test]
    fn empty_batch_keeps_average() {
        let mut store = PriceStore::with_average(31);
        store.replace(PriceTable::new());
        assert_eq!(store.average(), 31);
    }

    #[test]
    fn full_batch_weighs_in() {
        let prices: PriceTable = (0..MAX_PRICES as Hour)
            .map(|hour| HourPrice::new(hour + 1, 40))
            .collect();
        let mut store = PriceStore::with_average(25);
        store.replace(prices);
        // (250 + 72 * 40) / 82 = 38.17
        assert_eq!(store.average(), 38);
    }

    #[test]
    fn large_prices_do_not_overflow() {
        let prices: PriceTable = (0..MAX_PRICES as Hour)
            .map(|hour| HourPrice::new(hour + 1, Price::MAX))
            .collect();
        let mut store = PriceStore::with_average(Price::MAX);
        store.replace(prices);
        assert_eq!(store.average(), Price::MAX);
    }

    #[test]
    fn lowest_requires_price_below_average() {
        // average stays at 25 + batch: (250 + 30 + 40) / 12 = 26
        let store = store(&[(10, 30), (11, 40)]);
        assert_eq!(store.average(), 26);
        assert_eq!(store.lowest(), Some(30));
        assert!(!store.price_is_lowest(10));
        assert!(store.price_is_highest(11));
    }

    #[test]
    fn lowest_and_highest_hours() {
        let store = store(&[(100, 30), (101, 10), (102, 50)]);
        assert!(store.price_is_lowest(101));
        assert!(!store.price_is_lowest(100));
        assert!(store.price_is_highest(102));
        assert!(!store.price_is_highest(100));
        assert_eq!(store.classify(101), PriceClass::Cheapest);
        assert_eq!(store.classify(102), PriceClass::MostExpensive);
        assert_eq!(store.classify(100), PriceClass::Neutral);
    }

    #[test]
    fn unknown_hour_is_neutral() {
        let store = store(&[(100, 30), (101, 10)]);
        assert!(!store.price_is_lowest(999));
        assert!(!store.price_is_highest(999));
        assert_eq!(PriceStore::new().classify(0), PriceClass::Neutral);
    }

    #[test]
    fn tied_minimum_hours_are_all_lowest() {
        let store = store(&[(1, 5), (2, 5), (3, 60)]);
        assert!(store.price_is_lowest(1));
        assert!(store.price_is_lowest(2));
    }

    #[test]
    fn debug_dump_lists_every_slot() {
        let store = store(&[(100, 30), (101, 10)]);
        let dump = store.to_string();
        let mut lines = dump.lines();
        assert_eq!(lines.next(), Some("lowest: 10"));
        assert_eq!(lines.next(), Some("highest: 30"));
        assert_eq!(lines.next(), Some("capacity: 72"));
        assert_eq!(lines.next(), Some("average: 24"));
        assert_eq!(lines.next(), Some("prices:"));
        assert_eq!(lines.next(), Some("0 100 30"));
        assert_eq!(lines.next(), Some("1 101 10"));
        assert_eq!(lines.next(), Some("2 - -"));
        assert_eq!(dump.lines().count(), 5 + store.capacity());
        assert_eq!(store.capacity(), MAX_PRICES);
    }

    #[test]
    fn debug_dump_of_empty_store() {
        let dump = PriceStore::new().to_string();
        assert!(dump.starts_with("lowest: -\nhighest: -\n"));
        assert!(dump.contains("average: 25\n"));
    }
}
