#![no_std]
#![no_main]

use core::panic::PanicInfo;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::{delay::Delay, timer::timg::TimerGroup};

use dynabat::{
    config::ControlConfig,
    datetime::parse_iso_hour,
    hardware::Esp32Battery,
    ingest::apply_fetch,
    logic::{ChargeController, Mode},
    model::PriceClass,
    prices::PriceStore,
    traits::BatterySensor,
};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    esp_println::println!("[PANIC] {:?}", info);
    let delay = Delay::new();
    loop {
        delay.delay_millis(1_000);
    }
}

esp_bootloader_esp_idf::esp_app_desc!();

const SAMPLE_PAYLOAD: &[u8] = br#"{"data":[
    {"date":"1970-01-05T04:00:00.000Z","values":{"allInPrijs":30}},
    {"date":"1970-01-05T05:00:00.000Z","values":{"allInPrijs":10}},
    {"date":"1970-01-05T06:00:00.000Z","values":{"allInPrijs":50}}
]}"#;

// Test result tracking
struct TestResults {
    passed: u32,
    failed: u32,
    total: u32,
}

impl TestResults {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
            total: 0,
        }
    }

    fn assert(&mut self, condition: bool, test_name: &str) {
        self.total += 1;
        if condition {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED", test_name);
        }
    }

    fn assert_eq<T: PartialEq + core::fmt::Debug>(&mut self, left: T, right: T, test_name: &str) {
        self.total += 1;
        if left == right {
            self.passed += 1;
            esp_println::println!("  ✓ {}", test_name);
        } else {
            self.failed += 1;
            esp_println::println!("  ✗ {} FAILED: {:?} != {:?}", test_name, left, right);
        }
    }

    fn print_summary(&self) {
        esp_println::println!("\n==========================================");
        esp_println::println!("Test Summary:");
        esp_println::println!("  Total:  {}", self.total);
        esp_println::println!("  Passed: {}", self.passed);
        esp_println::println!("  Failed: {}", self.failed);
        if self.failed == 0 {
            esp_println::println!("\n✓ ALL TESTS PASSED!");
        } else {
            esp_println::println!("\n✗ SOME TESTS FAILED");
        }
        esp_println::println!("==========================================");
    }
}

fn test_price_store(results: &mut TestResults) {
    esp_println::println!("\n[TEST] Price Store Tests");

    results.assert_eq(
        parse_iso_hour("1970-01-02T05:00:00.000Z"),
        Ok(29),
        "timestamp to hour index",
    );

    let mut store = PriceStore::new();
    results.assert_eq(apply_fetch(&mut store, Ok(SAMPLE_PAYLOAD)), Ok(3), "ingest sample");
    results.assert_eq(store.lowest(), Some(10), "lowest price");
    results.assert_eq(store.highest(), Some(50), "highest price");
    results.assert_eq(store.count_future_hours(100), 2, "future hours");
    results.assert_eq(store.classify(101), PriceClass::Cheapest, "cheapest hour");
    results.assert_eq(store.classify(102), PriceClass::MostExpensive, "most expensive hour");

    let average = store.average();
    let failed = apply_fetch(&mut store, Ok(b"{".as_slice()));
    results.assert(failed.is_err(), "broken payload rejected");
    results.assert_eq(store.average(), average, "average kept on failure");
    results.assert_eq(store.len(), 3, "table kept on failure");
}

fn test_charge_logic(results: &mut TestResults) {
    esp_println::println!("\n[TEST] Charge Logic Tests");

    let mut controller = ChargeController::new(ControlConfig::default());
    results.assert_eq(
        controller.update(PriceClass::Cheapest, 19.0),
        Mode::Charging,
        "charge in cheap hour",
    );
    results.assert_eq(
        controller.update(PriceClass::Cheapest, 21.0),
        Mode::Idle,
        "stop charging at max",
    );
    results.assert_eq(
        controller.update(PriceClass::MostExpensive, 18.0),
        Mode::Discharging,
        "discharge in expensive hour",
    );
    results.assert_eq(
        controller.update(PriceClass::MostExpensive, 17.0),
        Mode::Idle,
        "stop discharging at min",
    );
}

async fn test_battery_adc(
    results: &mut TestResults,
    adc1: esp_hal::peripherals::ADC1<'static>,
    sense: esp_hal::peripherals::GPIO34<'static>,
) {
    esp_println::println!("\n[TEST] Battery ADC Tests");

    let mut battery = Esp32Battery::new(adc1, sense);

    esp_println::println!("  Reading battery voltage (5 samples)...");
    let mut volts = heapless::Vec::<f32, 5>::new();
    for i in 0..5 {
        Timer::after(Duration::from_millis(100)).await;
        match battery.read_volts() {
            Ok(v) => {
                esp_println::println!("    Sample {}: {:.2}V", i + 1, v);
                let _ = volts.push(v);
            }
            Err(e) => {
                esp_println::println!("    Failed to read voltage: {}", e);
            }
        }
    }

    results.assert_eq(volts.len(), 5, "collected 5 voltage samples");

    if volts.len() == 5 {
        for v in volts.iter() {
            results.assert(*v >= 0.0 && *v < 26.0, "voltage within divider range");
        }

        let min = volts.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = volts.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        results.assert(max - min < 0.5, "voltage readings stable (within 0.5V)");
    }
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    esp_alloc::heap_allocator!(size: 32 * 1024);
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_println::println!("\n==========================================");
    esp_println::println!("=== Hardware Unit Test Runner ===");
    esp_println::println!("==========================================");

    let mut results = TestResults::new();

    // Run tests that don't need hardware
    test_price_store(&mut results);
    test_charge_logic(&mut results);

    // Initialize RTOS timer for embassy (this consumes TIMG0)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Run hardware tests
    test_battery_adc(&mut results, peripherals.ADC1, peripherals.GPIO34).await;

    // Print summary
    results.print_summary();

    esp_println::println!("\nTest run complete. Looping...");
    loop {
        Timer::after(Duration::from_millis(1000)).await;
    }
}
