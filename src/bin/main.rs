#![no_std]
#![no_main]

use core::panic::PanicInfo;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::{delay::Delay, ledc::channel, timer::timg::TimerGroup};

use dynabat::{
    config::ControlConfig,
    hardware::{self, Esp32Battery, Esp32Led, Esp32Outputs},
    logic::{ChargeController, Mode, control_step, discharge_duty_pct},
    net::{self, PRICES},
    traits::ChargeOutputs,
};

const CONTROL_INTERVAL_MS: u64 = 10_000;
const HEART_BEAT_INTERVAL_MS: u64 = 60_000;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    esp_println::println!("[PANIC] {:?}", info);
    let delay = Delay::new();
    loop {
        delay.delay_millis(1_000);
        esp_println::println!("[PANIC] continue...");
    }
}

esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn run_heartbeat() {
    loop {
        let hour = net::current_hour().await;
        let (stored, average) = {
            let prices = PRICES.lock().await;
            (prices.len(), prices.average())
        };
        esp_println::println!(
            "[HEARTBEAT] hour={:?} prices={} average={}",
            hour,
            stored,
            average
        );
        Timer::after(Duration::from_millis(HEART_BEAT_INTERVAL_MS)).await;
    }
}

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    esp_alloc::heap_allocator!(size: 72 * 1024);
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_println::println!("=== Dynabat ===");

    // Initialize RTOS timer for embassy
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Power stages first so relay and gates sit in their off state
    let ledc = hardware::init_ledc(peripherals.LEDC);
    let pwm_timer = match hardware::discharge_timer(&ledc) {
        Ok(timer) => timer,
        Err(e) => halt(e).await,
    };
    let discharge = [
        hardware::discharge_channel(&ledc, &pwm_timer, channel::Number::Channel0, peripherals.GPIO32),
        hardware::discharge_channel(&ledc, &pwm_timer, channel::Number::Channel1, peripherals.GPIO33),
        hardware::discharge_channel(&ledc, &pwm_timer, channel::Number::Channel2, peripherals.GPIO25),
        hardware::discharge_channel(&ledc, &pwm_timer, channel::Number::Channel3, peripherals.GPIO18),
    ];
    let discharge = match discharge {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        _ => halt("PWM channel init failed").await,
    };

    let mut outputs = Esp32Outputs::new(
        peripherals.GPIO12,
        (
            peripherals.GPIO13,
            peripherals.GPIO14,
            peripherals.GPIO27,
            peripherals.GPIO26,
        ),
        discharge,
    );
    let mut battery = Esp32Battery::new(peripherals.ADC1, peripherals.GPIO34);
    let mut led = Esp32Led::new(peripherals.GPIO2);

    net::spawn_network(&spawner, peripherals.WIFI);

    // Spawn the background heartbeat task
    if let Err(e) = spawner.spawn(run_heartbeat()) {
        esp_println::println!("[ERROR] Failed to spawn task: {:?}", e);
    }

    let mut controller = ChargeController::new(ControlConfig::default());

    loop {
        let hour = net::current_hour().await;
        let result = {
            let prices = PRICES.lock().await;
            control_step(
                &mut battery,
                &mut outputs,
                &mut led,
                &mut controller,
                &prices,
                hour,
            )
        };

        if let Err(e) = result {
            esp_println::println!("[CONTROL] step failed, outputs off: {}", e);
            let _ = outputs.set_charging(false);
            let _ = outputs.set_discharge_duty(discharge_duty_pct(Mode::Idle));
        }

        Timer::after(Duration::from_millis(CONTROL_INTERVAL_MS)).await;
    }
}

async fn halt(reason: &str) -> ! {
    esp_println::println!("[ERROR] {}", reason);
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
