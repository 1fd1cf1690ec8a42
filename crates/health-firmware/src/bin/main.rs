#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Ticker, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use health_core::MonitorContext;
use health_core::config::{MonitorConfig, NetworkMode};
use health_core::display::DisplayTask;
use health_core::init::{BootDecision, Component, InitReport};
use health_core::sampler::Sampler;
use health_core::sensors::{Bmp280Thermometer, Max30100, PulseOximeter, SensorError, Thermometer};
use health_core::sensors::max30100::LedCurrent;
use health_firmware::hardware::{BusDevice, BusDevices, I2C_FREQUENCY_KHZ, share_i2c};
use health_firmware::net;
use health_firmware::oled::Oled;
use log::{error, info, warn};
use static_cell::StaticCell;

/// Sampling loop period; keeps the MAX30100 FIFO (16 samples at 100 Hz) from overflowing
const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static CONTEXT: StaticCell<MonitorContext> = StaticCell::new();

#[embassy_executor::task]
async fn display_task(mut task: DisplayTask<'static, Oled<BusDevice>>) {
    task.run().await
}

async fn init_oximeter(i2c: BusDevice) -> Result<Max30100<BusDevice>, SensorError> {
    let mut oximeter = Max30100::new(i2c).with_ir_current(LedCurrent::Ma7_6);
    oximeter.init().await?;
    Ok(oximeter)
}

/// Leave whatever is on the screen and stop.
async fn halt(decision: BootDecision) -> ! {
    error!("Cannot run ({:?}), halting", decision);
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // The WiFi driver allocates its buffers on the heap.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let context: &'static MonitorContext = CONTEXT.init(MonitorContext::new(MonitorConfig::DEFAULT));

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )
    .expect("Failed to configure I2C")
    .with_sda(peripherals.GPIO8)
    .with_scl(peripherals.GPIO9)
    .into_async();
    let devices = BusDevices::new(share_i2c(i2c));

    let mut report = InitReport::new();

    let mut display = report
        .record(Component::Display, Oled::new(devices.display).await)
        .map(|oled| DisplayTask::new(oled, &context.queue));
    if let Some(display) = display.as_mut()
        && let Err(e) = display.welcome().await
    {
        warn!("Failed to draw welcome screen: {:?}", e);
    }

    let oximeter = report.record(
        Component::PulseOximeter,
        init_oximeter(devices.oximeter).await,
    );

    let thermometer = report.record(
        Component::Thermometer,
        Bmp280Thermometer::new(devices.thermometer, Delay).await,
    );

    // Nothing to serve without the essentials; stop before bringing up WiFi.
    if let decision @ BootDecision::Halt(_) = report.decide() {
        halt(decision).await;
    }

    let mode = NetworkMode::select(option_env!("WIFI_SSID"), option_env!("WIFI_PASSWORD"));
    let network = net::start(spawner, peripherals.WIFI, context, mode)
        .await
        .map_err(|e| {
            error!("Network bring-up failed: {}", e);
            "WiFi bring-up failed"
        });
    if let Some(active) = report.record(Component::Network, network) {
        info!("Network up in {:?} mode", active);
    }

    let decision = report.decide();
    let (BootDecision::Run | BootDecision::RunDegraded(_), Some(display), Some(oximeter)) =
        (decision, display, oximeter)
    else {
        halt(decision).await
    };
    if let BootDecision::RunDegraded(component) = decision {
        warn!("Running without {}", component);
    }

    spawner
        .spawn(display_task(display))
        .expect("Failed to spawn display task");

    run_sampler(context, oximeter, thermometer).await
}

async fn run_sampler<P, T>(context: &'static MonitorContext, oximeter: P, thermometer: T) -> !
where
    P: PulseOximeter,
    T: Thermometer,
{
    let mut sampler = Sampler::new(context, oximeter, thermometer);
    let mut ticker = Ticker::every(SAMPLE_INTERVAL);
    info!("Sampling every {} ms", SAMPLE_INTERVAL.as_millis());

    loop {
        sampler.step(Instant::now(), &mut Delay).await;
        ticker.next().await;
    }
}
