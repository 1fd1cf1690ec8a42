//! Desktop simulator for the health monitor.
//!
//! Runs the health-core pipeline on the host with synthetic sensors: the
//! sampler thread feeds the latest-reading store and the display queue, the
//! display thread renders each snapshot into a 128x64 frame buffer printed
//! as ASCII art, and the web read-out is served on localhost.
//!
//! # Environment
//!
//! | Variable            | Default          | Meaning                       |
//! |---------------------|------------------|-------------------------------|
//! | `HEALTH_SIM_ADDR`   | `127.0.0.1:8080` | Address of the HTTP server    |
//! | `HEALTH_SIM_FRAMES` | set              | `0` stops printing the frames |
//! | `RUST_LOG`          | unset            | `env_logger` filter           |

mod mock;
mod server;

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant as StdInstant};

use embassy_futures::block_on;
use embassy_time::Instant;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_hal_async::delay::DelayNs;
use health_core::MonitorContext;
use health_core::config::{MonitorConfig, SCREEN_HEIGHT_PX, SCREEN_WIDTH_PX};
use health_core::display::DisplayTask;
use health_core::framebuffer::FrameBuffer;
use health_core::sampler::Sampler;
use log::{error, info, warn};

use mock::{SimulatedOximeter, SimulatedThermometer};

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Same loop period as the firmware
const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// How often the display thread checks the queue
const DISPLAY_POLL: Duration = Duration::from_millis(50);

/// Delay backed by `thread::sleep`; times the queue's bounded waits.
struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Render a frame as text, two pixel rows per line.
fn frame_to_ascii(frame: &FrameBuffer) -> String {
    let width = SCREEN_WIDTH_PX as usize;
    let height = SCREEN_HEIGHT_PX as usize;
    let mut out = String::with_capacity((width + 3) * (height / 2 + 2));

    let border = format!("+{}+\n", "-".repeat(width));
    out.push_str(&border);
    for y in (0..height).step_by(2) {
        out.push('|');
        for x in 0..width {
            let top = frame.pixel(x, y) == BinaryColor::On;
            let bottom = frame.pixel(x, y + 1) == BinaryColor::On;
            out.push(match (top, bottom) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push_str("|\n");
    }
    out.push_str(&border);
    out
}

fn run_sampler(context: &MonitorContext) -> ! {
    let mut sampler = Sampler::new(context, SimulatedOximeter::new(), SimulatedThermometer::new());
    let mut delay = StdDelay;
    let start = StdInstant::now();
    info!("Sampling every {} ms", SAMPLE_INTERVAL.as_millis());

    loop {
        let tick = StdInstant::now();
        let now = Instant::from_micros(start.elapsed().as_micros() as u64);
        block_on(sampler.step(now, &mut delay));

        if let Some(rest) = SAMPLE_INTERVAL.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }
}

fn run_display(context: &MonitorContext, print_frames: bool) {
    let mut display = DisplayTask::new(FrameBuffer::new(), &context.queue);
    if let Err(e) = block_on(display.welcome()) {
        warn!("Failed to draw welcome screen: {:?}", e);
    }
    if print_frames {
        println!("{}", frame_to_ascii(display.screen()));
    }

    loop {
        drain_queue(&mut display, context, print_frames);
        thread::sleep(DISPLAY_POLL);
    }
}

/// Show every queued reading through the display task's own loop body.
fn drain_queue(
    display: &mut DisplayTask<'_, FrameBuffer>,
    context: &MonitorContext,
    print_frames: bool,
) {
    // Only run the task with a reading waiting, `block_on` would spin on an
    // empty queue.
    while !context.queue.is_empty() {
        let frames = display.frames();
        block_on(display.run_once());
        if print_frames && display.frames() != frames {
            println!("{}", frame_to_ascii(display.screen()));
        }
    }
}

fn main() {
    env_logger::init();
    info!("Starting health monitor simulator");

    let addr = std::env::var("HEALTH_SIM_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
    let print_frames = std::env::var("HEALTH_SIM_FRAMES").map_or(true, |v| v != "0");

    let listener = match TcpListener::bind(&addr) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    let context = MonitorContext::new(MonitorConfig::DEFAULT);

    thread::scope(|s| {
        s.spawn(|| run_display(&context, print_frames));
        s.spawn(|| server::serve(listener, &context.latest));
        run_sampler(&context)
    });
}

#[cfg(test)]
mod tests {
    use embedded_graphics::prelude::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    use health_core::SensorReading;

    use super::*;

    #[test]
    fn test_display_thread_shows_every_queued_reading() {
        let context = MonitorContext::default();
        let mut display = DisplayTask::new(FrameBuffer::new(), &context.queue);
        for n in 0..3 {
            context.queue.try_push(SensorReading::new(70 + n, 97, 98.6)).unwrap();
        }

        drain_queue(&mut display, &context, false);

        assert_eq!(display.frames(), 3);
        assert!(context.queue.is_empty());
        assert!(!display.screen().is_blank());
    }

    #[test]
    fn test_blank_frame_has_only_borders() {
        let ascii = frame_to_ascii(&FrameBuffer::new());
        let lines: Vec<&str> = ascii.lines().collect();
        assert_eq!(lines.len(), 34);
        assert!(lines[1..33].iter().all(|l| l.trim_matches('|').trim().is_empty()));
    }

    #[test]
    fn test_pixels_map_to_half_blocks() {
        let mut frame = FrameBuffer::new();
        Rectangle::new(Point::new(0, 0), Size::new(1, 1))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut frame)
            .unwrap();
        Rectangle::new(Point::new(1, 0), Size::new(1, 2))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut frame)
            .unwrap();
        Rectangle::new(Point::new(2, 1), Size::new(1, 1))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut frame)
            .unwrap();

        let ascii = frame_to_ascii(&frame);
        let first_row = ascii.lines().nth(1).unwrap();
        assert!(first_row.starts_with("|▀█▄ "));
    }
}
