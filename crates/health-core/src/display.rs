//! Display task: takes snapshots off the queue and draws them on the OLED
//!
//! Every reading replaces the whole screen with three text lines (pulse rate,
//! SpO2 and temperature). Rendering goes through the [`Screen`] trait so the
//! same code drives the SSD1306 on the device, the text dump in the
//! simulator and the recording screens in the tests.

use core::fmt::{Debug, Write};

use embassy_futures::yield_now;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_7X13;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use heapless::String;
use log::{error, info};
use thiserror_no_std::Error;

use crate::framebuffer::FrameBuffer;
use crate::queue::ReadingQueue;
use crate::reading::SensorReading;

/// Baselines of the three reading lines, top to bottom
pub const LINE_BASELINES: [i32; 3] = [15, 35, 55];

/// Left margin of every line
const LEFT_MARGIN: i32 = 0;

/// Longest line we ever format
const LINE_CAPACITY: usize = 32;

const TEXT_STYLE: MonoTextStyle<'static, BinaryColor> =
    MonoTextStyle::new(&FONT_7X13, BinaryColor::On);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    #[error("display not found: {details}")]
    NotFound { details: &'static str },
    #[error("display {operation} failed: {details}")]
    WriteFailed {
        operation: &'static str,
        details: &'static str,
    },
}

/// A monochrome draw target whose contents only become visible on `present`.
///
/// Drawing into a `Screen` fills an off-screen buffer; `present` pushes it to
/// the panel.
pub trait Screen: DrawTarget<Color = BinaryColor> {
    fn present(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

impl Screen for FrameBuffer {
    async fn present(&mut self) -> Result<(), Self::Error> {
        self.mark_clean();
        Ok(())
    }
}

/// Format the three display lines for `reading`.
///
/// A line that does not fit is truncated rather than dropped.
pub fn reading_lines(reading: &SensorReading) -> [String<LINE_CAPACITY>; 3] {
    let mut pulse = String::new();
    let mut spo2 = String::new();
    let mut temp = String::new();
    let _ = write!(pulse, "Pulse: {} /Min", reading.pulse_rate);
    let _ = write!(spo2, "SpO2: {} %", reading.spo2);
    let _ = write!(temp, "Temp: {:.2} *F", reading.temperature_f);
    [pulse, spo2, temp]
}

fn draw_lines<D>(target: &mut D, lines: &[&str]) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target.clear(BinaryColor::Off)?;
    for (line, y) in lines.iter().copied().zip(LINE_BASELINES) {
        Text::with_baseline(
            line,
            Point::new(LEFT_MARGIN, y),
            TEXT_STYLE,
            Baseline::Alphabetic,
        )
        .draw(target)?;
    }
    Ok(())
}

/// Clear `target` and draw `reading` on it.
pub fn draw_reading<D>(target: &mut D, reading: &SensorReading) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let [pulse, spo2, temp] = reading_lines(reading);
    draw_lines(target, &[pulse.as_str(), spo2.as_str(), temp.as_str()])
}

/// Clear `target` and draw the boot greeting.
pub fn draw_welcome<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    draw_lines(target, &["Welcome To", "Health Monitoring", "System"])
}

/// Consumer side of the reading queue.
pub struct DisplayTask<'a, S> {
    screen: S,
    queue: &'a ReadingQueue,
    frames: u32,
}

impl<'a, S> DisplayTask<'a, S>
where
    S: Screen,
    S::Error: Debug,
{
    pub fn new(screen: S, queue: &'a ReadingQueue) -> Self {
        Self {
            screen,
            queue,
            frames: 0,
        }
    }

    /// Replace the screen contents with `reading`.
    pub async fn show(&mut self, reading: &SensorReading) -> Result<(), S::Error> {
        draw_reading(&mut self.screen, reading)?;
        self.screen.present().await?;
        self.frames = self.frames.wrapping_add(1);
        Ok(())
    }

    /// Show the boot greeting.
    pub async fn welcome(&mut self) -> Result<(), S::Error> {
        draw_welcome(&mut self.screen)?;
        self.screen.present().await
    }

    /// Wait for the next reading, log it and draw it.
    ///
    /// A failed render is logged and the reading is skipped.
    pub async fn run_once(&mut self) {
        let reading = self.queue.pop().await;
        info!("{}", reading);

        if let Err(e) = self.show(&reading).await {
            error!("Failed to render reading: {:?}", e);
        }

        yield_now().await;
    }

    /// Render readings forever.
    pub async fn run(&mut self) -> ! {
        info!("Display task started");
        loop {
            self.run_once().await;
        }
    }

    /// Number of frames successfully presented so far
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }
}
