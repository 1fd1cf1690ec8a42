//! MAX30100 pulse oximeter over I2C
//!
//! The chip samples IR and red reflectance into a 16-entry FIFO. Each
//! `update` drains whatever has accumulated and runs it through the
//! [`PulseProcessor`]; the loop must therefore call it at least every 160 ms
//! (16 samples at 100 Hz) or samples are lost to FIFO overflow.

use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

use super::pulse::SAMPLE_PERIOD_MS;
use super::{OximeterReading, PulseOximeter, PulseProcessor, RawPulseSample, SensorError};

/// Fixed 7-bit bus address
pub const MAX30100_ADDRESS: u8 = 0x57;

const SENSOR: &str = "MAX30100";

const REG_FIFO_WRITE_POINTER: u8 = 0x02;
const REG_FIFO_OVERFLOW_COUNTER: u8 = 0x03;
const REG_FIFO_READ_POINTER: u8 = 0x04;
const REG_FIFO_DATA: u8 = 0x05;
const REG_MODE_CONFIG: u8 = 0x06;
const REG_SPO2_CONFIG: u8 = 0x07;
const REG_LED_CONFIG: u8 = 0x09;
const REG_PART_ID: u8 = 0xFF;

const EXPECTED_PART_ID: u8 = 0x11;

/// Heart rate plus SpO2: both LEDs pulsed alternately
const MODE_SPO2: u8 = 0x03;

/// High-resolution ADC, 100 samples/s, 1600 us LED pulses (16-bit samples)
const SPO2_CONFIG: u8 = 0x40 | (0x01 << 2) | 0x03;

const FIFO_DEPTH: usize = 16;

/// Time the FIFO takes to fill, and overflow, without a drain
pub const FIFO_WINDOW_MS: u64 = (FIFO_DEPTH as u32 * SAMPLE_PERIOD_MS) as u64;

const BYTES_PER_SAMPLE: usize = 4;

/// LED drive current, in the chip's register encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedCurrent {
    Off = 0x0,
    Ma4_4 = 0x1,
    Ma7_6 = 0x2,
    Ma11_0 = 0x3,
    Ma14_2 = 0x4,
    Ma17_4 = 0x5,
    Ma20_8 = 0x6,
    Ma24_0 = 0x7,
    Ma27_1 = 0x8,
    Ma30_6 = 0x9,
    Ma33_8 = 0xA,
    Ma37_0 = 0xB,
    Ma40_2 = 0xC,
    Ma43_6 = 0xD,
    Ma46_8 = 0xE,
    Ma50_0 = 0xF,
}

/// Register-level MAX30100 driver feeding the pulse processing chain.
pub struct Max30100<I> {
    i2c: I,
    processor: PulseProcessor,
    ir_current: LedCurrent,
    red_current: LedCurrent,
}

impl<I: I2c> Max30100<I> {
    /// Defaults: 7.6 mA on the IR LED, 27.1 mA on the red one.
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            processor: PulseProcessor::new(),
            ir_current: LedCurrent::Ma7_6,
            red_current: LedCurrent::Ma27_1,
        }
    }

    pub fn with_ir_current(mut self, current: LedCurrent) -> Self {
        self.ir_current = current;
        self
    }

    pub fn with_red_current(mut self, current: LedCurrent) -> Self {
        self.red_current = current;
        self
    }

    /// Check the part id, configure SpO2 mode and empty the FIFO.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        let part_id = self.read_register(REG_PART_ID).await.map_err(|_| SensorError::NotFound {
            sensor: SENSOR,
            details: "no response at 0x57",
        })?;
        if part_id != EXPECTED_PART_ID {
            error!("{}: unexpected part id 0x{:02X}", SENSOR, part_id);
            return Err(SensorError::NotFound {
                sensor: SENSOR,
                details: "unexpected part id",
            });
        }

        let led_config = ((self.red_current as u8) << 4) | self.ir_current as u8;
        for (register, value) in [
            (REG_MODE_CONFIG, MODE_SPO2),
            (REG_SPO2_CONFIG, SPO2_CONFIG),
            (REG_LED_CONFIG, led_config),
            (REG_FIFO_WRITE_POINTER, 0),
            (REG_FIFO_OVERFLOW_COUNTER, 0),
            (REG_FIFO_READ_POINTER, 0),
        ] {
            self.write_register(register, value).await.map_err(|_| {
                SensorError::InitializationFailed {
                    sensor: SENSOR,
                    details: "failed to write configuration",
                }
            })?;
        }

        info!(
            "{}: SpO2 mode, 100 Hz, LED config 0x{:02X}",
            SENSOR, led_config
        );
        Ok(())
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, I::Error> {
        let mut value = [0u8];
        self.i2c
            .write_read(MAX30100_ADDRESS, &[register], &mut value)
            .await?;
        Ok(value[0])
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(MAX30100_ADDRESS, &[register, value]).await
    }

    /// Number of samples waiting in the FIFO.
    async fn pending_samples(&mut self) -> Result<usize, I::Error> {
        let write = self.read_register(REG_FIFO_WRITE_POINTER).await?;
        let read = self.read_register(REG_FIFO_READ_POINTER).await?;
        let pending = usize::from(write.wrapping_sub(read)) & (FIFO_DEPTH - 1);
        if pending == 0 && self.read_register(REG_FIFO_OVERFLOW_COUNTER).await? > 0 {
            // Pointers caught up with each other: the FIFO is full, not empty.
            return Ok(FIFO_DEPTH);
        }
        Ok(pending)
    }

    /// Read every pending sample into the processor; returns beats detected.
    async fn drain_fifo(&mut self) -> Result<u8, I::Error> {
        let pending = self.pending_samples().await?;
        if pending == 0 {
            return Ok(0);
        }

        let mut raw = [0u8; FIFO_DEPTH * BYTES_PER_SAMPLE];
        let raw = &mut raw[..pending * BYTES_PER_SAMPLE];
        self.i2c
            .write_read(MAX30100_ADDRESS, &[REG_FIFO_DATA], raw)
            .await?;

        let mut beats = 0u8;
        for chunk in raw.chunks_exact(BYTES_PER_SAMPLE) {
            let sample = RawPulseSample {
                ir: u16::from_be_bytes([chunk[0], chunk[1]]),
                red: u16::from_be_bytes([chunk[2], chunk[3]]),
            };
            if self.processor.push(sample) {
                beats = beats.saturating_add(1);
            }
        }
        debug!("{}: {} samples, {} beats", SENSOR, pending, beats);
        Ok(beats)
    }
}

impl<I: I2c> PulseOximeter for Max30100<I> {
    async fn update(&mut self) -> Result<OximeterReading, SensorError> {
        let beats = self.drain_fifo().await.map_err(|_| SensorError::ReadFailed {
            sensor: SENSOR,
            operation: "drain FIFO",
            details: "I2C communication error",
        })?;

        Ok(OximeterReading {
            heart_rate_bpm: self.processor.heart_rate_bpm(),
            spo2_percent: self.processor.spo2_percent(),
            beats,
        })
    }
}
