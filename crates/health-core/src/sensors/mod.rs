//! Sensor traits, errors and drivers
//!
//! The sampler only knows the [`PulseOximeter`] and [`Thermometer`] traits.
//! Drivers for the MAX30100 and the BMP280 implement them on top of any
//! `embedded-hal-async` I2C bus.

#[cfg(feature = "sensor-bmp280")]
pub mod bmp280;
pub mod max30100;
pub mod pulse;

use thiserror_no_std::Error;

#[cfg(feature = "sensor-bmp280")]
pub use bmp280::Bmp280Thermometer;
pub use max30100::Max30100;
pub use pulse::{PulseProcessor, RawPulseSample};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not found: {details}")]
    NotFound {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} read failed during {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
}

/// What the pulse oximeter driver reports after processing its latest samples.
///
/// Until the driver has locked onto a pulse both values are zero; callers
/// forward them as-is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OximeterReading {
    pub heart_rate_bpm: f32,
    pub spo2_percent: u8,
    /// Beats detected while processing this batch of samples
    pub beats: u8,
}

/// Pulse oximeter driver: pulls pending samples and returns the running estimate.
pub trait PulseOximeter {
    fn update(&mut self) -> impl Future<Output = Result<OximeterReading, SensorError>>;
}

/// Temperature sensor driver reporting degrees Celsius.
pub trait Thermometer {
    fn read_celsius(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// A thermometer that failed to come up reports `NotFound` on every read.
impl<T: Thermometer> Thermometer for Option<T> {
    async fn read_celsius(&mut self) -> Result<f32, SensorError> {
        match self {
            Some(thermometer) => thermometer.read_celsius().await,
            None => Err(SensorError::NotFound {
                sensor: "thermometer",
                details: "not initialized",
            }),
        }
    }
}
