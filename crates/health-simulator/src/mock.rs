//! Synthetic sensors standing in for the MAX30100 and the BMP280.

use core::f64::consts::PI;

use health_core::sensors::pulse::SAMPLE_RATE_HZ;
use health_core::sensors::{
    OximeterReading, PulseOximeter, PulseProcessor, RawPulseSample, SensorError, Thermometer,
};

/// Produces one 100 Hz photodiode sample per update and runs it through the
/// same [`PulseProcessor`] the real driver uses.
pub struct SimulatedOximeter {
    processor: PulseProcessor,
    phase: f64,
    elapsed_secs: f64,
}

impl SimulatedOximeter {
    pub fn new() -> Self {
        Self {
            processor: PulseProcessor::new(),
            phase: 0.0,
            elapsed_secs: 0.0,
        }
    }

    /// Heart rate wandering slowly between 66 and 78 bpm
    fn target_bpm(&self) -> f64 {
        72.0 + 6.0 * (self.elapsed_secs / 90.0).sin()
    }

    fn next_sample(&mut self) -> RawPulseSample {
        let dt = 1.0 / f64::from(SAMPLE_RATE_HZ);
        self.elapsed_secs += dt;
        self.phase = (self.phase + 2.0 * PI * self.target_bpm() / 60.0 * dt) % (2.0 * PI);

        let wave = self.phase.sin();
        RawPulseSample {
            ir: (50_000.0 + 500.0 * wave) as u16,
            red: (40_000.0 + 300.0 * wave) as u16,
        }
    }
}

impl Default for SimulatedOximeter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseOximeter for SimulatedOximeter {
    async fn update(&mut self) -> Result<OximeterReading, SensorError> {
        let sample = self.next_sample();
        let beat = self.processor.push(sample);
        Ok(OximeterReading {
            heart_rate_bpm: self.processor.heart_rate_bpm(),
            spo2_percent: self.processor.spo2_percent(),
            beats: u8::from(beat),
        })
    }
}

/// Body temperature around 36.8 °C with a slow swing.
pub struct SimulatedThermometer {
    reads: u32,
}

impl SimulatedThermometer {
    pub const fn new() -> Self {
        Self { reads: 0 }
    }
}

impl Default for SimulatedThermometer {
    fn default() -> Self {
        Self::new()
    }
}

impl Thermometer for SimulatedThermometer {
    async fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.reads = self.reads.wrapping_add(1);
        let t = f64::from(self.reads) / f64::from(SAMPLE_RATE_HZ);
        Ok((36.8 + 0.3 * (t / 120.0).sin()) as f32)
    }
}
